//! Console settings.
//!
//! Values come from `HORIZON_*` environment variables; the server binary lets
//! command-line flags override them. Nothing here talks to the network.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_KEYSTONE_URL: &str = "http://127.0.0.1:5000/v2.0";
pub const DEFAULT_REGION_NAME: &str = "Default Region";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// A selectable identity endpoint shown on the login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub endpoint: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub http_port: u16,
    /// OPENSTACK_KEYSTONE_URL: identity endpoint used when no region is posted.
    pub keystone_url: String,
    /// AVAILABLE_REGIONS; empty means "only the default endpoint".
    pub available_regions: Vec<Region>,
    /// Override for the network endpoint otherwise read from the service catalog.
    pub network_url: Option<String>,
    /// Override for the compute endpoint otherwise read from the service catalog.
    pub compute_url: Option<String>,
    pub session_ttl: Duration,
    pub api_timeout: Duration,
    /// Emit the `Secure` attribute on the session cookie.
    pub secure_cookies: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            keystone_url: DEFAULT_KEYSTONE_URL.to_string(),
            available_regions: Vec::new(),
            network_url: None,
            compute_url: None,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            secure_cookies: true,
        }
    }
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();
        if let Some(v) = lookup("HORIZON_HTTP_PORT") {
            s.http_port = v.parse().with_context(|| format!("HORIZON_HTTP_PORT is not a port: {}", v))?;
        }
        if let Some(v) = lookup("OPENSTACK_KEYSTONE_URL") {
            if !v.trim().is_empty() { s.keystone_url = v.trim().to_string(); }
        }
        if let Some(v) = lookup("HORIZON_AVAILABLE_REGIONS") {
            s.available_regions = parse_regions(&v)?;
        }
        s.network_url = lookup("HORIZON_NETWORK_URL").filter(|v| !v.trim().is_empty());
        s.compute_url = lookup("HORIZON_COMPUTE_URL").filter(|v| !v.trim().is_empty());
        if let Some(v) = lookup("HORIZON_SESSION_TTL_SECS") {
            let secs: u64 = v.parse().with_context(|| format!("HORIZON_SESSION_TTL_SECS is not a number: {}", v))?;
            s.session_ttl = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("HORIZON_API_TIMEOUT_SECS") {
            let secs: u64 = v.parse().with_context(|| format!("HORIZON_API_TIMEOUT_SECS is not a number: {}", v))?;
            s.api_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("HORIZON_SECURE_COOKIES") {
            s.secure_cookies = parse_bool(&v).ok_or_else(|| anyhow!("HORIZON_SECURE_COOKIES is not a boolean: {}", v))?;
        }
        Ok(s)
    }

    /// Region choices for the login form. Falls back to the single default endpoint.
    pub fn regions(&self) -> Vec<Region> {
        if self.available_regions.is_empty() {
            vec![Region { endpoint: self.keystone_url.clone(), name: DEFAULT_REGION_NAME.to_string() }]
        } else {
            self.available_regions.clone()
        }
    }

    /// Display name for a region endpoint, if it is one of the configured choices.
    pub fn region_name(&self, endpoint: &str) -> Option<String> {
        self.regions().into_iter().find(|r| r.endpoint == endpoint).map(|r| r.name)
    }
}

/// Parse `[["http://a:5000/v2.0", "Region A"], ...]`.
pub fn parse_regions(raw: &str) -> Result<Vec<Region>> {
    let pairs: Vec<(String, String)> = serde_json::from_str(raw)
        .with_context(|| "HORIZON_AVAILABLE_REGIONS must be a JSON list of [endpoint, name] pairs")?;
    Ok(pairs.into_iter().map(|(endpoint, name)| Region { endpoint, name }).collect())
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| m.get(k).cloned()
    }

    #[test]
    fn defaults_to_single_region() {
        let s = Settings::from_lookup(lookup_from(&[("OPENSTACK_KEYSTONE_URL", "http://ks:5000/v2.0")])).unwrap();
        let regions = s.regions();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].endpoint, "http://ks:5000/v2.0");
        assert_eq!(regions[0].name, DEFAULT_REGION_NAME);
        assert_eq!(s.region_name("http://ks:5000/v2.0").as_deref(), Some(DEFAULT_REGION_NAME));
    }

    #[test]
    fn parses_region_list() {
        let s = Settings::from_lookup(lookup_from(&[(
            "HORIZON_AVAILABLE_REGIONS",
            r#"[["http://a/v2.0","East"],["http://b/v2.0","West"]]"#,
        )]))
        .unwrap();
        assert_eq!(s.regions().len(), 2);
        assert_eq!(s.region_name("http://b/v2.0").as_deref(), Some("West"));
        assert_eq!(s.region_name("http://c/v2.0"), None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Settings::from_lookup(lookup_from(&[("HORIZON_HTTP_PORT", "eighty")])).is_err());
        assert!(Settings::from_lookup(lookup_from(&[("HORIZON_AVAILABLE_REGIONS", "a,b")])).is_err());
        assert!(Settings::from_lookup(lookup_from(&[("HORIZON_SECURE_COOKIES", "maybe")])).is_err());
    }

    #[test]
    fn overrides_apply() {
        let s = Settings::from_lookup(lookup_from(&[
            ("HORIZON_HTTP_PORT", "9000"),
            ("HORIZON_SESSION_TTL_SECS", "60"),
            ("HORIZON_SECURE_COOKIES", "off"),
            ("HORIZON_NETWORK_URL", "http://quantum:9696/v1.0"),
        ]))
        .unwrap();
        assert_eq!(s.http_port, 9000);
        assert_eq!(s.session_ttl, Duration::from_secs(60));
        assert!(!s.secure_cookies);
        assert_eq!(s.network_url.as_deref(), Some("http://quantum:9696/v1.0"));
        assert_eq!(s.compute_url, None);
    }
}
