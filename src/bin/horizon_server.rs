//!
//! horizon server binary
//! ---------------------
//! Command-line entry point for the web console. Settings come from `HORIZON_*`
//! environment variables; CLI flags override them.

use anyhow::{Context, Result};
use horizon::config::{parse_regions, Settings};
use std::env;
use std::time::Duration;

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Apply CLI flags on top of settings read from the environment.
fn apply_args(mut s: Settings, args: &[String]) -> Result<Settings> {
    if let Some(v) = arg_value(args, "--http-port") {
        s.http_port = v.parse().with_context(|| format!("--http-port is not a port: {}", v))?;
    }
    if let Some(v) = arg_value(args, "--keystone-url") {
        s.keystone_url = v.to_string();
    }
    if let Some(v) = arg_value(args, "--regions") {
        s.available_regions = parse_regions(v)?;
    }
    if let Some(v) = arg_value(args, "--network-url") {
        s.network_url = Some(v.to_string());
    }
    if let Some(v) = arg_value(args, "--compute-url") {
        s.compute_url = Some(v.to_string());
    }
    if let Some(v) = arg_value(args, "--session-ttl") {
        let secs: u64 = v.parse().with_context(|| format!("--session-ttl is not a number of seconds: {}", v))?;
        s.session_ttl = Duration::from_secs(secs);
    }
    if has_flag(args, "--insecure-cookie") {
        s.secure_cookies = false;
    }
    Ok(s)
}

#[tokio::main]
async fn main() -> Result<()> {
    println!(r"    __               _
   / /_  ____  _____(_)___  ____  ____
  / __ \/ __ \/ ___/ /_  / / __ \/ __ \
 / / / / /_/ / /  / / / /_/ /_/ / / / /
/_/ /_/\____/_/  /_/ /___/\____/_/ /_/ ");

    // Initialize tracing subscriber with env filter if provided
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("horizon Server\n\nUSAGE:\n  horizon_server [--http-port N] [--keystone-url URL] [--regions JSON] [--network-url URL] [--compute-url URL] [--session-ttl SECS] [--insecure-cookie]\n\nOPTIONS:\n  --http-port N         HTTP port (env: HORIZON_HTTP_PORT, default 8080)\n  --keystone-url URL    Identity endpoint (env: OPENSTACK_KEYSTONE_URL, default http://127.0.0.1:5000/v2.0)\n  --regions JSON        Login regions as [[endpoint, name], ...] (env: HORIZON_AVAILABLE_REGIONS)\n  --network-url URL     Network endpoint override (env: HORIZON_NETWORK_URL; default from service catalog)\n  --compute-url URL     Compute endpoint override (env: HORIZON_COMPUTE_URL; default from service catalog)\n  --session-ttl SECS    Idle session lifetime (env: HORIZON_SESSION_TTL_SECS, default 3600)\n  --insecure-cookie     Omit the Secure cookie attribute, for plain-http development (env: HORIZON_SECURE_COOKIES=false)\n");
        return Ok(());
    }

    let settings = apply_args(Settings::from_env()?, &args)?;
    println!("horizon starting: http={}, keystone={}", settings.http_port, settings.keystone_url);
    horizon::server::run_with_settings(settings).await
}
