//!
//! horizon HTTP server
//! -------------------
//! Axum router for the console pages.
//!
//! Responsibilities:
//! - Session management with a cookie + CSRF token model (`csrfmiddlewaretoken` form field).
//! - Login/logout and tenant switching against the identity service.
//! - Network and port pages delegating to the network and compute services.
//! - Rendering flash messages and errors at the boundary so remote failures never escape a handler.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{extract::State, Router};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::api::{self, ComputeApi, IdentityApi, KeystoneClient, NetworkApi, NovaClient, QuantumClient, ServiceScope};
use crate::config::Settings;
use crate::error::AppError;
use crate::identity::{RequestContext, SessionStore, User};
use crate::render::{self, Templates};

pub mod auth_views;
pub mod network_views;

pub const SESSION_COOKIE: &str = "horizon_session";
pub const CSRF_FIELD: &str = "csrfmiddlewaretoken";
pub const LOGIN_URL: &str = "/auth/login";
pub const USER_HOME: &str = "/nova/networks/";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: SessionStore,
    pub templates: Arc<Templates>,
    pub identity: Arc<dyn IdentityApi>,
    pub network: Arc<dyn NetworkApi>,
    pub compute: Arc<dyn ComputeApi>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        identity: Arc<dyn IdentityApi>,
        network: Arc<dyn NetworkApi>,
        compute: Arc<dyn ComputeApi>,
    ) -> anyhow::Result<Self> {
        let templates = Templates::new().context("while registering page templates")?;
        // session ids and CSRF tokens are drawn from here; refuse to serve without it
        crate::identity::gen_id().map_err(|e| anyhow::anyhow!("system random source unavailable: {}", e))?;
        let sessions = SessionStore::new(settings.session_ttl);
        Ok(Self {
            settings: Arc::new(settings),
            sessions,
            templates: Arc::new(templates),
            identity,
            network,
            compute,
        })
    }

    /// State wired to the real services over HTTP.
    pub fn with_http_clients(settings: Settings) -> anyhow::Result<Self> {
        let client = api::http_client(settings.api_timeout);
        Self::new(
            settings,
            Arc::new(KeystoneClient::new(client.clone())),
            Arc::new(QuantumClient::new(client.clone())),
            Arc::new(NovaClient::new(client)),
        )
    }
}

/// All console routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(auth_views::routes())
        .merge(network_views::routes())
        .with_state(state)
}

fn log_startup_settings(settings: &Settings) {
    let regions: Vec<String> = settings.regions().iter().map(|r| format!("{}={}", r.name, r.endpoint)).collect();
    info!(
        target: "startup",
        "horizon starting: http_port={}, keystone_url={}, regions=[{}], network_url={:?}, compute_url={:?}, session_ttl_secs={}",
        settings.http_port,
        settings.keystone_url,
        regions.join(", "),
        settings.network_url,
        settings.compute_url,
        settings.session_ttl.as_secs()
    );
}

/// Start the console bound to `settings.http_port` and serve until the process exits.
pub async fn run_with_settings(settings: Settings) -> anyhow::Result<()> {
    log_startup_settings(&settings);
    let http_port = settings.http_port;
    let state = AppState::with_http_clients(settings)?;

    // Background session sweeper
    {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            loop {
                let removed = sessions.sweep();
                if removed > 0 { tracing::debug!(target: "session", removed = removed, "session_sweep"); }
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });
    }

    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Convenience entry point reading settings from the environment.
pub(crate) fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all("cookie").iter() {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

pub(crate) fn session_cookie(sid: &str, secure: bool) -> String {
    // HttpOnly cookie scoped to path /; Lax so the login redirect keeps it
    let secure = if secure { "; Secure" } else { "" };
    format!("{}={}; HttpOnly; SameSite=Lax; Path=/{}", SESSION_COOKIE, sid, secure)
}

pub(crate) fn expired_session_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

/// Collapse posted pairs into a map; the last value of a repeated key wins.
pub(crate) fn form_map(pairs: &[(String, String)]) -> HashMap<String, String> {
    pairs.iter().cloned().collect()
}

/// Every value posted under `key`, in order.
pub(crate) fn form_values(pairs: &[(String, String)], key: &str) -> Vec<String> {
    pairs.iter().filter(|(k, _)| k == key).map(|(_, v)| v.clone()).collect()
}

pub(crate) fn validate_csrf(ctx: &RequestContext, data: &HashMap<String, String>) -> bool {
    match data.get(CSRF_FIELD) {
        Some(provided) => !ctx.session.csrf_token.is_empty() && provided == &ctx.session.csrf_token,
        None => false,
    }
}

pub(crate) fn redirect(to: &str) -> Response {
    Redirect::to(to).into_response()
}

/// Send an anonymous caller to the login page, remembering where they were going.
pub(crate) fn login_redirect(state: &AppState, ctx: RequestContext) -> Response {
    let to = format!("{}?next={}", LOGIN_URL, urlencoding::encode(&ctx.path));
    ctx.finish(state, redirect(&to))
}

/// Endpoint and credentials for calling a tenant-scoped service as `user`.
pub(crate) fn service_scope(
    ctx: &RequestContext,
    user: &User,
    service_type: &str,
    configured: Option<&String>,
) -> Result<ServiceScope, AppError> {
    let endpoint = configured
        .cloned()
        .or_else(|| user.service_catalog.url_for(service_type, ctx.session.region_name.as_deref()))
        .ok_or_else(|| {
            AppError::unavailable("no_endpoint".to_string(), format!("No {} endpoint in the service catalog.", service_type))
        })?;
    Ok(ServiceScope { endpoint, token: user.token.clone(), tenant_id: user.tenant_id.clone() })
}

/// Base template context: the user, their tenants, pending messages and the CSRF token.
/// Pending messages are consumed.
pub(crate) async fn page_context(state: &AppState, ctx: &mut RequestContext, title: &str) -> Value {
    let messages: Vec<Value> = ctx
        .session
        .messages
        .drain()
        .into_iter()
        .map(|m| json!({"tags": m.tags(), "text": m.text, "level": m.level.as_str()}))
        .collect();
    let (user, tenants) = match ctx.user.as_ref() {
        Some(u) => {
            let endpoint = ctx.identity_endpoint(&state.settings);
            let tenants: Vec<Value> = u
                .authorized_tenants(state.identity.as_ref(), &endpoint, ctx.session.unscoped_token.as_deref())
                .await
                .iter()
                .filter(|t| t.enabled)
                .map(|t| json!({"id": t.id, "name": t.name, "current": t.id == u.tenant_id}))
                .collect();
            let user = json!({
                "username": u.username,
                "tenant_id": u.tenant_id,
                "tenant_name": u.tenant_name,
                "is_admin": u.is_admin(),
            });
            (user, tenants)
        }
        None => (Value::Null, Vec::new()),
    };
    json!({
        "title": title,
        "user": user,
        "tenants": tenants,
        "messages": messages,
        "csrf_token": ctx.session.csrf_token,
        "region_name": ctx.session.region_name,
    })
}

/// Merge `extra` into a base page context and render `template`.
pub(crate) async fn render_page(
    state: &AppState,
    mut ctx: RequestContext,
    template: &str,
    title: &str,
    status: StatusCode,
    extra: Value,
) -> Response {
    let mut page = page_context(state, &mut ctx, title).await;
    if let (Some(base), Value::Object(more)) = (page.as_object_mut(), extra) {
        base.extend(more);
    }
    let body = match state.templates.render(template, &page) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!(target: "render", request_id = %ctx.request_id, template = template, "render failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    };
    ctx.finish(state, body)
}

/// Render an error page with the status mapped from `err`.
pub(crate) async fn render_error(state: &AppState, ctx: RequestContext, err: &AppError, back_url: &str) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let extra = json!({
        "status": status.as_u16(),
        "error_code": err.code_str(),
        "error_message": err.message(),
        "back_url": back_url,
    });
    render_page(state, ctx, render::ERROR, "Error", status, extra).await
}

async fn root(State(state): State<AppState>, ctx: RequestContext) -> Response {
    let to = if ctx.user.is_some() { USER_HOME } else { LOGIN_URL };
    ctx.finish(&state, redirect(to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_session_cookie_among_others() {
        let mut h = HeaderMap::new();
        h.insert("cookie", HeaderValue::from_static("a=1; horizon_session=abc; b=2"));
        assert_eq!(parse_cookie(&h, SESSION_COOKIE).as_deref(), Some("abc"));
        assert_eq!(parse_cookie(&h, "missing"), None);
    }

    #[test]
    fn cookie_secure_flag_is_optional() {
        assert!(session_cookie("x", true).ends_with("; Secure"));
        assert!(!session_cookie("x", false).contains("Secure"));
    }

    #[test]
    fn form_helpers_handle_repeats() {
        let pairs = vec![
            ("object_ids".to_string(), "a".to_string()),
            ("object_ids".to_string(), "b".to_string()),
            ("action".to_string(), "networks__delete".to_string()),
        ];
        assert_eq!(form_values(&pairs, "object_ids"), vec!["a", "b"]);
        assert_eq!(form_map(&pairs).get("object_ids").map(|s| s.as_str()), Some("b"));
    }
}
