//! Login, logout and tenant switching.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::{Form, Router};
use serde_json::json;
use tracing::{info, warn};

use super::{form_map, redirect, render_page, validate_csrf, AppState, LOGIN_URL, USER_HOME};
use crate::config::Settings;
use crate::error::AppError;
use crate::forms::{Field, FormErrors, FormSpec, Widget};
use crate::identity::{Credentials, KeystoneBackend, RequestContext, MSG_TRY_AGAIN_LATER};
use crate::render;

pub const NEXT_FIELD: &str = "next";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login_page).post(login_submit))
        .route("/auth/logout", get(logout))
        .route("/auth/switch/{tenant_id}", get(switch_page).post(switch_submit))
}

fn region_field(settings: &Settings) -> Field {
    let regions = settings.regions();
    let single = regions.len() == 1;
    let choices = regions.into_iter().map(|r| (r.endpoint, r.name)).collect();
    let field = Field::choice("region", "Region", choices).optional();
    if single { field.widget(Widget::Hidden) } else { field }
}

/// The login form. A region picker is shown only when more than one region is configured.
pub fn login_form(settings: &Settings) -> FormSpec {
    FormSpec::new("login", "Log In", "Sign In")
        .field(region_field(settings))
        .field(Field::char("username", "User Name"))
        .field(Field::char("password", "Password").widget(Widget::Password))
        .field(Field::char("tenant", "Tenant").widget(Widget::Hidden).optional())
        .field(Field::char(NEXT_FIELD, "Next").widget(Widget::Hidden).optional())
}

/// Same as [`login_form`] but bound to one tenant, so tenant selection is skipped.
pub fn login_with_tenant_form(settings: &Settings) -> FormSpec {
    let mut form = login_form(settings);
    form.name = "login_with_tenant";
    form.title = "Switch Projects";
    form.submit_label = "Switch";
    if let Some(f) = form.get_field_mut("username") {
        *f = Field::char("username", "User Name").max_length(20).widget(Widget::ReadOnly);
    }
    if let Some(f) = form.get_field_mut("tenant") {
        f.required = true;
    }
    form
}

/// Only same-site absolute paths are followed after login. Browsers read `/\`
/// like `//`, so a backslash after the leading slash is refused too.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n) if is_local_path(n) => n,
        _ => USER_HOME,
    }
}

fn is_local_path(n: &str) -> bool {
    let mut chars = n.chars();
    chars.next() == Some('/')
        && !matches!(chars.next(), Some('/') | Some('\\'))
        && !n.chars().any(char::is_control)
}

fn initial_region(ctx: &RequestContext, settings: &Settings) -> String {
    ctx.session
        .region_endpoint
        .clone()
        .filter(|e| settings.region_name(e).is_some())
        .unwrap_or_else(|| settings.regions().first().map(|r| r.endpoint.clone()).unwrap_or_default())
}

async fn render_login(
    state: &AppState,
    ctx: RequestContext,
    values: &HashMap<String, String>,
    errors: Option<&FormErrors>,
    status: StatusCode,
) -> Response {
    let form = login_form(&state.settings);
    let extra = json!({"body_id": "splash", "form": form.context(values, errors)});
    render_page(state, ctx, render::LOGIN, "Log In", status, extra).await
}

async fn login_page(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    ctx: RequestContext,
) -> Response {
    let mut values = HashMap::new();
    values.insert("region".to_string(), initial_region(&ctx, &state.settings));
    if let Some(next) = query.get(NEXT_FIELD) {
        values.insert(NEXT_FIELD.to_string(), next.clone());
    }
    render_login(&state, ctx, &values, None, StatusCode::OK).await
}

/// Outcome of running credentials through the backend, shared by login and tenant switch.
async fn sign_in(state: &AppState, ctx: &mut RequestContext, creds: &Credentials) -> Result<bool, (AppError, String)> {
    let backend = KeystoneBackend::new(state.identity.clone());
    match backend.authenticate(&mut ctx.session, creds).await {
        Ok(Some(user)) => {
            info!(target: "auth", request_id = %ctx.request_id, user = %user.username, tenant = %user.tenant_id, "signed in");
            if let Err(e) = ctx.login(&state.sessions, user) {
                warn!(target: "auth", request_id = %ctx.request_id, "cannot start session: {}", e);
                let err = AppError::unavailable("session_unavailable", MSG_TRY_AGAIN_LATER);
                return Err((err, MSG_TRY_AGAIN_LATER.to_string()));
            }
            Ok(true)
        }
        Ok(None) => Ok(false),
        Err(e) => {
            warn!(target: "auth", request_id = %ctx.request_id, user = %creds.username, "sign in failed: {}", e);
            let msg = e.user_message();
            Err((AppError::from(e), msg))
        }
    }
}

/// Record the chosen region, whatever the authentication outcome.
fn select_region(ctx: &mut RequestContext, settings: &Settings, posted: Option<&str>) -> String {
    let endpoint = posted.filter(|e| !e.is_empty()).map(str::to_string).unwrap_or_else(|| settings.keystone_url.clone());
    ctx.session.region_name = settings.region_name(&endpoint);
    ctx.session.region_endpoint = Some(endpoint.clone());
    endpoint
}

async fn login_submit(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    let data = form_map(&pairs);
    if !validate_csrf(&ctx, &data) {
        let err = AppError::csrf("csrf_failed", "CSRF verification failed. Request aborted.");
        return super::render_error(&state, ctx, &err, LOGIN_URL).await;
    }
    let form = login_form(&state.settings);
    let cleaned = match form.validate(&data) {
        Ok(c) => c,
        Err(errors) => return render_login(&state, ctx, &data, Some(&errors), StatusCode::OK).await,
    };

    let endpoint = select_region(&mut ctx, &state.settings, cleaned.get("region"));
    let creds = Credentials {
        username: cleaned.str("username").to_string(),
        password: cleaned.str("password").to_string(),
        tenant: cleaned.get("tenant").map(str::to_string),
        endpoint,
    };
    match sign_in(&state, &mut ctx, &creds).await {
        Ok(true) => {
            let to = safe_next(cleaned.get(NEXT_FIELD)).to_string();
            ctx.finish(&state, redirect(&to))
        }
        // no tenants; the backend already queued a message for the page
        Ok(false) => render_login(&state, ctx, &data, None, StatusCode::OK).await,
        Err((err, msg)) => {
            let mut errors = FormErrors::default();
            errors.add_non_field(msg);
            let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::UNAUTHORIZED);
            render_login(&state, ctx, &data, Some(&errors), status).await
        }
    }
}

async fn logout(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    if let Some(user) = ctx.user.as_ref() {
        info!(target: "auth", request_id = %ctx.request_id, user = %user.username, "logout");
    }
    ctx.session.flush();
    state.sessions.destroy(&ctx.session_id);
    let mut resp = redirect(LOGIN_URL);
    if let Ok(v) = HeaderValue::from_str(&super::expired_session_cookie()) {
        resp.headers_mut().append("set-cookie", v);
    }
    resp
}

async fn render_switch(
    state: &AppState,
    ctx: RequestContext,
    values: &HashMap<String, String>,
    errors: Option<&FormErrors>,
    status: StatusCode,
) -> Response {
    let form = login_with_tenant_form(&state.settings);
    let extra = json!({"form": form.context(values, errors), "cancel_url": USER_HOME});
    render_page(state, ctx, render::FORM_PAGE, "Switch Projects", status, extra).await
}

async fn switch_page(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    ctx: RequestContext,
) -> Response {
    let Some(user) = ctx.user.as_ref() else {
        return super::login_redirect(&state, ctx);
    };
    let mut values = HashMap::new();
    values.insert("username".to_string(), user.username.clone());
    values.insert("tenant".to_string(), tenant_id);
    values.insert("region".to_string(), initial_region(&ctx, &state.settings));
    render_switch(&state, ctx, &values, None, StatusCode::OK).await
}

async fn switch_submit(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    mut ctx: RequestContext,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    if ctx.user.is_none() {
        return super::login_redirect(&state, ctx);
    }
    let mut data = form_map(&pairs);
    if !validate_csrf(&ctx, &data) {
        let err = AppError::csrf("csrf_failed", "CSRF verification failed. Request aborted.");
        return super::render_error(&state, ctx, &err, USER_HOME).await;
    }
    // the path names the tenant; a posted value cannot redirect the switch elsewhere
    data.insert("tenant".to_string(), tenant_id);
    let form = login_with_tenant_form(&state.settings);
    let cleaned = match form.validate(&data) {
        Ok(c) => c,
        Err(errors) => return render_switch(&state, ctx, &data, Some(&errors), StatusCode::OK).await,
    };

    let endpoint = select_region(&mut ctx, &state.settings, cleaned.get("region"));
    let creds = Credentials {
        username: cleaned.str("username").to_string(),
        password: cleaned.str("password").to_string(),
        tenant: Some(cleaned.str("tenant").to_string()),
        endpoint,
    };
    match sign_in(&state, &mut ctx, &creds).await {
        Ok(true) => {
            let to = safe_next(cleaned.get(NEXT_FIELD)).to_string();
            ctx.finish(&state, redirect(&to))
        }
        Ok(false) => render_switch(&state, ctx, &data, None, StatusCode::OK).await,
        Err((err, msg)) => {
            let mut errors = FormErrors::default();
            errors.add_non_field(msg);
            let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::UNAUTHORIZED);
            render_switch(&state, ctx, &data, Some(&errors), status).await
        }
    }
}
