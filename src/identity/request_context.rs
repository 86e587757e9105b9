use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use super::principal::User;
use super::session::{SessionData, SessionStore};
use crate::config::Settings;
use crate::server::{parse_cookie, session_cookie, AppState, SESSION_COOKIE};

/// Everything a handler knows about the caller.
///
/// Loaded from the session cookie at the start of the request; handlers mutate
/// `session` and hand the context back through [`RequestContext::finish`], which
/// persists the session and sets the cookie when its id is new to the browser.
pub struct RequestContext {
    pub session_id: String,
    pub session: SessionData,
    /// Rebuilt from the session on every request; `None` for anonymous callers.
    pub user: Option<User>,
    pub request_id: String,
    /// Path and query of the request, used for `next` redirects.
    pub path: String,
    is_new: bool,
}

impl RequestContext {
    pub fn new(session_id: String, session: SessionData, is_new: bool, path: String) -> Self {
        let user = session.user.clone().map(User::from_record).filter(|u| u.is_authenticated());
        Self { session_id, session, user, request_id: uuid::Uuid::new_v4().to_string(), path, is_new }
    }

    /// Identity endpoint of the region chosen at login.
    pub fn identity_endpoint(&self, settings: &Settings) -> String {
        self.session.region_endpoint.clone().unwrap_or_else(|| settings.keystone_url.clone())
    }

    /// Install `user` as the logged-in identity for the rest of this request and later ones.
    ///
    /// The session moves to a new id with a new CSRF token; region, tokens and
    /// queued messages come along. The pre-login id is destroyed.
    pub fn login(&mut self, sessions: &SessionStore, user: User) -> Result<(), getrandom::Error> {
        let mut next = self.session.clone();
        next.rotate_csrf()?;
        next.user = Some(user.to_record());
        self.session_id = sessions.cycle(&self.session_id, next.clone())?;
        self.session = next;
        self.is_new = true;
        self.user = Some(user);
        Ok(())
    }

    /// Persist the session and attach the cookie if the browser does not have it yet.
    /// A session destroyed while this request ran (logout) is not brought back.
    pub fn finish(self, state: &AppState, resp: impl IntoResponse) -> Response {
        if !state.sessions.save(&self.session_id, self.session) {
            tracing::debug!(target: "session", request_id = %self.request_id, "session ended during request; not saved");
        }
        let mut resp = resp.into_response();
        if self.is_new {
            if let Ok(v) = HeaderValue::from_str(&session_cookie(&self.session_id, state.settings.secure_cookies)) {
                resp.headers_mut().append("set-cookie", v);
            }
        }
        resp
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path_and_query().map(|p| p.as_str().to_string()).unwrap_or_else(|| "/".to_string());
        let existing = parse_cookie(&parts.headers, SESSION_COOKIE)
            .and_then(|sid| state.sessions.load(&sid).map(|data| (sid, data)));
        let ctx = match existing {
            Some((sid, data)) => RequestContext::new(sid, data, false, path),
            None => {
                let (sid, data) = state.sessions.create().map_err(|e| {
                    tracing::error!(target: "session", "cannot create session: {}", e);
                    (StatusCode::SERVICE_UNAVAILABLE, "Session unavailable")
                })?;
                RequestContext::new(sid, data, true, path)
            }
        };
        tracing::debug!(target: "session", request_id = %ctx.request_id, new = ctx.is_new, authenticated = ctx.user.is_some(), "request context");
        Ok(ctx)
    }
}
