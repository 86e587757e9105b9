//! Login against the identity service.
//!
//! A login either names the tenant to scope into, or it obtains an unscoped token
//! first and then walks the user's tenant list until one of them accepts a scoped
//! token. The identity service can list tenants a user administers but may not log
//! into, so authorization failures on individual candidates are expected.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::principal::User;
use super::session::SessionData;
use crate::api::{IdentityApi, Tenant};
use crate::error::{ApiError, AppError};
use crate::messages::{Level, Message};

pub const MSG_INVALID_CREDENTIALS: &str = "Invalid user name or password.";
pub const MSG_TENANT_AUTH_FAILED: &str = "Unable to authenticate for that project.";
pub const MSG_TRY_AGAIN_LATER: &str = "An error occurred authenticating. Please try again later.";
pub const MSG_NO_PROJECTS: &str = "You are not authorized for any projects.";
pub const MSG_NO_AVAILABLE_PROJECTS: &str = "You are not authorized for any available projects.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid user name or password.")]
    InvalidCredentials,

    #[error("{0}")]
    NotAuthorized(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Unknown(String),
}

impl AuthError {
    /// Text shown to the person at the login form.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => MSG_INVALID_CREDENTIALS.to_string(),
            AuthError::NotAuthorized(m) | AuthError::ServiceUnavailable(m) => m.clone(),
            AuthError::Unknown(_) => MSG_TRY_AGAIN_LATER.to_string(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::auth("invalid_credentials", MSG_INVALID_CREDENTIALS),
            AuthError::NotAuthorized(m) => AppError::Auth { code: "not_authorized".into(), message: m },
            AuthError::ServiceUnavailable(m) => AppError::Unavailable { code: "service_unavailable".into(), message: m },
            AuthError::Unknown(m) => AppError::Internal { code: "auth_error".into(), message: m },
        }
    }
}

/// What the login form hands to the backend.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Scope directly into this tenant, skipping tenant selection.
    pub tenant: Option<String>,
    /// Identity endpoint of the selected region.
    pub endpoint: String,
}

#[derive(Clone)]
pub struct KeystoneBackend {
    api: Arc<dyn IdentityApi>,
}

impl KeystoneBackend {
    pub fn new(api: Arc<dyn IdentityApi>) -> Self { Self { api } }

    /// Authenticate and scope to exactly one tenant.
    ///
    /// `Ok(None)` means the credentials were fine but the user has no tenants; an
    /// error message has been queued on the session in that case.
    pub async fn authenticate(&self, session: &mut SessionData, creds: &Credentials) -> Result<Option<User>, AuthError> {
        match creds.tenant.as_deref().filter(|t| !t.is_empty()) {
            Some(tenant) => self.authenticate_for_tenant(creds, tenant).await.map(Some),
            None => self.authenticate_unscoped(session, creds).await,
        }
    }

    async fn authenticate_for_tenant(&self, creds: &Credentials, tenant: &str) -> Result<User, AuthError> {
        let endpoint = creds.endpoint.as_str();
        let scoped = async {
            let token = self.api.create_token(endpoint, tenant, &creds.username, &creds.password).await?;
            let tenants = self.api.list_tenants_for_token(endpoint, &token.id).await?;
            Ok::<_, ApiError>((token, tenants))
        }
        .await;
        match scoped {
            Ok((token, tenants)) => {
                let mut user = User::from_token(&token);
                if user.tenant_id.is_empty() {
                    user.tenant_id = tenant.to_string();
                }
                user.set_authorized_tenants(tenants);
                info!(target: "auth", user = %user.username, tenant = %user.tenant_id, "login scoped to requested tenant");
                Ok(user)
            }
            Err(e) => {
                warn!(target: "auth", user = %creds.username, tenant = %tenant, "tenant login failed: {}", e);
                Err(AuthError::NotAuthorized(MSG_TENANT_AUTH_FAILED.to_string()))
            }
        }
    }

    async fn authenticate_unscoped(&self, session: &mut SessionData, creds: &Credentials) -> Result<Option<User>, AuthError> {
        if creds.username.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let endpoint = creds.endpoint.as_str();
        let unscoped = match self.api.create_unscoped_token(endpoint, &creds.username, &creds.password).await {
            Ok(t) => t,
            Err(ApiError::Unauthorized(_)) => {
                info!(target: "auth", user = %creds.username, "invalid credentials");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                // Whatever was cached before this attempt can no longer be trusted.
                error!(target: "auth", user = %creds.username, "unscoped token request failed: {}", e);
                session.clear_auth();
                return Err(AuthError::ServiceUnavailable(MSG_TRY_AGAIN_LATER.to_string()));
            }
        };

        // a new identity; nothing from an earlier login may sit next to its token
        session.clear_auth();
        session.unscoped_token = Some(unscoped.id.clone());

        let tenants: Vec<Tenant> = match self.api.list_tenants_for_token(endpoint, &unscoped.id).await {
            Ok(list) => list,
            Err(e) => {
                warn!(target: "auth", user = %creds.username, "tenant list failed: {}", e);
                Vec::new()
            }
        };

        if tenants.is_empty() {
            session.messages.add(Message::new(Level::Error, MSG_NO_PROJECTS).with_tags("login"));
            info!(target: "auth", user = %creds.username, "no tenants for user");
            return Ok(None);
        }

        let mut candidates = tenants.clone();
        let mut scoped = None;
        while let Some(tenant) = candidates.pop() {
            match self.api.create_scoped_token(endpoint, &tenant.id, &unscoped.id).await {
                Ok(token) => {
                    scoped = Some(token);
                    break;
                }
                Err(e) if e.is_authorization() => {
                    debug!(target: "auth", user = %creds.username, tenant = %tenant.id, "tenant rejected scoped token: {}", e);
                }
                Err(ApiError::Unavailable(m)) => {
                    error!(target: "auth", tenant = %tenant.id, "scoped token request failed: {}", m);
                    return Err(AuthError::ServiceUnavailable(MSG_TRY_AGAIN_LATER.to_string()));
                }
                Err(e) => {
                    error!(target: "auth", tenant = %tenant.id, "scoped token request failed: {}", e);
                    return Err(AuthError::Unknown(e.to_string()));
                }
            }
        }

        let Some(token) = scoped else {
            warn!(target: "auth", user = %creds.username, "no tenant accepted a scoped token");
            return Err(AuthError::NotAuthorized(MSG_NO_AVAILABLE_PROJECTS.to_string()));
        };

        let user = User::from_token(&token);
        user.set_authorized_tenants(tenants);
        info!(target: "auth", user = %user.username, tenant = %user.tenant_id, "login");
        Ok(Some(user))
    }
}
