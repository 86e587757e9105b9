//! Identity and session management: who the caller is, which tenant they act in,
//! and the per-browser state that carries this between requests.

mod backend;
mod principal;
mod request_context;
mod session;

pub use backend::{
    AuthError, Credentials, KeystoneBackend, MSG_INVALID_CREDENTIALS, MSG_NO_AVAILABLE_PROJECTS, MSG_NO_PROJECTS,
    MSG_TENANT_AUTH_FAILED, MSG_TRY_AGAIN_LATER,
};
pub use principal::{User, UserRecord};
pub use request_context::RequestContext;
pub use session::{SessionData, SessionStore};
pub(crate) use session::gen_id;
