mod error;
mod functions;
mod lockout;
mod traits;
mod types;
mod validation;

pub use error::AuthError;
pub use functions::{
    calculate_expiry, generate_session_id, generate_state, is_auth_flow_expired,
    is_session_expired, AUTH_FLOW_TTL_MINUTES, SESSION_ID_LENGTH,
};
pub use lockout::{
    is_locked, register_failed_login, register_successful_login, unlock, LockoutPolicy,
    LoginFailureOutcome,
};
pub use traits::{Result, SessionRepository};
pub use types::{AuthFlowState, Role, Session, SessionId, User};
pub use validation::{
    validate_password, validate_return_to, validate_username, MAX_PASSWORD_BYTES,
    MIN_PASSWORD_CHARS,
};
