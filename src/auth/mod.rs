//! Credential and session lifecycle.
//!
//! Short-lived stateless access tokens (15 min) plus opaque refresh tokens
//! (7 days, one database row each, rotated on every refresh). Email
//! verification and password reset use their own purpose-tagged tokens.

mod bearer;
mod credentials;
mod errors;
mod extractors;
mod ip;
mod session;
mod state;
mod validation;

pub use bearer::get_bearer;
pub use credentials::{CredentialVerifier, Registration};
pub use errors::{AuthError, BearerRejection};
pub use extractors::AccessAuth;
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use session::{DEFAULT_NOTIFIER_TIMEOUT, SessionOrchestrator, SessionPolicy, TokenPair};
pub use state::HasTokenCodec;
pub use validation::normalize_email;
