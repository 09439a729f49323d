//! Bearer credential for the outbound third-party API.
//!
//! The credential is obtained from a remote authorization endpoint, cached
//! in memory, and refreshed shortly before it expires. Concurrent callers
//! that find it stale share one refresh.

mod cache;
mod source;

pub use cache::{
    CredentialRefreshError, CredentialSource, DEFAULT_REFRESH_SKEW, ExternalCredential,
    ExternalTokenCache, FetchedCredential,
};
pub use source::{DEFAULT_FETCH_TIMEOUT, ExternalAuthConfig, HttpCredentialSource};
