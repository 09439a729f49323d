//! Register, login, refresh, logout, email verification and password reset.
//!
//! Access, email-verification and password-reset tokens are stateless and
//! purpose-scoped (see `jwt`). Refresh tokens are opaque rows in the session
//! store and are rotated on every use.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::AuthError;
use super::credentials::{CredentialVerifier, Registration};
use super::validation::{normalize_email, validate_password};
use crate::db::{Database, Identity, SessionError, UserRole};
use crate::jwt::{TokenCodec, TokenPurpose};
use crate::notifier::Notifier;
use crate::password::PasswordHasher;

/// Default bound on a single notifier call.
pub const DEFAULT_NOTIFIER_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunable behavior of the session flows.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub notifier_timeout: Duration,
    /// Revoke every session of an identity when one of its rotated refresh
    /// tokens is presented again.
    pub revoke_on_replay: bool,
    /// Revoke every session of an identity after its password is reset.
    /// Off unless configured.
    pub revoke_on_password_reset: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            notifier_timeout: DEFAULT_NOTIFIER_TIMEOUT,
            revoke_on_replay: true,
            revoke_on_password_reset: false,
        }
    }
}

/// Tokens handed to a client after login or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub role: UserRole,
}

#[derive(Clone)]
pub struct SessionOrchestrator {
    db: Database,
    verifier: CredentialVerifier,
    codec: Arc<TokenCodec>,
    notifier: Arc<dyn Notifier>,
    policy: SessionPolicy,
}

impl SessionOrchestrator {
    pub fn new(
        db: Database,
        codec: Arc<TokenCodec>,
        hasher: Arc<dyn PasswordHasher>,
        notifier: Arc<dyn Notifier>,
        policy: SessionPolicy,
    ) -> Self {
        let verifier = CredentialVerifier::new(db.users(), hasher);
        Self {
            db,
            verifier,
            codec,
            notifier,
            policy,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub async fn register(&self, registration: &Registration<'_>) -> Result<Identity, AuthError> {
        let identity = self.verifier.register(registration).await?;
        info!(user_id = identity.id, uuid = %identity.uuid, "Identity registered");
        Ok(identity)
    }

    /// Authenticate and open a new refresh session.
    ///
    /// Unknown email and wrong password both come back as
    /// `AuthenticationFailed`.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let identity = match self.verifier.authenticate(email, password).await {
            Ok(identity) => identity,
            Err(e @ (AuthError::EmailNotFound | AuthError::InvalidCredentials)) => {
                info!(reason = %e, "Login rejected");
                return Err(AuthError::AuthenticationFailed);
            }
            Err(e) => return Err(e),
        };

        let pair = self.open_session(&identity).await?;
        info!(user_id = identity.id, "Login succeeded");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. The owner is resolved inside
    /// the rotation transaction; after it commits only access-token signing
    /// remains.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let rotation = match self.db.sessions().rotate(refresh_token).await {
            Ok(rotation) => rotation,
            Err(SessionError::Replay { owner: Some(user_id) }) => {
                warn!(user_id, "Refresh token replay detected");
                if self.policy.revoke_on_replay {
                    let revoked = self.db.sessions().revoke_all(user_id).await?;
                    warn!(user_id, revoked, "Revoked session family after replay");
                }
                return Err(AuthError::TokenReplay);
            }
            Err(SessionError::Replay { owner: None }) => {
                info!("Unknown or revoked refresh token presented");
                return Err(AuthError::TokenReplay);
            }
            Err(e) => return Err(e.into()),
        };

        debug!(
            user_id = rotation.session.user_id,
            previous = %rotation.previous_id,
            session = %rotation.session.id,
            "Refresh token rotated"
        );

        let access = self
            .codec
            .issue(&rotation.user_uuid, rotation.role, TokenPurpose::Access)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: rotation.session.token,
            role: rotation.role,
        })
    }

    /// Revoke all refresh sessions of the identity. Revoking nothing is success.
    pub async fn logout(&self, user_uuid: &str) -> Result<u64, AuthError> {
        let Some(identity) = self.db.users().get_by_uuid(user_uuid).await? else {
            return Ok(0);
        };

        let revoked = self.db.sessions().revoke_all(identity.id).await?;
        info!(user_id = identity.id, revoked, "Logged out");
        Ok(revoked)
    }

    pub async fn send_verification_email(&self, email: &str) -> Result<(), AuthError> {
        let identity = self.find_by_email(email).await?;
        if identity.verified {
            return Err(AuthError::AlreadyVerified);
        }

        let token = self
            .codec
            .issue(&identity.uuid, identity.role, TokenPurpose::EmailVerify)?;

        self.notify(
            &identity.email,
            "Email verification",
            &format!("Please verify your email using this token: {}", token.token),
        )
        .await
    }

    /// Mark the token's subject as verified. Verifying twice is not an error.
    pub async fn verify_email(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.codec.validate(token, TokenPurpose::EmailVerify)?;

        let mut identity = self
            .db
            .users()
            .get_by_uuid(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !identity.verified {
            self.db.users().mark_verified(identity.id).await?;
            identity.verified = true;
            info!(user_id = identity.id, "Email verified");
        }

        Ok(identity)
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let identity = self.find_by_email(email).await?;

        let token = self
            .codec
            .issue(&identity.uuid, identity.role, TokenPurpose::PasswordReset)?;

        self.notify(
            &identity.email,
            "Password reset",
            &format!("Reset your password using this token: {}", token.token),
        )
        .await
    }

    /// Replace the password of the token's subject. Leaves the verified flag
    /// alone, and existing refresh sessions too unless the policy revokes them.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        validate_password(new_password)?;

        let claims = self.codec.validate(token, TokenPurpose::PasswordReset)?;

        let identity = self
            .db
            .users()
            .get_by_uuid(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let digest = self.verifier.hash_password(new_password).await?;
        self.db
            .users()
            .set_password_digest(identity.id, &digest)
            .await?;
        info!(user_id = identity.id, "Password reset");

        if self.policy.revoke_on_password_reset {
            let revoked = self.db.sessions().revoke_all(identity.id).await?;
            info!(user_id = identity.id, revoked, "Revoked sessions after password reset");
        }

        Ok(())
    }

    async fn open_session(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let access = self
            .codec
            .issue(&identity.uuid, identity.role, TokenPurpose::Access)?;
        let session = self.db.sessions().create(identity.id).await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: session.token,
            role: identity.role,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Identity, AuthError> {
        self.db
            .users()
            .get_by_email(&normalize_email(email))
            .await?
            .ok_or(AuthError::EmailNotFound)
    }

    async fn notify(&self, to: &str, subject: &str, body: &str) -> Result<(), AuthError> {
        tokio::time::timeout(
            self.policy.notifier_timeout,
            self.notifier.send(to, subject, body),
        )
        .await
        .map_err(|_| AuthError::Timeout("notifier"))??;
        Ok(())
    }
}
