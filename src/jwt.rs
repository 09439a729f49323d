//! Purpose-scoped stateless tokens (access, email verification, password reset).
//!
//! Every token carries a purpose tag. Validation always names the purpose the
//! caller is about to act on, and a token minted for any other purpose is
//! rejected even when its signature and expiry are fine.

use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::clock::unix_now;
use crate::db::UserRole;

/// Access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Email verification token duration: 30 minutes
pub const EMAIL_VERIFY_TOKEN_DURATION_SECS: u64 = 30 * 60;

/// Password reset token duration: 15 minutes
pub const PASSWORD_RESET_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenPurpose {
    Access,
    EmailVerify,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Access => "access",
            TokenPurpose::EmailVerify => "email-verify",
            TokenPurpose::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims embedded in every stateless token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (identity UUID)
    pub sub: String,
    /// Identity role at issue time
    pub role: UserRole,
    /// Purpose tag
    #[serde(rename = "pur")]
    pub purpose: TokenPurpose,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Process-wide signing secret. Loaded once at startup and never mutated.
pub struct SigningKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }
}

/// Lifetimes for each token purpose, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub access: u64,
    pub email_verify: u64,
    pub password_reset: u64,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            access: ACCESS_TOKEN_DURATION_SECS,
            email_verify: EMAIL_VERIFY_TOKEN_DURATION_SECS,
            password_reset: PASSWORD_RESET_TOKEN_DURATION_SECS,
        }
    }
}

impl TokenTtls {
    pub fn for_purpose(&self, purpose: TokenPurpose) -> u64 {
        match purpose {
            TokenPurpose::Access => self.access,
            TokenPurpose::EmailVerify => self.email_verify,
            TokenPurpose::PasswordReset => self.password_reset,
        }
    }
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Issues and validates purpose-scoped tokens.
#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<SigningKeys>,
    ttls: TokenTtls,
}

impl TokenCodec {
    pub fn new(keys: Arc<SigningKeys>, ttls: TokenTtls) -> Self {
        Self { keys, ttls }
    }

    pub fn ttls(&self) -> &TokenTtls {
        &self.ttls
    }

    /// Issue a token using the configured lifetime for `purpose`.
    pub fn issue(
        &self,
        subject: &str,
        role: UserRole,
        purpose: TokenPurpose,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_with_ttl(subject, role, purpose, self.ttls.for_purpose(purpose))
    }

    /// Issue a token that expires `ttl` seconds from now.
    pub fn issue_with_ttl(
        &self,
        subject: &str,
        role: UserRole,
        purpose: TokenPurpose,
        ttl: u64,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, role, purpose, ttl, unix_now())
    }

    fn issue_at(
        &self,
        subject: &str,
        role: UserRole,
        purpose: TokenPurpose,
        ttl: u64,
        now: u64,
    ) -> Result<IssuedToken, TokenError> {
        let claims = Claims {
            sub: subject.to_string(),
            role,
            purpose,
            iat: now,
            exp: now.saturating_add(ttl),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.keys.encoding_key)
            .map_err(TokenError::Encoding)?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Validate a token against the purpose the caller is about to act on.
    pub fn validate(&self, token: &str, expected: TokenPurpose) -> Result<Claims, TokenError> {
        self.validate_at(token, expected, unix_now())
    }

    /// Validate as of `now` (Unix seconds). A token is expired once `now >= exp`.
    pub fn validate_at(
        &self,
        token: &str,
        expected: TokenPurpose,
        now: u64,
    ) -> Result<Claims, TokenError> {
        // Expiry is checked below so that exp itself is already expired.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = jsonwebtoken::decode::<Claims>(token, &self.keys.decoding_key, &validation)
            .map_err(|_| TokenError::Invalid)?
            .claims;

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        if claims.purpose != expected {
            return Err(TokenError::PurposeMismatch {
                expected,
                found: claims.purpose,
            });
        }

        Ok(claims)
    }
}

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("token is malformed or has a bad signature")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("token was issued for {found}, not {expected}")]
    PurposeMismatch {
        expected: TokenPurpose,
        found: TokenPurpose,
    },
}
