//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::bearer::get_bearer;
use super::errors::BearerRejection;
use super::state::HasTokenCodec;
use crate::jwt::{Claims, TokenPurpose};

/// Claims of a valid `access` bearer token.
///
/// Tokens minted for email verification or password reset are rejected
/// here even when their signature and expiry are fine.
pub struct AccessAuth(pub Claims);

impl<S> FromRequestParts<S> for AccessAuth
where
    S: HasTokenCodec + Send + Sync,
{
    type Rejection = BearerRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = get_bearer(&parts.headers).ok_or_else(BearerRejection::missing)?;

        state
            .codec()
            .validate(token, TokenPurpose::Access)
            .map(AccessAuth)
            .map_err(BearerRejection::from)
    }
}
