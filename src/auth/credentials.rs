//! Email/password credential checks.

use std::sync::Arc;

use tracing::debug;

use super::AuthError;
use super::validation::{
    normalize_email, validate_email, validate_full_name, validate_password, validate_phone,
};
use crate::db::{Identity, NewIdentity, UserRole, UserStore};
use crate::password::PasswordHasher;

/// Fields accepted at registration.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'a> {
    pub full_name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub password: &'a str,
}

/// Registers identities and checks passwords against stored digests.
#[derive(Clone)]
pub struct CredentialVerifier {
    users: UserStore,
    hasher: Arc<dyn PasswordHasher>,
}

impl CredentialVerifier {
    pub fn new(users: UserStore, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { users, hasher }
    }

    /// Create an unverified applicant. The duplicate check runs before the
    /// insert; a concurrent insert that wins the race still maps to
    /// `DuplicateEmail` through the unique index.
    pub async fn register(&self, registration: &Registration<'_>) -> Result<Identity, AuthError> {
        let email = normalize_email(registration.email);
        let full_name = registration.full_name.trim();
        let phone = registration.phone.trim();

        validate_full_name(full_name)?;
        validate_email(&email)?;
        validate_phone(phone)?;
        validate_password(registration.password)?;

        if self.users.email_exists(&email).await? {
            return Err(AuthError::DuplicateEmail);
        }

        let digest = self.hash_password(registration.password).await?;
        let uuid = uuid::Uuid::new_v4().to_string();

        let created = self
            .users
            .create(&NewIdentity {
                uuid: &uuid,
                full_name,
                email: &email,
                phone,
                password_digest: &digest,
                role: UserRole::Applicant,
            })
            .await;

        let id = match created {
            Ok(id) => id,
            Err(e) if is_unique_violation(&e) => return Err(AuthError::DuplicateEmail),
            Err(e) => return Err(e.into()),
        };

        self.users
            .get_by_id(id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Look up the identity for `email` and check `password` against its digest.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);

        let identity = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::EmailNotFound)?;

        let hasher = self.hasher.clone();
        let digest = identity.password_digest.clone();
        let password = password.to_owned();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&digest, &password))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        if !matches {
            debug!(user_id = identity.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(identity)
    }

    /// Hash a plaintext password off the async workers.
    pub async fn hash_password(&self, plain: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(AuthError::from)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::password::Argon2Hasher;

    async fn verifier() -> CredentialVerifier {
        let db = Database::open(":memory:").await.unwrap();
        let hasher = Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap());
        CredentialVerifier::new(db.users(), hasher)
    }

    fn alice() -> Registration<'static> {
        Registration {
            full_name: "Alice",
            email: "a@x.com",
            phone: "+1",
            password: "pw12345678",
        }
    }

    #[tokio::test]
    async fn test_register_defaults() {
        let verifier = verifier().await;

        let identity = verifier.register(&alice()).await.unwrap();
        assert_eq!(identity.email, "a@x.com");
        assert_eq!(identity.role, UserRole::Applicant);
        assert!(!identity.verified);
        assert_ne!(identity.password_digest, "pw12345678");
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let verifier = verifier().await;
        verifier.register(&alice()).await.unwrap();

        let again = Registration {
            email: " A@X.com ",
            ..alice()
        };
        assert!(matches!(
            verifier.register(&again).await,
            Err(AuthError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let verifier = verifier().await;
        let short = Registration {
            password: "short",
            ..alice()
        };
        assert!(matches!(
            verifier.register(&short).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let verifier = verifier().await;
        let registered = verifier.register(&alice()).await.unwrap();

        let identity = verifier
            .authenticate("A@x.com", "pw12345678")
            .await
            .unwrap();
        assert_eq!(identity.id, registered.id);

        assert!(matches!(
            verifier.authenticate("a@x.com", "wrong-password").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            verifier.authenticate("b@x.com", "pw12345678").await,
            Err(AuthError::EmailNotFound)
        ));
    }
}
