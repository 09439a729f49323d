//! Refresh session storage.
//!
//! One row per live refresh token. Rotation deletes the presented row and
//! inserts its replacement inside a single transaction, and only proceeds
//! when the delete actually removed a row. A token that has been rotated away
//! is remembered in `consumed_refresh_tokens` until its original expiry so a
//! later replay can be attributed to its owner.

use base64::Engine;
use rand::RngCore;
use sqlx::sqlite::SqlitePool;

use super::user::UserRole;
use crate::clock::unix_now;

/// Refresh session duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Random bytes per refresh token (encoded as unpadded base64url).
const REFRESH_TOKEN_BYTES: usize = 32;

/// A live refresh session.
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub id: String,
    pub user_id: i64,
    pub token: String,
    pub expires_at: u64,
    pub created_at: u64,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: i64,
    token: String,
    expires_at: i64,
    created_at: i64,
}

impl From<SessionRow> for RefreshSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token: row.token,
            expires_at: row.expires_at.max(0) as u64,
            created_at: row.created_at.max(0) as u64,
        }
    }
}

/// Result of a successful rotation.
#[derive(Debug, Clone)]
pub struct Rotation {
    /// The newly inserted session
    pub session: RefreshSession,
    /// The session row that was consumed
    pub previous_id: String,
    /// Owner UUID, read inside the rotation transaction
    pub user_uuid: String,
    /// Owner role, read inside the rotation transaction
    pub role: UserRole,
}

/// Failures specific to refresh session lookups and rotation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The presented token matched no live row. `owner` is set when the token
    /// was previously consumed by rotation.
    #[error("refresh token already used or unknown")]
    Replay { owner: Option<i64> },
    #[error("refresh token has expired")]
    Expired,
    /// The session row pointed at an identity that no longer exists.
    #[error("refresh session owner no longer exists")]
    OwnerMissing,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Store for refresh sessions.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    ttl: u64,
}

impl SessionStore {
    pub fn new(pool: SqlitePool, ttl: u64) -> Self {
        Self { pool, ttl }
    }

    /// Refresh session lifetime in seconds.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Create a new session for a user with a fresh random token.
    pub async fn create(&self, user_id: i64) -> Result<RefreshSession, sqlx::Error> {
        let now = unix_now();
        let session = RefreshSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            token: generate_token(),
            expires_at: now.saturating_add(self.ttl),
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO refresh_sessions (id, user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(&session.token)
        .bind(session.expires_at as i64)
        .bind(session.created_at as i64)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// Find a live session by token. Expired rows are deleted and reported as missing.
    pub async fn find_live(&self, token: &str) -> Result<Option<RefreshSession>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, token, expires_at, created_at FROM refresh_sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(session) = row.map(RefreshSession::from) else {
            return Ok(None);
        };

        if session.expires_at <= unix_now() {
            sqlx::query("DELETE FROM refresh_sessions WHERE id = ?")
                .bind(&session.id)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Consume `old_token` and issue its replacement for the same user.
    ///
    /// The delete and the insert share one transaction, and the insert only
    /// happens if the delete removed exactly one row. Of any number of
    /// concurrent callers presenting the same token, at most one succeeds.
    /// The owner is read in the same transaction, so a rotation that returns
    /// `Ok` carries everything needed to mint the access token.
    pub async fn rotate(&self, old_token: &str) -> Result<Rotation, SessionError> {
        let now = unix_now();
        let mut tx = self.pool.begin().await?;

        let deleted: Option<(String, i64, i64)> = sqlx::query_as(
            "DELETE FROM refresh_sessions WHERE token = ? RETURNING id, user_id, expires_at",
        )
        .bind(old_token)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((previous_id, user_id, expires_at)) = deleted else {
            let owner: Option<(i64,)> =
                sqlx::query_as("SELECT user_id FROM consumed_refresh_tokens WHERE token = ?")
                    .bind(old_token)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Err(SessionError::Replay {
                owner: owner.map(|o| o.0),
            });
        };

        if expires_at.max(0) as u64 <= now {
            // Keep the delete; an expired row is dead either way.
            tx.commit().await?;
            return Err(SessionError::Expired);
        }

        let owner: Option<(String, String)> =
            sqlx::query_as("SELECT uuid, role FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((user_uuid, role)) = owner else {
            tx.rollback().await?;
            return Err(SessionError::OwnerMissing);
        };

        sqlx::query(
            "INSERT OR IGNORE INTO consumed_refresh_tokens (token, user_id, consumed_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(old_token)
        .bind(user_id)
        .bind(now as i64)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        let session = RefreshSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            token: generate_token(),
            expires_at: now.saturating_add(self.ttl),
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO refresh_sessions (id, user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(&session.token)
        .bind(session.expires_at as i64)
        .bind(session.created_at as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Rotation {
            session,
            previous_id,
            user_uuid,
            role: UserRole::from_str(&role),
        })
    }

    /// Delete all sessions for a user (logout everywhere).
    pub async fn revoke_all(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Count live sessions for a user.
    pub async fn count_live(&self, user_id: i64) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refresh_sessions WHERE user_id = ? AND expires_at > ?",
        )
        .bind(user_id)
        .bind(unix_now() as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Delete expired sessions and consumed-token records. Returns rows removed.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let now = unix_now() as i64;

        let sessions = sqlx::query("DELETE FROM refresh_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        let consumed = sqlx::query("DELETE FROM consumed_refresh_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(sessions.rows_affected() + consumed.rows_affected())
    }
}

/// Generate a high-entropy opaque refresh token.
fn generate_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
