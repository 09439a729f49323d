mod session;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use session::{
    REFRESH_TOKEN_DURATION_SECS, RefreshSession, Rotation, SessionError, SessionStore,
};
pub use user::{Identity, NewIdentity, UserRole, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    refresh_ttl: u64,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self {
            pool,
            refresh_ttl: REFRESH_TOKEN_DURATION_SECS,
        };
        db.migrate().await?;
        Ok(db)
    }

    /// Override the refresh session lifetime (seconds) used by `sessions()`.
    pub fn with_refresh_ttl(mut self, ttl: u64) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    full_name TEXT NOT NULL,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    phone TEXT NOT NULL,
                    password_digest TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'APPLICANT',
                    verified INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_uuid ON users(uuid)",
                "CREATE INDEX idx_users_email ON users(email)",
                // Live refresh sessions, one row per outstanding refresh token
                "CREATE TABLE refresh_sessions (
                    id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    token TEXT UNIQUE NOT NULL,
                    expires_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_refresh_sessions_user_id ON refresh_sessions(user_id)",
                "CREATE INDEX idx_refresh_sessions_expires_at ON refresh_sessions(expires_at)",
                // Tokens consumed by rotation, kept until they would have expired
                "CREATE TABLE consumed_refresh_tokens (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    consumed_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_consumed_refresh_tokens_expires_at ON consumed_refresh_tokens(expires_at)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the refresh session store.
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.pool.clone(), self.refresh_ttl)
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice<'a>(uuid: &'a str, email: &'a str) -> NewIdentity<'a> {
        NewIdentity {
            uuid,
            full_name: "Alice Example",
            email,
            phone: "+10000000000",
            password_digest: "digest",
            role: UserRole::Applicant,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create(&alice("uuid-123", "alice@example.com"))
            .await
            .unwrap();

        let user = db
            .users()
            .get_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.uuid, "uuid-123");
        assert_eq!(user.full_name, "Alice Example");
        assert_eq!(user.role, UserRole::Applicant);
        assert!(!user.verified);

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.id, id);

        let user = db.users().get_by_uuid("uuid-123").await.unwrap().unwrap();
        assert_eq!(user.id, id);
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create(&alice("uuid-1", "alice@example.com"))
            .await
            .unwrap();

        assert!(db.users().email_exists("ALICE@example.com").await.unwrap());
        assert!(
            db.users()
                .get_by_email("Alice@Example.com")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_mark_verified_is_one_way() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create(&alice("uuid-123", "alice@example.com"))
            .await
            .unwrap();

        assert!(db.users().mark_verified(id).await.unwrap());
        assert!(!db.users().mark_verified(id).await.unwrap());
        assert!(db.users().get_by_id(id).await.unwrap().unwrap().verified);
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create(&alice("uuid-1", "alice@example.com"))
            .await
            .unwrap();
        let result = db
            .users()
            .create(&alice("uuid-2", "Alice@example.com"))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_set_password_digest() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create(&alice("uuid-123", "alice@example.com"))
            .await
            .unwrap();

        assert!(db.users().set_password_digest(id, "new-digest").await.unwrap());
        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.password_digest, "new-digest");
    }

    #[tokio::test]
    async fn test_delete_user_cascades_sessions() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create(&alice("uuid-123", "alice@example.com"))
            .await
            .unwrap();
        let session = db.sessions().create(id).await.unwrap();

        db.users().delete(id).await.unwrap();

        assert!(db.users().get_by_id(id).await.unwrap().is_none());
        assert!(db.sessions().find_live(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_keeps_schema_version() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);

        db.migrate().await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);
    }
}
