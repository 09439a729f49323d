use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// Identity role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Applicant,
    Company,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Applicant => "APPLICANT",
            UserRole::Company => "COMPANY",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "COMPANY" => UserRole::Company,
            _ => UserRole::Applicant,
        }
    }
}

/// A stored identity. `uuid` is the public identifier carried in token subjects.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: i64,
    pub uuid: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password_digest: String,
    pub role: UserRole,
    pub verified: bool,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: i64,
    uuid: String,
    full_name: String,
    email: String,
    phone: String,
    password_digest: String,
    role: String,
    verified: i32,
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            full_name: row.full_name,
            email: row.email,
            phone: row.phone,
            password_digest: row.password_digest,
            role: UserRole::from_str(&row.role),
            verified: row.verified != 0,
        }
    }
}

/// Fields for a new identity row.
pub struct NewIdentity<'a> {
    pub uuid: &'a str,
    pub full_name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub password_digest: &'a str,
    pub role: UserRole,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new, unverified identity. Returns the row ID.
    pub async fn create(&self, identity: &NewIdentity<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, full_name, email, phone, password_digest, role, verified) VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(identity.uuid)
        .bind(identity.full_name)
        .bind(identity.email)
        .bind(identity.phone)
        .bind(identity.password_digest)
        .bind(identity.role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get an identity by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, sqlx::Error> {
        let row: Option<IdentityRow> = sqlx::query_as(
            "SELECT id, uuid, full_name, email, phone, password_digest, role, verified FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Identity::from))
    }

    /// Get an identity by row ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Identity>, sqlx::Error> {
        let row: Option<IdentityRow> = sqlx::query_as(
            "SELECT id, uuid, full_name, email, phone, password_digest, role, verified FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Identity::from))
    }

    /// Get an identity by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Identity>, sqlx::Error> {
        let row: Option<IdentityRow> = sqlx::query_as(
            "SELECT id, uuid, full_name, email, phone, password_digest, role, verified FROM users WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Identity::from))
    }

    /// Check whether an email is already registered.
    pub async fn email_exists(&self, email: &str) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Mark an identity as verified. The flag never goes back to false.
    pub async fn mark_verified(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET verified = 1 WHERE id = ? AND verified = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the stored password digest.
    pub async fn set_password_digest(&self, id: i64, digest: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_digest = ? WHERE id = ?")
            .bind(digest)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete an identity by ID. Its refresh sessions go with it.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
