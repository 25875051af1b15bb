use sqlx::sqlite::SqlitePool;

use super::StoreError;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Moderator => "moderator",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            "moderator" => UserRole::Moderator,
            _ => UserRole::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub is_verified: bool,
    pub avatar: Option<String>,
    /// JTI of the refresh token currently bound to this user
    pub refresh_token_id: Option<String>,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    is_verified: i32,
    avatar: Option<String>,
    refresh_token_id: Option<String>,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: UserRole::from_str(&row.role),
            is_verified: row.is_verified != 0,
            avatar: row.avatar,
            refresh_token_id: row.refresh_token_id,
            created_at: row.created_at,
        }
    }
}

/// Fields required to create an account.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub uuid: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub avatar: Option<&'a str>,
}

/// Public user profile. Does not expose internal database IDs or secrets.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserSummary {
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub is_verified: bool,
    pub avatar: Option<String>,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct UserSummaryRow {
    uuid: String,
    username: String,
    email: String,
    role: String,
    is_verified: i32,
    avatar: Option<String>,
    created_at: String,
}

impl From<UserSummaryRow> for UserSummary {
    fn from(row: UserSummaryRow) -> Self {
        Self {
            uuid: row.uuid,
            username: row.username,
            email: row.email,
            role: UserRole::from_str(&row.role),
            is_verified: row.is_verified != 0,
            avatar: row.avatar,
            created_at: row.created_at,
        }
    }
}

macro_rules! select_user_where {
    ($condition:literal) => {
        concat!(
            "SELECT id, uuid, username, email, password_hash, role, is_verified, avatar, ",
            "refresh_token_id, created_at FROM users WHERE ",
            $condition
        )
    };
}

/// Map a unique constraint failure to the column that caused it.
fn conflict_or(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let message = db_err.message();
            if message.contains("users.email") {
                return StoreError::Conflict("email");
            }
            if message.contains("users.username") {
                return StoreError::Conflict("username");
            }
            return StoreError::Conflict("uuid");
        }
    }
    StoreError::Database(e)
}

fn affected(rows: u64) -> Result<(), StoreError> {
    if rows == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new unverified user with the `user` role. Returns the user ID.
    pub async fn create(&self, new: NewUser<'_>) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, username, email, password_hash, avatar, is_verified) VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(new.uuid)
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.avatar)
        .execute(&self.pool)
        .await
        .map_err(conflict_or)?;
        Ok(result.last_insert_rowid())
    }

    async fn fetch_one(&self, sql: &'static str, value: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one(select_user_where!("email = ?"), email).await
    }

    /// Get a user by username (case-insensitive).
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one(select_user_where!("username = ?"), username)
            .await
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one(select_user_where!("uuid = ?"), uuid).await
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(select_user_where!("id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Overwrite (or clear) the refresh token binding.
    pub async fn set_refresh_token(&self, id: i64, jti: Option<&str>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET refresh_token_id = ? WHERE id = ?")
            .bind(jti)
            .bind(id)
            .execute(&self.pool)
            .await?;
        affected(result.rows_affected())
    }

    /// Replace the binding only if it still equals `expected`.
    /// Returns false when another rotation or a revocation got there first.
    pub async fn rotate_refresh_token(
        &self,
        id: i64,
        expected: &str,
        new_jti: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token_id = ? WHERE id = ? AND refresh_token_id = ?",
        )
        .bind(new_jti)
        .bind(id)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark the account owning `email` as verified.
    pub async fn set_verified(&self, email: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET is_verified = 1 WHERE email = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;
        affected(result.rows_affected())
    }

    /// Set the role for a user.
    pub async fn set_role(&self, id: i64, role: UserRole) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        affected(result.rows_affected())
    }

    /// Set or clear the avatar URL.
    pub async fn set_avatar(&self, id: i64, url: Option<&str>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET avatar = ? WHERE id = ?")
            .bind(url)
            .bind(id)
            .execute(&self.pool)
            .await?;
        affected(result.rows_affected())
    }

    /// List all users (for the admin dashboard). Does not expose internal IDs.
    pub async fn list(&self) -> Result<Vec<UserSummary>, StoreError> {
        let rows: Vec<UserSummaryRow> = sqlx::query_as(
            "SELECT uuid, username, email, role, is_verified, avatar, created_at FROM users ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserSummary::from).collect())
    }
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid,
            username: user.username,
            email: user.email,
            role: user.role,
            is_verified: user.is_verified,
            avatar: user.avatar,
            created_at: user.created_at,
        }
    }
}
