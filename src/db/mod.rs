mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use user::{NewUser, User, UserRole, UserStore, UserSummary};

/// Errors returned by the credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,
    /// A unique column (`email` or `username`) already holds this value
    #[error("{0} is already taken")]
    Conflict(&'static str),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        // Every connection to sqlite::memory: gets its own database, so the
        // in-memory pool is pinned to one connection.
        let (url, max_connections) = if path == ":memory:" {
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite:{}?mode=rwc", path), 5)
        };

        let mut options = SqlitePoolOptions::new().max_connections(max_connections);
        if path == ":memory:" {
            // Closing the only connection would drop the database
            options = options.idle_timeout(None).max_lifetime(None);
        }
        let pool = options.connect(&url).await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
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
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'user',
                    is_verified INTEGER NOT NULL DEFAULT 0,
                    avatar TEXT,
                    -- JTI of the one refresh token currently bound to the user
                    refresh_token_id TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_uuid ON users(uuid)",
                "CREATE INDEX idx_users_email ON users(email)",
                "CREATE INDEX idx_users_username ON users(username)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewUser<'static> {
        NewUser {
            uuid: "uuid-123",
            username: "alice",
            email: "alice@example.com",
            password_hash: "$argon2id$placeholder",
            avatar: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db.users().create(alice()).await.unwrap();

        let user = db.users().get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.uuid, "uuid-123");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, UserRole::User);
        assert!(!user.is_verified);
        assert!(user.refresh_token_id.is_none());
        assert!(user.avatar.is_none());

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.id, id);

        let user = db.users().get_by_uuid("uuid-123").await.unwrap().unwrap();
        assert_eq!(user.id, id);

        let user = db
            .users()
            .get_by_email("ALICE@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(alice()).await.unwrap();
        let result = db
            .users()
            .create(NewUser {
                uuid: "uuid-456",
                username: "alice2",
                ..alice()
            })
            .await;

        assert!(matches!(result, Err(StoreError::Conflict("email"))));
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(alice()).await.unwrap();
        let result = db
            .users()
            .create(NewUser {
                uuid: "uuid-456",
                email: "other@example.com",
                username: "Alice",
                ..alice()
            })
            .await;

        assert!(matches!(result, Err(StoreError::Conflict("username"))));
    }

    #[tokio::test]
    async fn test_set_verified() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create(alice()).await.unwrap();

        db.users().set_verified("alice@example.com").await.unwrap();
        assert!(db.users().get_by_id(id).await.unwrap().unwrap().is_verified);

        // Already verified is not an error
        db.users().set_verified("alice@example.com").await.unwrap();

        let missing = db.users().set_verified("nobody@example.com").await;
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_set_role() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create(alice()).await.unwrap();

        db.users().set_role(id, UserRole::Moderator).await.unwrap();
        assert_eq!(
            db.users().get_by_id(id).await.unwrap().unwrap().role,
            UserRole::Moderator
        );

        let missing = db.users().set_role(id + 100, UserRole::Admin).await;
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_rotate_refresh_token_is_conditional() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create(alice()).await.unwrap();

        db.users().set_refresh_token(id, Some("jti-1")).await.unwrap();

        assert!(db.users().rotate_refresh_token(id, "jti-1", "jti-2").await.unwrap());
        // A second rotation from the same starting point loses
        assert!(!db.users().rotate_refresh_token(id, "jti-1", "jti-3").await.unwrap());

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.refresh_token_id.as_deref(), Some("jti-2"));

        db.users().set_refresh_token(id, None).await.unwrap();
        assert!(!db.users().rotate_refresh_token(id, "jti-2", "jti-4").await.unwrap());
        assert!(
            db.users()
                .get_by_id(id)
                .await
                .unwrap()
                .unwrap()
                .refresh_token_id
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_set_avatar_and_list() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create(alice()).await.unwrap();

        db.users()
            .set_avatar(id, Some("https://cdn.example.com/alice.png"))
            .await
            .unwrap();

        let users = db.users().list().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].uuid, "uuid-123");
        assert_eq!(
            users[0].avatar.as_deref(),
            Some("https://cdn.example.com/alice.png")
        );
    }
}
