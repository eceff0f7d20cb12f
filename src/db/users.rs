//! User repository: credentials, role, status and moderation flags.

use super::{DbError, now_millis, unique_or};
use crate::chat::Role;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Presence status as persisted and broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Away,
    #[default]
    Offline,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "online" => Self::Online,
            "away" => Self::Away,
            _ => Self::Offline,
        }
    }
}

/// A stored user account.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub status: UserStatus,
    pub status_message: Option<String>,
    /// Unix millis; a mute is active while this is in the future.
    pub muted_until: Option<i64>,
    pub banned: bool,
    pub created_at: i64,
    pub last_seen_at: i64,
}

impl UserRecord {
    pub fn is_muted_at(&self, now: i64) -> bool {
        self.muted_until.is_some_and(|until| until > now)
    }

    /// A mute that has already run out but was never cleared.
    pub fn has_expired_mute(&self, now: i64) -> bool {
        self.muted_until.is_some_and(|until| until <= now)
    }
}

type UserRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<i64>,
    bool,
    i64,
    i64,
);

const USER_COLUMNS: &str = "id, username, role, status, status_message, muted_until, banned, created_at, last_seen_at";

fn from_row(row: UserRow) -> Result<UserRecord, DbError> {
    let (id, username, role, status, status_message, muted_until, banned, created_at, last_seen_at) =
        row;
    let role = role
        .parse::<Role>()
        .map_err(|_| DbError::Corrupt(format!("role '{}' for user {}", role, id)))?;
    Ok(UserRecord {
        id,
        username,
        role,
        status: UserStatus::parse(&status),
        status_message,
        muted_until,
        banned,
        created_at,
        last_seen_at,
    })
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user with an Argon2-hashed password.
    pub async fn create(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<UserRecord, DbError> {
        let password_hash = hash_password(password)?;
        let now = now_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, role, created_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(username)
        .bind(&password_hash)
        .bind(role.as_str())
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| unique_or(e, || DbError::UserExists(username.to_string())))?;

        Ok(UserRecord {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            role,
            status: UserStatus::Offline,
            status_message: None,
            muted_until: None,
            banned: false,
            created_at: now,
            last_seen_at: now,
        })
    }

    pub async fn find_by_name(&self, username: &str) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ? COLLATE NOCASE"
        ))
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        row.map(from_row).transpose()
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(from_row).transpose()
    }

    /// Check credentials. Returns `None` for unknown users, wrong passwords
    /// and banned accounts alike.
    ///
    /// Unknown users still pay for one Argon2 verification so response time
    /// does not reveal whether an account exists.
    pub async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, password_hash FROM users WHERE username = ? COLLATE NOCASE",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        let Some((id, password_hash)) = row else {
            dummy_password_verify(password);
            return Ok(None);
        };

        if !verify_password(password, &password_hash) {
            return Ok(None);
        }

        sqlx::query("UPDATE users SET last_seen_at = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(self.find_by_id(id).await?.filter(|user| !user.banned))
    }

    pub async fn set_status(
        &self,
        id: i64,
        status: UserStatus,
        message: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET status = ?, status_message = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(message)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Mute until `until` (unix millis), or clear the mute with `None`.
    pub async fn set_muted_until(&self, id: i64, until: Option<i64>) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET muted_until = ? WHERE id = ?")
            .bind(until)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_banned(&self, id: i64, banned: bool) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET banned = ? WHERE id = ?")
            .bind(banned)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_role(&self, id: i64, role: Role) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

fn hash_password(password: &str) -> Result<String, DbError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| DbError::PasswordHash)
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Burn roughly one verification's worth of CPU for unknown accounts.
fn dummy_password_verify(password: &str) {
    const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$ZWNob2h1Yi10aW1pbmc$K4VZh8k8YL3E8H7E8H7E8H7E8H7E8H7E8H7E8H7E8Hs";

    if let Ok(parsed) = PasswordHash::new(DUMMY_HASH) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
}

#[cfg(test)]
mod tests {
    use crate::chat::Role;
    use crate::db::{Database, DbError, UserStatus};

    #[tokio::test]
    async fn create_and_verify() {
        let db = Database::new(":memory:").await.unwrap();
        let created = db.users().create("alice", "wonderland", Role::User).await.unwrap();

        let ok = db.users().verify("alice", "wonderland").await.unwrap();
        assert_eq!(ok.map(|u| u.id), Some(created.id));

        assert!(db.users().verify("alice", "nope").await.unwrap().is_none());
        assert!(db.users().verify("nobody", "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn username_lookup_is_case_insensitive() {
        let db = Database::new(":memory:").await.unwrap();
        db.users().create("Alice", "pw", Role::User).await.unwrap();
        assert!(db.users().find_by_name("alice").await.unwrap().is_some());
        assert!(db.users().verify("ALICE", "pw").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_user_is_rejected() {
        let db = Database::new(":memory:").await.unwrap();
        db.users().create("bob", "pw", Role::User).await.unwrap();
        let err = db.users().create("BOB", "pw", Role::User).await.unwrap_err();
        assert!(matches!(err, DbError::UserExists(_)));
    }

    #[tokio::test]
    async fn banned_user_cannot_verify() {
        let db = Database::new(":memory:").await.unwrap();
        let user = db.users().create("carol", "pw", Role::User).await.unwrap();
        db.users().set_banned(user.id, true).await.unwrap();
        assert!(db.users().verify("carol", "pw").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_role_and_mute_round_trip() {
        let db = Database::new(":memory:").await.unwrap();
        let user = db.users().create("dave", "pw", Role::User).await.unwrap();

        db.users()
            .set_status(user.id, UserStatus::Away, Some("lunch"))
            .await
            .unwrap();
        db.users().set_role(user.id, Role::Mod).await.unwrap();
        db.users().set_muted_until(user.id, Some(1_000)).await.unwrap();

        let stored = db.users().find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.status, UserStatus::Away);
        assert_eq!(stored.status_message.as_deref(), Some("lunch"));
        assert_eq!(stored.role, Role::Mod);
        assert!(stored.is_muted_at(500));
        assert!(stored.has_expired_mute(2_000));

        db.users().set_muted_until(user.id, None).await.unwrap();
        let stored = db.users().find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.muted_until.is_none());
    }
}
