//! Channel repository: lookup, creation, topics and persisted membership.

use super::{DbError, now_millis, unique_or};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "private" {
            Self::Private
        } else {
            Self::Public
        }
    }
}

/// A stored channel. `name` is always the canonical lowercase form.
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub id: i64,
    pub name: String,
    pub topic: Option<String>,
    pub visibility: Visibility,
    pub created_by: Option<i64>,
    pub created_at: i64,
}

type ChannelRow = (i64, String, Option<String>, String, Option<i64>, i64);

impl From<ChannelRow> for ChannelRecord {
    fn from((id, name, topic, visibility, created_by, created_at): ChannelRow) -> Self {
        Self {
            id,
            name,
            topic,
            visibility: Visibility::parse(&visibility),
            created_by,
            created_at,
        }
    }
}

/// Repository for channel operations.
pub struct ChannelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChannelRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<ChannelRecord>, DbError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, name, topic, visibility, created_by, created_at
            FROM channels
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(ChannelRecord::from))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<ChannelRecord>, DbError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, name, topic, visibility, created_by, created_at
            FROM channels
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(ChannelRecord::from))
    }

    pub async fn create(
        &self,
        name: &str,
        topic: Option<&str>,
        created_by: Option<i64>,
    ) -> Result<ChannelRecord, DbError> {
        let now = now_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO channels (name, topic, visibility, created_by, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(topic)
        .bind(Visibility::Public.as_str())
        .bind(created_by)
        .bind(now)
        .execute(self.pool)
        .await
        .map_err(|e| unique_or(e, || DbError::ChannelExists(name.to_string())))?;

        Ok(ChannelRecord {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            topic: topic.map(String::from),
            visibility: Visibility::Public,
            created_by,
            created_at: now,
        })
    }

    /// Find a channel, creating it when missing. The flag is true when created.
    ///
    /// A concurrent creator winning the race is treated as "found".
    pub async fn find_or_create(
        &self,
        name: &str,
        created_by: Option<i64>,
    ) -> Result<(ChannelRecord, bool), DbError> {
        if let Some(existing) = self.find_by_name(name).await? {
            return Ok((existing, false));
        }

        match self.create(name, None, created_by).await {
            Ok(created) => Ok((created, true)),
            Err(DbError::ChannelExists(_)) => self
                .find_by_name(name)
                .await?
                .map(|c| (c, false))
                .ok_or_else(|| DbError::Corrupt(format!("channel '{}' vanished", name))),
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self) -> Result<Vec<ChannelRecord>, DbError> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, name, topic, visibility, created_by, created_at
            FROM channels
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(ChannelRecord::from).collect())
    }

    pub async fn set_topic(&self, id: i64, topic: Option<&str>) -> Result<(), DbError> {
        sqlx::query("UPDATE channels SET topic = ? WHERE id = ?")
            .bind(topic)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Returns true when the row was newly inserted.
    pub async fn add_member(&self, channel_id: i64, user_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO channel_members (channel_id, user_id, joined_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(now_millis())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns true when a row was removed.
    pub async fn remove_member(&self, channel_id: i64, user_id: i64) -> Result<bool, DbError> {
        let result =
            sqlx::query("DELETE FROM channel_members WHERE channel_id = ? AND user_id = ?")
                .bind(channel_id)
                .bind(user_id)
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Usernames persisted as members, alphabetically.
    pub async fn members(&self, channel_id: i64) -> Result<Vec<String>, DbError> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT u.username
            FROM channel_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.channel_id = ?
            ORDER BY u.username COLLATE NOCASE
            "#,
        )
        .bind(channel_id)
        .fetch_all(self.pool)
        .await?;

        Ok(names)
    }

    /// Channel names a user is persisted in, alphabetically.
    pub async fn memberships(&self, user_id: i64) -> Result<Vec<String>, DbError> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT c.name
            FROM channel_members m
            JOIN channels c ON c.id = m.channel_id
            WHERE m.user_id = ?
            ORDER BY c.name
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(names)
    }

    /// Delete a channel with its membership and messages (cascade).
    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM channels WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::chat::Role;
    use crate::db::Database;

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let db = Database::new(":memory:").await.unwrap();
        let (first, created) = db.channels().find_or_create("general", None).await.unwrap();
        assert!(created);
        let (second, created) = db.channels().find_or_create("general", None).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn membership_is_idempotent() {
        let db = Database::new(":memory:").await.unwrap();
        let user = db.users().create("alice", "pw", Role::User).await.unwrap();
        let (chan, _) = db.channels().find_or_create("general", None).await.unwrap();

        assert!(db.channels().add_member(chan.id, user.id).await.unwrap());
        assert!(!db.channels().add_member(chan.id, user.id).await.unwrap());
        assert_eq!(db.channels().members(chan.id).await.unwrap(), vec!["alice"]);

        assert!(db.channels().remove_member(chan.id, user.id).await.unwrap());
        assert!(!db.channels().remove_member(chan.id, user.id).await.unwrap());
        assert!(db.channels().members(chan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn topic_and_list() {
        let db = Database::new(":memory:").await.unwrap();
        let (chan, _) = db.channels().find_or_create("random", None).await.unwrap();
        db.channels().find_or_create("general", None).await.unwrap();
        db.channels().set_topic(chan.id, Some("anything goes")).await.unwrap();

        let list = db.channels().list().await.unwrap();
        let names: Vec<_> = list.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["general", "random"]);
        assert_eq!(list[1].topic.as_deref(), Some("anything goes"));
    }

    #[tokio::test]
    async fn delete_cascades_membership() {
        let db = Database::new(":memory:").await.unwrap();
        let user = db.users().create("alice", "pw", Role::User).await.unwrap();
        let (chan, _) = db.channels().find_or_create("temp", None).await.unwrap();
        db.channels().add_member(chan.id, user.id).await.unwrap();

        assert!(db.channels().delete(chan.id).await.unwrap());
        assert!(db.channels().find_by_name("temp").await.unwrap().is_none());
        assert!(db.channels().members(chan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memberships_and_lookup_by_id() {
        let db = Database::new(":memory:").await.unwrap();
        let user = db.users().create("alice", "pw", Role::User).await.unwrap();
        let (b, _) = db.channels().find_or_create("beta", None).await.unwrap();
        let (a, _) = db.channels().find_or_create("alpha", None).await.unwrap();
        db.channels().add_member(b.id, user.id).await.unwrap();
        db.channels().add_member(a.id, user.id).await.unwrap();

        assert_eq!(
            db.channels().memberships(user.id).await.unwrap(),
            vec!["alpha", "beta"]
        );
        assert_eq!(db.channels().find_by_id(b.id).await.unwrap().unwrap().name, "beta");
        assert!(db.channels().find_by_id(999).await.unwrap().is_none());
    }
}
