//! Message repository: append-only history with deletion.

use super::{DbError, now_millis};
use sqlx::SqlitePool;

/// A message about to be persisted.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub channel_id: i64,
    pub user_id: Option<i64>,
    pub username: &'a str,
    pub content: &'a str,
    pub kind: &'a str,
    /// Embed metadata as JSON.
    pub embed: Option<&'a str>,
}

/// A persisted message row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: i64,
    pub channel_id: i64,
    pub user_id: Option<i64>,
    pub username: String,
    pub content: String,
    pub kind: String,
    pub embed: Option<String>,
    pub created_at: i64,
}

type MessageRow = (i64, i64, Option<i64>, String, String, String, Option<String>, i64);

impl From<MessageRow> for StoredMessage {
    fn from(
        (id, channel_id, user_id, username, content, kind, embed, created_at): MessageRow,
    ) -> Self {
        Self {
            id,
            channel_id,
            user_id,
            username,
            content,
            kind,
            embed,
            created_at,
        }
    }
}

/// Repository for message history.
pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, msg: NewMessage<'_>) -> Result<StoredMessage, DbError> {
        let now = now_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO messages (channel_id, user_id, username, content, kind, embed, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(msg.channel_id)
        .bind(msg.user_id)
        .bind(msg.username)
        .bind(msg.content)
        .bind(msg.kind)
        .bind(msg.embed)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(StoredMessage {
            id: result.last_insert_rowid(),
            channel_id: msg.channel_id,
            user_id: msg.user_id,
            username: msg.username.to_string(),
            content: msg.content.to_string(),
            kind: msg.kind.to_string(),
            embed: msg.embed.map(String::from),
            created_at: now,
        })
    }

    /// The latest `limit` messages of a channel in chronological order.
    pub async fn recent(&self, channel_id: i64, limit: usize) -> Result<Vec<StoredMessage>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, channel_id, user_id, username, content, kind, embed, created_at
            FROM messages
            WHERE channel_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(channel_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        let mut messages: Vec<StoredMessage> = rows.into_iter().map(StoredMessage::from).collect();
        messages.reverse();
        Ok(messages)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<StoredMessage>, DbError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, channel_id, user_id, username, content, kind, embed, created_at
            FROM messages
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(StoredMessage::from))
    }

    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every message of a channel, returning how many were removed.
    pub async fn clear_channel(&self, channel_id: i64) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM messages WHERE channel_id = ?")
            .bind(channel_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::NewMessage;
    use crate::db::Database;

    fn text<'a>(channel_id: i64, content: &'a str) -> NewMessage<'a> {
        NewMessage {
            channel_id,
            user_id: None,
            username: "alice",
            content,
            kind: "text",
            embed: None,
        }
    }

    #[tokio::test]
    async fn recent_is_chronological_and_bounded() {
        let db = Database::new(":memory:").await.unwrap();
        let (chan, _) = db.channels().find_or_create("general", None).await.unwrap();
        for i in 0..5 {
            db.messages().append(text(chan.id, &format!("m{i}"))).await.unwrap();
        }

        let recent = db.messages().recent(chan.id, 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let db = Database::new(":memory:").await.unwrap();
        let (chan, _) = db.channels().find_or_create("general", None).await.unwrap();
        let first = db.messages().append(text(chan.id, "one")).await.unwrap();
        db.messages().append(text(chan.id, "two")).await.unwrap();

        assert!(db.messages().delete(first.id).await.unwrap());
        assert!(!db.messages().delete(first.id).await.unwrap());
        assert!(db.messages().find_by_id(first.id).await.unwrap().is_none());

        assert_eq!(db.messages().clear_channel(chan.id).await.unwrap(), 1);
        assert!(db.messages().recent(chan.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn embed_json_is_kept() {
        let db = Database::new(":memory:").await.unwrap();
        let (chan, _) = db.channels().find_or_create("general", None).await.unwrap();
        let mut msg = text(chan.id, "see https://example.com");
        msg.embed = Some(r#"{"type":"link"}"#);
        let stored = db.messages().append(msg).await.unwrap();
        let found = db.messages().find_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(found, stored);
    }
}
