//! 消息Repository实现
//!
//! read_by/liked_by/unreads这类集合字段的写入全部走带唯一
//! 约束的单语句INSERT，并发下的重复写入由ON CONFLICT吸收。

use std::sync::Arc;

use crate::db::repositories::storage_error;
use crate::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    entities::message::{Emotion, Location, Message, Reaction, ReadReceipt, ReplyTo},
    errors::DomainResult,
    repositories::{ListPage, MessageRepository, Pagination},
};
use sqlx::{query, query_as, query_scalar, FromRow};
use uuid::Uuid;

/// 数据库消息模型
#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub text: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub order_id: Option<i64>,
    pub product_id: Option<i64>,
    pub reply_to_message_id: Option<Uuid>,
    pub reply_to_attachment_id: Option<Uuid>,
    pub is_hidden: bool,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
struct DbReadReceipt {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbReaction {
    pub user_id: Uuid,
    pub emotion: String,
}

fn emotion_to_str(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Like => "like",
        Emotion::Angry => "angry",
        Emotion::Sad => "sad",
        Emotion::Laugh => "laugh",
        Emotion::Heart => "heart",
        Emotion::Wow => "wow",
    }
}

fn emotion_from_str(s: &str) -> Emotion {
    match s {
        "angry" => Emotion::Angry,
        "sad" => Emotion::Sad,
        "laugh" => Emotion::Laugh,
        "heart" => Emotion::Heart,
        "wow" => Emotion::Wow,
        _ => Emotion::Like,
    }
}

/// 消息Repository实现
pub struct PostgresMessageRepository {
    pool: Arc<DbPool>,
}

impl PostgresMessageRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// 补齐附件、提及、已读回执与表情回应
    async fn hydrate(&self, row: DbMessage) -> DomainResult<Message> {
        let attachment_ids: Vec<Uuid> = query_scalar(
            "SELECT attachment_id FROM message_attachments WHERE message_id = $1 ORDER BY position",
        )
        .bind(row.id)
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        let mention_to: Vec<Uuid> =
            query_scalar("SELECT user_id FROM message_mentions WHERE message_id = $1")
                .bind(row.id)
                .fetch_all(&*self.pool)
                .await
                .map_err(storage_error)?;

        let read_by: Vec<DbReadReceipt> = query_as(
            "SELECT user_id, created_at FROM message_read_by WHERE message_id = $1 ORDER BY created_at",
        )
        .bind(row.id)
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        let liked_by: Vec<DbReaction> =
            query_as("SELECT user_id, emotion FROM message_reactions WHERE message_id = $1")
                .bind(row.id)
                .fetch_all(&*self.pool)
                .await
                .map_err(storage_error)?;

        let location = match (row.lat, row.lng) {
            (Some(lat), Some(lng)) => Some(Location { lat, lng }),
            _ => None,
        };
        let reply_to = row.reply_to_message_id.map(|message_id| ReplyTo {
            message_id,
            attachment_id: row.reply_to_attachment_id,
        });

        Ok(Message {
            id: row.id,
            room_id: row.room_id,
            author_id: row.author_id,
            text: row.text,
            location,
            order_id: row.order_id,
            product_id: row.product_id,
            attachment_ids,
            mention_to,
            reply_to,
            read_by: read_by
                .into_iter()
                .map(|r| ReadReceipt {
                    user_id: r.user_id,
                    created_at: r.created_at,
                })
                .collect(),
            liked_by: liked_by
                .into_iter()
                .map(|r| Reaction {
                    user_id: r.user_id,
                    emotion: emotion_from_str(&r.emotion),
                })
                .collect(),
            is_hidden: row.is_hidden,
            is_deleted: row.is_deleted,
            is_edited: row.is_edited,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn fetch(&self, id: Uuid) -> DomainResult<Option<Message>> {
        let row: Option<DbMessage> = query_as("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage_error)?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn create(&self, message: Message) -> DomainResult<Message> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        query(
            r#"
            INSERT INTO messages (
                id, room_id, author_id, text, lat, lng, order_id, product_id,
                reply_to_message_id, reply_to_attachment_id,
                is_hidden, is_deleted, is_edited, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(message.id)
        .bind(message.room_id)
        .bind(message.author_id)
        .bind(&message.text)
        .bind(message.location.as_ref().map(|l| l.lat.clone()))
        .bind(message.location.as_ref().map(|l| l.lng.clone()))
        .bind(message.order_id)
        .bind(message.product_id)
        .bind(message.reply_to.as_ref().map(|r| r.message_id))
        .bind(message.reply_to.as_ref().and_then(|r| r.attachment_id))
        .bind(message.is_hidden)
        .bind(message.is_deleted)
        .bind(message.is_edited)
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        for (position, attachment_id) in message.attachment_ids.iter().enumerate() {
            query(
                "INSERT INTO message_attachments (message_id, attachment_id, position) VALUES ($1, $2, $3)",
            )
            .bind(message.id)
            .bind(attachment_id)
            .bind(position as i32)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        for user_id in &message.mention_to {
            query("INSERT INTO message_mentions (message_id, user_id) VALUES ($1, $2)")
                .bind(message.id)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }

        for receipt in &message.read_by {
            query(
                "INSERT INTO message_read_by (message_id, user_id, created_at) VALUES ($1, $2, $3)",
            )
            .bind(message.id)
            .bind(receipt.user_id)
            .bind(receipt.created_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(message)
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Message>> {
        self.fetch(id).await
    }

    async fn add_read_receipt(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<Option<Message>> {
        let inserted = query(
            r#"
            INSERT INTO message_read_by (message_id, user_id, created_at)
            SELECT m.id, $2, NOW() FROM messages m WHERE m.id = $1
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .execute(&*self.pool)
        .await
        .map_err(storage_error)?;

        // 已读过或消息不存在时无行插入
        if inserted.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch(message_id).await
    }

    async fn add_read_receipts_for_room(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<u64> {
        let inserted = query(
            r#"
            INSERT INTO message_read_by (message_id, user_id, created_at)
            SELECT m.id, $2, NOW() FROM messages m
            WHERE m.room_id = $1 AND m.is_deleted = FALSE
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&*self.pool)
        .await
        .map_err(storage_error)?;
        Ok(inserted.rows_affected())
    }

    async fn set_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emotion: Emotion,
    ) -> DomainResult<Option<Message>> {
        let upserted = query(
            r#"
            INSERT INTO message_reactions (message_id, user_id, emotion)
            SELECT m.id, $2, $3 FROM messages m WHERE m.id = $1
            ON CONFLICT (message_id, user_id) DO UPDATE SET emotion = EXCLUDED.emotion
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emotion_to_str(emotion))
        .execute(&*self.pool)
        .await
        .map_err(storage_error)?;
        if upserted.rows_affected() == 0 {
            return Ok(None);
        }

        query("UPDATE messages SET updated_at = NOW() WHERE id = $1")
            .bind(message_id)
            .execute(&*self.pool)
            .await
            .map_err(storage_error)?;
        self.fetch(message_id).await
    }

    async fn remove_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<Option<Message>> {
        query("DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2")
            .bind(message_id)
            .bind(user_id)
            .execute(&*self.pool)
            .await
            .map_err(storage_error)?;

        query("UPDATE messages SET updated_at = NOW() WHERE id = $1")
            .bind(message_id)
            .execute(&*self.pool)
            .await
            .map_err(storage_error)?;
        self.fetch(message_id).await
    }

    async fn page_by_room(
        &self,
        room_id: Uuid,
        include_hidden: bool,
        pagination: Pagination,
    ) -> DomainResult<ListPage<Message>> {
        let total: i64 = query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE room_id = $1 AND is_deleted = FALSE AND ($2 OR is_hidden = FALSE)
            "#,
        )
        .bind(room_id)
        .bind(include_hidden)
        .fetch_one(&*self.pool)
        .await
        .map_err(storage_error)?;

        let rows: Vec<DbMessage> = query_as(
            r#"
            SELECT * FROM messages
            WHERE room_id = $1 AND is_deleted = FALSE AND ($2 OR is_hidden = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(room_id)
        .bind(include_hidden)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(self.hydrate(row).await?);
        }
        Ok(ListPage::new(messages, total as u64, pagination))
    }

    async fn count_by_room(&self, room_id: Uuid) -> DomainResult<u64> {
        let count: i64 = query_scalar(
            "SELECT COUNT(*) FROM messages WHERE room_id = $1 AND is_deleted = FALSE",
        )
        .bind(room_id)
        .fetch_one(&*self.pool)
        .await
        .map_err(storage_error)?;
        Ok(count as u64)
    }
}
