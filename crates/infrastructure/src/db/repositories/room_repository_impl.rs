//! 房间Repository实现

use std::sync::Arc;

use crate::db::repositories::storage_error;
use crate::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    entities::room::{LeavedMember, Room, RoomMember, RoomType},
    errors::{DomainError, DomainResult},
    repositories::{ListPage, Pagination, RoomRepository},
};
use sqlx::{query, query_as, query_scalar, FromRow};
use uuid::Uuid;

/// 数据库房间模型
#[derive(Debug, Clone, FromRow)]
struct DbRoom {
    pub id: Uuid,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub room_type: String,
    pub last_message_id: Option<Uuid>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn room_type_to_str(room_type: RoomType) -> &'static str {
    match room_type {
        RoomType::Single => "single",
        RoomType::Group => "group",
        RoomType::Admin => "admin",
    }
}

fn room_type_from_str(s: &str) -> RoomType {
    match s {
        "group" => RoomType::Group,
        "admin" => RoomType::Admin,
        _ => RoomType::Single,
    }
}

#[derive(Debug, Clone, FromRow)]
struct DbRoomMember {
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbLeavedMember {
    pub user_id: Uuid,
    pub leaved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbUnread {
    pub user_id: Uuid,
    pub message_id: Uuid,
}

/// 房间Repository实现
pub struct PostgresRoomRepository {
    pool: Arc<DbPool>,
}

impl PostgresRoomRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// 补齐成员、退出历史、未读集合与消息ID列表
    async fn hydrate(&self, row: DbRoom) -> DomainResult<Room> {
        let members: Vec<DbRoomMember> = query_as(
            "SELECT user_id, joined_at FROM room_members WHERE room_id = $1 ORDER BY joined_at",
        )
        .bind(row.id)
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        let leaved: Vec<DbLeavedMember> = query_as(
            "SELECT user_id, leaved_at FROM room_members_leaved WHERE room_id = $1 ORDER BY leaved_at",
        )
        .bind(row.id)
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        let unreads: Vec<DbUnread> = query_as(
            "SELECT user_id, message_id FROM room_member_unreads WHERE room_id = $1 ORDER BY created_at",
        )
        .bind(row.id)
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        let messages: Vec<Uuid> = query_scalar(
            "SELECT id FROM messages WHERE room_id = $1 AND is_deleted = FALSE ORDER BY created_at",
        )
        .bind(row.id)
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        let members = members
            .into_iter()
            .map(|m| RoomMember {
                user_id: m.user_id,
                joined_at: m.joined_at,
                message_unreads: unreads
                    .iter()
                    .filter(|u| u.user_id == m.user_id)
                    .map(|u| u.message_id)
                    .collect(),
            })
            .collect();

        Ok(Room {
            id: row.id,
            name: row.name,
            avatar: row.avatar,
            room_type: room_type_from_str(&row.room_type),
            members,
            members_leaved: leaved
                .into_iter()
                .map(|m| LeavedMember {
                    user_id: m.user_id,
                    leaved_at: m.leaved_at,
                })
                .collect(),
            messages,
            last_message_id: row.last_message_id,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl RoomRepository for PostgresRoomRepository {
    async fn create(&self, room: Room) -> DomainResult<Room> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        query(
            r#"
            INSERT INTO rooms (id, name, avatar, room_type, last_message_id, is_deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(room.id)
        .bind(&room.name)
        .bind(&room.avatar)
        .bind(room_type_to_str(room.room_type))
        .bind(room.last_message_id)
        .bind(room.is_deleted)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        for member in &room.members {
            query(
                "INSERT INTO room_members (room_id, user_id, joined_at) VALUES ($1, $2, $3)",
            )
            .bind(room.id)
            .bind(member.user_id)
            .bind(member.joined_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(room)
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Room>> {
        let row: Option<DbRoom> = query_as("SELECT * FROM rooms WHERE id = $1")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage_error)?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_single_between(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> DomainResult<Option<Room>> {
        let row: Option<DbRoom> = query_as(
            r#"
            SELECT r.* FROM rooms r
            WHERE r.room_type = 'single' AND r.is_deleted = FALSE
              AND EXISTS (SELECT 1 FROM room_members WHERE room_id = r.id AND user_id = $1)
              AND EXISTS (SELECT 1 FROM room_members WHERE room_id = r.id AND user_id = $2)
            LIMIT 1
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_error)?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn page_by_member(
        &self,
        user_id: Uuid,
        keyword: Option<&str>,
        pagination: Pagination,
    ) -> DomainResult<ListPage<Room>> {
        let pattern = keyword.map(|k| format!("%{k}%"));

        let total: i64 = query_scalar(
            r#"
            SELECT COUNT(*) FROM rooms r
            JOIN room_members rm ON rm.room_id = r.id
            WHERE rm.user_id = $1 AND r.is_deleted = FALSE
              AND ($2::text IS NULL OR r.name ILIKE $2)
            "#,
        )
        .bind(user_id)
        .bind(&pattern)
        .fetch_one(&*self.pool)
        .await
        .map_err(storage_error)?;

        let rows: Vec<DbRoom> = query_as(
            r#"
            SELECT r.* FROM rooms r
            JOIN room_members rm ON rm.room_id = r.id
            WHERE rm.user_id = $1 AND r.is_deleted = FALSE
              AND ($2::text IS NULL OR r.name ILIKE $2)
            ORDER BY r.updated_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(&pattern)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        let mut rooms = Vec::with_capacity(rows.len());
        for row in rows {
            rooms.push(self.hydrate(row).await?);
        }
        Ok(ListPage::new(rooms, total as u64, pagination))
    }

    async fn update_info(
        &self,
        room_id: Uuid,
        name: Option<String>,
        avatar: Option<String>,
    ) -> DomainResult<Option<Room>> {
        let row: Option<DbRoom> = query_as(
            r#"
            UPDATE rooms
            SET name = COALESCE($2, name), avatar = COALESCE($3, avatar), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(room_id)
        .bind(&name)
        .bind(&avatar)
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_error)?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn add_member(&self, room_id: Uuid, member: RoomMember) -> DomainResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        query("DELETE FROM room_members_leaved WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(member.user_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        query(
            r#"
            INSERT INTO room_members (room_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(member.user_id)
        .bind(member.joined_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        query("UPDATE rooms SET updated_at = NOW() WHERE id = $1")
            .bind(room_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> DomainResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let removed = query("DELETE FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        if removed.rows_affected() == 0 {
            return Err(DomainError::invalid_operation("用户不在该房间中"));
        }

        query(
            r#"
            INSERT INTO room_members_leaved (room_id, user_id, leaved_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (room_id, user_id) DO UPDATE SET leaved_at = EXCLUDED.leaved_at
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        query("DELETE FROM room_member_unreads WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        query("UPDATE rooms SET updated_at = NOW() WHERE id = $1")
            .bind(room_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn append_message(&self, room_id: Uuid, message_id: Uuid) -> DomainResult<()> {
        query("UPDATE rooms SET last_message_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(room_id)
            .bind(message_id)
            .execute(&*self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn add_message_unread(
        &self,
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<()> {
        // 仅对当前成员生效；重复累积被唯一约束吸收
        query(
            r#"
            INSERT INTO room_member_unreads (room_id, user_id, message_id)
            SELECT rm.room_id, rm.user_id, $2
            FROM room_members rm
            WHERE rm.room_id = $1 AND rm.user_id = $3
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(message_id)
        .bind(user_id)
        .execute(&*self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn add_message_unread_except(
        &self,
        room_id: Uuid,
        message_id: Uuid,
        except_user_id: Uuid,
    ) -> DomainResult<()> {
        query(
            r#"
            INSERT INTO room_member_unreads (room_id, user_id, message_id)
            SELECT rm.room_id, rm.user_id, $2
            FROM room_members rm
            WHERE rm.room_id = $1 AND rm.user_id <> $3
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(message_id)
        .bind(except_user_id)
        .execute(&*self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn clear_unread(&self, room_id: Uuid, user_id: Uuid) -> DomainResult<()> {
        query("DELETE FROM room_member_unreads WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(&*self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn soft_delete(&self, room_id: Uuid) -> DomainResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        query(
            r#"
            INSERT INTO room_members_leaved (room_id, user_id, leaved_at)
            SELECT room_id, user_id, NOW() FROM room_members WHERE room_id = $1
            ON CONFLICT (room_id, user_id) DO UPDATE SET leaved_at = EXCLUDED.leaved_at
            "#,
        )
        .bind(room_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        query("DELETE FROM room_members WHERE room_id = $1")
            .bind(room_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        query("DELETE FROM room_member_unreads WHERE room_id = $1")
            .bind(room_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        let updated = query(
            "UPDATE rooms SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(room_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;
        if updated.rows_affected() == 0 {
            return Err(DomainError::not_found("room", room_id));
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn hard_delete(&self, room_id: Uuid) -> DomainResult<()> {
        let deleted = query("DELETE FROM rooms WHERE id = $1")
            .bind(room_id)
            .execute(&*self.pool)
            .await
            .map_err(storage_error)?;
        if deleted.rows_affected() == 0 {
            return Err(DomainError::not_found("room", room_id));
        }
        Ok(())
    }
}
