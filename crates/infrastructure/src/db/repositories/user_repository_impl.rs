//! 用户Repository实现

use std::sync::Arc;

use crate::db::repositories::storage_error;
use crate::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    entities::user::User,
    errors::DomainResult,
    repositories::{ListPage, Pagination, UserRepository},
};
use sqlx::{query, query_as, query_scalar, FromRow};
use uuid::Uuid;

/// 数据库用户模型
#[derive(Debug, Clone, FromRow)]
struct DbUser {
    pub id: Uuid,
    pub user_name: String,
    pub avatar: Option<String>,
    pub socket_id: Option<Uuid>,
    pub offline_at: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbUser {
    fn into_user(self, friends: Vec<Uuid>, room_joineds: Vec<Uuid>) -> User {
        User {
            id: self.id,
            user_name: self.user_name,
            avatar: self.avatar,
            socket_id: self.socket_id,
            offline_at: self.offline_at,
            device_id: self.device_id,
            friends,
            room_joineds,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 用户Repository实现
pub struct PostgresUserRepository {
    pool: Arc<DbPool>,
}

impl PostgresUserRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// 补齐好友与已加入房间两个关联集合
    async fn hydrate(&self, row: DbUser) -> DomainResult<User> {
        let friends: Vec<Uuid> =
            query_scalar("SELECT friend_id FROM user_friends WHERE user_id = $1")
                .bind(row.id)
                .fetch_all(&*self.pool)
                .await
                .map_err(storage_error)?;
        let room_joineds: Vec<Uuid> =
            query_scalar("SELECT room_id FROM user_rooms WHERE user_id = $1")
                .bind(row.id)
                .fetch_all(&*self.pool)
                .await
                .map_err(storage_error)?;
        Ok(row.into_user(friends, room_joineds))
    }

    async fn hydrate_all(&self, rows: Vec<DbUser>) -> DomainResult<Vec<User>> {
        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(self.hydrate(row).await?);
        }
        Ok(users)
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: User) -> DomainResult<User> {
        query(
            r#"
            INSERT INTO users (id, user_name, avatar, socket_id, offline_at, device_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.user_name)
        .bind(&user.avatar)
        .bind(user.socket_id)
        .bind(user.offline_at)
        .bind(&user.device_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(storage_error)?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>> {
        let row: Option<DbUser> = query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage_error)?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> DomainResult<Vec<User>> {
        let rows: Vec<DbUser> = query_as("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&*self.pool)
            .await
            .map_err(storage_error)?;
        self.hydrate_all(rows).await
    }

    async fn page_by_ids(
        &self,
        ids: &[Uuid],
        pagination: Pagination,
    ) -> DomainResult<ListPage<User>> {
        let total: i64 = query_scalar("SELECT COUNT(*) FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_one(&*self.pool)
            .await
            .map_err(storage_error)?;

        // 在线成员（offline_at为空）排在前面
        let rows: Vec<DbUser> = query_as(
            r#"
            SELECT * FROM users WHERE id = ANY($1)
            ORDER BY (offline_at IS NULL) DESC, offline_at DESC, user_name ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(ids)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        let users = self.hydrate_all(rows).await?;
        Ok(ListPage::new(users, total as u64, pagination))
    }

    async fn attach_socket(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
    ) -> DomainResult<Option<User>> {
        let row: Option<DbUser> = query_as(
            r#"
            UPDATE users SET socket_id = $2, offline_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(connection_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_error)?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn detach_socket(&self, connection_id: Uuid) -> DomainResult<Option<User>> {
        let row: Option<DbUser> = query_as(
            r#"
            UPDATE users SET socket_id = NULL, offline_at = NOW(), updated_at = NOW()
            WHERE socket_id = $1
            RETURNING *
            "#,
        )
        .bind(connection_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_error)?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn add_friends(&self, user_ids: &[Uuid]) -> DomainResult<()> {
        // 两两对称展开，重复的好友关系被唯一约束吸收
        query(
            r#"
            INSERT INTO user_friends (user_id, friend_id)
            SELECT a, b FROM unnest($1::uuid[]) a, unnest($1::uuid[]) b
            WHERE a <> b
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_ids)
        .execute(&*self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn save_room_to_users(&self, user_ids: &[Uuid], room_id: Uuid) -> DomainResult<()> {
        query(
            r#"
            INSERT INTO user_rooms (user_id, room_id)
            SELECT u, $2 FROM unnest($1::uuid[]) u
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_ids)
        .bind(room_id)
        .execute(&*self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn remove_room_from_users(&self, user_ids: &[Uuid], room_id: Uuid) -> DomainResult<()> {
        query("DELETE FROM user_rooms WHERE user_id = ANY($1) AND room_id = $2")
            .bind(user_ids)
            .bind(room_id)
            .execute(&*self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
