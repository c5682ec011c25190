//! 基础设施层实现。
//!
//! 提供PostgreSQL仓储与HTTP推送通知适配器，实现应用/领域层
//! 定义的接口。

pub mod db;
pub mod notification;

pub use db::repositories::{
    PostgresMessageRepository, PostgresRoomRepository, PostgresUserRepository,
};
pub use db::{create_pg_pool, DbPool};
pub use notification::HttpNotificationSender;
