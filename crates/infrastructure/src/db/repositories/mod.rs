//! PostgreSQL仓储实现

mod message_repository_impl;
mod room_repository_impl;
mod user_repository_impl;

pub use message_repository_impl::PostgresMessageRepository;
pub use room_repository_impl::PostgresRoomRepository;
pub use user_repository_impl::PostgresUserRepository;

use domain::errors::DomainError;

/// sqlx错误映射为存储层错误
pub(crate) fn storage_error(e: sqlx::Error) -> DomainError {
    DomainError::storage(e.to_string())
}
