//! 用户Repository接口定义

use crate::entities::user::User;
use crate::errors::DomainResult;
use crate::repositories::{ListPage, Pagination};
use async_trait::async_trait;
use uuid::Uuid;

/// 用户Repository接口
///
/// 好友关系与已加入房间列表只通过这里的定向方法变更。
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 创建新用户
    async fn create(&self, user: User) -> DomainResult<User>;

    /// 根据ID查找用户
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>>;

    /// 批量查找用户，未解析的ID被静默丢弃
    async fn find_by_ids(&self, ids: &[Uuid]) -> DomainResult<Vec<User>>;

    /// 按ID集合分页查询，按offline_at降序（在线成员优先）
    async fn page_by_ids(&self, ids: &[Uuid], pagination: Pagination)
        -> DomainResult<ListPage<User>>;

    /// 绑定在线连接句柄，清空offline_at，返回更新后的用户
    async fn attach_socket(&self, user_id: Uuid, connection_id: Uuid)
        -> DomainResult<Option<User>>;

    /// 按连接句柄解绑并记录离线时间，返回更新后的用户
    async fn detach_socket(&self, connection_id: Uuid) -> DomainResult<Option<User>>;

    /// 在给定用户之间建立两两对称的好友关系（集合语义）
    async fn add_friends(&self, user_ids: &[Uuid]) -> DomainResult<()>;

    /// 将房间写入这些用户的已加入列表
    async fn save_room_to_users(&self, user_ids: &[Uuid], room_id: Uuid) -> DomainResult<()>;

    /// 将房间从这些用户的已加入列表移除
    async fn remove_room_from_users(&self, user_ids: &[Uuid], room_id: Uuid) -> DomainResult<()>;
}
