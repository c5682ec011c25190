//! 房间Repository接口定义

use crate::entities::room::{Room, RoomMember};
use crate::errors::DomainResult;
use crate::repositories::{ListPage, Pagination};
use async_trait::async_trait;
use uuid::Uuid;

/// 房间Repository接口
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// 创建房间
    async fn create(&self, room: Room) -> DomainResult<Room>;

    /// 根据ID查找房间（包含已软删除的）
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Room>>;

    /// 查找两名用户之间未删除的single类型房间
    async fn find_single_between(&self, user_a: Uuid, user_b: Uuid)
        -> DomainResult<Option<Room>>;

    /// 按成员分页查询未删除的房间，可按名称关键字过滤，
    /// 按最近活跃（updated_at）降序
    async fn page_by_member(
        &self,
        user_id: Uuid,
        keyword: Option<&str>,
        pagination: Pagination,
    ) -> DomainResult<ListPage<Room>>;

    /// 更新房间名称/头像
    async fn update_info(
        &self,
        room_id: Uuid,
        name: Option<String>,
        avatar: Option<String>,
    ) -> DomainResult<Option<Room>>;

    /// 添加成员（同时清除该用户的退出历史）
    async fn add_member(&self, room_id: Uuid, member: RoomMember) -> DomainResult<()>;

    /// 移除成员并写入退出历史
    async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> DomainResult<()>;

    /// 追加消息并更新last_message指针
    async fn append_message(&self, room_id: Uuid, message_id: Uuid) -> DomainResult<()>;

    /// 向单个成员的未读集合添加消息（集合语义，幂等）
    async fn add_message_unread(
        &self,
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<()>;

    /// 向除指定用户外的所有当前成员的未读集合添加消息
    async fn add_message_unread_except(
        &self,
        room_id: Uuid,
        message_id: Uuid,
        except_user_id: Uuid,
    ) -> DomainResult<()>;

    /// 清空某个成员的未读集合，不影响其他成员
    async fn clear_unread(&self, room_id: Uuid, user_id: Uuid) -> DomainResult<()>;

    /// 软删除：置删除标记并快照成员进退出历史
    async fn soft_delete(&self, room_id: Uuid) -> DomainResult<()>;

    /// 物理删除（仅限没有消息的房间）
    async fn hard_delete(&self, room_id: Uuid) -> DomainResult<()>;
}
