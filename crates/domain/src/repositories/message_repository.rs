//! 消息Repository接口定义

use crate::entities::message::{Emotion, Message};
use crate::errors::DomainResult;
use crate::repositories::{ListPage, Pagination};
use async_trait::async_trait;
use uuid::Uuid;

/// 消息Repository接口
///
/// 已读回执与表情回应的写入必须是原子的带条件更新，
/// 并发下同一用户的重复写入不会产生重复记录。
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化新消息
    async fn create(&self, message: Message) -> DomainResult<Message>;

    /// 根据ID查找消息
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Message>>;

    /// 为单条消息写入已读回执；仅在该用户尚未读过时生效，
    /// 返回更新后的消息（已读过或不存在时返回None）
    async fn add_read_receipt(&self, message_id: Uuid, user_id: Uuid)
        -> DomainResult<Option<Message>>;

    /// 为房间内所有该用户未读的消息写入已读回执，返回受影响条数
    async fn add_read_receipts_for_room(&self, room_id: Uuid, user_id: Uuid)
        -> DomainResult<u64>;

    /// 设置表情回应：替换该用户在该消息上的旧回应，
    /// 返回更新后的消息
    async fn set_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emotion: Emotion,
    ) -> DomainResult<Option<Message>>;

    /// 移除该用户在该消息上的表情回应，返回更新后的消息
    async fn remove_reaction(&self, message_id: Uuid, user_id: Uuid)
        -> DomainResult<Option<Message>>;

    /// 分页查询房间消息，按创建时间降序（最新在前）
    async fn page_by_room(
        &self,
        room_id: Uuid,
        include_hidden: bool,
        pagination: Pagination,
    ) -> DomainResult<ListPage<Message>>;

    /// 房间内消息总数
    async fn count_by_room(&self, room_id: Uuid) -> DomainResult<u64>;
}
