//! 消息服务
//!
//! 实现消息发送、历史查询、已读回执与表情回应的核心业务逻辑。
//! 所有读操作都要求查看者是房间成员；视图按查看者组装。

use std::sync::Arc;

use crate::collaborators::AttachmentResolver;
use crate::dto::{
    AuthorView, MessageView, ReactionGroup, ReactionSummary, ReactionView, ReplyView,
};
use crate::errors::ApplicationResult;
use domain::entities::message::{Emotion, Message, MessagePayload};
use domain::entities::room::Room;
use domain::errors::DomainError;
use domain::repositories::{
    ListPage, MessageRepository, Pagination, RoomRepository, UserRepository,
};
use tracing::info;
use uuid::Uuid;

/// 发送结果：扇出需要房间与原始消息，响应需要作者视角的视图
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub room: Room,
    pub message: Message,
    pub view: MessageView,
}

/// 查看者在房间内的未读摘要
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UnreadMarker {
    pub count: usize,
    /// 最早的一条未读消息，客户端据此定位分隔线
    pub oldest_message_id: Option<Uuid>,
}

/// 消息服务
pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    rooms: Arc<dyn RoomRepository>,
    users: Arc<dyn UserRepository>,
    attachments: Arc<dyn AttachmentResolver>,
}

impl MessageService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        rooms: Arc<dyn RoomRepository>,
        users: Arc<dyn UserRepository>,
        attachments: Arc<dyn AttachmentResolver>,
    ) -> Self {
        Self {
            messages,
            rooms,
            users,
            attachments,
        }
    }

    /// 发送消息
    ///
    /// 返回的SentMessage携带房间快照，调用方据此做在线扇出。
    pub async fn send_message(
        &self,
        room_id: Uuid,
        author_id: Uuid,
        mut payload: MessagePayload,
    ) -> ApplicationResult<SentMessage> {
        let room = self.require_room(room_id).await?;
        require_member(&room, author_id)?;

        if !payload.mention_to.is_empty() {
            if room.room_type.is_pair() {
                return Err(DomainError::invalid_operation("双人会话不支持提及成员").into());
            }
            // 无法解析的提及目标静默丢弃
            let resolved = self.users.find_by_ids(&payload.mention_to).await?;
            payload
                .mention_to
                .retain(|id| resolved.iter().any(|u| u.id == *id));
        }

        if let Some(reply) = &payload.reply_to {
            let target = self.messages.find_by_id(reply.message_id).await?;
            match target {
                Some(target) if target.room_id == room_id => {}
                _ => {
                    return Err(
                        DomainError::invalid_operation("被回复的消息不在该房间中").into()
                    )
                }
            }
        }

        let message = Message::new(room_id, author_id, payload)?;
        let message = self.messages.create(message).await?;
        self.rooms.append_message(room_id, message.id).await?;

        info!(room_id = %room_id, message_id = %message.id, "消息已持久化");

        let view = self.to_view(&message, author_id).await?;
        Ok(SentMessage {
            room,
            message,
            view,
        })
    }

    /// 分页查询房间消息历史，最新在前
    pub async fn list_messages(
        &self,
        room_id: Uuid,
        viewer_id: Uuid,
        pagination: Pagination,
    ) -> ApplicationResult<ListPage<MessageView>> {
        let room = self.require_room(room_id).await?;
        require_member(&room, viewer_id)?;

        let page = self
            .messages
            .page_by_room(room_id, false, pagination)
            .await?;

        let mut views = Vec::with_capacity(page.data.len());
        for message in &page.data {
            views.push(self.to_view(message, viewer_id).await?);
        }
        Ok(ListPage {
            data: views,
            total: page.total,
            limit: page.limit,
            offset: page.offset,
            has_more: page.has_more,
        })
    }

    /// 消息详情
    pub async fn message_detail(
        &self,
        message_id: Uuid,
        viewer_id: Uuid,
    ) -> ApplicationResult<MessageView> {
        let message = self.require_message(message_id).await?;
        let room = self.require_room(message.room_id).await?;
        require_member(&room, viewer_id)?;
        self.to_view(&message, viewer_id).await
    }

    /// 确认单条消息已读（幂等）
    ///
    /// 返回更新后的消息；重复确认或作者读自己的消息返回None。
    pub async fn read_message(
        &self,
        message_id: Uuid,
        reader_id: Uuid,
    ) -> ApplicationResult<Option<Message>> {
        let message = self.require_message(message_id).await?;
        let room = self.require_room(message.room_id).await?;
        require_member(&room, reader_id)?;

        if message.author_id == reader_id {
            return Ok(None);
        }
        Ok(self.messages.add_read_receipt(message_id, reader_id).await?)
    }

    /// 房间内全部已读：补齐回执并清空查看者的未读集合
    pub async fn read_all(&self, room_id: Uuid, reader_id: Uuid) -> ApplicationResult<u64> {
        let room = self.require_room(room_id).await?;
        require_member(&room, reader_id)?;

        let updated = self
            .messages
            .add_read_receipts_for_room(room_id, reader_id)
            .await?;
        self.rooms.clear_unread(room_id, reader_id).await?;

        info!(room_id = %room_id, user_id = %reader_id, updated, "未读消息已清空");
        Ok(updated)
    }

    /// 设置表情回应（替换旧回应），返回操作者视角的视图
    pub async fn like_message(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emotion: Emotion,
    ) -> ApplicationResult<MessageView> {
        let message = self.require_message(message_id).await?;
        let room = self.require_room(message.room_id).await?;
        require_member(&room, user_id)?;

        let updated = self
            .messages
            .set_reaction(message_id, user_id, emotion)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id))?;
        self.to_view(&updated, user_id).await
    }

    /// 移除表情回应（不存在时为no-op）
    pub async fn unlike_message(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> ApplicationResult<MessageView> {
        let message = self.require_message(message_id).await?;
        let room = self.require_room(message.room_id).await?;
        require_member(&room, user_id)?;

        let updated = self
            .messages
            .remove_reaction(message_id, user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id))?;
        self.to_view(&updated, user_id).await
    }

    /// 消息的表情回应汇总：按表情分组外加扁平的全量列表
    pub async fn reactors(
        &self,
        message_id: Uuid,
        viewer_id: Uuid,
    ) -> ApplicationResult<ReactionSummary> {
        let message = self.require_message(message_id).await?;
        let room = self.require_room(message.room_id).await?;
        require_member(&room, viewer_id)?;

        let all = self.reaction_views(&message).await?;
        let mut groups: Vec<ReactionGroup> = Vec::new();
        for reaction in &all {
            match groups.iter_mut().find(|g| g.emotion == reaction.emotion) {
                Some(group) => group.users.push(reaction.user.clone()),
                None => groups.push(ReactionGroup {
                    emotion: reaction.emotion,
                    users: vec![reaction.user.clone()],
                }),
            }
        }
        Ok(ReactionSummary { all, groups })
    }

    /// 已读该消息的用户列表（不含查看者本人）
    pub async fn readers(
        &self,
        message_id: Uuid,
        viewer_id: Uuid,
    ) -> ApplicationResult<Vec<AuthorView>> {
        let message = self.require_message(message_id).await?;
        let room = self.require_room(message.room_id).await?;
        require_member(&room, viewer_id)?;

        let reader_ids: Vec<Uuid> = message
            .read_by
            .iter()
            .map(|r| r.user_id)
            .filter(|id| *id != viewer_id)
            .collect();
        let users = self.users.find_by_ids(&reader_ids).await?;
        Ok(users.iter().map(AuthorView::from).collect())
    }

    /// 查看者在房间内的未读摘要
    pub async fn unread_marker(
        &self,
        room_id: Uuid,
        viewer_id: Uuid,
    ) -> ApplicationResult<UnreadMarker> {
        let room = self.require_room(room_id).await?;
        let member = room
            .member(viewer_id)
            .ok_or_else(|| DomainError::unauthorized("不是房间成员"))?;
        Ok(UnreadMarker {
            count: member.message_unreads.len(),
            oldest_message_id: member.message_unreads.first().copied(),
        })
    }

    /// 组装查看者视角的消息视图
    pub async fn to_view(
        &self,
        message: &Message,
        viewer_id: Uuid,
    ) -> ApplicationResult<MessageView> {
        let author = self
            .users
            .find_by_id(message.author_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", message.author_id))?;

        let attachments = self.attachments.resolve(&message.attachment_ids).await?;

        let mentioned = self.users.find_by_ids(&message.mention_to).await?;
        let mention_to: Vec<AuthorView> = mentioned.iter().map(AuthorView::from).collect();

        let reply_to = match &message.reply_to {
            Some(reply) => self.reply_view(reply).await?,
            None => None,
        };

        let reactions = self.reaction_views(message).await?;

        let is_author = viewer_id == message.author_id;
        // 作者视角：是否已有他人读过；其他人视角：本人是否读过
        let is_read = if is_author {
            message.read_by.len() >= 2
        } else {
            message.is_read_by(viewer_id)
        };

        Ok(MessageView {
            id: message.id,
            room_id: message.room_id,
            author: AuthorView::from(&author),
            is_author,
            text: message.text.clone(),
            location: message.location.clone(),
            order_id: message.order_id,
            product_id: message.product_id,
            attachments,
            mention_to,
            reply_to,
            is_read,
            your_reaction: message.reaction_of(viewer_id),
            reaction_count: message.liked_by.len(),
            reactions,
            is_edited: message.is_edited,
            created_at: message.created_at,
            updated_at: message.updated_at,
        })
    }

    async fn reply_view(
        &self,
        reply: &domain::entities::message::ReplyTo,
    ) -> ApplicationResult<Option<ReplyView>> {
        // 被回复的消息已不存在时静默省略引用
        let Some(target) = self.messages.find_by_id(reply.message_id).await? else {
            return Ok(None);
        };
        let author = self
            .users
            .find_by_id(target.author_id)
            .await?
            .as_ref()
            .map(AuthorView::from);
        let attachment = match reply.attachment_id {
            Some(id) => self.attachments.find(id).await?,
            None => None,
        };
        Ok(Some(ReplyView {
            message_id: target.id,
            author,
            preview: target.preview_text(),
            attachment,
        }))
    }

    async fn reaction_views(&self, message: &Message) -> ApplicationResult<Vec<ReactionView>> {
        let user_ids: Vec<Uuid> = message.liked_by.iter().map(|r| r.user_id).collect();
        let users = self.users.find_by_ids(&user_ids).await?;
        Ok(message
            .liked_by
            .iter()
            .filter_map(|reaction| {
                users
                    .iter()
                    .find(|u| u.id == reaction.user_id)
                    .map(|user| ReactionView {
                        user: AuthorView::from(user),
                        emotion: reaction.emotion,
                    })
            })
            .collect())
    }

    async fn require_room(&self, room_id: Uuid) -> ApplicationResult<Room> {
        let room = self
            .rooms
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        if room.is_deleted {
            return Err(DomainError::invalid_operation("房间已被删除").into());
        }
        Ok(room)
    }

    async fn require_message(&self, message_id: Uuid) -> ApplicationResult<Message> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id))?;
        if message.is_deleted {
            return Err(DomainError::not_found("message", message_id).into());
        }
        Ok(message)
    }
}

fn require_member(room: &Room, user_id: Uuid) -> Result<(), DomainError> {
    if !room.has_member(user_id) {
        return Err(DomainError::unauthorized("不是房间成员"));
    }
    Ok(())
}
