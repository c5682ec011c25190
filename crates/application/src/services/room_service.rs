//! 房间服务
//!
//! 实现房间的创建、查询、成员进出与删除。创建与成员变更会
//! 通过广播路由通知受影响的在线用户；通知失败不影响操作结果。

use std::sync::Arc;

use crate::broadcaster::BroadcastRouter;
use crate::dto::{AuthorView, RoomDetailView, RoomListItemView, RoomMemberView};
use crate::errors::ApplicationResult;
use crate::events::ServerEvent;
use crate::presence::PresenceRegistry;
use domain::entities::room::{Room, RoomMember, RoomType};
use domain::entities::user::User;
use domain::errors::DomainError;
use domain::repositories::{
    ListPage, MessageRepository, Pagination, RoomRepository, UserRepository,
};
use tracing::info;
use uuid::Uuid;

/// 房间服务
pub struct RoomService {
    rooms: Arc<dyn RoomRepository>,
    users: Arc<dyn UserRepository>,
    messages: Arc<dyn MessageRepository>,
    presence: Arc<dyn PresenceRegistry>,
    router: Arc<BroadcastRouter>,
}

impl RoomService {
    pub fn new(
        rooms: Arc<dyn RoomRepository>,
        users: Arc<dyn UserRepository>,
        messages: Arc<dyn MessageRepository>,
        presence: Arc<dyn PresenceRegistry>,
        router: Arc<BroadcastRouter>,
    ) -> Self {
        Self {
            rooms,
            users,
            messages,
            presence,
            router,
        }
    }

    /// 创建双人会话
    ///
    /// single类型是幂等的：两人之间已有未删除的single房间时
    /// 直接返回现有房间，不会产生新房间。
    pub async fn create_pair_room(
        &self,
        creator_id: Uuid,
        partner_id: Uuid,
        room_type: RoomType,
    ) -> ApplicationResult<RoomDetailView> {
        if creator_id == partner_id {
            return Err(DomainError::invalid_operation("不能只和自己创建房间").into());
        }
        self.require_user(creator_id).await?;
        self.require_user(partner_id).await?;

        if room_type == RoomType::Single {
            if let Some(existing) = self
                .rooms
                .find_single_between(creator_id, partner_id)
                .await?
            {
                return self.detail_view(&existing, creator_id).await;
            }
        }

        let room = Room::new_pair(room_type, creator_id, partner_id)?;
        let room = self.rooms.create(room).await?;
        let member_ids = room.member_ids();
        self.users.add_friends(&member_ids).await?;
        self.users.save_room_to_users(&member_ids, room.id).await?;

        info!(room_id = %room.id, "双人会话已创建");

        if self.presence.is_online(partner_id).await {
            let partner_view = self.detail_view(&room, partner_id).await?;
            self.router
                .emit_to_user(partner_id, ServerEvent::CreateRoom(partner_view))
                .await;
        }

        self.detail_view(&room, creator_id).await
    }

    /// 创建群聊，创建者自动成为成员
    pub async fn create_group_room(
        &self,
        creator_id: Uuid,
        name: String,
        avatar: Option<String>,
        member_ids: Vec<Uuid>,
    ) -> ApplicationResult<RoomDetailView> {
        let mut all_ids = vec![creator_id];
        for id in member_ids {
            if !all_ids.contains(&id) {
                all_ids.push(id);
            }
        }

        // 无法解析的成员ID静默丢弃，成员数校验只看解析成功的部分
        let found = self.users.find_by_ids(&all_ids).await?;
        let resolved: Vec<Uuid> = all_ids
            .into_iter()
            .filter(|id| found.iter().any(|u| u.id == *id))
            .collect();

        let room = Room::new_group(name, avatar, resolved.clone())?;
        let room = self.rooms.create(room).await?;
        self.users.add_friends(&resolved).await?;
        self.users.save_room_to_users(&resolved, room.id).await?;

        info!(room_id = %room.id, members = resolved.len(), "群聊已创建");

        for member_id in &resolved {
            if *member_id == creator_id || !self.presence.is_online(*member_id).await {
                continue;
            }
            let view = self.detail_view(&room, *member_id).await?;
            self.router
                .emit_to_user(*member_id, ServerEvent::CreateRoom(view))
                .await;
        }

        self.detail_view(&room, creator_id).await
    }

    /// 查看者的房间列表，按最近活跃降序，可按名称关键字过滤
    pub async fn list_rooms(
        &self,
        viewer_id: Uuid,
        keyword: Option<&str>,
        pagination: Pagination,
    ) -> ApplicationResult<ListPage<RoomListItemView>> {
        let page = self
            .rooms
            .page_by_member(viewer_id, keyword, pagination)
            .await?;

        let mut items = Vec::with_capacity(page.data.len());
        for room in &page.data {
            items.push(self.list_item_view(room, viewer_id).await?);
        }
        Ok(ListPage {
            data: items,
            total: page.total,
            limit: page.limit,
            offset: page.offset,
            has_more: page.has_more,
        })
    }

    /// 房间详情
    pub async fn room_detail(
        &self,
        room_id: Uuid,
        viewer_id: Uuid,
    ) -> ApplicationResult<RoomDetailView> {
        let room = self.require_active_room(room_id).await?;
        self.require_member(&room, viewer_id)?;
        self.detail_view(&room, viewer_id).await
    }

    /// 修改群聊名称/头像
    pub async fn update_room_info(
        &self,
        room_id: Uuid,
        viewer_id: Uuid,
        name: Option<String>,
        avatar: Option<String>,
    ) -> ApplicationResult<RoomDetailView> {
        let room = self.require_active_room(room_id).await?;
        self.require_member(&room, viewer_id)?;
        if room.room_type != RoomType::Group {
            return Err(DomainError::invalid_operation("双人会话不能修改资料").into());
        }

        let updated = self
            .rooms
            .update_info(room_id, name, avatar)
            .await?
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        self.detail_view(&updated, viewer_id).await
    }

    /// 加入群聊
    pub async fn join_room(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> ApplicationResult<RoomDetailView> {
        let user = self.require_user(user_id).await?;
        let mut room = self.require_active_room(room_id).await?;
        // 领域校验：仅群聊可加入、不可重复加入
        room.join(user_id)?;

        self.rooms
            .add_member(room_id, RoomMember::new(user_id))
            .await?;
        self.users.save_room_to_users(&[user_id], room_id).await?;
        self.users.add_friends(&room.member_ids()).await?;

        info!(room_id = %room_id, user_id = %user_id, "成员加入群聊");

        let member_view = RoomMemberView {
            user: AuthorView::from(&user),
            joined_at: chrono::Utc::now(),
            is_online: self.presence.is_online(user_id).await,
            offline_at: user.offline_at,
        };
        self.router
            .emit_to_room(
                &room,
                ServerEvent::MemberJoinRoom {
                    room_id,
                    member: member_view,
                },
                Some(user_id),
            )
            .await;

        self.detail_view(&room, user_id).await
    }

    /// 退出群聊
    pub async fn leave_room(&self, room_id: Uuid, user_id: Uuid) -> ApplicationResult<()> {
        let mut room = self.require_active_room(room_id).await?;
        // 领域校验：仅群聊可退出、必须是成员
        room.leave(user_id)?;

        self.rooms.remove_member(room_id, user_id).await?;
        self.users
            .remove_room_from_users(&[user_id], room_id)
            .await?;

        info!(room_id = %room_id, user_id = %user_id, "成员退出群聊");

        self.router
            .emit_to_room(
                &room,
                ServerEvent::MemberLeaveRoom { room_id, user_id },
                Some(user_id),
            )
            .await;
        Ok(())
    }

    /// 删除房间
    ///
    /// 没有任何消息的房间直接物理删除；有消息的房间软删除，
    /// 保留消息归档但脱离所有成员视图。
    pub async fn delete_room(&self, room_id: Uuid, actor_id: Uuid) -> ApplicationResult<()> {
        let room = self.require_active_room(room_id).await?;
        self.require_member(&room, actor_id)?;

        let member_ids = room.member_ids();
        let message_count = self.messages.count_by_room(room_id).await?;
        if message_count == 0 {
            self.rooms.hard_delete(room_id).await?;
        } else {
            self.rooms.soft_delete(room_id).await?;
        }
        self.users
            .remove_room_from_users(&member_ids, room_id)
            .await?;

        info!(room_id = %room_id, message_count, "房间已删除");

        self.router
            .emit_to_room(&room, ServerEvent::DeleteRoom { room_id }, Some(actor_id))
            .await;
        Ok(())
    }

    /// 房间成员分页，在线成员优先
    pub async fn room_members(
        &self,
        room_id: Uuid,
        viewer_id: Uuid,
        pagination: Pagination,
    ) -> ApplicationResult<ListPage<RoomMemberView>> {
        let room = self.require_active_room(room_id).await?;
        self.require_member(&room, viewer_id)?;

        let page = self
            .users
            .page_by_ids(&room.member_ids(), pagination)
            .await?;

        let mut members = Vec::with_capacity(page.data.len());
        for user in &page.data {
            members.push(self.member_view(&room, user).await);
        }
        Ok(ListPage {
            data: members,
            total: page.total,
            limit: page.limit,
            offset: page.offset,
            has_more: page.has_more,
        })
    }

    /// 组装查看者视角的房间详情
    pub async fn detail_view(
        &self,
        room: &Room,
        viewer_id: Uuid,
    ) -> ApplicationResult<RoomDetailView> {
        let users = self.users.find_by_ids(&room.member_ids()).await?;
        let mut members = Vec::with_capacity(users.len());
        for user in &users {
            members.push(self.member_view(room, user).await);
        }

        let (name, avatar) = self.display_identity(room, viewer_id, &users);
        let unread_count = room
            .member(viewer_id)
            .map(|m| m.message_unreads.len())
            .unwrap_or(0);

        Ok(RoomDetailView {
            id: room.id,
            name,
            avatar,
            room_type: room.room_type,
            members,
            unread_count,
            created_at: room.created_at,
        })
    }

    async fn list_item_view(
        &self,
        room: &Room,
        viewer_id: Uuid,
    ) -> ApplicationResult<RoomListItemView> {
        let users = self.users.find_by_ids(&room.member_ids()).await?;
        let (name, avatar) = self.display_identity(room, viewer_id, &users);

        let last_message = match room.last_message_id {
            Some(id) => self.messages.find_by_id(id).await?,
            None => None,
        };
        let unread_count = room
            .member(viewer_id)
            .map(|m| m.message_unreads.len())
            .unwrap_or(0);

        Ok(RoomListItemView {
            id: room.id,
            name,
            avatar,
            room_type: room.room_type,
            member_count: room.members.len(),
            last_message_preview: last_message.as_ref().map(|m| m.preview_text()),
            last_message_at: last_message.as_ref().map(|m| m.created_at),
            unread_count,
            updated_at: room.updated_at,
        })
    }

    async fn member_view(&self, room: &Room, user: &User) -> RoomMemberView {
        let joined_at = room
            .member(user.id)
            .map(|m| m.joined_at)
            .unwrap_or(room.created_at);
        RoomMemberView {
            user: AuthorView::from(user),
            joined_at,
            is_online: self.presence.is_online(user.id).await,
            offline_at: user.offline_at,
        }
    }

    /// 展示名称与头像：群聊取房间资料，双人会话取对方资料
    fn display_identity(
        &self,
        room: &Room,
        viewer_id: Uuid,
        users: &[User],
    ) -> (Option<String>, Option<String>) {
        if room.room_type == RoomType::Group {
            return (room.name.clone(), room.avatar.clone());
        }
        match users.iter().find(|u| u.id != viewer_id) {
            Some(partner) => (Some(partner.user_name.clone()), partner.avatar.clone()),
            None => (room.name.clone(), room.avatar.clone()),
        }
    }

    fn require_member(&self, room: &Room, user_id: Uuid) -> Result<(), DomainError> {
        if !room.has_member(user_id) {
            return Err(DomainError::unauthorized("不是房间成员"));
        }
        Ok(())
    }

    async fn require_active_room(&self, room_id: Uuid) -> ApplicationResult<Room> {
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

    async fn require_user(&self, user_id: Uuid) -> ApplicationResult<User> {
        Ok(self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", user_id))?)
    }
}
