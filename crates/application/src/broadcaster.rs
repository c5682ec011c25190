//! 事件广播路由
//!
//! 把服务端事件按接收者的在线状态路由到正确的通道：正在查看
//! 房间的成员直接收消息，在线但不在房间视图的成员收未读提醒，
//! 离线成员累积未读并尝试推送通知。广播失败只记录日志，不会
//! 向调用方传播。

use std::sync::Arc;

use crate::collaborators::{NotificationSender, PushNotification};
use crate::dto::{FriendStatus, MessageView};
use crate::events::ServerEvent;
use crate::presence::PresenceRegistry;
use domain::entities::message::Message;
use domain::entities::room::{Room, RoomType};
use domain::entities::user::User;
use domain::repositories::{RoomRepository, UserRepository};
use tracing::{debug, warn};
use uuid::Uuid;

/// 事件广播路由器
pub struct BroadcastRouter {
    presence: Arc<dyn PresenceRegistry>,
    users: Arc<dyn UserRepository>,
    rooms: Arc<dyn RoomRepository>,
    notifier: Arc<dyn NotificationSender>,
}

impl BroadcastRouter {
    pub fn new(
        presence: Arc<dyn PresenceRegistry>,
        users: Arc<dyn UserRepository>,
        rooms: Arc<dyn RoomRepository>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            presence,
            users,
            rooms,
            notifier,
        }
    }

    /// 向单个在线用户下发事件；离线或通道已关闭返回false
    pub async fn emit_to_user(&self, user_id: Uuid, event: ServerEvent) -> bool {
        let Some(handle) = self.presence.get(user_id).await else {
            return false;
        };
        if handle.sender.send(event).is_err() {
            warn!(user_id = %user_id, "事件下发失败，连接通道已关闭");
            return false;
        }
        true
    }

    /// 向房间所有在线成员下发事件，可排除一名成员（通常是触发者）
    pub async fn emit_to_room(&self, room: &Room, event: ServerEvent, exclude: Option<Uuid>) {
        for member in &room.members {
            if Some(member.user_id) == exclude {
                continue;
            }
            self.emit_to_user(member.user_id, event.clone()).await;
        }
    }

    /// 按房间ID加载成员后下发事件；房间不存在时静默丢弃
    pub async fn emit_to_room_id(&self, room_id: Uuid, event: ServerEvent, exclude: Option<Uuid>) {
        match self.rooms.find_by_id(room_id).await {
            Ok(Some(room)) => self.emit_to_room(&room, event, exclude).await,
            Ok(None) => {}
            Err(e) => warn!(room_id = %room_id, error = %e, "广播时加载房间失败"),
        }
    }

    /// 新消息扇出
    ///
    /// base_view是作者视角的消息视图；发给其他成员的副本会被
    /// 重置为接收者视角（is_author/is_read/your_reaction清零）。
    pub async fn fan_out_message(&self, room: &Room, message: &Message, base_view: &MessageView) {
        let recipient_ids: Vec<Uuid> = room
            .member_ids()
            .into_iter()
            .filter(|id| *id != message.author_id)
            .collect();
        let recipients = match self.users.find_by_ids(&recipient_ids).await {
            Ok(users) => users,
            Err(e) => {
                warn!(room_id = %room.id, error = %e, "扇出时加载接收者失败");
                return;
            }
        };

        for recipient in &recipients {
            let copy = recipient_copy(base_view);

            if self.presence.viewing_room(recipient.id).await == Some(room.id) {
                self.emit_to_user(recipient.id, ServerEvent::ReceiveMessage(copy))
                    .await;
                continue;
            }

            // 不在房间视图中：累积未读
            if let Err(e) = self
                .rooms
                .add_message_unread(room.id, message.id, recipient.id)
                .await
            {
                warn!(
                    room_id = %room.id,
                    user_id = %recipient.id,
                    error = %e,
                    "累积未读消息失败"
                );
            }

            if self.presence.is_online(recipient.id).await {
                self.emit_to_user(recipient.id, ServerEvent::ReceiveUnreadMessage(copy))
                    .await;
            }

            self.push_notification(room, message, base_view, recipient)
                .await;
        }
    }

    /// 好友上线通知：广播给所有在线好友，携带双方共同的房间
    pub async fn friend_logged_in(&self, user: &User) {
        let friends = match self.users.find_by_ids(&user.friends).await {
            Ok(friends) => friends,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "上线通知加载好友失败");
                return;
            }
        };

        for friend in &friends {
            if !self.presence.is_online(friend.id).await {
                continue;
            }
            let status = FriendStatus {
                user: user.into(),
                room_ids: user.shared_rooms(friend),
            };
            self.emit_to_user(friend.id, ServerEvent::FriendLogin(status))
                .await;
        }
    }

    /// 好友下线通知：只发给仍与该用户共享至少一个房间的在线好友
    pub async fn friend_logged_out(&self, user: &User) {
        let friends = match self.users.find_by_ids(&user.friends).await {
            Ok(friends) => friends,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "下线通知加载好友失败");
                return;
            }
        };

        for friend in &friends {
            let room_ids = user.shared_rooms(friend);
            if room_ids.is_empty() || !self.presence.is_online(friend.id).await {
                continue;
            }
            let status = FriendStatus {
                user: user.into(),
                room_ids,
            };
            self.emit_to_user(friend.id, ServerEvent::FriendLogout(status))
                .await;
        }
    }

    async fn push_notification(
        &self,
        room: &Room,
        message: &Message,
        base_view: &MessageView,
        recipient: &User,
    ) {
        let Some(device_id) = recipient.device_id.clone() else {
            return;
        };

        let title = match room.room_type {
            RoomType::Group => room
                .name
                .clone()
                .unwrap_or_else(|| base_view.author.user_name.clone()),
            _ => base_view.author.user_name.clone(),
        };
        let notification = PushNotification {
            device_id,
            title,
            body: message.preview_text(),
            room_id: room.id,
        };

        if let Err(e) = self.notifier.send(notification).await {
            warn!(user_id = %recipient.id, error = %e, "推送通知失败");
        } else {
            debug!(user_id = %recipient.id, room_id = %room.id, "推送通知已发送");
        }
    }
}

/// 接收者视角的消息副本
fn recipient_copy(base: &MessageView) -> MessageView {
    let mut copy = base.clone();
    copy.is_author = false;
    copy.is_read = false;
    copy.your_reaction = None;
    copy
}
