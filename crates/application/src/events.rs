//! 服务端推送事件定义
//!
//! 经由WebSocket连接下发给客户端的事件，按事件名加负载的
//! 形式序列化。

use crate::dto::{FriendStatus, MessageView, RoomDetailView, RoomMemberView, TypingStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 服务端推送事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 连接建立确认，回传本人信息
    Login(crate::dto::AuthorView),
    /// 账号在别处建立了新连接，当前连接被顶下线
    Logout,
    /// 好友上线
    FriendLogin(FriendStatus),
    /// 好友下线
    FriendLogout(FriendStatus),
    /// 被拉入新房间
    CreateRoom(RoomDetailView),
    /// 房间被删除
    DeleteRoom { room_id: Uuid },
    /// 新成员加入群聊
    MemberJoinRoom {
        room_id: Uuid,
        member: RoomMemberView,
    },
    /// 成员退出群聊
    MemberLeaveRoom { room_id: Uuid, user_id: Uuid },
    /// 正在查看房间的成员收到新消息
    ReceiveMessage(MessageView),
    /// 在线但未查看房间的成员收到未读提醒
    ReceiveUnreadMessage(MessageView),
    /// 有人读了你的消息
    ConfirmReadMessage {
        room_id: Uuid,
        message_id: Uuid,
        reader_id: Uuid,
    },
    /// 进入房间时未读已被清空
    ReadAllMessage { room_id: Uuid },
    /// 成员开始输入
    StartTyping(TypingStatus),
    /// 成员停止输入
    StopTyping(TypingStatus),
    /// 消息被添加表情回应
    LikeMessage(MessageView),
    /// 消息的表情回应被移除
    UnlikeMessage(MessageView),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = ServerEvent::DeleteRoom {
            room_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "delete_room");
        assert_eq!(
            json["payload"]["room_id"],
            "00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_unit_event_wire_format() {
        let json = serde_json::to_value(&ServerEvent::Logout).unwrap();
        assert_eq!(json["event"], "logout");
    }

    #[test]
    fn test_read_all_event_roundtrip() {
        let event = ServerEvent::ReadAllMessage {
            room_id: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
