//! 面向客户端的视图模型
//!
//! 消息视图是按查看者组装的：is_author/is_read/your_reaction
//! 对不同的查看者会产生不同的值，因此视图不会被缓存或复用。

use chrono::{DateTime, Utc};
use domain::entities::message::{Emotion, Location};
use domain::entities::room::RoomType;
use domain::entities::user::User;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 用户摘要视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorView {
    pub id: Uuid,
    pub user_name: String,
    pub avatar: Option<String>,
}

impl From<&User> for AuthorView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            user_name: user.user_name.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

/// 已解析的附件视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentView {
    pub id: Uuid,
    pub url: String,
    pub thumbnail: Option<String>,
}

/// 回复引用视图（被回复消息的摘要）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyView {
    pub message_id: Uuid,
    pub author: Option<AuthorView>,
    pub preview: String,
    pub attachment: Option<AttachmentView>,
}

/// 表情回应视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionView {
    pub user: AuthorView,
    pub emotion: Emotion,
}

/// 同一种表情的回应者分组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emotion: Emotion,
    pub users: Vec<AuthorView>,
}

/// 消息的表情回应汇总：按表情分组外加扁平的全量列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub all: Vec<ReactionView>,
    pub groups: Vec<ReactionGroup>,
}

/// 消息视图（按查看者组装）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author: AuthorView,
    /// 查看者是否为消息作者
    pub is_author: bool,
    pub text: Option<String>,
    pub location: Option<Location>,
    pub order_id: Option<i64>,
    pub product_id: Option<i64>,
    pub attachments: Vec<AttachmentView>,
    pub mention_to: Vec<AuthorView>,
    pub reply_to: Option<ReplyView>,
    /// 作者视角：是否已有他人读过；他人视角：查看者是否读过
    pub is_read: bool,
    /// 查看者当前生效的表情回应
    pub your_reaction: Option<Emotion>,
    pub reactions: Vec<ReactionView>,
    pub reaction_count: usize,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// 房间成员视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMemberView {
    pub user: AuthorView,
    pub joined_at: DateTime<Utc>,
    pub is_online: bool,
    pub offline_at: Option<DateTime<Utc>>,
}

/// 房间列表项视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomListItemView {
    pub id: Uuid,
    /// 单聊取对方昵称，群聊取房间名称
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub room_type: RoomType,
    pub member_count: usize,
    /// 最后一条消息的摘要文本
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    /// 查看者的未读消息数
    pub unread_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// 房间详情视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDetailView {
    pub id: Uuid,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub room_type: RoomType,
    pub members: Vec<RoomMemberView>,
    pub unread_count: usize,
    pub created_at: DateTime<Utc>,
}

/// 好友上下线通知（携带双方共同所在的房间）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendStatus {
    pub user: AuthorView,
    pub room_ids: Vec<Uuid>,
}

/// 输入状态通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingStatus {
    pub room_id: Uuid,
    pub user: AuthorView,
}
