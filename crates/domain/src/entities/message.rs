//! 消息实体定义
//!
//! read_by 与 liked_by 均以用户ID为键：重复确认已读为no-op，
//! 同一用户在同一条消息上最多只有一个生效的表情回应。

use crate::errors::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 表情回应类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Like,
    Angry,
    Sad,
    Laugh,
    Heart,
    Wow,
}

/// 地理位置负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: String,
    pub lng: String,
}

/// 回复引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyTo {
    /// 被回复的消息ID
    pub message_id: Uuid,
    /// 被回复消息中的附件ID（可选）
    pub attachment_id: Option<Uuid>,
}

/// 已读回执
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// 表情回应记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Uuid,
    pub emotion: Emotion,
}

/// 消息创建参数
///
/// 各负载字段互不排斥，但不能全部为空。
#[derive(Debug, Clone, Default)]
pub struct MessagePayload {
    pub text: Option<String>,
    pub location: Option<Location>,
    pub order_id: Option<i64>,
    pub product_id: Option<i64>,
    pub attachment_ids: Vec<Uuid>,
    pub mention_to: Vec<Uuid>,
    pub reply_to: Option<ReplyTo>,
}

impl MessagePayload {
    /// 至少携带一种负载（text/location/attachment/order/product）
    pub fn has_content(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
            || self.location.is_some()
            || !self.attachment_ids.is_empty()
            || self.order_id.is_some()
            || self.product_id.is_some()
    }
}

/// 消息实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 消息唯一ID
    pub id: Uuid,
    /// 所属房间ID
    pub room_id: Uuid,
    /// 作者ID
    pub author_id: Uuid,
    /// 文本内容
    pub text: Option<String>,
    /// 位置负载
    pub location: Option<Location>,
    /// 订单引用
    pub order_id: Option<i64>,
    /// 商品引用
    pub product_id: Option<i64>,
    /// 附件ID列表
    pub attachment_ids: Vec<Uuid>,
    /// 提及的用户ID
    pub mention_to: Vec<Uuid>,
    /// 回复引用
    pub reply_to: Option<ReplyTo>,
    /// 已读回执集合（以用户ID为键）
    pub read_by: Vec<ReadReceipt>,
    /// 表情回应集合（每个用户最多一条）
    pub liked_by: Vec<Reaction>,
    /// 隐藏标记
    pub is_hidden: bool,
    /// 删除标记
    pub is_deleted: bool,
    /// 编辑标记
    pub is_edited: bool,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: Option<DateTime<Utc>>,
}

impl Message {
    /// 创建新消息，作者自动确认已读自己的消息
    pub fn new(room_id: Uuid, author_id: Uuid, payload: MessagePayload) -> DomainResult<Self> {
        if !payload.has_content() {
            return Err(DomainError::invalid_input("消息缺少发送内容"));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            room_id,
            author_id,
            text: payload.text.map(|t| t.trim().to_string()),
            location: payload.location,
            order_id: payload.order_id,
            product_id: payload.product_id,
            attachment_ids: payload.attachment_ids,
            mention_to: payload.mention_to,
            reply_to: payload.reply_to,
            read_by: vec![ReadReceipt {
                user_id: author_id,
                created_at: now,
            }],
            liked_by: Vec::new(),
            is_hidden: false,
            is_deleted: false,
            is_edited: false,
            created_at: now,
            updated_at: None,
        })
    }

    /// 确认已读（幂等）；返回是否发生了变更
    pub fn mark_read(&mut self, user_id: Uuid) -> bool {
        if self.is_read_by(user_id) {
            return false;
        }
        self.read_by.push(ReadReceipt {
            user_id,
            created_at: Utc::now(),
        });
        true
    }

    /// 用户是否已读
    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }

    /// 设置表情回应：先移除该用户的旧回应，再写入新回应
    pub fn set_reaction(&mut self, user_id: Uuid, emotion: Emotion) {
        self.liked_by.retain(|r| r.user_id != user_id);
        self.liked_by.push(Reaction { user_id, emotion });
        self.updated_at = Some(Utc::now());
    }

    /// 移除表情回应；不存在时为no-op
    pub fn remove_reaction(&mut self, user_id: Uuid) {
        self.liked_by.retain(|r| r.user_id != user_id);
        self.updated_at = Some(Utc::now());
    }

    /// 用户当前生效的表情回应
    pub fn reaction_of(&self, user_id: Uuid) -> Option<Emotion> {
        self.liked_by
            .iter()
            .find(|r| r.user_id == user_id)
            .map(|r| r.emotion)
    }

    /// 通知摘要文本
    pub fn preview_text(&self) -> String {
        if !self.attachment_ids.is_empty() {
            "Photo".to_string()
        } else if self.location.is_some() {
            "Location".to_string()
        } else if self.order_id.is_some() {
            "Order".to_string()
        } else if self.product_id.is_some() {
            "Product".to_string()
        } else {
            self.text.clone().unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_payload(text: &str) -> MessagePayload {
        MessagePayload {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_message_requires_payload() {
        let room_id = Uuid::new_v4();
        let author = Uuid::new_v4();

        assert!(Message::new(room_id, author, MessagePayload::default()).is_err());
        assert!(Message::new(room_id, author, text_payload("   ")).is_err());
        assert!(Message::new(room_id, author, text_payload("hi")).is_ok());

        // 仅附件也是合法负载
        let payload = MessagePayload {
            attachment_ids: vec![Uuid::new_v4()],
            ..Default::default()
        };
        assert!(Message::new(room_id, author, payload).is_ok());
    }

    #[test]
    fn test_author_reads_own_message() {
        let author = Uuid::new_v4();
        let message = Message::new(Uuid::new_v4(), author, text_payload("hi")).unwrap();
        assert!(message.is_read_by(author));
        assert_eq!(message.read_by.len(), 1);
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let mut message =
            Message::new(Uuid::new_v4(), Uuid::new_v4(), text_payload("hi")).unwrap();
        let reader = Uuid::new_v4();

        assert!(message.mark_read(reader));
        let after_first = message.read_by.clone();
        assert!(!message.mark_read(reader));
        assert_eq!(message.read_by, after_first);
    }

    #[test]
    fn test_single_active_reaction_per_user() {
        let mut message =
            Message::new(Uuid::new_v4(), Uuid::new_v4(), text_payload("hi")).unwrap();
        let user = Uuid::new_v4();

        message.set_reaction(user, Emotion::Like);
        message.set_reaction(user, Emotion::Heart);

        let reactions: Vec<_> = message.liked_by.iter().filter(|r| r.user_id == user).collect();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].emotion, Emotion::Heart);
    }

    #[test]
    fn test_remove_reaction_is_noop_when_absent() {
        let mut message =
            Message::new(Uuid::new_v4(), Uuid::new_v4(), text_payload("hi")).unwrap();
        message.remove_reaction(Uuid::new_v4());
        assert!(message.liked_by.is_empty());
    }

    #[test]
    fn test_preview_text_priority() {
        let author = Uuid::new_v4();
        let room = Uuid::new_v4();

        let with_attachment = Message::new(
            room,
            author,
            MessagePayload {
                text: Some("caption".into()),
                attachment_ids: vec![Uuid::new_v4()],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(with_attachment.preview_text(), "Photo");

        let with_order = Message::new(
            room,
            author,
            MessagePayload {
                order_id: Some(42),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(with_order.preview_text(), "Order");

        let plain = Message::new(room, author, text_payload("hello")).unwrap();
        assert_eq!(plain.preview_text(), "hello");
    }
}
