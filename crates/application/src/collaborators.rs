//! 外部协作者抽象
//!
//! 附件解析与推送通知都由外部系统承担，应用层只依赖这里的
//! trait。解析失败的附件会被静默丢弃，推送失败只记录日志，
//! 两者都不会中断消息流程。

use crate::dto::AttachmentView;
use crate::errors::ApplicationResult;
use uuid::Uuid;

/// 附件解析器
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AttachmentResolver: Send + Sync {
    /// 批量解析附件，未解析的ID被静默丢弃
    async fn resolve(&self, ids: &[Uuid]) -> ApplicationResult<Vec<AttachmentView>>;

    /// 解析单个附件
    async fn find(&self, id: Uuid) -> ApplicationResult<Option<AttachmentView>>;
}

/// 空实现：所有附件都视为不可解析
pub struct NoopAttachmentResolver;

#[async_trait::async_trait]
impl AttachmentResolver for NoopAttachmentResolver {
    async fn resolve(&self, _ids: &[Uuid]) -> ApplicationResult<Vec<AttachmentView>> {
        Ok(Vec::new())
    }

    async fn find(&self, _id: Uuid) -> ApplicationResult<Option<AttachmentView>> {
        Ok(None)
    }
}

/// 推送通知负载
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PushNotification {
    /// 目标设备
    pub device_id: String,
    /// 标题（通常为发送者昵称或群名）
    pub title: String,
    /// 摘要文本
    pub body: String,
    /// 点击跳转的房间
    pub room_id: Uuid,
}

/// 推送通知发送器
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: PushNotification) -> ApplicationResult<()>;
}

/// 空实现：推送未配置时使用
pub struct NoopNotificationSender;

#[async_trait::async_trait]
impl NotificationSender for NoopNotificationSender {
    async fn send(&self, _notification: PushNotification) -> ApplicationResult<()> {
        Ok(())
    }
}
