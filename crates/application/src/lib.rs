//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、视图组装、
//! 以及对外部适配器（在线状态、推送通知、附件解析）的抽象。

pub mod broadcaster;
pub mod collaborators;
pub mod dto;
pub mod errors;
pub mod events;
pub mod presence;
pub mod services;
pub mod store;

pub use broadcaster::BroadcastRouter;
pub use collaborators::{
    AttachmentResolver, NoopAttachmentResolver, NoopNotificationSender, NotificationSender,
    PushNotification,
};
pub use errors::{ApplicationError, ApplicationResult};
pub use events::ServerEvent;
pub use presence::{ConnectionHandle, MemoryPresenceRegistry, PresenceRegistry};
pub use services::{MessageService, RoomService};
pub use store::MemoryStore;
