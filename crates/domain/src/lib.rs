//! 群聊消息系统核心领域模型
//!
//! 包含用户、房间、消息等核心实体，以及持久化存储接口定义。

pub mod entities;
pub mod errors;
pub mod repositories;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use repositories::*;
