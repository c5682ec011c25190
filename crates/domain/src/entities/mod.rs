//! 核心实体定义

pub mod message;
pub mod room;
pub mod user;

pub use message::*;
pub use room::*;
pub use user::*;
