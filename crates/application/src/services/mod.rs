mod message_service;
mod room_service;

#[cfg(test)]
mod room_service_tests;

pub use message_service::{MessageService, SentMessage, UnreadMarker};
pub use room_service::RoomService;
