use std::sync::Arc;

use application::{BroadcastRouter, MessageService, PresenceRegistry, RoomService};
use domain::repositories::UserRepository;

use crate::auth::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub room_service: Arc<RoomService>,
    pub message_service: Arc<MessageService>,
    pub users: Arc<dyn UserRepository>,
    pub presence: Arc<dyn PresenceRegistry>,
    pub broadcast: Arc<BroadcastRouter>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        room_service: Arc<RoomService>,
        message_service: Arc<MessageService>,
        users: Arc<dyn UserRepository>,
        presence: Arc<dyn PresenceRegistry>,
        broadcast: Arc<BroadcastRouter>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            room_service,
            message_service,
            users,
            presence,
            broadcast,
            jwt_service,
        }
    }
}
