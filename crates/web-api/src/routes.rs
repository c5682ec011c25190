//! HTTP 路由定义
//!
//! 除注册入口外的所有接口都在认证中间件之后，处理器从请求
//! 扩展中取出已认证用户。

use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use application::dto::{
    AuthorView, MessageView, ReactionSummary, RoomDetailView, RoomListItemView, RoomMemberView,
};
use application::services::UnreadMarker;
use application::ServerEvent;
use domain::entities::message::{Emotion, Location, MessagePayload, ReplyTo};
use domain::entities::room::RoomType;
use domain::entities::user::User;
use domain::repositories::{ListPage, Pagination};

use crate::auth::{require_auth, AuthUser, LoginResponse};
use crate::error::ApiError;
use crate::state::AppState;
use crate::websocket;

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    user_name: String,
    avatar: Option<String>,
    device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatePairRoomPayload {
    partner_id: Uuid,
    #[serde(default)]
    admin: bool,
}

#[derive(Debug, Deserialize)]
struct CreateGroupRoomPayload {
    name: String,
    avatar: Option<String>,
    member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct UpdateRoomPayload {
    name: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoomListQuery {
    keyword: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessagePayload {
    pub text: Option<String>,
    pub location: Option<Location>,
    pub order_id: Option<i64>,
    pub product_id: Option<i64>,
    #[serde(default)]
    pub attachment_ids: Vec<Uuid>,
    #[serde(default)]
    pub mention_to: Vec<Uuid>,
    pub reply_to: Option<ReplyTo>,
}

impl From<SendMessagePayload> for MessagePayload {
    fn from(payload: SendMessagePayload) -> Self {
        MessagePayload {
            text: payload.text,
            location: payload.location,
            order_id: payload.order_id,
            product_id: payload.product_id,
            attachment_ids: payload.attachment_ids,
            mention_to: payload.mention_to,
            reply_to: payload.reply_to,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LikePayload {
    emotion: Emotion,
}

fn pagination(limit: Option<u32>, offset: Option<u32>) -> Pagination {
    let default = Pagination::default();
    Pagination::new(limit.unwrap_or(default.limit), offset.unwrap_or(0))
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/rooms/single", post(create_pair_room))
        .route("/rooms/group", post(create_group_room))
        .route("/rooms", get(list_rooms))
        .route("/rooms/{room_id}", get(room_detail))
        .route("/rooms/{room_id}", patch(update_room))
        .route("/rooms/{room_id}", delete(delete_room))
        .route("/rooms/{room_id}/join", post(join_room))
        .route("/rooms/{room_id}/leave", post(leave_room))
        .route("/rooms/{room_id}/members", get(room_members))
        .route("/rooms/{room_id}/messages", get(list_messages))
        .route("/rooms/{room_id}/messages", post(send_message))
        .route("/rooms/{room_id}/unread", get(unread_marker))
        .route("/rooms/{room_id}/read-all", post(read_all))
        .route("/messages/{message_id}", get(message_detail))
        .route("/messages/{message_id}/read", post(read_message))
        .route("/messages/{message_id}/like", post(like_message))
        .route("/messages/{message_id}/unlike", post(unlike_message))
        .route("/messages/{message_id}/reactions", get(message_reactions))
        .route("/messages/{message_id}/readers", get(message_readers))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket::handle_upgrade))
        .nest(
            "/api/v1",
            Router::new()
                .route("/auth/register", post(register))
                .merge(protected),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    if payload.user_name.trim().is_empty() {
        return Err(ApiError::bad_request("user_name不能为空"));
    }

    let mut user = User::new(payload.user_name.trim(), payload.avatar);
    user.device_id = payload.device_id;
    let user = state.users.create(user).await.map_err(ApiError::from)?;
    let token = state.jwt_service.generate_token(user.id)?;

    Ok(Json(LoginResponse {
        user: AuthorView::from(&user),
        token,
    }))
}

async fn create_pair_room(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(payload): Json<CreatePairRoomPayload>,
) -> Result<Json<RoomDetailView>, ApiError> {
    let room_type = if payload.admin {
        RoomType::Admin
    } else {
        RoomType::Single
    };
    let detail = state
        .room_service
        .create_pair_room(user_id, payload.partner_id, room_type)
        .await?;
    Ok(Json(detail))
}

async fn create_group_room(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(payload): Json<CreateGroupRoomPayload>,
) -> Result<Json<RoomDetailView>, ApiError> {
    let detail = state
        .room_service
        .create_group_room(user_id, payload.name, payload.avatar, payload.member_ids)
        .await?;
    Ok(Json(detail))
}

async fn list_rooms(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(query): Query<RoomListQuery>,
) -> Result<Json<ListPage<RoomListItemView>>, ApiError> {
    let page = state
        .room_service
        .list_rooms(
            user_id,
            query.keyword.as_deref(),
            pagination(query.limit, query.offset),
        )
        .await?;
    Ok(Json(page))
}

async fn room_detail(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomDetailView>, ApiError> {
    Ok(Json(state.room_service.room_detail(room_id, user_id).await?))
}

async fn update_room(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<UpdateRoomPayload>,
) -> Result<Json<RoomDetailView>, ApiError> {
    let detail = state
        .room_service
        .update_room_info(room_id, user_id, payload.name, payload.avatar)
        .await?;
    Ok(Json(detail))
}

async fn delete_room(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.room_service.delete_room(room_id, user_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn join_room(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomDetailView>, ApiError> {
    Ok(Json(state.room_service.join_room(room_id, user_id).await?))
}

async fn leave_room(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.room_service.leave_room(room_id, user_id).await?;
    Ok(Json(serde_json::json!({ "left": true })))
}

async fn room_members(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListPage<RoomMemberView>>, ApiError> {
    let page = state
        .room_service
        .room_members(room_id, user_id, pagination(query.limit, query.offset))
        .await?;
    Ok(Json(page))
}

async fn list_messages(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListPage<MessageView>>, ApiError> {
    let page = state
        .message_service
        .list_messages(room_id, user_id, pagination(query.limit, query.offset))
        .await?;
    Ok(Json(page))
}

async fn send_message(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<Json<MessageView>, ApiError> {
    let sent = state
        .message_service
        .send_message(room_id, user_id, payload.into())
        .await?;
    state
        .broadcast
        .fan_out_message(&sent.room, &sent.message, &sent.view)
        .await;
    Ok(Json(sent.view))
}

async fn unread_marker(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<UnreadMarker>, ApiError> {
    Ok(Json(
        state.message_service.unread_marker(room_id, user_id).await?,
    ))
}

async fn read_all(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state.message_service.read_all(room_id, user_id).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn message_detail(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageView>, ApiError> {
    Ok(Json(
        state
            .message_service
            .message_detail(message_id, user_id)
            .await?,
    ))
}

async fn read_message(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .message_service
        .read_message(message_id, user_id)
        .await?;

    // 通知作者有人读了这条消息
    if let Some(message) = &updated {
        state
            .broadcast
            .emit_to_user(
                message.author_id,
                ServerEvent::ConfirmReadMessage {
                    room_id: message.room_id,
                    message_id: message.id,
                    reader_id: user_id,
                },
            )
            .await;
    }
    Ok(Json(serde_json::json!({ "updated": updated.is_some() })))
}

async fn like_message(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<LikePayload>,
) -> Result<Json<MessageView>, ApiError> {
    let view = state
        .message_service
        .like_message(message_id, user_id, payload.emotion)
        .await?;
    state
        .broadcast
        .emit_to_room_id(
            view.room_id,
            ServerEvent::LikeMessage(view.clone()),
            Some(user_id),
        )
        .await;
    Ok(Json(view))
}

async fn unlike_message(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageView>, ApiError> {
    let view = state
        .message_service
        .unlike_message(message_id, user_id)
        .await?;
    state
        .broadcast
        .emit_to_room_id(
            view.room_id,
            ServerEvent::UnlikeMessage(view.clone()),
            Some(user_id),
        )
        .await;
    Ok(Json(view))
}

async fn message_reactions(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<ReactionSummary>, ApiError> {
    Ok(Json(
        state.message_service.reactors(message_id, user_id).await?,
    ))
}

async fn message_readers(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Vec<AuthorView>>, ApiError> {
    Ok(Json(
        state.message_service.readers(message_id, user_id).await?,
    ))
}
