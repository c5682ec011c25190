//! WebSocket 实时网关
//!
//! 每个用户同时只保留一条连接，新连接会顶掉旧连接，被顶掉的
//! 连接收到Logout事件后关闭。连接建立后
//! 绑定socket、下发Login事件并通知在线好友；断开时只有仍持有
//! 当前connection_id的连接才会触发下线流程，防止被顶掉的旧连接
//! 把新连接误判为离线。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use application::dto::{AuthorView, TypingStatus};
use application::{ConnectionHandle, ServerEvent};
use domain::entities::message::{Emotion, Location, MessagePayload, ReplyTo};
use domain::entities::user::User;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// 客户端上行事件
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
enum ClientEvent {
    /// 进入房间视图：清空该房间未读并开始接收ReceiveMessage
    JoinRoom {
        room_id: Uuid,
    },
    /// 离开房间视图
    LeaveRoom {
        room_id: Uuid,
    },
    SendMessage {
        room_id: Uuid,
        text: Option<String>,
        location: Option<Location>,
        order_id: Option<i64>,
        product_id: Option<i64>,
        #[serde(default)]
        attachment_ids: Vec<Uuid>,
        #[serde(default)]
        mention_to: Vec<Uuid>,
        reply_to: Option<ReplyTo>,
    },
    ReadMessage {
        message_id: Uuid,
    },
    StartTyping {
        room_id: Uuid,
    },
    StopTyping {
        room_id: Uuid,
    },
    LikeMessage {
        message_id: Uuid,
        emotion: Emotion,
    },
    UnlikeMessage {
        message_id: Uuid,
    },
}

/// GET /ws?token=... 升级入口
pub async fn handle_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match state.jwt_service.verify_token(&query.token) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims.user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // 注册在线状态并绑定socket；被顶掉的旧连接收到Logout后退出
    notify_evicted(
        state
            .presence
            .connect(user_id, ConnectionHandle::new(connection_id, tx.clone()))
            .await,
    );

    let user = match state.users.attach_socket(user_id, connection_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(user_id = %user_id, "连接的用户不存在");
            state.presence.disconnect(user_id, connection_id).await;
            return;
        }
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "绑定socket失败");
            state.presence.disconnect(user_id, connection_id).await;
            return;
        }
    };

    debug!(user_id = %user_id, connection_id = %connection_id, "WebSocket连接建立");

    if tx.send(ServerEvent::Login(AuthorView::from(&user))).is_err() {
        return;
    }
    state.broadcast.friend_logged_in(&user).await;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(event) = outbound else {
                    break;
                };
                let evicted = matches!(event, ServerEvent::Logout);
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "事件序列化失败");
                        continue;
                    }
                };
                if ws_sender.send(WsMessage::Text(json.into())).await.is_err() {
                    break;
                }
                if evicted {
                    break;
                }
            }
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                handle_client_event(&state, &user, &tx, event).await;
                            }
                            Err(e) => {
                                warn!(user_id = %user_id, error = %e, "无法解析客户端事件");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(user_id = %user_id, error = %e, "WebSocket读取错误");
                        break;
                    }
                }
            }
        }
    }

    // 只有当前连接才能触发下线；被顶掉的旧连接在这里拿到false
    if state.presence.disconnect(user_id, connection_id).await {
        match state.users.detach_socket(connection_id).await {
            Ok(Some(user)) => state.broadcast.friend_logged_out(&user).await,
            Ok(None) => {}
            Err(e) => warn!(user_id = %user_id, error = %e, "解绑socket失败"),
        }
        debug!(user_id = %user_id, connection_id = %connection_id, "WebSocket连接断开");
    }
}

/// 通知被新连接顶掉的旧连接下线
///
/// 旧连接的任务仍持有自己的发送端，通道不会因顶替而关闭，
/// 必须显式下发Logout让它结束事件循环。
fn notify_evicted(replaced: Option<ConnectionHandle>) {
    if let Some(old) = replaced {
        let _ = old.sender.send(ServerEvent::Logout);
    }
}

async fn handle_client_event(
    state: &AppState,
    user: &User,
    tx: &mpsc::UnboundedSender<ServerEvent>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinRoom { room_id } => {
            state.presence.set_viewing(user.id, Some(room_id)).await;
            match state.message_service.read_all(room_id, user.id).await {
                Ok(_) => {
                    let _ = tx.send(ServerEvent::ReadAllMessage { room_id });
                }
                Err(e) => warn!(user_id = %user.id, room_id = %room_id, error = %e, "进入房间清空未读失败"),
            }
        }
        ClientEvent::LeaveRoom { room_id } => {
            if state.presence.viewing_room(user.id).await == Some(room_id) {
                state.presence.set_viewing(user.id, None).await;
            }
        }
        ClientEvent::SendMessage {
            room_id,
            text,
            location,
            order_id,
            product_id,
            attachment_ids,
            mention_to,
            reply_to,
        } => {
            let payload = MessagePayload {
                text,
                location,
                order_id,
                product_id,
                attachment_ids,
                mention_to,
                reply_to,
            };
            match state.message_service.send_message(room_id, user.id, payload).await {
                Ok(sent) => {
                    state
                        .broadcast
                        .fan_out_message(&sent.room, &sent.message, &sent.view)
                        .await;
                    // 作者视角的回显
                    let _ = tx.send(ServerEvent::ReceiveMessage(sent.view));
                }
                Err(e) => warn!(user_id = %user.id, room_id = %room_id, error = %e, "发送消息失败"),
            }
        }
        ClientEvent::ReadMessage { message_id } => {
            match state.message_service.read_message(message_id, user.id).await {
                Ok(Some(message)) => {
                    state
                        .broadcast
                        .emit_to_user(
                            message.author_id,
                            ServerEvent::ConfirmReadMessage {
                                room_id: message.room_id,
                                message_id: message.id,
                                reader_id: user.id,
                            },
                        )
                        .await;
                }
                Ok(None) => {}
                Err(e) => warn!(user_id = %user.id, message_id = %message_id, error = %e, "确认已读失败"),
            }
        }
        ClientEvent::StartTyping { room_id } => {
            let status = TypingStatus {
                room_id,
                user: AuthorView::from(user),
            };
            state
                .broadcast
                .emit_to_room_id(room_id, ServerEvent::StartTyping(status), Some(user.id))
                .await;
        }
        ClientEvent::StopTyping { room_id } => {
            let status = TypingStatus {
                room_id,
                user: AuthorView::from(user),
            };
            state
                .broadcast
                .emit_to_room_id(room_id, ServerEvent::StopTyping(status), Some(user.id))
                .await;
        }
        ClientEvent::LikeMessage { message_id, emotion } => {
            match state
                .message_service
                .like_message(message_id, user.id, emotion)
                .await
            {
                Ok(view) => {
                    let room_id = view.room_id;
                    let _ = tx.send(ServerEvent::LikeMessage(view.clone()));
                    state
                        .broadcast
                        .emit_to_room_id(room_id, ServerEvent::LikeMessage(view), Some(user.id))
                        .await;
                }
                Err(e) => warn!(user_id = %user.id, message_id = %message_id, error = %e, "表情回应失败"),
            }
        }
        ClientEvent::UnlikeMessage { message_id } => {
            match state
                .message_service
                .unlike_message(message_id, user.id)
                .await
            {
                Ok(view) => {
                    let room_id = view.room_id;
                    let _ = tx.send(ServerEvent::UnlikeMessage(view.clone()));
                    state
                        .broadcast
                        .emit_to_room_id(room_id, ServerEvent::UnlikeMessage(view), Some(user.id))
                        .await;
                }
                Err(e) => warn!(user_id = %user.id, message_id = %message_id, error = %e, "取消表情回应失败"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_join_room() {
        let room_id = Uuid::new_v4();
        let json = format!(r#"{{"event":"join_room","payload":{{"room_id":"{room_id}"}}}}"#);
        let event: ClientEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { room_id: id } if id == room_id));
    }

    #[test]
    fn test_client_event_send_message_defaults() {
        let room_id = Uuid::new_v4();
        let json = format!(
            r#"{{"event":"send_message","payload":{{"room_id":"{room_id}","text":"hello"}}}}"#
        );
        let event: ClientEvent = serde_json::from_str(&json).unwrap();
        match event {
            ClientEvent::SendMessage {
                text,
                attachment_ids,
                mention_to,
                reply_to,
                ..
            } => {
                assert_eq!(text.as_deref(), Some("hello"));
                assert!(attachment_ids.is_empty());
                assert!(mention_to.is_empty());
                assert!(reply_to.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_client_event_like_message() {
        let message_id = Uuid::new_v4();
        let json = format!(
            r#"{{"event":"like_message","payload":{{"message_id":"{message_id}","emotion":"heart"}}}}"#
        );
        let event: ClientEvent = serde_json::from_str(&json).unwrap();
        match event {
            ClientEvent::LikeMessage { emotion, .. } => assert_eq!(emotion, Emotion::Heart),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_evicted_connection_receives_logout() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let old = ConnectionHandle::new(Uuid::new_v4(), tx);

        notify_evicted(Some(old));
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Logout);

        // 没有旧连接时是no-op
        notify_evicted(None);
    }

    #[test]
    fn test_unknown_event_rejected() {
        let json = r#"{"event":"teleport","payload":{}}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }
}
