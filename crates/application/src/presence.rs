//! 在线状态注册表
//!
//! 记录每个用户当前的WebSocket连接句柄以及正在查看的房间。
//! 每个用户最多持有一个活跃连接，新连接会顶掉旧连接；断开
//! 操作携带连接ID做守卫，避免旧连接的清理误伤新连接。

use std::collections::HashMap;

use crate::events::ServerEvent;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// 活跃连接句柄
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// 连接唯一ID
    pub connection_id: Uuid,
    /// 事件下发通道
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(connection_id: Uuid, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            connection_id,
            sender,
        }
    }
}

/// 在线状态注册表trait
#[async_trait::async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// 注册用户连接；返回被顶掉的旧连接（若有）
    async fn connect(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<ConnectionHandle>;

    /// 注销用户连接；仅当connection_id与当前连接一致时生效，
    /// 返回是否实际发生了注销
    async fn disconnect(&self, user_id: Uuid, connection_id: Uuid) -> bool;

    /// 获取用户当前连接
    async fn get(&self, user_id: Uuid) -> Option<ConnectionHandle>;

    /// 用户是否在线
    async fn is_online(&self, user_id: Uuid) -> bool;

    /// 记录用户正在查看的房间（None表示离开房间视图）
    async fn set_viewing(&self, user_id: Uuid, room_id: Option<Uuid>);

    /// 用户正在查看的房间
    async fn viewing_room(&self, user_id: Uuid) -> Option<Uuid>;
}

struct PresenceEntry {
    handle: ConnectionHandle,
    viewing: Option<Uuid>,
}

/// 内存实现的在线状态注册表
pub struct MemoryPresenceRegistry {
    entries: RwLock<HashMap<Uuid, PresenceEntry>>,
}

impl Default for MemoryPresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl PresenceRegistry for MemoryPresenceRegistry {
    async fn connect(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut entries = self.entries.write().await;
        entries
            .insert(
                user_id,
                PresenceEntry {
                    handle,
                    viewing: None,
                },
            )
            .map(|old| old.handle)
    }

    async fn disconnect(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(&user_id) {
            Some(entry) if entry.handle.connection_id == connection_id => {
                entries.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    async fn get(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        let entries = self.entries.read().await;
        entries.get(&user_id).map(|e| e.handle.clone())
    }

    async fn is_online(&self, user_id: Uuid) -> bool {
        let entries = self.entries.read().await;
        entries.contains_key(&user_id)
    }

    async fn set_viewing(&self, user_id: Uuid, room_id: Option<Uuid>) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&user_id) {
            entry.viewing = room_id;
        }
    }

    async fn viewing_room(&self, user_id: Uuid) -> Option<Uuid> {
        let entries = self.entries.read().await;
        entries.get(&user_id).and_then(|e| e.viewing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(Uuid::new_v4(), tx), rx)
    }

    #[tokio::test]
    async fn test_new_connection_replaces_old() {
        let registry = MemoryPresenceRegistry::new();
        let user = Uuid::new_v4();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();
        let first_id = first.connection_id;

        assert!(registry.connect(user, first).await.is_none());
        let replaced = registry.connect(user, second.clone()).await;
        assert_eq!(replaced.map(|h| h.connection_id), Some(first_id));

        // 旧连接的断开不应影响新连接
        assert!(!registry.disconnect(user, first_id).await);
        assert!(registry.is_online(user).await);

        assert!(registry.disconnect(user, second.connection_id).await);
        assert!(!registry.is_online(user).await);
    }

    #[tokio::test]
    async fn test_viewing_room_cleared_on_disconnect() {
        let registry = MemoryPresenceRegistry::new();
        let user = Uuid::new_v4();
        let room = Uuid::new_v4();
        let (conn, _rx) = handle();
        let conn_id = conn.connection_id;

        registry.connect(user, conn).await;
        registry.set_viewing(user, Some(room)).await;
        assert_eq!(registry.viewing_room(user).await, Some(room));

        registry.set_viewing(user, None).await;
        assert_eq!(registry.viewing_room(user).await, None);

        registry.set_viewing(user, Some(room)).await;
        registry.disconnect(user, conn_id).await;
        assert_eq!(registry.viewing_room(user).await, None);
    }

    #[tokio::test]
    async fn test_set_viewing_requires_connection() {
        let registry = MemoryPresenceRegistry::new();
        let user = Uuid::new_v4();
        registry.set_viewing(user, Some(Uuid::new_v4())).await;
        assert_eq!(registry.viewing_room(user).await, None);
    }
}
