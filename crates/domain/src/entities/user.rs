//! 用户实体定义
//!
//! 用户的好友关系和已加入房间列表只能由房间成员管理服务维护，
//! 客户端不能直接修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 用户实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// 用户唯一ID
    pub id: Uuid,
    /// 显示名称
    pub user_name: String,
    /// 头像URL（可选）
    pub avatar: Option<String>,
    /// 当前在线连接句柄ID（离线为None）
    pub socket_id: Option<Uuid>,
    /// 最近一次离线时间（在线为None）
    pub offline_at: Option<DateTime<Utc>>,
    /// 推送通知设备ID（可选）
    pub device_id: Option<String>,
    /// 好友列表（对称关系）
    pub friends: Vec<Uuid>,
    /// 已加入的房间ID列表
    pub room_joineds: Vec<Uuid>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// 创建新用户，初始为离线状态
    pub fn new(user_name: impl Into<String>, avatar: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_name: user_name.into(),
            avatar,
            socket_id: None,
            offline_at: Some(now),
            device_id: None,
            friends: Vec::new(),
            room_joineds: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 绑定在线连接句柄
    ///
    /// 不变式：socket_id 与 offline_at 互斥，绑定句柄时清空离线时间。
    pub fn attach_socket(&mut self, connection_id: Uuid) {
        self.socket_id = Some(connection_id);
        self.offline_at = None;
        self.updated_at = Utc::now();
    }

    /// 解绑在线连接句柄并记录离线时间
    pub fn detach_socket(&mut self) {
        self.socket_id = None;
        self.offline_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// 是否持有在线连接
    pub fn is_online(&self) -> bool {
        self.socket_id.is_some()
    }

    /// 添加好友（集合语义，重复添加为no-op）
    pub fn add_friend(&mut self, friend_id: Uuid) {
        if friend_id != self.id && !self.friends.contains(&friend_id) {
            self.friends.push(friend_id);
            self.updated_at = Utc::now();
        }
    }

    /// 记录已加入的房间
    pub fn add_room(&mut self, room_id: Uuid) {
        if !self.room_joineds.contains(&room_id) {
            self.room_joineds.push(room_id);
            self.updated_at = Utc::now();
        }
    }

    /// 从已加入列表移除房间
    pub fn remove_room(&mut self, room_id: Uuid) {
        self.room_joineds.retain(|id| *id != room_id);
        self.updated_at = Utc::now();
    }

    /// 计算与另一用户共同加入的房间ID集合
    pub fn shared_rooms(&self, other: &User) -> Vec<Uuid> {
        self.room_joineds
            .iter()
            .filter(|id| other.room_joineds.contains(id))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_offline_exclusive() {
        let mut user = User::new("alice", None);
        assert!(user.offline_at.is_some());
        assert!(!user.is_online());

        let conn = Uuid::new_v4();
        user.attach_socket(conn);
        assert_eq!(user.socket_id, Some(conn));
        assert!(user.offline_at.is_none());
        assert!(user.is_online());

        user.detach_socket();
        assert!(user.socket_id.is_none());
        assert!(user.offline_at.is_some());
    }

    #[test]
    fn test_add_friend_is_idempotent() {
        let mut user = User::new("alice", None);
        let friend = Uuid::new_v4();

        user.add_friend(friend);
        user.add_friend(friend);
        assert_eq!(user.friends.len(), 1);

        // 不能和自己成为好友
        user.add_friend(user.id);
        assert_eq!(user.friends.len(), 1);
    }

    #[test]
    fn test_shared_rooms_intersection() {
        let mut a = User::new("a", None);
        let mut b = User::new("b", None);
        let shared = Uuid::new_v4();
        let only_a = Uuid::new_v4();

        a.add_room(shared);
        a.add_room(only_a);
        b.add_room(shared);

        assert_eq!(a.shared_rooms(&b), vec![shared]);
        assert!(b.shared_rooms(&a).contains(&shared));
    }
}
