//! 房间实体定义
//!
//! 房间独占其成员的未读消息集合；消息归属于房间，但删除房间
//! 不会级联删除消息，只是从成员视图中分离。

use crate::errors::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 房间类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    /// 双人会话
    Single,
    /// 群聊（至少3人）
    Group,
    /// 双人客服会话
    Admin,
}

impl RoomType {
    /// 是否为固定两人的会话类型
    pub fn is_pair(&self) -> bool {
        matches!(self, RoomType::Single | RoomType::Admin)
    }
}

/// 房间成员
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMember {
    /// 用户ID
    pub user_id: Uuid,
    /// 加入时间
    pub joined_at: DateTime<Utc>,
    /// 个人未读消息ID集合（集合语义）
    pub message_unreads: Vec<Uuid>,
}

impl RoomMember {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            joined_at: Utc::now(),
            message_unreads: Vec::new(),
        }
    }

    /// 添加未读消息（重复添加为no-op）
    pub fn add_unread(&mut self, message_id: Uuid) {
        if !self.message_unreads.contains(&message_id) {
            self.message_unreads.push(message_id);
        }
    }
}

/// 已退出成员的历史记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeavedMember {
    pub user_id: Uuid,
    pub leaved_at: DateTime<Utc>,
}

/// 房间实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// 房间唯一ID
    pub id: Uuid,
    /// 房间名称（单聊通常为空，展示时取对方昵称）
    pub name: Option<String>,
    /// 房间头像（可选）
    pub avatar: Option<String>,
    /// 房间类型
    pub room_type: RoomType,
    /// 当前成员列表（有序）
    pub members: Vec<RoomMember>,
    /// 已退出成员历史
    pub members_leaved: Vec<LeavedMember>,
    /// 房间内消息ID列表（按持久化顺序）
    pub messages: Vec<Uuid>,
    /// 最后一条消息
    pub last_message_id: Option<Uuid>,
    /// 软删除标记
    pub is_deleted: bool,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// 创建双人会话房间（single/admin）
    pub fn new_pair(room_type: RoomType, user_a: Uuid, user_b: Uuid) -> DomainResult<Self> {
        if !room_type.is_pair() {
            return Err(DomainError::invalid_operation("该类型不是双人会话"));
        }
        if user_a == user_b {
            return Err(DomainError::invalid_operation("不能只和自己创建房间"));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: None,
            avatar: None,
            room_type,
            members: vec![RoomMember::new(user_a), RoomMember::new(user_b)],
            members_leaved: Vec::new(),
            messages: Vec::new(),
            last_message_id: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// 创建群聊房间，成员数必须≥3（调用方负责去重）
    pub fn new_group(
        name: impl Into<String>,
        avatar: Option<String>,
        member_ids: Vec<Uuid>,
    ) -> DomainResult<Self> {
        if member_ids.len() < 3 {
            return Err(DomainError::invalid_input("群聊至少需要3名成员"));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: Some(name.into()),
            avatar,
            room_type: RoomType::Group,
            members: member_ids.into_iter().map(RoomMember::new).collect(),
            members_leaved: Vec::new(),
            messages: Vec::new(),
            last_message_id: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// 查找成员
    pub fn member(&self, user_id: Uuid) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    /// 是否为当前成员
    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.member(user_id).is_some()
    }

    /// 当前成员ID列表
    pub fn member_ids(&self) -> Vec<Uuid> {
        self.members.iter().map(|m| m.user_id).collect()
    }

    /// 加入成员（仅群聊）
    pub fn join(&mut self, user_id: Uuid) -> DomainResult<()> {
        if self.room_type != RoomType::Group {
            return Err(DomainError::invalid_operation("该房间不是群聊"));
        }
        if self.has_member(user_id) {
            return Err(DomainError::invalid_operation("用户已在房间中"));
        }

        self.members_leaved.retain(|m| m.user_id != user_id);
        self.members.push(RoomMember::new(user_id));
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 退出成员（仅群聊），移入退出历史
    pub fn leave(&mut self, user_id: Uuid) -> DomainResult<()> {
        if self.room_type != RoomType::Group {
            return Err(DomainError::invalid_operation("该房间不是群聊"));
        }
        if !self.has_member(user_id) {
            return Err(DomainError::invalid_operation("用户不在该房间中"));
        }

        self.members.retain(|m| m.user_id != user_id);
        self.members_leaved.push(LeavedMember {
            user_id,
            leaved_at: Utc::now(),
        });
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 追加消息并更新最后一条消息指针
    pub fn append_message(&mut self, message_id: Uuid) {
        self.messages.push(message_id);
        self.last_message_id = Some(message_id);
        self.updated_at = Utc::now();
    }

    /// 软删除：标记删除并将全部现有成员快照进退出历史
    pub fn soft_delete(&mut self) {
        let now = Utc::now();
        for member in self.members.drain(..) {
            self.members_leaved.push(LeavedMember {
                user_id: member.user_id,
                leaved_at: now,
            });
        }
        self.is_deleted = true;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_room_requires_two_distinct_users() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let room = Room::new_pair(RoomType::Single, a, b).unwrap();
        assert_eq!(room.members.len(), 2);
        assert!(room.has_member(a));
        assert!(room.has_member(b));

        assert!(Room::new_pair(RoomType::Single, a, a).is_err());
        assert!(Room::new_pair(RoomType::Group, a, b).is_err());
    }

    #[test]
    fn test_group_room_requires_three_members() {
        let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        assert!(Room::new_group("team", None, members[..2].to_vec()).is_err());

        let room = Room::new_group("team", None, members).unwrap();
        assert_eq!(room.room_type, RoomType::Group);
        assert_eq!(room.members.len(), 3);
    }

    #[test]
    fn test_join_leave_restores_member_count() {
        let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut room = Room::new_group("team", None, members).unwrap();
        let before = room.members.len();

        let newcomer = Uuid::new_v4();
        room.join(newcomer).unwrap();
        assert_eq!(room.members.len(), before + 1);

        room.leave(newcomer).unwrap();
        assert_eq!(room.members.len(), before);
        assert!(room.members_leaved.iter().any(|m| m.user_id == newcomer));
    }

    #[test]
    fn test_join_leave_rejected_on_pair_room() {
        let mut room = Room::new_pair(RoomType::Single, Uuid::new_v4(), Uuid::new_v4()).unwrap();
        let outsider = Uuid::new_v4();

        assert!(room.join(outsider).is_err());
        let member = room.members[0].user_id;
        assert!(room.leave(member).is_err());
    }

    #[test]
    fn test_leave_requires_membership() {
        let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut room = Room::new_group("team", None, members).unwrap();
        assert!(room.leave(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_rejoin_clears_leaved_history() {
        let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let user = members[0];
        let mut room = Room::new_group("team", None, members).unwrap();

        room.leave(user).unwrap();
        room.join(user).unwrap();
        assert!(room.has_member(user));
        assert!(!room.members_leaved.iter().any(|m| m.user_id == user));
    }

    #[test]
    fn test_soft_delete_snapshots_members() {
        let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut room = Room::new_group("team", None, members.clone()).unwrap();

        room.soft_delete();
        assert!(room.is_deleted);
        assert!(room.members.is_empty());
        assert_eq!(room.members_leaved.len(), 3);
        for id in members {
            assert!(room.members_leaved.iter().any(|m| m.user_id == id));
        }
    }

    #[test]
    fn test_member_unread_set_semantics() {
        let mut member = RoomMember::new(Uuid::new_v4());
        let message_id = Uuid::new_v4();

        member.add_unread(message_id);
        member.add_unread(message_id);
        assert_eq!(member.message_unreads.len(), 1);
    }
}
