//! 内存存储实现
//!
//! 实现全部Repository trait，供单元测试与本地运行使用。
//! 集合类变更（read_by/liked_by/message_unreads）都在单个
//! 写锁临界区内完成检查与写入，与数据库实现的原子语义一致。

use std::collections::HashMap;

use domain::entities::message::{Emotion, Message};
use domain::entities::room::{Room, RoomMember, RoomType};
use domain::entities::user::User;
use domain::errors::{DomainError, DomainResult};
use domain::repositories::{
    ListPage, MessageRepository, Pagination, RoomRepository, UserRepository,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// 内存存储
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    rooms: RwLock<HashMap<Uuid, Room>>,
    messages: RwLock<HashMap<Uuid, Message>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
        }
    }
}

fn page_slice<T: Clone>(items: &[T], pagination: Pagination) -> ListPage<T> {
    let total = items.len() as u64;
    let start = pagination.offset as usize;
    let data = if start < items.len() {
        let end = usize::min(start + pagination.limit as usize, items.len());
        items[start..end].to_vec()
    } else {
        Vec::new()
    };
    ListPage::new(data, total, pagination)
}

#[async_trait::async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: User) -> DomainResult<User> {
        let mut users = self.users.write().await;
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> DomainResult<Vec<User>> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn page_by_ids(
        &self,
        ids: &[Uuid],
        pagination: Pagination,
    ) -> DomainResult<ListPage<User>> {
        let users = self.users.read().await;
        let mut matched: Vec<User> = ids.iter().filter_map(|id| users.get(id).cloned()).collect();
        // 在线成员（offline_at为空）排在前面，其余按离线时间降序
        matched.sort_by(|a, b| match (a.offline_at, b.offline_at) {
            (None, None) => a.user_name.cmp(&b.user_name),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => y.cmp(&x),
        });
        Ok(page_slice(&matched, pagination))
    }

    async fn attach_socket(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
    ) -> DomainResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&user_id).map(|user| {
            user.attach_socket(connection_id);
            user.clone()
        }))
    }

    async fn detach_socket(&self, connection_id: Uuid) -> DomainResult<Option<User>> {
        let mut users = self.users.write().await;
        let user = users
            .values_mut()
            .find(|u| u.socket_id == Some(connection_id));
        Ok(user.map(|user| {
            user.detach_socket();
            user.clone()
        }))
    }

    async fn add_friends(&self, user_ids: &[Uuid]) -> DomainResult<()> {
        let mut users = self.users.write().await;
        for a in user_ids {
            for b in user_ids {
                if a == b {
                    continue;
                }
                if let Some(user) = users.get_mut(a) {
                    user.add_friend(*b);
                }
            }
        }
        Ok(())
    }

    async fn save_room_to_users(&self, user_ids: &[Uuid], room_id: Uuid) -> DomainResult<()> {
        let mut users = self.users.write().await;
        for id in user_ids {
            if let Some(user) = users.get_mut(id) {
                user.add_room(room_id);
            }
        }
        Ok(())
    }

    async fn remove_room_from_users(&self, user_ids: &[Uuid], room_id: Uuid) -> DomainResult<()> {
        let mut users = self.users.write().await;
        for id in user_ids {
            if let Some(user) = users.get_mut(id) {
                user.remove_room(room_id);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RoomRepository for MemoryStore {
    async fn create(&self, room: Room) -> DomainResult<Room> {
        let mut rooms = self.rooms.write().await;
        rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Room>> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(&id).cloned())
    }

    async fn find_single_between(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> DomainResult<Option<Room>> {
        let rooms = self.rooms.read().await;
        Ok(rooms
            .values()
            .find(|room| {
                room.room_type == RoomType::Single
                    && !room.is_deleted
                    && room.has_member(user_a)
                    && room.has_member(user_b)
            })
            .cloned())
    }

    async fn page_by_member(
        &self,
        user_id: Uuid,
        keyword: Option<&str>,
        pagination: Pagination,
    ) -> DomainResult<ListPage<Room>> {
        let rooms = self.rooms.read().await;
        let keyword = keyword.map(|k| k.to_lowercase());
        let mut matched: Vec<Room> = rooms
            .values()
            .filter(|room| !room.is_deleted && room.has_member(user_id))
            .filter(|room| match &keyword {
                Some(k) => room
                    .name
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(k)),
                None => true,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(page_slice(&matched, pagination))
    }

    async fn update_info(
        &self,
        room_id: Uuid,
        name: Option<String>,
        avatar: Option<String>,
    ) -> DomainResult<Option<Room>> {
        let mut rooms = self.rooms.write().await;
        Ok(rooms.get_mut(&room_id).map(|room| {
            if name.is_some() {
                room.name = name;
            }
            if avatar.is_some() {
                room.avatar = avatar;
            }
            room.updated_at = chrono::Utc::now();
            room.clone()
        }))
    }

    async fn add_member(&self, room_id: Uuid, member: RoomMember) -> DomainResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        if !room.has_member(member.user_id) {
            room.members_leaved.retain(|m| m.user_id != member.user_id);
            room.members.push(member);
            room.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> DomainResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        room.leave(user_id)?;
        Ok(())
    }

    async fn append_message(&self, room_id: Uuid, message_id: Uuid) -> DomainResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        room.append_message(message_id);
        Ok(())
    }

    async fn add_message_unread(
        &self,
        room_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        if let Some(member) = room.members.iter_mut().find(|m| m.user_id == user_id) {
            member.add_unread(message_id);
        }
        Ok(())
    }

    async fn add_message_unread_except(
        &self,
        room_id: Uuid,
        message_id: Uuid,
        except_user_id: Uuid,
    ) -> DomainResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        for member in room.members.iter_mut() {
            if member.user_id != except_user_id {
                member.add_unread(message_id);
            }
        }
        Ok(())
    }

    async fn clear_unread(&self, room_id: Uuid, user_id: Uuid) -> DomainResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        if let Some(member) = room.members.iter_mut().find(|m| m.user_id == user_id) {
            member.message_unreads.clear();
        }
        Ok(())
    }

    async fn soft_delete(&self, room_id: Uuid) -> DomainResult<()> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(&room_id)
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        room.soft_delete();
        Ok(())
    }

    async fn hard_delete(&self, room_id: Uuid) -> DomainResult<()> {
        let mut rooms = self.rooms.write().await;
        rooms
            .remove(&room_id)
            .ok_or_else(|| DomainError::not_found("room", room_id))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, message: Message) -> DomainResult<Message> {
        let mut messages = self.messages.write().await;
        messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.get(&id).cloned())
    }

    async fn add_read_receipt(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<Option<Message>> {
        let mut messages = self.messages.write().await;
        let Some(message) = messages.get_mut(&message_id) else {
            return Ok(None);
        };
        if !message.mark_read(user_id) {
            return Ok(None);
        }
        Ok(Some(message.clone()))
    }

    async fn add_read_receipts_for_room(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<u64> {
        let mut messages = self.messages.write().await;
        let mut updated = 0;
        for message in messages.values_mut() {
            if message.room_id == room_id && message.mark_read(user_id) {
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn set_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emotion: Emotion,
    ) -> DomainResult<Option<Message>> {
        let mut messages = self.messages.write().await;
        Ok(messages.get_mut(&message_id).map(|message| {
            message.set_reaction(user_id, emotion);
            message.clone()
        }))
    }

    async fn remove_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> DomainResult<Option<Message>> {
        let mut messages = self.messages.write().await;
        Ok(messages.get_mut(&message_id).map(|message| {
            message.remove_reaction(user_id);
            message.clone()
        }))
    }

    async fn page_by_room(
        &self,
        room_id: Uuid,
        include_hidden: bool,
        pagination: Pagination,
    ) -> DomainResult<ListPage<Message>> {
        let messages = self.messages.read().await;
        let mut matched: Vec<Message> = messages
            .values()
            .filter(|m| m.room_id == room_id && !m.is_deleted && (include_hidden || !m.is_hidden))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page_slice(&matched, pagination))
    }

    async fn count_by_room(&self, room_id: Uuid) -> DomainResult<u64> {
        let messages = self.messages.read().await;
        Ok(messages
            .values()
            .filter(|m| m.room_id == room_id && !m.is_deleted)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::entities::message::MessagePayload;

    fn text_message(room_id: Uuid, author: Uuid) -> Message {
        Message::new(
            room_id,
            author,
            MessagePayload {
                text: Some("hi".into()),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_read_receipt_is_conditional() {
        let store = MemoryStore::new();
        let reader = Uuid::new_v4();
        let message = text_message(Uuid::new_v4(), Uuid::new_v4());
        let id = message.id;
        MessageRepository::create(&store, message).await.unwrap();

        let first = store.add_read_receipt(id, reader).await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().read_by.len(), 2);

        // 已读过的用户再次确认不产生更新
        assert!(store.add_read_receipt(id, reader).await.unwrap().is_none());
        assert!(store
            .add_read_receipt(Uuid::new_v4(), reader)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unread_except_skips_author() {
        let store = MemoryStore::new();
        let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let author = members[0];
        let room = Room::new_group("team", None, members.clone()).unwrap();
        let room_id = room.id;
        RoomRepository::create(&store, room).await.unwrap();

        let message_id = Uuid::new_v4();
        store
            .add_message_unread_except(room_id, message_id, author)
            .await
            .unwrap();

        let room = RoomRepository::find_by_id(&store, room_id)
            .await
            .unwrap()
            .unwrap();
        assert!(room.member(author).unwrap().message_unreads.is_empty());
        for other in &members[1..] {
            assert_eq!(room.member(*other).unwrap().message_unreads, vec![message_id]);
        }
    }

    #[tokio::test]
    async fn test_clear_unread_only_touches_target_member() {
        let store = MemoryStore::new();
        let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let room = Room::new_group("team", None, members.clone()).unwrap();
        let room_id = room.id;
        RoomRepository::create(&store, room).await.unwrap();

        store
            .add_message_unread_except(room_id, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        store.clear_unread(room_id, members[0]).await.unwrap();

        let room = RoomRepository::find_by_id(&store, room_id)
            .await
            .unwrap()
            .unwrap();
        assert!(room.member(members[0]).unwrap().message_unreads.is_empty());
        assert_eq!(room.member(members[1]).unwrap().message_unreads.len(), 1);
    }

    #[tokio::test]
    async fn test_page_by_room_newest_first() {
        let store = MemoryStore::new();
        let room_id = Uuid::new_v4();
        let author = Uuid::new_v4();

        let mut ids = Vec::new();
        for i in 0..3 {
            let mut message = text_message(room_id, author);
            message.created_at = chrono::Utc::now() + chrono::Duration::seconds(i);
            ids.push(message.id);
            MessageRepository::create(&store, message).await.unwrap();
        }

        let page = store
            .page_by_room(room_id, false, Pagination::new(2, 0))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert!(page.has_more);
        assert_eq!(page.data[0].id, ids[2]);
        assert_eq!(page.data[1].id, ids[1]);
    }
}
