//! 并发数据一致性测试
//!
//! 验证集合类变更（已读回执、表情回应、未读集合）与在线状态
//! 注册表在并发任务下保持一致。

use std::sync::Arc;

use application::{ConnectionHandle, MemoryPresenceRegistry, MemoryStore, PresenceRegistry};
use domain::entities::message::{Emotion, Message, MessagePayload};
use domain::entities::room::{Room, RoomType};
use domain::entities::user::User;
use domain::repositories::{MessageRepository, RoomRepository, UserRepository};
use futures_util::future::join_all;
use tokio::sync::mpsc;
use uuid::Uuid;

async fn seed_message(store: &MemoryStore) -> (Room, Message, User) {
    let alice = UserRepository::create(store, User::new("alice", None))
        .await
        .unwrap();
    let bob = UserRepository::create(store, User::new("bob", None))
        .await
        .unwrap();
    let room = Room::new_pair(RoomType::Single, alice.id, bob.id).unwrap();
    let room = RoomRepository::create(store, room).await.unwrap();

    let payload = MessagePayload {
        text: Some("hi".into()),
        ..Default::default()
    };
    let message = Message::new(room.id, alice.id, payload).unwrap();
    let message = MessageRepository::create(store, message).await.unwrap();
    (room, message, bob)
}

#[tokio::test]
async fn test_concurrent_read_receipts_form_set() {
    let store = Arc::new(MemoryStore::new());
    let (_, message, bob) = seed_message(&store).await;

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            let message_id = message.id;
            let reader = bob.id;
            tokio::spawn(async move { store.add_read_receipt(message_id, reader).await.unwrap() })
        })
        .collect();

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // 恰好一次写入生效，其余都是no-op
    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);

    let stored = MessageRepository::find_by_id(&*store, message.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.read_by.len(), 2);
}

#[tokio::test]
async fn test_concurrent_reactions_leave_single_active() {
    let store = Arc::new(MemoryStore::new());
    let (_, message, bob) = seed_message(&store).await;

    let emotions = [Emotion::Like, Emotion::Heart, Emotion::Laugh, Emotion::Wow];
    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let store = store.clone();
            let message_id = message.id;
            let user = bob.id;
            let emotion = emotions[i % emotions.len()];
            tokio::spawn(async move { store.set_reaction(message_id, user, emotion).await.unwrap() })
        })
        .collect();
    join_all(tasks).await;

    let stored = MessageRepository::find_by_id(&*store, message.id)
        .await
        .unwrap()
        .unwrap();
    let active: Vec<_> = stored
        .liked_by
        .iter()
        .filter(|r| r.user_id == bob.id)
        .collect();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn test_concurrent_unread_adds_are_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let (room, message, bob) = seed_message(&store).await;

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            let room_id = room.id;
            let message_id = message.id;
            let user = bob.id;
            tokio::spawn(async move {
                store
                    .add_message_unread(room_id, message_id, user)
                    .await
                    .unwrap()
            })
        })
        .collect();
    join_all(tasks).await;

    let stored = RoomRepository::find_by_id(&*store, room.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.member(bob.id).unwrap().message_unreads.len(), 1);
}

#[tokio::test]
async fn test_concurrent_connect_disconnect_consistency() {
    let registry = Arc::new(MemoryPresenceRegistry::new());
    let users: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

    let tasks: Vec<_> = users
        .iter()
        .flat_map(|&user| {
            let connect = {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let (tx, _rx) = mpsc::unbounded_channel();
                    registry
                        .connect(user, ConnectionHandle::new(Uuid::new_v4(), tx))
                        .await;
                })
            };
            let probe = {
                let registry = registry.clone();
                tokio::spawn(async move {
                    // 任一时刻两种查询方式结果一致
                    let online = registry.is_online(user).await;
                    let handle = registry.get(user).await;
                    assert_eq!(online, handle.is_some());
                })
            };
            [connect, probe]
        })
        .collect();
    join_all(tasks).await;

    for user in users {
        assert!(registry.is_online(user).await);
        assert!(registry.get(user).await.is_some());
    }
}
