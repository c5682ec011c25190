//! 房间服务单元测试
//!
//! 覆盖房间创建的幂等性、成员进出、删除策略与在线通知。

#[cfg(test)]
mod room_service_tests {
    use std::sync::Arc;

    use crate::broadcaster::BroadcastRouter;
    use crate::collaborators::NoopNotificationSender;
    use crate::events::ServerEvent;
    use crate::presence::{ConnectionHandle, MemoryPresenceRegistry, PresenceRegistry};
    use crate::services::RoomService;
    use crate::store::MemoryStore;
    use domain::entities::room::RoomType;
    use domain::entities::user::User;
    use domain::errors::DomainError;
    use domain::repositories::{Pagination, RoomRepository, UserRepository};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct TestHarness {
        store: Arc<MemoryStore>,
        presence: Arc<MemoryPresenceRegistry>,
        service: RoomService,
    }

    fn harness() -> TestHarness {
        let store = Arc::new(MemoryStore::new());
        let presence = Arc::new(MemoryPresenceRegistry::new());
        let router = Arc::new(BroadcastRouter::new(
            presence.clone(),
            store.clone(),
            store.clone(),
            Arc::new(NoopNotificationSender),
        ));
        let service = RoomService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            presence.clone(),
            router,
        );
        TestHarness {
            store,
            presence,
            service,
        }
    }

    async fn create_user(store: &MemoryStore, name: &str) -> User {
        UserRepository::create(store, User::new(name, None))
            .await
            .unwrap()
    }

    async fn connect(
        presence: &MemoryPresenceRegistry,
        user_id: Uuid,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        presence
            .connect(user_id, ConnectionHandle::new(Uuid::new_v4(), tx))
            .await;
        rx
    }

    #[tokio::test]
    async fn test_create_single_room_is_idempotent() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;

        let first = h
            .service
            .create_pair_room(alice.id, bob.id, RoomType::Single)
            .await
            .unwrap();
        let second = h
            .service
            .create_pair_room(alice.id, bob.id, RoomType::Single)
            .await
            .unwrap();
        // 反向调用也命中同一房间
        let reversed = h
            .service
            .create_pair_room(bob.id, alice.id, RoomType::Single)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, reversed.id);
    }

    #[tokio::test]
    async fn test_create_pair_room_rejects_self() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;

        let result = h
            .service
            .create_pair_room(alice.id, alice.id, RoomType::Single)
            .await;
        assert!(matches!(
            result.unwrap_err().as_domain(),
            DomainError::InvalidOperation { .. }
        ));

        // 已有其他single房间时也不能被幂等查找命中
        h.service
            .create_pair_room(alice.id, bob.id, RoomType::Single)
            .await
            .unwrap();
        let result = h
            .service
            .create_pair_room(alice.id, alice.id, RoomType::Single)
            .await;
        assert!(matches!(
            result.unwrap_err().as_domain(),
            DomainError::InvalidOperation { .. }
        ));
    }

    #[tokio::test]
    async fn test_create_pair_room_establishes_friendship() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;

        let room = h
            .service
            .create_pair_room(alice.id, bob.id, RoomType::Single)
            .await
            .unwrap();

        let alice = UserRepository::find_by_id(&*h.store, alice.id)
            .await
            .unwrap()
            .unwrap();
        let bob = UserRepository::find_by_id(&*h.store, bob.id)
            .await
            .unwrap()
            .unwrap();
        assert!(alice.friends.contains(&bob.id));
        assert!(bob.friends.contains(&alice.id));
        assert!(alice.room_joineds.contains(&room.id));
        assert!(bob.room_joineds.contains(&room.id));
    }

    #[tokio::test]
    async fn test_group_room_requires_three_members() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;

        let result = h
            .service
            .create_group_room(alice.id, "team".into(), None, vec![bob.id])
            .await;
        assert!(matches!(
            result.unwrap_err().as_domain(),
            DomainError::InvalidInput { .. }
        ));

        // 无法解析的ID被丢弃后不足3人同样被拒绝
        let result = h
            .service
            .create_group_room(
                alice.id,
                "team".into(),
                None,
                vec![bob.id, Uuid::new_v4()],
            )
            .await;
        assert!(matches!(
            result.unwrap_err().as_domain(),
            DomainError::InvalidInput { .. }
        ));
    }

    #[tokio::test]
    async fn test_group_room_drops_unresolvable_member_ids() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;
        let carol = create_user(&h.store, "carol").await;

        let detail = h
            .service
            .create_group_room(
                alice.id,
                "team".into(),
                None,
                vec![bob.id, carol.id, Uuid::new_v4()],
            )
            .await
            .unwrap();

        assert_eq!(detail.members.len(), 3);
        let member_ids: Vec<Uuid> = detail.members.iter().map(|m| m.user.id).collect();
        assert!(member_ids.contains(&alice.id));
        assert!(member_ids.contains(&bob.id));
        assert!(member_ids.contains(&carol.id));
    }

    #[tokio::test]
    async fn test_group_creation_notifies_online_members() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;
        let carol = create_user(&h.store, "carol").await;

        let mut bob_rx = connect(&h.presence, bob.id).await;

        let detail = h
            .service
            .create_group_room(alice.id, "team".into(), None, vec![bob.id, carol.id])
            .await
            .unwrap();
        assert_eq!(detail.members.len(), 3);

        match bob_rx.try_recv().unwrap() {
            ServerEvent::CreateRoom(view) => assert_eq!(view.id, detail.id),
            other => panic!("意外事件: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_and_leave_group() {
        let h = harness();
        let members: Vec<_> = {
            let mut v = Vec::new();
            for name in ["alice", "bob", "carol"] {
                v.push(create_user(&h.store, name).await);
            }
            v
        };
        let dave = create_user(&h.store, "dave").await;

        let detail = h
            .service
            .create_group_room(
                members[0].id,
                "team".into(),
                None,
                members[1..].iter().map(|u| u.id).collect(),
            )
            .await
            .unwrap();

        let joined = h.service.join_room(detail.id, dave.id).await.unwrap();
        assert_eq!(joined.members.len(), 4);

        h.service.leave_room(detail.id, dave.id).await.unwrap();
        let room = RoomRepository::find_by_id(&*h.store, detail.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room.members.len(), 3);
        assert!(room.members_leaved.iter().any(|m| m.user_id == dave.id));

        // 非成员退出被拒绝
        let result = h.service.leave_room(detail.id, dave.id).await;
        assert!(matches!(
            result.unwrap_err().as_domain(),
            DomainError::InvalidOperation { .. }
        ));
    }

    #[tokio::test]
    async fn test_join_rejected_on_pair_room() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;
        let carol = create_user(&h.store, "carol").await;

        let room = h
            .service
            .create_pair_room(alice.id, bob.id, RoomType::Single)
            .await
            .unwrap();

        assert!(h.service.join_room(room.id, carol.id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_empty_room_is_hard_delete() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;

        let room = h
            .service
            .create_pair_room(alice.id, bob.id, RoomType::Single)
            .await
            .unwrap();
        let mut bob_rx = connect(&h.presence, bob.id).await;

        h.service.delete_room(room.id, alice.id).await.unwrap();

        assert!(RoomRepository::find_by_id(&*h.store, room.id)
            .await
            .unwrap()
            .is_none());
        match bob_rx.try_recv().unwrap() {
            ServerEvent::DeleteRoom { room_id } => assert_eq!(room_id, room.id),
            other => panic!("意外事件: {other:?}"),
        }

        let alice = UserRepository::find_by_id(&*h.store, alice.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!alice.room_joineds.contains(&room.id));
    }

    #[tokio::test]
    async fn test_delete_room_with_messages_is_soft_delete() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;

        let room = h
            .service
            .create_pair_room(alice.id, bob.id, RoomType::Single)
            .await
            .unwrap();

        let message = domain::entities::message::Message::new(
            room.id,
            alice.id,
            domain::entities::message::MessagePayload {
                text: Some("hi".into()),
                ..Default::default()
            },
        )
        .unwrap();
        domain::repositories::MessageRepository::create(&*h.store, message)
            .await
            .unwrap();

        h.service.delete_room(room.id, alice.id).await.unwrap();

        let stored = RoomRepository::find_by_id(&*h.store, room.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_deleted);
        assert!(stored.members.is_empty());
        assert_eq!(stored.members_leaved.len(), 2);
    }

    #[tokio::test]
    async fn test_list_rooms_resolves_partner_identity() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;

        h.service
            .create_pair_room(alice.id, bob.id, RoomType::Single)
            .await
            .unwrap();

        let page = h
            .service
            .list_rooms(alice.id, None, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].name.as_deref(), Some("bob"));

        let page = h
            .service
            .list_rooms(bob.id, None, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.data[0].name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_room_detail_requires_membership() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;
        let outsider = create_user(&h.store, "eve").await;

        let room = h
            .service
            .create_pair_room(alice.id, bob.id, RoomType::Single)
            .await
            .unwrap();

        let result = h.service.room_detail(room.id, outsider.id).await;
        assert!(matches!(
            result.unwrap_err().as_domain(),
            DomainError::Unauthorized { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_info_rejected_on_pair_room() {
        let h = harness();
        let alice = create_user(&h.store, "alice").await;
        let bob = create_user(&h.store, "bob").await;

        let room = h
            .service
            .create_pair_room(alice.id, bob.id, RoomType::Single)
            .await
            .unwrap();

        let result = h
            .service
            .update_room_info(room.id, alice.id, Some("renamed".into()), None)
            .await;
        assert!(matches!(
            result.unwrap_err().as_domain(),
            DomainError::InvalidOperation { .. }
        ));
    }
}
