use domain::CommandStatus;
use edge_storage::{CommandStore, InMemoryCommandStore};
use serde_json::json;

#[tokio::test]
async fn pending_commands_come_back_in_creation_order() {
    let store = InMemoryCommandStore::new();
    let first = store
        .insert_pending("d1", "reboot", json!({}))
        .await
        .expect("insert");
    let second = store
        .insert_pending("d1", "ota", json!({"version": "1.2"}))
        .await
        .expect("insert");

    let pending = store.fetch_pending(10).await.expect("fetch");
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, first.id);
    assert_eq!(pending[1].id, second.id);
}

#[tokio::test]
async fn happy_path_walks_pending_sent_acked() {
    let store = InMemoryCommandStore::new();
    let command = store
        .insert_pending("d1", "reboot", json!({}))
        .await
        .expect("insert");

    store.mark_sent(&command.id).await.expect("sent");
    let loaded = store.find_by_id(&command.id).await.expect("find").expect("row");
    assert_eq!(loaded.status, CommandStatus::Sent);
    assert!(loaded.sent_at_ms.is_some());

    store.mark_acked(&command.id).await.expect("acked");
    let loaded = store.find_by_id(&command.id).await.expect("find").expect("row");
    assert_eq!(loaded.status, CommandStatus::Acked);
    assert!(loaded.ack_at_ms.is_some());
}

#[tokio::test]
async fn terminal_states_are_never_left() {
    let store = InMemoryCommandStore::new();
    let command = store
        .insert_pending("d1", "reboot", json!({}))
        .await
        .expect("insert");

    store.mark_sent(&command.id).await.expect("sent");
    store.mark_acked(&command.id).await.expect("acked");

    // acked 之后的任何标记都不再生效
    store.mark_failed(&command.id, "late failure").await.expect("noop");
    store
        .schedule_retry(&command.id, 1, 30, "late retry")
        .await
        .expect("noop");
    let loaded = store.find_by_id(&command.id).await.expect("find").expect("row");
    assert_eq!(loaded.status, CommandStatus::Acked);
    assert!(loaded.error.is_none());

    // 终态行不会再次出现在 pending 扫描里
    let pending = store.fetch_pending(10).await.expect("fetch");
    assert!(pending.is_empty());
}

#[tokio::test]
async fn retry_requeues_only_when_due() {
    let store = InMemoryCommandStore::new();
    let command = store
        .insert_pending("d1", "reboot", json!({}))
        .await
        .expect("insert");

    store.mark_sent(&command.id).await.expect("sent");
    store
        .schedule_retry(&command.id, 1, 30, "publish timeout")
        .await
        .expect("retry");
    let loaded = store.find_by_id(&command.id).await.expect("find").expect("row");
    assert_eq!(loaded.status, CommandStatus::Retry);
    assert_eq!(loaded.attempts, 1);
    let due_at = loaded.next_retry_at_ms.expect("deadline");

    // 未到期：不回迁
    let promoted = store.promote_due_retries(due_at - 1).await.expect("sweep");
    assert_eq!(promoted, 0);

    // 到期：retry → pending
    let promoted = store.promote_due_retries(due_at).await.expect("sweep");
    assert_eq!(promoted, 1);
    let pending = store.fetch_pending(10).await.expect("fetch");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, command.id);
}
