use domain::{Role, User};
use edge_storage::{InMemoryUserStore, UserStore};

fn user(tenant: &str, name: &str) -> User {
    User {
        id: domain::new_id(),
        tenant_id: tenant.to_string(),
        user_name: name.to_string(),
        email: format!("{name}@example.com"),
        password_hash: "$argon2id$stub".to_string(),
        role: Role::Viewer,
        disabled: false,
        mfa_enabled: false,
        totp_secret_b32: String::new(),
        totp_digits: 6,
        totp_period: 30,
        site_roles: Default::default(),
        created_at_ms: 1,
        updated_at_ms: 1,
    }
}

#[tokio::test]
async fn user_name_is_unique_per_tenant() {
    let store = InMemoryUserStore::new();
    store.insert(user("t1", "hatem")).await.expect("first");
    let duplicate = store.insert(user("t1", "hatem")).await;
    assert!(duplicate.is_err());
    // 另一个租户可以复用同名
    store.insert(user("t2", "hatem")).await.expect("other tenant");
}

#[tokio::test]
async fn list_is_tenant_scoped_and_creation_ordered() {
    let store = InMemoryUserStore::new();
    store.insert(user("t1", "a")).await.expect("a");
    store.insert(user("t2", "b")).await.expect("b");
    store.insert(user("t1", "c")).await.expect("c");

    let users = store.list("t1", 200).await.expect("list");
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].user_name, "a");
    assert_eq!(users[1].user_name, "c");
}

#[tokio::test]
async fn disabled_flag_round_trips() {
    let store = InMemoryUserStore::new();
    let created = user("t1", "hatem");
    let id = created.id.clone();
    store.insert(created).await.expect("insert");
    store.set_disabled(&id, true).await.expect("disable");
    let loaded = store.find_by_id(&id).await.expect("find").expect("user");
    assert!(loaded.disabled);
}
