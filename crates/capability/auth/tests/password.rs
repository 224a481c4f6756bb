use edge_auth::{hash_password, verify_password};

#[test]
fn password_round_trip() {
    let hash = hash_password("p@ssw0rd").expect("hash");
    assert!(hash.starts_with("$argon2id$"));
    assert!(verify_password("p@ssw0rd", &hash));
    assert!(!verify_password("p@ssw0rd!", &hash));
}

#[test]
fn verify_rejects_garbage_hash() {
    assert!(!verify_password("p", "not-a-phc-string"));
    assert!(!verify_password("p", ""));
}

#[test]
fn hashes_are_salted() {
    let a = hash_password("same").expect("hash");
    let b = hash_password("same").expect("hash");
    assert_ne!(a, b);
    assert!(verify_password("same", &a));
    assert!(verify_password("same", &b));
}
