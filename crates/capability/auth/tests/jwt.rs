use domain::Role;
use edge_auth::{AuthError, Identity, JwtSigner};
use serde_json::json;

fn identity() -> Identity {
    Identity {
        sub: "hatem".to_string(),
        role: Role::Admin,
        tenant_slug: "t1".to_string(),
        tenant_id: "tenant-1".to_string(),
        site_ids: vec!["site-1".to_string()],
    }
}

#[test]
fn issue_and_verify_round_trip() {
    let signer = JwtSigner::new("secret".to_string(), 3600, None, None);
    let token = signer.issue(&identity()).expect("token");
    assert_eq!(token.matches('.').count(), 2);

    let verified = signer.verify(&token).expect("verified");
    assert_eq!(verified.sub, "hatem");
    assert_eq!(verified.role, Role::Admin);
    assert_eq!(verified.tenant_slug, "t1");
    assert_eq!(verified.tenant_id, "tenant-1");
    assert_eq!(verified.site_ids, vec!["site-1".to_string()]);
}

#[test]
fn tampered_signature_is_rejected() {
    let signer = JwtSigner::new("secret".to_string(), 3600, None, None);
    let token = signer.issue(&identity()).expect("token");

    let mut tampered = token.clone();
    let last = tampered.pop().expect("char");
    tampered.push(if last == 'A' { 'B' } else { 'A' });
    assert!(matches!(
        signer.verify(&tampered),
        Err(AuthError::TokenInvalidSignature)
    ));
}

#[test]
fn tampered_payload_is_rejected() {
    let signer = JwtSigner::new("secret".to_string(), 3600, None, None);
    let token = signer.issue(&identity()).expect("token");
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    let mut payload: Vec<char> = parts[1].chars().collect();
    payload[0] = if payload[0] == 'A' { 'B' } else { 'A' };
    parts[1] = payload.into_iter().collect();
    assert!(signer.verify(&parts.join(".")).is_err());
}

#[test]
fn wrong_secret_is_rejected() {
    let signer = JwtSigner::new("secret".to_string(), 3600, None, None);
    let other = JwtSigner::new("other".to_string(), 3600, None, None);
    let token = signer.issue(&identity()).expect("token");
    assert!(other.verify(&token).is_err());
}

fn raw_token(secret: &str, claims: serde_json::Value) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encode")
}

#[test]
fn expired_token_is_rejected_with_expired_kind() {
    let signer = JwtSigner::new("secret".to_string(), 3600, None, None);
    let token = raw_token(
        "secret",
        json!({
            "sub": "hatem",
            "role": "admin",
            "tenant_slug": "t1",
            "tenant_id": "tenant-1",
            "iat": 1_000,
            "nbf": 1_000,
            "exp": 2_000
        }),
    );
    assert!(matches!(signer.verify(&token), Err(AuthError::TokenExpired)));
}

#[test]
fn future_nbf_is_rejected() {
    let signer = JwtSigner::new("secret".to_string(), 3600, None, None);
    let far_future = 4_102_444_800u64;
    let token = raw_token(
        "secret",
        json!({
            "sub": "hatem",
            "role": "admin",
            "tenant_slug": "t1",
            "tenant_id": "tenant-1",
            "iat": far_future,
            "nbf": far_future,
            "exp": far_future + 3600
        }),
    );
    assert!(matches!(
        signer.verify(&token),
        Err(AuthError::TokenBadClaims)
    ));
}

#[test]
fn issuer_and_audience_are_enforced_when_configured() {
    let signer = JwtSigner::new(
        "secret".to_string(),
        3600,
        Some("edge".to_string()),
        Some("ui".to_string()),
    );
    let token = signer.issue(&identity()).expect("token");
    assert!(signer.verify(&token).is_ok());

    let wrong_iss = JwtSigner::new(
        "secret".to_string(),
        3600,
        Some("someone-else".to_string()),
        Some("ui".to_string()),
    );
    assert!(matches!(
        wrong_iss.verify(&token),
        Err(AuthError::TokenBadClaims)
    ));
}
