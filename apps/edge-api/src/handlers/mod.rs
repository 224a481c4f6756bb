mod auth;
mod users;
mod ws;

pub use auth::{login, signin};
pub use users::{create_user, list_users};
pub use ws::{chat_ws, events_ws, gateway_ws};

use axum::Json;
use axum::response::IntoResponse;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppState;
    use axum::extract::{Json, State};
    use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
    use axum::response::Response;
    use domain::Tenant;
    use edge_auth::{AuthService, JwtSigner};
    use edge_rooms::{ChatRoom, GatewayBrokerSettings, GatewayRoom, GatewayRoomConfig};
    use edge_storage::{InMemoryTenantStore, InMemoryUserStore, TenantStore};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;

    async fn test_state() -> AppState {
        let tenants = Arc::new(InMemoryTenantStore::new());
        tenants
            .insert(Tenant {
                id: "T1".to_string(),
                slug: "T1".to_string(),
                name: "Tenant One".to_string(),
            })
            .await
            .expect("tenant");
        let users = Arc::new(InMemoryUserStore::new());
        let signer = JwtSigner::new("test-secret".to_string(), 3600, None, None);
        let auth = Arc::new(AuthService::new(users.clone(), signer));
        let (events_tx, _) = tokio::sync::broadcast::channel(16);
        AppState {
            auth,
            tenants,
            users,
            chat_room: ChatRoom::new(Duration::from_millis(50)),
            gateway_room: GatewayRoom::new(GatewayRoomConfig {
                broker: GatewayBrokerSettings {
                    host: "127.0.0.1".to_string(),
                    port: 1883,
                    username: None,
                    password: None,
                    client_id: "test".to_string(),
                    clean_session: true,
                    keep_alive: 10,
                    qos: 1,
                    will_topic: None,
                    will_payload: None,
                    will_retain: false,
                },
                poll_period: Duration::from_millis(50),
                ping_period: Duration::from_secs(50),
                connect_timeout: Duration::from_millis(50),
                suback_timeout: Duration::from_millis(30),
            }),
            events_tx,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn signin_body(user_name: &str, role: &str, mfa: bool) -> api_contract::SigninRequest {
        serde_json::from_value(serde_json::json!({
            "tenant_id": "T1",
            "user_name": user_name,
            "password": "p",
            "email": format!("{user_name}@example.com"),
            "role": role,
            "mfa_enabled": mfa,
        }))
        .expect("request")
    }

    fn login_body(user_name: &str, totp: Option<&str>) -> api_contract::LoginRequest {
        serde_json::from_value(serde_json::json!({
            "tenant_id": "T1",
            "tenant_slug": "T1",
            "user_name": user_name,
            "password": "p",
            "totp": totp,
        }))
        .expect("request")
    }

    #[tokio::test]
    async fn signin_then_login_then_protected_list() {
        let state = test_state().await;

        // signin
        let response = signin(State(state.clone()), Json(signin_body("hatem", "admin", false))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let user = body_json(response).await;
        assert_eq!(user["user_name"], "hatem");
        assert!(user.get("password_hash").is_none());

        // login
        let response = login(
            State(state.clone()),
            HeaderMap::new(),
            Json(login_body("hatem", None)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["role"], "admin");
        assert_eq!(body["mfa_enabled"], false);
        let token = body["access_token"].as_str().expect("token").to_string();

        // GET /users（Admin + 租户匹配）
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers.insert("X-Tenant", HeaderValue::from_static("T1"));
        let response = list_users(State(state.clone()), headers).await;
        assert_eq!(response.status(), StatusCode::OK);
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().expect("array").len(), 1);
        assert_eq!(listed[0]["user_name"], "hatem");
    }

    #[tokio::test]
    async fn login_requires_tenant_and_credentials() {
        let state = test_state().await;
        let request: api_contract::LoginRequest = serde_json::from_value(serde_json::json!({
            "user_name": "hatem",
            "password": "p",
        }))
        .expect("request");
        let response = login(State(state.clone()), HeaderMap::new(), Json(request)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "tenant-id required");
    }

    #[tokio::test]
    async fn totp_gated_login() {
        let state = test_state().await;

        let response = signin(State(state.clone()), Json(signin_body("maya", "operator", true))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let user = body_json(response).await;
        let secret = user["totp_secret_b32"].as_str().expect("secret").to_string();
        assert!(!secret.is_empty());

        // 缺少 TOTP：拒绝并提示 mfa required
        let response = login(
            State(state.clone()),
            HeaderMap::new(),
            Json(login_body("maya", None)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "mfa required");

        // 正确的 TOTP：通过
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_secs();
        let code = edge_auth::totp_code(&secret, now, 6, 30).expect("code");
        let rendered = format!("{code:06}");
        let response = login(
            State(state.clone()),
            HeaderMap::new(),
            Json(login_body("maya", Some(&rendered))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["mfa_enabled"], true);
    }

    #[tokio::test]
    async fn role_order_gates_user_listing() {
        let state = test_state().await;
        for (name, role) in [("v", "viewer"), ("o", "operator"), ("a", "admin")] {
            let response =
                signin(State(state.clone()), Json(signin_body(name, role, false))).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        for (name, expected) in [
            ("v", StatusCode::FORBIDDEN),
            ("o", StatusCode::FORBIDDEN),
            ("a", StatusCode::OK),
        ] {
            let response = login(
                State(state.clone()),
                HeaderMap::new(),
                Json(login_body(name, None)),
            )
            .await;
            let body = body_json(response).await;
            let token = body["access_token"].as_str().expect("token").to_string();

            let mut headers = HeaderMap::new();
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
            );
            headers.insert("X-Tenant", HeaderValue::from_static("T1"));
            let response = list_users(State(state.clone()), headers).await;
            assert_eq!(response.status(), expected, "role {name}");
        }
    }

    #[tokio::test]
    async fn missing_authorization_gets_challenge() {
        let state = test_state().await;
        let mut headers = HeaderMap::new();
        headers.insert("X-Tenant", HeaderValue::from_static("T1"));
        let response = list_users(State(state.clone()), headers).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("WWW-Authenticate").expect("header"),
            "Bearer"
        );
    }

    #[tokio::test]
    async fn site_scope_limits_listing() {
        let state = test_state().await;
        let response = signin(State(state.clone()), Json(signin_body("hatem", "admin", false))).await;
        assert_eq!(response.status(), StatusCode::OK);

        // 手工签发一个只覆盖 site-1 的 token
        let identity = edge_auth::Identity {
            sub: "hatem".to_string(),
            role: domain::Role::Admin,
            tenant_slug: "T1".to_string(),
            tenant_id: "T1".to_string(),
            site_ids: vec!["site-1".to_string()],
        };
        let token = state.auth.issue_token(&identity).expect("token");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers.insert("X-Tenant", HeaderValue::from_static("T1"));
        headers.insert("X-Site", HeaderValue::from_static("site-1"));
        let response = list_users(State(state.clone()), headers.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);

        headers.insert("X-Site", HeaderValue::from_static("site-2"));
        let response = list_users(State(state.clone()), headers).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"], "site not allowed");
    }

    #[tokio::test]
    async fn tenant_mismatch_is_forbidden() {
        let state = test_state().await;
        let response = signin(State(state.clone()), Json(signin_body("hatem", "admin", false))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = login(
            State(state.clone()),
            HeaderMap::new(),
            Json(login_body("hatem", None)),
        )
        .await;
        let body = body_json(response).await;
        let token = body["access_token"].as_str().expect("token").to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers.insert("X-Tenant", HeaderValue::from_static("other-tenant"));
        let response = list_users(State(state.clone()), headers).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
