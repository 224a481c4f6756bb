//! 用户管理 handlers（Admin + 租户匹配）
//!
//! - GET /users：列出调用方租户的用户，上限 200。
//!   带 `X-Site` 头时额外要求 token 的站点集合覆盖该站点
//! - POST /users：在调用方租户内建用户

use crate::AppState;
use crate::middleware::{require_tenant_site_strict, require_tenant_strict};
use crate::utils::response::{forbidden, json_error};
use api_contract::SigninRequest;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::Role;
use edge_auth::{AuthError, SigninUser};
use serde_json::Value;

const LIST_LIMIT: i64 = 200;

fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string()
}

pub async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let tenant_slug = header_string(&headers, "X-Tenant");
    let site_id = header_string(&headers, "X-Site");
    let identity =
        match require_tenant_site_strict(&state, &headers, &tenant_slug, &site_id, Role::Admin) {
            Ok(identity) => identity,
            Err(response) => return response,
        };

    match state.users.list(&identity.tenant_id, LIST_LIMIT).await {
        Ok(users) => {
            let data: Vec<Value> = users.iter().map(|user| user.to_public_json()).collect();
            (StatusCode::OK, Json(data)).into_response()
        }
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SigninRequest>,
) -> Response {
    let tenant_slug = header_string(&headers, "X-Tenant");
    let identity = match require_tenant_strict(&state, &headers, &tenant_slug, Role::Admin) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    // 跨租户建用户拒绝；body 省略租户时落到调用方租户
    if !req.tenant_id.is_empty() && req.tenant_id != identity.tenant_id {
        return forbidden("tenant mismatch");
    }
    if req.user_name.is_empty() || req.password.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "username/password required");
    }
    let role = match &req.role {
        Some(raw) => match Role::parse(raw) {
            Some(role) => role,
            None => return json_error(StatusCode::BAD_REQUEST, "unknown role"),
        },
        None => Role::Viewer,
    };

    let input = SigninUser {
        tenant_id: identity.tenant_id.clone(),
        user_name: req.user_name,
        password: req.password,
        email: req.email,
        role,
        mfa_enabled: req.mfa_enabled,
        totp_digits: req.totp_digits.unwrap_or(6),
        totp_period: req.totp_period.unwrap_or(30),
    };
    match state.auth.signin_create_user(input).await {
        Ok(user) => (StatusCode::OK, Json(user.to_public_json())).into_response(),
        Err(AuthError::Internal(message)) if message.contains("duplicate") => {
            json_error(StatusCode::CONFLICT, message)
        }
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}
