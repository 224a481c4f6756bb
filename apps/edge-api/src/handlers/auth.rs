//! 注册与登录 handlers
//!
//! - POST /signin：建用户，返回用户 JSON（MFA 启用时含 TOTP 密钥）
//! - POST /login：口令（+TOTP）校验后签发 access token，
//!   响应体 `{access_token, token_type, role, mfa_enabled}`

use crate::AppState;
use crate::utils::response::{json_error, unavailable};
use api_contract::{LoginRequest, LoginResponse, SigninRequest};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use domain::Role;
use edge_auth::{AuthError, SigninUser};

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> &'h str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

pub async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SigninRequest>,
) -> Response {
    if !state.auth.available() {
        return unavailable("auth service not available");
    }
    if req.tenant_id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "tenant-id required");
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
        tenant_id: req.tenant_id,
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

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Response {
    if !state.auth.available() {
        return unavailable("auth service not available");
    }
    let tenant_id = req
        .tenant_id
        .clone()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| header_value(&headers, "X-Tenant-Id").to_string());
    if tenant_id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "tenant-id required");
    }
    if req.user_name.is_empty() || req.password.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "username/password required");
    }

    let user = match state
        .auth
        .login_verify(&tenant_id, &req.user_name, &req.password, req.totp.as_deref())
        .await
    {
        Ok(user) => user,
        Err(err) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };

    // 租户 slug：body/header 优先，否则查租户表
    let mut tenant_slug = req
        .tenant_slug
        .clone()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| header_value(&headers, "X-Tenant-Slug").to_string());
    if tenant_slug.is_empty() {
        if let Ok(Some(tenant)) = state.tenants.find_by_id(&tenant_id).await {
            tenant_slug = tenant.slug;
        }
    }

    let identity = state.auth.identity_for(&user, &tenant_slug);
    let token = match state.auth.issue_token(&identity) {
        Ok(token) => token,
        Err(err) => return json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    let response = LoginResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        role: user.role.to_string(),
        mfa_enabled: user.mfa_enabled,
    };
    (StatusCode::OK, Json(response)).into_response()
}
