//! 认证与授权守卫
//!
//! 三层校验，逐层收紧：
//!
//! 1. `require_role_strict`：Bearer token 校验 + 最低角色
//! 2. `require_tenant_strict`：再要求租户 slug 匹配
//! 3. `require_tenant_site_strict`：再要求 token 的站点集合包含目标站点
//!
//! 失败语义：缺头/坏 token → 401（带 `WWW-Authenticate: Bearer`）；
//! token 合法但角色/租户/站点不符 → 403；认证服务未配置 → 503。

use crate::AppState;
use crate::utils::response::{forbidden, json_error, unauthorized, unavailable};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use domain::Role;
use edge_auth::{AuthError, Identity};

/// 校验 token 并要求最低角色。
pub fn require_role_strict(
    state: &AppState,
    headers: &HeaderMap,
    required: Role,
) -> Result<Identity, Response> {
    if !state.auth.available() {
        return Err(unavailable("auth service not available"));
    }

    let Some(authorization) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return Err(unauthorized("missing Authorization"));
    };

    match state.auth.require(required, authorization) {
        Ok(identity) => Ok(identity),
        Err(AuthError::InsufficientRole) => Err(forbidden("insufficient role")),
        Err(
            AuthError::MissingBearer
            | AuthError::TokenExpired
            | AuthError::TokenInvalidSignature
            | AuthError::TokenBadClaims,
        ) => Err(unauthorized("invalid token")),
        Err(err) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            err.to_string(),
        )),
    }
}

/// 角色校验之上再要求租户匹配。双方 slug 都非空且不等时拒绝。
pub fn require_tenant_strict(
    state: &AppState,
    headers: &HeaderMap,
    tenant_slug: &str,
    required: Role,
) -> Result<Identity, Response> {
    let identity = require_role_strict(state, headers, required)?;
    if !tenant_slug.is_empty()
        && !identity.tenant_slug.is_empty()
        && identity.tenant_slug != tenant_slug
    {
        return Err(forbidden("tenant mismatch"));
    }
    Ok(identity)
}

/// 租户校验之上再要求站点归属。token 的站点集合为空表示不限站点。
pub fn require_tenant_site_strict(
    state: &AppState,
    headers: &HeaderMap,
    tenant_slug: &str,
    site_id: &str,
    required: Role,
) -> Result<Identity, Response> {
    let identity = require_tenant_strict(state, headers, tenant_slug, required)?;
    if !site_id.is_empty() && !identity.has_site(site_id) {
        return Err(forbidden("site not allowed"));
    }
    Ok(identity)
}
