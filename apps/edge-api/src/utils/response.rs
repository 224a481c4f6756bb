//! HTTP 响应辅助函数
//!
//! 所有失败响应统一为 `{"error":"<message>"}`；认证失败附带
//! `WWW-Authenticate: Bearer` 头。

use api_contract::ErrorBody;
use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

/// 通用错误响应。
pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

/// 401：缺少或非法的 Bearer token。
pub fn unauthorized(message: impl Into<String>) -> Response {
    let mut response = json_error(StatusCode::UNAUTHORIZED, message);
    response.headers_mut().insert(
        "WWW-Authenticate",
        HeaderValue::from_static("Bearer"),
    );
    response
}

/// 403：角色/租户/站点校验未通过。
pub fn forbidden(message: impl Into<String>) -> Response {
    json_error(StatusCode::FORBIDDEN, message)
}

/// 503：认证服务不可用。
pub fn unavailable(message: impl Into<String>) -> Response {
    json_error(StatusCode::SERVICE_UNAVAILABLE, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn unauthorized_carries_challenge_header() {
        let response = unauthorized("missing Authorization");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("WWW-Authenticate").expect("header"),
            "Bearer"
        );
        let json = body_json(response).await;
        assert_eq!(json["error"], "missing Authorization");
    }

    #[tokio::test]
    async fn error_body_shape() {
        let json = body_json(forbidden("tenant mismatch")).await;
        assert_eq!(json, serde_json::json!({ "error": "tenant mismatch" }));
    }
}
