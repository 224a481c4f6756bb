//! 认证能力：口令散列、JWT 签发与校验、TOTP、身份与角色判定。

mod jwt;
mod password;
mod totp;

use async_trait::async_trait;
use domain::{Role, User};
use edge_storage::UserStore;
use std::sync::Arc;

pub use jwt::JwtSigner;
pub use password::{hash_password, verify_password};
pub use totp::{generate_secret_base32, totp_code, totp_verify, TotpError};

/// MFA 启用时生成的 TOTP 密钥长度（160 位）。
const TOTP_SECRET_BYTES: usize = 20;

/// 登录校验时容忍的时间窗口（前后各一个 period）。
const TOTP_LOGIN_WINDOW: u32 = 1;

/// 认证相关错误。
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("bad credentials")]
    BadCredentials,
    #[error("user disabled")]
    UserDisabled,
    #[error("mfa required")]
    MfaRequired,
    #[error("mfa misconfiguration")]
    MfaMisconfigured,
    #[error("bad totp")]
    BadTotp,
    #[error("jwt expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalidSignature,
    #[error("bad token claims")]
    TokenBadClaims,
    #[error("missing Authorization")]
    MissingBearer,
    #[error("insufficient role")]
    InsufficientRole,
    #[error("auth service not available")]
    Unavailable,
    #[error("internal error: {0}")]
    Internal(String),
}

/// 已校验 token 携带的身份。
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub sub: String,
    pub role: Role,
    pub tenant_slug: String,
    pub tenant_id: String,
    pub site_ids: Vec<String>,
}

impl Identity {
    /// site_ids 为空表示不限站点。
    pub fn has_site(&self, site_id: &str) -> bool {
        self.site_ids.is_empty() || self.site_ids.iter().any(|s| s == site_id)
    }
}

/// 注册/建用户输入。
#[derive(Debug, Clone)]
pub struct SigninUser {
    pub tenant_id: String,
    pub user_name: String,
    pub password: String,
    pub email: String,
    pub role: Role,
    pub mfa_enabled: bool,
    pub totp_digits: u32,
    pub totp_period: u32,
}

/// 认证服务（UserStore + HS256 签发器）。
pub struct AuthService {
    users: Arc<dyn UserStore>,
    signer: JwtSigner,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, signer: JwtSigner) -> Self {
        Self { users, signer }
    }

    /// 密钥未配置时服务不可用（对外 503）。
    pub fn available(&self) -> bool {
        self.signer.has_secret()
    }

    /// 建用户：散列口令，MFA 启用时生成 TOTP 密钥，落库后返回完整实体。
    pub async fn signin_create_user(&self, input: SigninUser) -> Result<User, AuthError> {
        let now_ms = now_epoch_ms();
        let mut user = User {
            id: domain::new_id(),
            tenant_id: input.tenant_id,
            user_name: input.user_name,
            email: input.email,
            password_hash: hash_password(&input.password)?,
            role: input.role,
            disabled: false,
            mfa_enabled: input.mfa_enabled,
            totp_secret_b32: String::new(),
            totp_digits: input.totp_digits,
            totp_period: input.totp_period,
            site_roles: Default::default(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        };
        if user.mfa_enabled {
            user.totp_secret_b32 = generate_secret_base32(TOTP_SECRET_BYTES);
        }
        let inserted_id = self
            .users
            .insert(user.clone())
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))?;
        if inserted_id != user.id {
            return Err(AuthError::Internal("insert returned foreign id".to_string()));
        }
        Ok(user)
    }

    /// 登录校验：口令，然后（启用时）TOTP。
    pub async fn login_verify(
        &self,
        tenant_id: &str,
        user_name: &str,
        password: &str,
        totp: Option<&str>,
    ) -> Result<User, AuthError> {
        let user = self
            .users
            .find_by_tenant_and_name(tenant_id, user_name)
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))?
            .ok_or(AuthError::BadCredentials)?;
        if user.disabled {
            return Err(AuthError::UserDisabled);
        }
        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::BadCredentials);
        }
        if user.mfa_enabled {
            if user.totp_secret_b32.is_empty() {
                return Err(AuthError::MfaMisconfigured);
            }
            let code = totp.unwrap_or("").trim();
            if code.is_empty() {
                return Err(AuthError::MfaRequired);
            }
            let now = now_epoch_ms() as u64 / 1000;
            if !totp_verify(
                &user.totp_secret_b32,
                code,
                now,
                user.totp_digits,
                user.totp_period,
                TOTP_LOGIN_WINDOW,
            ) {
                return Err(AuthError::BadTotp);
            }
        }
        Ok(user)
    }

    /// 由用户构造签发身份。站点限制取 site_roles 的键集。
    pub fn identity_for(&self, user: &User, tenant_slug: &str) -> Identity {
        Identity {
            sub: user.user_name.clone(),
            role: user.role,
            tenant_slug: tenant_slug.to_string(),
            tenant_id: user.tenant_id.clone(),
            site_ids: user.site_roles.keys().cloned().collect(),
        }
    }

    pub fn issue_token(&self, identity: &Identity) -> Result<String, AuthError> {
        self.signer.issue(identity)
    }

    /// 解析 `Authorization: Bearer …` 并校验 token。
    pub fn authenticate_bearer(&self, authorization: &str) -> Result<Identity, AuthError> {
        let token = authorization
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingBearer)?;
        if token.is_empty() {
            return Err(AuthError::MissingBearer);
        }
        self.signer.verify(token)
    }

    /// 校验 token 并要求最低角色。
    pub fn require(&self, required: Role, authorization: &str) -> Result<Identity, AuthError> {
        let identity = self.authenticate_bearer(authorization)?;
        if identity.role < required {
            return Err(AuthError::InsufficientRole);
        }
        Ok(identity)
    }
}

/// 认证能力 trait，便于替换实现与测试。
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login_verify(
        &self,
        tenant_id: &str,
        user_name: &str,
        password: &str,
        totp: Option<&str>,
    ) -> Result<User, AuthError>;
    fn authenticate_bearer(&self, authorization: &str) -> Result<Identity, AuthError>;
    fn require(&self, required: Role, authorization: &str) -> Result<Identity, AuthError>;
}

#[async_trait]
impl Authenticator for AuthService {
    async fn login_verify(
        &self,
        tenant_id: &str,
        user_name: &str,
        password: &str,
        totp: Option<&str>,
    ) -> Result<User, AuthError> {
        self.login_verify(tenant_id, user_name, password, totp).await
    }

    fn authenticate_bearer(&self, authorization: &str) -> Result<Identity, AuthError> {
        self.authenticate_bearer(authorization)
    }

    fn require(&self, required: Role, authorization: &str) -> Result<Identity, AuthError> {
        self.require(required, authorization)
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
