use crate::{AuthError, Identity};
use domain::Role;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// JWT 内部 claims。`iat = nbf = 签发时刻`。
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: String,
    tenant_slug: String,
    tenant_id: String,
    #[serde(default)]
    site_ids: Vec<String>,
    iat: u64,
    nbf: u64,
    exp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aud: Option<String>,
}

/// HS256 签发与校验。
pub struct JwtSigner {
    secret: Vec<u8>,
    ttl_seconds: u64,
    iss: Option<String>,
    aud: Option<String>,
}

impl JwtSigner {
    /// 创建签发器。iss/aud 配置后在校验时强制匹配。
    pub fn new(secret: String, ttl_seconds: u64, iss: Option<String>, aud: Option<String>) -> Self {
        Self {
            secret: secret.into_bytes(),
            ttl_seconds,
            iss,
            aud,
        }
    }

    pub fn has_secret(&self) -> bool {
        !self.secret.is_empty()
    }

    /// 基于 Identity 签发 access token（默认 TTL）。
    pub fn issue(&self, identity: &Identity) -> Result<String, AuthError> {
        self.issue_with_ttl(identity, self.ttl_seconds)
    }

    /// 基于 Identity 签发指定 TTL 的 token。
    pub fn issue_with_ttl(&self, identity: &Identity, ttl_seconds: u64) -> Result<String, AuthError> {
        let now = now_epoch_seconds();
        let claims = Claims {
            sub: identity.sub.clone(),
            role: identity.role.as_str().to_string(),
            tenant_slug: identity.tenant_slug.clone(),
            tenant_id: identity.tenant_id.clone(),
            site_ids: identity.site_ids.clone(),
            iat: now,
            nbf: now,
            exp: now + ttl_seconds,
            iss: self.iss.clone(),
            aud: self.aud.clone(),
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|err| AuthError::Internal(err.to_string()))
    }

    /// 校验 token：签名、exp > now、nbf ≤ now，以及配置了的 iss/aud。
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        if let Some(iss) = &self.iss {
            validation.set_issuer(&[iss]);
        }
        if let Some(aud) = &self.aud {
            validation.set_audience(&[aud]);
        } else {
            validation.validate_aud = false;
        }

        let decoded = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(map_jwt_error)?;

        let claims = decoded.claims;
        Ok(Identity {
            sub: claims.sub,
            role: Role::parse(&claims.role).unwrap_or(Role::Viewer),
            tenant_slug: claims.tenant_slug,
            tenant_id: claims.tenant_id,
            site_ids: claims.site_ids,
        })
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature => AuthError::TokenInvalidSignature,
        ErrorKind::ImmatureSignature
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::MissingRequiredClaim(_) => AuthError::TokenBadClaims,
        _ => AuthError::TokenInvalidSignature,
    }
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}
