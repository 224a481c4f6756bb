mod auth;
mod context;

pub use auth::{require_role_strict, require_tenant_site_strict, require_tenant_strict};
pub use context::{cors, request_context};
