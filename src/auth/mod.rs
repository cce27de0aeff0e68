//! Authentication and authorization module

pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{AccessClaims, RefreshClaims, TokenCodec, TokenError, TokenPair};
pub use middleware::{
    authenticate, extract_token, jwt_auth_middleware, require_permission_middleware, AuthContext,
    PermissionGate,
};
pub use password::{PasswordHasher, PasswordPolicy};
