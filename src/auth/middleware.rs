//! JWT 认证与权限中间件

use crate::{
    auth::jwt::{AccessClaims, TokenCodec},
    error::AppError,
    services::permission_service::PermissionService,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

/// 认证上下文（附加到请求扩展）
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub tenant_id: String,
    pub roles: Vec<String>,
}

impl From<AccessClaims> for AuthContext {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.user_id,
            tenant_id: claims.tenant_id,
            roles: claims.roles,
        }
    }
}

// 实现 FromRequestParts 以便在 handler 中直接提取 AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 从 Authorization 头提取 Bearer 令牌
pub fn extract_token(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)
}

/// 校验访问令牌并返回认证上下文
pub fn authenticate(codec: &TokenCodec, headers: &HeaderMap) -> Result<AuthContext, AppError> {
    let token = extract_token(headers)?;
    let claims = codec.verify_access(&token).map_err(|e| {
        tracing::debug!(reason = e.reason(), "Access token rejected");
        AppError::from(e)
    })?;
    Ok(AuthContext::from(claims))
}

/// JWT 认证中间件 - 必须认证
///
/// 认证上下文同时写入响应扩展，供外层的请求审计使用
pub async fn jwt_auth_middleware(
    State(codec): State<Arc<TokenCodec>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_context = authenticate(&codec, req.headers())?;

    req.extensions_mut().insert(auth_context.clone());

    let mut response = next.run(req).await;
    response.extensions_mut().insert(auth_context);
    Ok(response)
}

/// 路由级权限检查的状态
#[derive(Clone)]
pub struct PermissionGate {
    pub permissions: Arc<PermissionService>,
    pub permission: &'static str,
}

impl PermissionGate {
    pub fn new(permissions: Arc<PermissionService>, permission: &'static str) -> Self {
        Self {
            permissions,
            permission,
        }
    }
}

/// 权限中间件，需位于认证中间件之内
pub async fn require_permission_middleware(
    State(gate): State<PermissionGate>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = req
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or(AppError::Unauthorized)?;

    gate.permissions.require(&ctx, gate.permission).await?;

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            b"access-secret-for-middleware-tests1",
            b"refresh-secret-for-middleware-test1",
            "sisfo",
            "api",
            Duration::from_secs(900),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_extract_token_valid() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer test_token_123".parse().unwrap());

        let token = extract_token(&headers).unwrap();
        assert_eq!(token, "test_token_123");
    }

    #[test]
    fn test_extract_token_missing() {
        let headers = HeaderMap::new();
        assert!(extract_token(&headers).is_err());
    }

    #[test]
    fn test_extract_token_invalid_format() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(extract_token(&headers).is_err());

        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert!(extract_token(&headers).is_err());
    }

    #[test]
    fn test_authenticate_builds_context() {
        let codec = codec();
        let user = Uuid::new_v4();
        let token = codec.issue_access(user, "t1", vec!["admin".into()]).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());

        let ctx = authenticate(&codec, &headers).unwrap();
        assert_eq!(ctx.user_id, user);
        assert_eq!(ctx.tenant_id, "t1");
        assert_eq!(ctx.roles, vec!["admin".to_string()]);
    }

    #[test]
    fn test_authenticate_rejects_refresh_token() {
        let codec = codec();
        let token = codec.issue_refresh(Uuid::new_v4()).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());

        assert!(matches!(authenticate(&codec, &headers), Err(AppError::Unauthorized)));
    }
}
