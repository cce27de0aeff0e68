//! 权限检查服务

use crate::{auth::AuthContext, error::AppError, repository::PermissionRepository};
use sqlx::PgPool;
use uuid::Uuid;

/// 解析 "resource:action"：恰好一个冒号，两侧去空白后非空
pub fn parse_permission(permission: &str) -> Option<(&str, &str)> {
    let (resource, action) = permission.split_once(':')?;
    if action.contains(':') {
        return None;
    }
    let (resource, action) = (resource.trim(), action.trim());
    if resource.is_empty() || action.is_empty() {
        return None;
    }
    Some((resource, action))
}

pub struct PermissionService {
    db: PgPool,
}

impl PermissionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 检查用户在租户内是否拥有权限；格式错误直接拒绝且不查询数据库
    pub async fn allow(&self, user_id: Uuid, tenant_id: &str, permission: &str) -> Result<bool, AppError> {
        let Some((resource, action)) = parse_permission(permission) else {
            tracing::warn!(permission, "Malformed permission string");
            return Ok(false);
        };

        PermissionRepository::new(self.db.clone())
            .user_has_permission(user_id, tenant_id, resource, action)
            .await
    }

    /// 检查权限，如果无权限则返回错误
    pub async fn require(&self, ctx: &AuthContext, permission: &str) -> Result<(), AppError> {
        if !self.allow(ctx.user_id, &ctx.tenant_id, permission).await? {
            tracing::warn!(
                user_id = %ctx.user_id,
                tenant_id = %ctx.tenant_id,
                permission,
                "Permission denied"
            );
            return Err(AppError::Forbidden);
        }

        Ok(())
    }
}
