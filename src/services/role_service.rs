//! 用户角色分配服务

use crate::{
    auth::AuthContext,
    error::AppError,
    models::{
        audit::{AuditAction, NewAuditLog},
        role::{AssignRoleRequest, Permission, Role, RoleResponse},
    },
    repository::{PermissionRepository, RoleRepository, UserRepository},
    services::{permission_service::parse_permission, AuditService},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub struct RoleService {
    db: PgPool,
    audit: Arc<AuditService>,
}

impl RoleService {
    pub fn new(db: PgPool, audit: Arc<AuditService>) -> Self {
        Self { db, audit }
    }

    /// 按名称查找租户内角色，不存在则创建
    pub async fn ensure_role(&self, tenant_id: &str, name: &str) -> Result<Role, AppError> {
        let repo = RoleRepository::new(self.db.clone());
        if let Some(role) = repo.find_by_name(tenant_id, name).await? {
            return Ok(role);
        }

        match repo.create(tenant_id, name, None, false).await {
            Ok(role) => Ok(role),
            // 并发创建时读取对方写入的记录
            Err(AppError::Conflict(_)) => repo
                .find_by_name(tenant_id, name)
                .await?
                .ok_or_else(|| AppError::Internal(format!("role {name} vanished"))),
            Err(e) => Err(e),
        }
    }

    /// 幂等分配角色
    pub async fn assign_by_name(&self, tenant_id: &str, user_id: Uuid, name: &str) -> Result<Role, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("role_name is required".to_string()));
        }

        let role = self.ensure_role(tenant_id, name).await?;
        RoleRepository::new(self.db.clone())
            .assign_user_role(user_id, role.id)
            .await?;

        Ok(role)
    }

    pub async fn assign(
        &self,
        ctx: &AuthContext,
        user_id: Uuid,
        req: AssignRoleRequest,
    ) -> Result<RoleResponse, AppError> {
        if let Some(tenant_id) = req.tenant_id.as_deref() {
            if tenant_id != ctx.tenant_id {
                return Err(AppError::BadRequest("tenant mismatch".to_string()));
            }
        }
        self.ensure_user_in_tenant(ctx, user_id).await?;

        let role = self.assign_by_name(&ctx.tenant_id, user_id, &req.role_name).await?;

        self.audit
            .record(
                NewAuditLog::new(AuditAction::UserRoleAssign, ctx.tenant_id.as_str())
                    .user(Some(ctx.user_id))
                    .resource("user", Some(user_id))
                    .payload(json!({ "role_id": role.id, "role_name": role.name })),
            )
            .await;

        Ok(role.into())
    }

    pub async fn list_user_roles(&self, ctx: &AuthContext, user_id: Uuid) -> Result<Vec<RoleResponse>, AppError> {
        self.ensure_user_in_tenant(ctx, user_id).await?;

        let roles = RoleRepository::new(self.db.clone())
            .list_user_roles(user_id)
            .await?;

        Ok(roles.into_iter().map(RoleResponse::from).collect())
    }

    pub async fn unassign(&self, ctx: &AuthContext, user_id: Uuid, role_id: Uuid) -> Result<(), AppError> {
        self.ensure_user_in_tenant(ctx, user_id).await?;

        let repo = RoleRepository::new(self.db.clone());
        repo.find_by_id(role_id)
            .await?
            .filter(|r| r.tenant_id == ctx.tenant_id)
            .ok_or_else(|| AppError::NotFound("role".to_string()))?;

        let removed = repo.unassign_user_role(user_id, role_id).await?;

        self.audit
            .record(
                NewAuditLog::new(AuditAction::UserRoleUnassign, ctx.tenant_id.as_str())
                    .user(Some(ctx.user_id))
                    .resource("user", Some(user_id))
                    .payload(json!({ "role_id": role_id, "removed": removed })),
            )
            .await;

        Ok(())
    }

    /// 给角色授予 "resource:action" 权限，权限不存在时创建
    pub async fn grant_permission(&self, role_id: Uuid, permission: &str) -> Result<Permission, AppError> {
        let (resource, action) = parse_permission(permission)
            .ok_or_else(|| AppError::BadRequest(format!("invalid permission: {permission}")))?;

        let repo = PermissionRepository::new(self.db.clone());
        let permission = repo.create(resource, action, None).await?;
        repo.assign_to_role(role_id, permission.id).await?;

        Ok(permission)
    }

    async fn ensure_user_in_tenant(&self, ctx: &AuthContext, user_id: Uuid) -> Result<(), AppError> {
        UserRepository::new(self.db.clone())
            .find_by_id(user_id)
            .await?
            .filter(|u| u.tenant_id == ctx.tenant_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("user".to_string()))
    }
}
