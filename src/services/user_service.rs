//! 用户管理服务（租户内）

use crate::{
    auth::{AuthContext, PasswordHasher, PasswordPolicy},
    error::AppError,
    models::{
        audit::{AuditAction, NewAuditLog},
        user::{CreateUserRequest, UpdateUserRequest, User, UserChanges, UserList, UserResponse},
        Pagination,
    },
    repository::{PasswordHistoryRepository, UserRepository},
    services::AuditService,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub struct UserService {
    db: PgPool,
    hasher: Arc<PasswordHasher>,
    policy: PasswordPolicy,
    history_size: usize,
    audit: Arc<AuditService>,
}

impl UserService {
    pub fn new(
        db: PgPool,
        hasher: Arc<PasswordHasher>,
        policy: PasswordPolicy,
        history_size: usize,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            db,
            hasher,
            policy,
            history_size,
            audit,
        }
    }

    pub async fn create(&self, ctx: &AuthContext, req: CreateUserRequest) -> Result<UserResponse, AppError> {
        req.validate()?;
        self.policy.validate(&req.password)?;

        let hash = self.hasher.hash(&req.password)?;
        let user = UserRepository::new(self.db.clone())
            .create(&ctx.tenant_id, &req.email, &hash, req.is_active.unwrap_or(true))
            .await?;
        self.remember_hash(user.id, &hash).await?;

        self.audit
            .record(
                NewAuditLog::new(AuditAction::UserCreate, ctx.tenant_id.as_str())
                    .user(Some(ctx.user_id))
                    .resource("user", Some(user.id))
                    .payload(json!({ "email": user.email, "is_active": user.is_active })),
            )
            .await;
        tracing::info!(user_id = %user.id, tenant_id = %ctx.tenant_id, "User created");

        Ok(user.into())
    }

    /// 由系统创建账号（消息消费、开发环境引导），不做强度检查
    pub async fn provision(&self, tenant_id: &str, email: &str, password: &str) -> Result<User, AppError> {
        let hash = self.hasher.hash(password)?;
        let user = UserRepository::new(self.db.clone())
            .create(tenant_id, email, &hash, true)
            .await?;
        self.remember_hash(user.id, &hash).await?;

        self.audit
            .record(
                NewAuditLog::new(AuditAction::UserCreate, tenant_id)
                    .resource("user", Some(user.id))
                    .payload(json!({ "email": user.email, "source": "system" })),
            )
            .await;

        Ok(user)
    }

    pub async fn get(&self, ctx: &AuthContext, id: Uuid) -> Result<UserResponse, AppError> {
        self.find_in_tenant(ctx, id).await.map(UserResponse::from)
    }

    pub async fn list(&self, ctx: &AuthContext, page: Pagination) -> Result<UserList, AppError> {
        let (limit, offset) = page.normalize();
        let (users, total) = UserRepository::new(self.db.clone())
            .list_by_tenant(&ctx.tenant_id, limit, offset)
            .await?;

        Ok(UserList {
            items: users.into_iter().map(UserResponse::from).collect(),
            total,
            limit,
            offset,
        })
    }

    pub async fn update(
        &self,
        ctx: &AuthContext,
        id: Uuid,
        req: UpdateUserRequest,
    ) -> Result<UserResponse, AppError> {
        req.validate()?;
        let existing = self.find_in_tenant(ctx, id).await?;

        let password_hash = match req.password.as_deref() {
            Some(password) => {
                self.policy.validate(password)?;
                Some(self.hasher.hash(password)?)
            }
            None => None,
        };

        let changes = UserChanges {
            email: req.email.clone(),
            password_hash: password_hash.clone(),
            is_active: req.is_active,
        };

        let user = UserRepository::new(self.db.clone())
            .update(id, &changes)
            .await?
            .ok_or_else(|| AppError::NotFound("user".to_string()))?;

        if let Some(hash) = password_hash.as_deref() {
            self.remember_hash(user.id, hash).await?;
        }

        self.audit
            .record(
                NewAuditLog::new(AuditAction::UserUpdate, ctx.tenant_id.as_str())
                    .user(Some(ctx.user_id))
                    .resource("user", Some(user.id))
                    .old_values(json!({ "email": existing.email, "is_active": existing.is_active }))
                    .payload(json!({
                        "email": user.email,
                        "is_active": user.is_active,
                        "password_changed": changes.password_hash.is_some(),
                    })),
            )
            .await;

        Ok(user.into())
    }

    pub async fn delete(&self, ctx: &AuthContext, id: Uuid) -> Result<(), AppError> {
        self.find_in_tenant(ctx, id).await?;

        if !UserRepository::new(self.db.clone()).soft_delete(id).await? {
            return Err(AppError::NotFound("user".to_string()));
        }

        self.audit
            .record(
                NewAuditLog::new(AuditAction::UserDelete, ctx.tenant_id.as_str())
                    .user(Some(ctx.user_id))
                    .resource("user", Some(id)),
            )
            .await;
        tracing::info!(user_id = %id, tenant_id = %ctx.tenant_id, "User deleted");

        Ok(())
    }

    /// 其他租户的用户一律视为不存在
    pub async fn find_in_tenant(&self, ctx: &AuthContext, id: Uuid) -> Result<User, AppError> {
        UserRepository::new(self.db.clone())
            .find_by_id(id)
            .await?
            .filter(|u| u.tenant_id == ctx.tenant_id)
            .ok_or_else(|| AppError::NotFound("user".to_string()))
    }

    async fn remember_hash(&self, user_id: Uuid, hash: &str) -> Result<(), AppError> {
        let history = PasswordHistoryRepository::new(self.db.clone());
        history.add(user_id, hash).await?;
        history.prune(user_id, self.history_size as i64).await?;
        Ok(())
    }
}
