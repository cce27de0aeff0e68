//! 密码服务：修改密码、忘记密码、重置密码

use crate::{
    auth::{PasswordHasher, PasswordPolicy},
    error::AppError,
    models::{
        audit::{AuditAction, NewAuditLog},
        user::{normalize_email, User},
    },
    rabbitmq::{SharedEventSink, PASSWORD_RESET_ROUTING_KEY},
    repository::{PasswordHistoryRepository, PasswordResetRepository, UserRepository},
    services::AuditService,
};
use chrono::Utc;
use rand::RngCore;
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const PASSWORD_REUSED: &str = "password_reused";

/// 重置令牌：32 字节随机数的十六进制
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// 数据库只保存令牌的 SHA-256 十六进制
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub struct PasswordService {
    db: PgPool,
    hasher: Arc<PasswordHasher>,
    policy: PasswordPolicy,
    history_size: usize,
    reset_ttl: Duration,
    events: SharedEventSink,
    audit: Arc<AuditService>,
}

impl PasswordService {
    pub fn new(
        db: PgPool,
        hasher: Arc<PasswordHasher>,
        policy: PasswordPolicy,
        history_size: usize,
        reset_ttl: Duration,
        events: SharedEventSink,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            db,
            hasher,
            policy,
            history_size,
            reset_ttl,
            events,
            audit,
        }
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        self.policy.validate(new_password)?;

        let user = UserRepository::new(self.db.clone())
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AppError::Unauthorized)?;

        if !self.hasher.matches(old_password, &user.password_hash) {
            self.audit
                .record(
                    NewAuditLog::new(AuditAction::AuthChangePassword, user.tenant_id.as_str())
                        .user(Some(user.id))
                        .outcome(false, Some("bad_password")),
                )
                .await;
            return Err(AppError::Unauthorized);
        }

        self.ensure_not_reused(&user, new_password).await?;
        self.store_new_password(&user, new_password).await?;

        self.audit
            .record(
                NewAuditLog::new(AuditAction::AuthChangePassword, user.tenant_id.as_str())
                    .user(Some(user.id))
                    .outcome(true, None),
            )
            .await;
        tracing::info!(user_id = %user.id, "Password changed");

        Ok(())
    }

    /// 返回明文令牌（用户不存在时为 None）；调用方决定是否回显
    pub async fn forgot_password(&self, tenant_id: &str, email: &str) -> Result<Option<String>, AppError> {
        let tenant_id = tenant_id.trim();
        let email = normalize_email(email);
        if tenant_id.is_empty() || email.is_empty() {
            return Err(AppError::BadRequest("tenant_id and email are required".to_string()));
        }

        let user = UserRepository::new(self.db.clone())
            .find_by_email(tenant_id, &email)
            .await?
            .filter(|u| u.is_active);

        let token = match user {
            Some(user) => {
                let token = generate_reset_token();
                let expires_at = Utc::now()
                    + chrono::Duration::from_std(self.reset_ttl)
                        .map_err(|e| AppError::Internal(format!("invalid reset ttl: {e}")))?;

                PasswordResetRepository::new(self.db.clone())
                    .create(tenant_id, user.id, &hash_reset_token(&token), expires_at)
                    .await?;

                let event = json!({
                    "tenant_id": tenant_id,
                    "user_id": user.id,
                    "email": user.email,
                    "token": token,
                    "type": "password_reset",
                    "timestamp": Utc::now().to_rfc3339(),
                });
                if let Err(e) = self.events.publish(PASSWORD_RESET_ROUTING_KEY, &event).await {
                    tracing::error!(user_id = %user.id, error = %e, "Failed to publish password reset event");
                }

                Some(token)
            }
            None => {
                tracing::debug!(tenant_id, "Forgot password for unknown account");
                None
            }
        };

        self.audit
            .record(NewAuditLog::new(AuditAction::AuthForgotPassword, tenant_id).outcome(true, None))
            .await;

        Ok(token)
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Unauthorized);
        }

        let reset_repo = PasswordResetRepository::new(self.db.clone());
        let reset = reset_repo
            .find_valid_by_token_hash(&hash_reset_token(token))
            .await?
            .ok_or(AppError::Unauthorized)?;

        self.policy.validate(new_password)?;

        let user = UserRepository::new(self.db.clone())
            .find_by_id(reset.user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        self.ensure_not_reused(&user, new_password).await?;

        // 并发兑换时只有一个调用能完成标记
        if !reset_repo.mark_used(reset.id).await? {
            return Err(AppError::Unauthorized);
        }

        self.store_new_password(&user, new_password).await?;

        self.audit
            .record(
                NewAuditLog::new(AuditAction::AuthResetPassword, reset.tenant_id.as_str())
                    .user(Some(user.id))
                    .outcome(true, None),
            )
            .await;
        tracing::info!(user_id = %user.id, "Password reset");

        Ok(())
    }

    /// 当前密码与最近 N 条历史都不能重复使用
    async fn ensure_not_reused(&self, user: &User, new_password: &str) -> Result<(), AppError> {
        if self.hasher.matches(new_password, &user.password_hash) {
            return Err(AppError::BadRequest(PASSWORD_REUSED.to_string()));
        }

        let history = PasswordHistoryRepository::new(self.db.clone())
            .recent(user.id, self.history_size as i64)
            .await?;

        if history
            .iter()
            .any(|entry| self.hasher.matches(new_password, &entry.password_hash))
        {
            return Err(AppError::BadRequest(PASSWORD_REUSED.to_string()));
        }

        Ok(())
    }

    async fn store_new_password(&self, user: &User, new_password: &str) -> Result<(), AppError> {
        let hash = self.hasher.hash(new_password)?;

        if !UserRepository::new(self.db.clone())
            .update_password(user.id, &hash)
            .await?
        {
            return Err(AppError::Unauthorized);
        }

        let history = PasswordHistoryRepository::new(self.db.clone());
        history.add(user.id, &hash).await?;
        history.prune(user.id, self.history_size as i64).await?;

        Ok(())
    }
}
