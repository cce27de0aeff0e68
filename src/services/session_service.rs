//! 会话服务：登录、刷新（轮换并吊销前一个令牌）、登出

use crate::{
    auth::{jwt::TokenPair, PasswordHasher, TokenCodec},
    error::AppError,
    models::{
        audit::{AuditAction, NewAuditLog},
        auth::{LoginRequest, MeResponse},
        user::normalize_email,
    },
    repository::{RoleRepository, UserRepository},
    services::AuditService,
    store::{LockoutPolicy, LoginGuard, SharedStore, TokenRevocation},
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub struct SessionService {
    db: PgPool,
    tokens: Arc<TokenCodec>,
    store: SharedStore,
    hasher: Arc<PasswordHasher>,
    audit: Arc<AuditService>,
    lockout: LockoutPolicy,
}

impl SessionService {
    pub fn new(
        db: PgPool,
        tokens: Arc<TokenCodec>,
        store: SharedStore,
        hasher: Arc<PasswordHasher>,
        audit: Arc<AuditService>,
        lockout: LockoutPolicy,
    ) -> Self {
        Self {
            db,
            tokens,
            store,
            hasher,
            audit,
            lockout,
        }
    }

    /// 用户登录
    pub async fn login(&self, req: LoginRequest) -> Result<TokenPair, AppError> {
        let tenant_id = req.tenant_id.trim().to_string();
        let email = normalize_email(&req.email);
        if tenant_id.is_empty() || email.is_empty() || req.password.is_empty() {
            return Err(AppError::BadRequest(
                "tenant_id, email and password are required".to_string(),
            ));
        }

        // 锁定检查；存储不可用时不阻止登录
        match self.store.is_locked(&tenant_id, &email).await {
            Ok(true) => {
                self.audit_login(&tenant_id, None, false, Some("locked")).await;
                return Err(AppError::AccountRestricted("account locked".to_string()));
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Lockout check failed, continuing"),
        }

        let user_repo = UserRepository::new(self.db.clone());
        let Some(user) = user_repo.find_by_email(&tenant_id, &email).await? else {
            self.note_failure(&tenant_id, &email).await;
            self.audit_login(&tenant_id, None, false, Some("unknown_user")).await;
            return Err(AppError::Unauthorized);
        };

        if !user.is_active {
            self.audit_login(&tenant_id, Some(user.id), false, Some("inactive")).await;
            return Err(AppError::AccountRestricted("account inactive".to_string()));
        }

        if !self.hasher.matches(&req.password, &user.password_hash) {
            self.note_failure(&tenant_id, &email).await;
            self.audit_login(&tenant_id, Some(user.id), false, Some("bad_password")).await;
            return Err(AppError::Unauthorized);
        }

        if let Err(e) = self.store.clear_failures(&tenant_id, &email).await {
            tracing::warn!(error = %e, "Failed to clear login failures");
        }

        let roles = RoleRepository::new(self.db.clone())
            .role_names_for_user(user.id)
            .await?;
        let pair = self.tokens.issue_pair(user.id, &user.tenant_id, roles)?;

        self.audit_login(&tenant_id, Some(user.id), true, None).await;
        tracing::info!(user_id = %user.id, tenant_id = %tenant_id, "User logged in");

        Ok(pair)
    }

    /// 刷新令牌：签发新令牌对，并吊销旧的 refresh token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        if refresh_token.trim().is_empty() {
            return Err(AppError::BadRequest("refresh_token is required".to_string()));
        }

        let claims = match self.tokens.verify_refresh(refresh_token.trim()) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(reason = e.reason(), "Refresh token rejected");
                self.audit_refresh("", None, false, Some(e.reason())).await;
                return Err(AppError::from(e));
            }
        };
        let user_id = claims.user_id()?;

        // 吊销表不可用时拒绝刷新
        if self.store.is_revoked(&claims.jti).await? {
            tracing::warn!(user_id = %user_id, jti = %claims.jti, "Revoked refresh token presented");
            self.audit_refresh("", Some(user_id), false, Some("revoked")).await;
            return Err(AppError::Unauthorized);
        }

        let user = match UserRepository::new(self.db.clone()).find_by_id(user_id).await? {
            Some(user) if user.is_active => user,
            Some(user) => {
                self.audit_refresh(&user.tenant_id, Some(user.id), false, Some("inactive")).await;
                return Err(AppError::Unauthorized);
            }
            None => {
                self.audit_refresh("", Some(user_id), false, Some("unknown_user")).await;
                return Err(AppError::Unauthorized);
            }
        };

        let roles = RoleRepository::new(self.db.clone())
            .role_names_for_user(user.id)
            .await?;
        let pair = self.tokens.issue_pair(user.id, &user.tenant_id, roles)?;

        // 旧令牌吊销失败时不返回新令牌
        if let Err(e) = self.store.mark_revoked(&claims.jti, claims.remaining()).await {
            tracing::error!(error = %e, jti = %claims.jti, "Failed to revoke rotated refresh token");
            self.audit_refresh(&user.tenant_id, Some(user.id), false, Some("revocation_failed"))
                .await;
            return Err(AppError::from(e));
        }

        self.audit_refresh(&user.tenant_id, Some(user.id), true, None).await;

        Ok(pair)
    }

    /// 登出：尽力吊销，客户端始终看到成功
    pub async fn logout(&self, refresh_token: Option<&str>) {
        let mut tenant_id = String::new();
        let mut user_id = None;

        let presented = refresh_token.map(str::trim).filter(|t| !t.is_empty());
        if let Some(claims) = presented.and_then(|t| self.tokens.verify_refresh(t).ok()) {
            if let Err(e) = self
                .store
                .mark_revoked(&claims.jti, self.tokens.refresh_ttl())
                .await
            {
                tracing::warn!(error = %e, jti = %claims.jti, "Failed to revoke refresh token on logout");
            }

            user_id = claims.user_id().ok();
            if let Some(id) = user_id {
                match UserRepository::new(self.db.clone()).find_by_id(id).await {
                    Ok(Some(user)) => tenant_id = user.tenant_id,
                    Ok(None) => {}
                    Err(e) => tracing::debug!(error = %e, "Tenant lookup for logout audit failed"),
                }
            }
        }

        self.audit
            .record(
                NewAuditLog::new(AuditAction::AuthLogout, tenant_id)
                    .user(user_id)
                    .outcome(true, None),
            )
            .await;
    }

    /// 当前用户信息，角色从数据库重新读取
    pub async fn me(&self, user_id: Uuid) -> Result<MeResponse, AppError> {
        let user = UserRepository::new(self.db.clone())
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AppError::Unauthorized)?;

        let roles = RoleRepository::new(self.db.clone())
            .role_names_for_user(user.id)
            .await?;

        Ok(MeResponse {
            id: user.id,
            tenant_id: user.tenant_id,
            email: user.email,
            roles,
        })
    }

    async fn note_failure(&self, tenant_id: &str, email: &str) {
        match self.store.record_failure(tenant_id, email, &self.lockout).await {
            Ok(true) => tracing::warn!(tenant_id, email, "Account locked after repeated failures"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to record login failure"),
        }
    }

    async fn audit_login(&self, tenant_id: &str, user_id: Option<Uuid>, success: bool, reason: Option<&str>) {
        self.audit
            .record(
                NewAuditLog::new(AuditAction::AuthLogin, tenant_id)
                    .user(user_id)
                    .outcome(success, reason),
            )
            .await;
    }

    async fn audit_refresh(&self, tenant_id: &str, user_id: Option<Uuid>, success: bool, reason: Option<&str>) {
        self.audit
            .record(
                NewAuditLog::new(AuditAction::AuthRefresh, tenant_id)
                    .user(user_id)
                    .outcome(success, reason),
            )
            .await;
    }
}
