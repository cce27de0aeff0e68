//! Password reset repository

use crate::{db::with_deadline, error::AppError, models::password::PasswordReset};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PasswordResetRepository {
    db: PgPool,
}

impl PasswordResetRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        tenant_id: &str,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordReset, AppError> {
        with_deadline(
            sqlx::query_as::<_, PasswordReset>(
                r#"
                INSERT INTO password_resets (tenant_id, user_id, token_hash, expires_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id, tenant_id, user_id, token_hash, expires_at, used_at, created_at
                "#,
            )
            .bind(tenant_id)
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .fetch_one(&self.db),
        )
        .await
    }

    /// 有效性以数据库时钟为准
    pub async fn find_valid_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordReset>, AppError> {
        with_deadline(
            sqlx::query_as::<_, PasswordReset>(
                r#"
                SELECT id, tenant_id, user_id, token_hash, expires_at, used_at, created_at
                FROM password_resets
                WHERE token_hash = $1 AND used_at IS NULL AND expires_at > NOW()
                LIMIT 1
                "#,
            )
            .bind(token_hash)
            .fetch_optional(&self.db),
        )
        .await
    }

    /// 返回本次调用是否真正完成了标记；重复调用为 no-op
    pub async fn mark_used(&self, id: Uuid) -> Result<bool, AppError> {
        let result = with_deadline(
            sqlx::query("UPDATE password_resets SET used_at = NOW() WHERE id = $1 AND used_at IS NULL")
                .bind(id)
                .execute(&self.db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
