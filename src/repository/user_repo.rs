//! User repository (用户数据访问)

use crate::{
    db::with_deadline,
    error::AppError,
    models::user::{normalize_email, User, UserChanges},
};
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, tenant_id, email, password_hash, is_active, created_at, updated_at, deleted_at";

pub struct UserRepository {
    db: PgPool,
}

impl UserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 创建用户；(tenant_id, email) 冲突时返回 Conflict
    pub async fn create(
        &self,
        tenant_id: &str,
        email: &str,
        password_hash: &str,
        is_active: bool,
    ) -> Result<User, AppError> {
        if tenant_id.trim().is_empty() || email.trim().is_empty() || password_hash.is_empty() {
            return Err(AppError::BadRequest("missing fields".to_string()));
        }

        let sql = format!(
            r#"
            INSERT INTO users (tenant_id, email, password_hash, is_active)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );

        let result = with_deadline(
            sqlx::query_as::<_, User>(&sql)
                .bind(tenant_id.trim())
                .bind(normalize_email(email))
                .bind(password_hash)
                .bind(is_active)
                .fetch_one(&self.db),
        )
        .await;

        match result {
            Err(AppError::Database(e)) if crate::error::is_unique_violation(&e) => {
                Err(AppError::Conflict("email already registered".to_string()))
            }
            other => other,
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL LIMIT 1"
        );

        with_deadline(
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(&self.db),
        )
        .await
    }

    /// 邮箱大小写不敏感
    pub async fn find_by_email(&self, tenant_id: &str, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE tenant_id = $1 AND email = $2 AND deleted_at IS NULL
            LIMIT 1
            "#
        );

        with_deadline(
            sqlx::query_as::<_, User>(&sql)
                .bind(tenant_id.trim())
                .bind(normalize_email(email))
                .fetch_optional(&self.db),
        )
        .await
    }

    /// 租户内用户列表及总数
    pub async fn list_by_tenant(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), AppError> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE tenant_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );

        let users = with_deadline(
            sqlx::query_as::<_, User>(&sql)
                .bind(tenant_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db),
        )
        .await?;

        let total: i64 = with_deadline(
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM users WHERE tenant_id = $1 AND deleted_at IS NULL",
            )
            .bind(tenant_id)
            .fetch_one(&self.db),
        )
        .await?;

        Ok((users, total))
    }

    /// 部分更新，未提供的字段保持不变
    pub async fn update(&self, id: Uuid, changes: &UserChanges) -> Result<Option<User>, AppError> {
        let sql = format!(
            r#"
            UPDATE users
            SET
                email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        );

        let result = with_deadline(
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .bind(changes.email.as_deref().map(normalize_email))
                .bind(changes.password_hash.as_deref())
                .bind(changes.is_active)
                .fetch_optional(&self.db),
        )
        .await;

        match result {
            Err(AppError::Database(e)) if crate::error::is_unique_violation(&e) => {
                Err(AppError::Conflict("email already registered".to_string()))
            }
            other => other,
        }
    }

    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool, AppError> {
        let result = with_deadline(
            sqlx::query(
                r#"
                UPDATE users
                SET password_hash = $2, updated_at = NOW()
                WHERE id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(id)
            .bind(password_hash)
            .execute(&self.db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 软删除
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = with_deadline(
            sqlx::query(
                "UPDATE users SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id)
            .execute(&self.db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
