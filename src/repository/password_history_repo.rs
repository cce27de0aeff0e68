//! Password history repository

use crate::{db::with_deadline, error::AppError, models::password::PasswordHistoryEntry};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PasswordHistoryRepository {
    db: PgPool,
}

impl PasswordHistoryRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn add(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError> {
        with_deadline(
            sqlx::query("INSERT INTO password_history (user_id, password_hash) VALUES ($1, $2)")
                .bind(user_id)
                .bind(password_hash)
                .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    /// 最近 n 条，按时间倒序
    pub async fn recent(&self, user_id: Uuid, n: i64) -> Result<Vec<PasswordHistoryEntry>, AppError> {
        with_deadline(
            sqlx::query_as::<_, PasswordHistoryEntry>(
                r#"
                SELECT id, user_id, password_hash, created_at
                FROM password_history
                WHERE user_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2
                "#,
            )
            .bind(user_id)
            .bind(n)
            .fetch_all(&self.db),
        )
        .await
    }

    /// 只保留最近 keep 条
    pub async fn prune(&self, user_id: Uuid, keep: i64) -> Result<u64, AppError> {
        let result = with_deadline(
            sqlx::query(
                r#"
                DELETE FROM password_history
                WHERE user_id = $1
                  AND id NOT IN (
                      SELECT id FROM password_history
                      WHERE user_id = $1
                      ORDER BY created_at DESC, id DESC
                      LIMIT $2
                  )
                "#,
            )
            .bind(user_id)
            .bind(keep)
            .execute(&self.db),
        )
        .await?;

        Ok(result.rows_affected())
    }
}
