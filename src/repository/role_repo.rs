//! Role repository (角色数据访问)

use crate::{db::with_deadline, error::AppError, models::role::Role};
use sqlx::PgPool;
use uuid::Uuid;

const ROLE_COLUMNS: &str =
    "id, tenant_id, name, description, is_system_role, created_at, updated_at, deleted_at";

pub struct RoleRepository {
    db: PgPool,
}

impl RoleRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ==================== Roles ====================

    pub async fn create(
        &self,
        tenant_id: &str,
        name: &str,
        description: Option<&str>,
        is_system_role: bool,
    ) -> Result<Role, AppError> {
        let sql = format!(
            r#"
            INSERT INTO roles (tenant_id, name, description, is_system_role)
            VALUES ($1, $2, $3, $4)
            RETURNING {ROLE_COLUMNS}
            "#
        );

        let result = with_deadline(
            sqlx::query_as::<_, Role>(&sql)
                .bind(tenant_id)
                .bind(name)
                .bind(description)
                .bind(is_system_role)
                .fetch_one(&self.db),
        )
        .await;

        match result {
            Err(AppError::Database(e)) if crate::error::is_unique_violation(&e) => {
                Err(AppError::Conflict(format!("role {name} already exists")))
            }
            other => other,
        }
    }

    /// 根据名称查找租户内角色（忽略已删除）
    pub async fn find_by_name(&self, tenant_id: &str, name: &str) -> Result<Option<Role>, AppError> {
        let sql = format!(
            r#"
            SELECT {ROLE_COLUMNS} FROM roles
            WHERE tenant_id = $1 AND name = $2 AND deleted_at IS NULL
            LIMIT 1
            "#
        );

        with_deadline(
            sqlx::query_as::<_, Role>(&sql)
                .bind(tenant_id)
                .bind(name)
                .fetch_optional(&self.db),
        )
        .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 AND deleted_at IS NULL LIMIT 1"
        );

        with_deadline(
            sqlx::query_as::<_, Role>(&sql)
                .bind(id)
                .fetch_optional(&self.db),
        )
        .await
    }

    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Role>, AppError> {
        let sql = format!(
            r#"
            SELECT {ROLE_COLUMNS} FROM roles
            WHERE tenant_id = $1 AND deleted_at IS NULL
            ORDER BY name
            "#
        );

        with_deadline(
            sqlx::query_as::<_, Role>(&sql)
                .bind(tenant_id)
                .fetch_all(&self.db),
        )
        .await
    }

    pub async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = with_deadline(
            sqlx::query(
                "UPDATE roles SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id)
            .execute(&self.db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== User Roles ====================

    /// 用户拥有的角色（忽略已删除角色）
    pub async fn list_user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, AppError> {
        let sql = r#"
            SELECT r.id, r.tenant_id, r.name, r.description, r.is_system_role,
                   r.created_at, r.updated_at, r.deleted_at
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = $1 AND r.deleted_at IS NULL
            ORDER BY r.name
        "#;

        with_deadline(
            sqlx::query_as::<_, Role>(sql)
                .bind(user_id)
                .fetch_all(&self.db),
        )
        .await
    }

    pub async fn role_names_for_user(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        with_deadline(
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT r.name
                FROM user_roles ur
                JOIN roles r ON r.id = ur.role_id
                WHERE ur.user_id = $1 AND r.deleted_at IS NULL
                ORDER BY r.name
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.db),
        )
        .await
    }

    /// 幂等分配
    pub async fn assign_user_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), AppError> {
        with_deadline(
            sqlx::query(
                r#"
                INSERT INTO user_roles (user_id, role_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(role_id)
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    pub async fn unassign_user_role(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, AppError> {
        let result = with_deadline(
            sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
                .bind(user_id)
                .bind(role_id)
                .execute(&self.db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
