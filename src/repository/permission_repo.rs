//! Permission repository (权限数据访问)

use crate::{db::with_deadline, error::AppError, models::role::Permission};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PermissionRepository {
    db: PgPool,
}

impl PermissionRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 创建权限；已存在时返回现有记录
    pub async fn create(
        &self,
        resource: &str,
        action: &str,
        description: Option<&str>,
    ) -> Result<Permission, AppError> {
        with_deadline(
            sqlx::query_as::<_, Permission>(
                r#"
                INSERT INTO permissions (resource, action, description)
                VALUES ($1, $2, $3)
                ON CONFLICT (resource, action)
                DO UPDATE SET description = COALESCE(EXCLUDED.description, permissions.description)
                RETURNING id, resource, action, description, created_at
                "#,
            )
            .bind(resource)
            .bind(action)
            .bind(description)
            .fetch_one(&self.db),
        )
        .await
    }

    pub async fn find_by_resource_action(
        &self,
        resource: &str,
        action: &str,
    ) -> Result<Option<Permission>, AppError> {
        with_deadline(
            sqlx::query_as::<_, Permission>(
                r#"
                SELECT id, resource, action, description, created_at
                FROM permissions
                WHERE resource = $1 AND action = $2
                "#,
            )
            .bind(resource)
            .bind(action)
            .fetch_optional(&self.db),
        )
        .await
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Permission>, AppError> {
        with_deadline(
            sqlx::query_as::<_, Permission>(
                r#"
                SELECT id, resource, action, description, created_at
                FROM permissions
                ORDER BY resource, action
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db),
        )
        .await
    }

    /// 幂等绑定
    pub async fn assign_to_role(&self, role_id: Uuid, permission_id: Uuid) -> Result<(), AppError> {
        with_deadline(
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id)
            .bind(permission_id)
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    pub async fn list_by_role(&self, role_id: Uuid) -> Result<Vec<Permission>, AppError> {
        with_deadline(
            sqlx::query_as::<_, Permission>(
                r#"
                SELECT p.id, p.resource, p.action, p.description, p.created_at
                FROM role_permissions rp
                JOIN permissions p ON p.id = rp.permission_id
                WHERE rp.role_id = $1
                ORDER BY p.resource, p.action
                "#,
            )
            .bind(role_id)
            .fetch_all(&self.db),
        )
        .await
    }

    /// 用户在租户内是否通过未删除角色拥有 resource:action
    pub async fn user_has_permission(
        &self,
        user_id: Uuid,
        tenant_id: &str,
        resource: &str,
        action: &str,
    ) -> Result<bool, AppError> {
        with_deadline(
            sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS (
                    SELECT 1
                    FROM user_roles ur
                    JOIN roles r ON r.id = ur.role_id
                    JOIN role_permissions rp ON rp.role_id = r.id
                    JOIN permissions p ON p.id = rp.permission_id
                    WHERE ur.user_id = $1
                      AND r.tenant_id = $2
                      AND r.deleted_at IS NULL
                      AND p.resource = $3
                      AND p.action = $4
                )
                "#,
            )
            .bind(user_id)
            .bind(tenant_id)
            .bind(resource)
            .bind(action)
            .fetch_one(&self.db),
        )
        .await
    }
}
