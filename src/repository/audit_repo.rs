//! Audit repository (审计数据访问)

use crate::{
    db::with_deadline,
    error::AppError,
    models::audit::{AuditLog, AuditLogFilter, NewAuditLog},
};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgArguments, query::QueryAs, PgPool, Postgres};

const AUDIT_COLUMNS: &str = "id, tenant_id, user_id, action, resource_type, resource_id, old_values, new_values, created_at";

pub struct AuditRepository {
    db: PgPool,
}

/// 按过滤条件拼接 WHERE 子句，参数从 $2 开始（$1 为 tenant_id）
fn filter_clause(filter: &AuditLogFilter) -> (String, usize) {
    let mut clause = String::from(" WHERE tenant_id = $1");
    let mut index = 1;

    if filter.user_id.is_some() {
        index += 1;
        clause.push_str(&format!(" AND user_id = ${}", index));
    }
    if filter.action.is_some() {
        index += 1;
        clause.push_str(&format!(" AND action = ${}", index));
    }
    if filter.resource_type.is_some() {
        index += 1;
        clause.push_str(&format!(" AND resource_type = ${}", index));
    }
    if filter.resource_id.is_some() {
        index += 1;
        clause.push_str(&format!(" AND resource_id = ${}", index));
    }
    if filter.start.is_some() {
        index += 1;
        clause.push_str(&format!(" AND created_at >= ${}", index));
    }
    if filter.end.is_some() {
        index += 1;
        clause.push_str(&format!(" AND created_at <= ${}", index));
    }

    (clause, index)
}

fn bind_filter<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    filter: &'q AuditLogFilter,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    if let Some(user_id) = filter.user_id {
        query = query.bind(user_id);
    }
    if let Some(action) = &filter.action {
        query = query.bind(action);
    }
    if let Some(resource_type) = &filter.resource_type {
        query = query.bind(resource_type);
    }
    if let Some(resource_id) = filter.resource_id {
        query = query.bind(resource_id);
    }
    if let Some(start) = filter.start {
        query = query.bind(start);
    }
    if let Some(end) = filter.end {
        query = query.bind(end);
    }
    query
}

impl AuditRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ==================== Audit Logs ====================

    /// 插入审计日志
    pub async fn insert(&self, entry: &NewAuditLog) -> Result<(), AppError> {
        with_deadline(
            sqlx::query(
                r#"
                INSERT INTO audit_logs (
                    tenant_id, user_id, action, resource_type, resource_id, old_values, new_values
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&entry.tenant_id)
            .bind(entry.user_id)
            .bind(entry.action.as_str())
            .bind(&entry.resource_type)
            .bind(entry.resource_id)
            .bind(&entry.old_values)
            .bind(&entry.new_values)
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    /// 按过滤条件查询，返回本页记录和总数
    pub async fn list(
        &self,
        tenant_id: &str,
        filter: &AuditLogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditLog>, i64), AppError> {
        let (clause, index) = filter_clause(filter);

        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs{clause} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            index + 1,
            index + 2
        );
        let query = bind_filter(sqlx::query_as::<_, AuditLog>(&sql).bind(tenant_id), filter);
        let logs = with_deadline(query.bind(limit).bind(offset).fetch_all(&self.db)).await?;

        let count_sql = format!("SELECT COUNT(*) FROM audit_logs{clause}");
        let count_query =
            bind_filter(sqlx::query_as::<_, (i64,)>(&count_sql).bind(tenant_id), filter);
        let (total,) = with_deadline(count_query.fetch_one(&self.db)).await?;

        Ok((logs, total))
    }

    /// 大小写不敏感的子串搜索：action、resource_type、new_values、old_values
    pub async fn search(
        &self,
        tenant_id: &str,
        q: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditLog>, i64), AppError> {
        let pattern = format!("%{}%", escape_like(q.trim()));
        let condition = r#"
            WHERE tenant_id = $1 AND (
                action ILIKE $2
                OR resource_type ILIKE $2
                OR new_values::text ILIKE $2
                OR COALESCE(old_values::text, '') ILIKE $2
            )
        "#;

        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs {condition} ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        let logs = with_deadline(
            sqlx::query_as::<_, AuditLog>(&sql)
                .bind(tenant_id)
                .bind(&pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db),
        )
        .await?;

        let count_sql = format!("SELECT COUNT(*) FROM audit_logs {condition}");
        let total: i64 = with_deadline(
            sqlx::query_scalar(&count_sql)
                .bind(tenant_id)
                .bind(&pattern)
                .fetch_one(&self.db),
        )
        .await?;

        Ok((logs, total))
    }

    /// 删除早于 cutoff 的记录，返回删除条数
    pub async fn cleanup_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = with_deadline(
            sqlx::query("DELETE FROM audit_logs WHERE created_at < $1")
                .bind(cutoff)
                .execute(&self.db),
        )
        .await?;

        Ok(result.rows_affected())
    }
}

/// 转义 LIKE 通配符，搜索词按字面匹配
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_filter_clause_numbering() {
        let filter = AuditLogFilter {
            user_id: Some(Uuid::new_v4()),
            resource_type: Some("user".into()),
            end: Some(Utc::now()),
            ..Default::default()
        };

        let (clause, index) = filter_clause(&filter);
        assert_eq!(index, 4);
        assert_eq!(
            clause,
            " WHERE tenant_id = $1 AND user_id = $2 AND resource_type = $3 AND created_at <= $4"
        );
    }

    #[test]
    fn test_empty_filter_only_scopes_tenant() {
        let (clause, index) = filter_clause(&AuditLogFilter::default());
        assert_eq!(clause, " WHERE tenant_id = $1");
        assert_eq!(index, 1);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("login"), "login");
    }
}
