//! 审计日志服务

use crate::{
    error::AppError,
    models::audit::{AuditLog, AuditLogFilter, NewAuditLog},
    repository::AuditRepository,
};
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub use crate::models::audit::AuditAction;

/// 保留任务的执行间隔
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 3600);

pub struct AuditService {
    db: PgPool,
}

impl AuditService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 同步写入，错误返回给调用方
    pub async fn log(&self, entry: &NewAuditLog) -> Result<(), AppError> {
        AuditRepository::new(self.db.clone()).insert(entry).await
    }

    /// 同步写入，失败只记录日志
    pub async fn record(&self, entry: NewAuditLog) {
        if let Err(e) = self.log(&entry).await {
            tracing::warn!(
                action = entry.action.as_str(),
                tenant_id = %entry.tenant_id,
                error = %e,
                "Failed to write audit log"
            );
        }
    }

    /// 后台写入，不阻塞响应
    pub fn spawn(self: &Arc<Self>, entry: NewAuditLog) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.record(entry).await;
        });
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        filter: &AuditLogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditLog>, i64), AppError> {
        AuditRepository::new(self.db.clone())
            .list(tenant_id, filter, limit, offset)
            .await
    }

    pub async fn search(
        &self,
        tenant_id: &str,
        q: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditLog>, i64), AppError> {
        AuditRepository::new(self.db.clone())
            .search(tenant_id, q, limit, offset)
            .await
    }

    pub async fn cleanup_older_than(&self, cutoff: chrono::DateTime<Utc>) -> Result<u64, AppError> {
        let deleted = AuditRepository::new(self.db.clone())
            .cleanup_older_than(cutoff)
            .await?;

        tracing::info!(deleted, cutoff = %cutoff, "Audit retention cleanup finished");
        Ok(deleted)
    }

    /// 按保留天数周期性清理
    pub fn spawn_retention_job(self: &Arc<Self>, retention_days: u32) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RETENTION_INTERVAL);
            loop {
                ticker.tick().await;
                let cutoff = Utc::now() - ChronoDuration::days(i64::from(retention_days));
                if let Err(e) = service.cleanup_older_than(cutoff).await {
                    tracing::error!(error = %e, "Audit retention cleanup failed");
                }
            }
        })
    }
}

/// 导出 CSV：id,tenant_id,user_id,action,resource_type,resource_id,created_at
pub fn render_csv(logs: &[AuditLog]) -> String {
    let mut out = String::from("id,tenant_id,user_id,action,resource_type,resource_id,created_at\n");
    for log in logs {
        let row = [
            log.id.to_string(),
            log.tenant_id.clone(),
            log.user_id.map(|u| u.to_string()).unwrap_or_default(),
            log.action.clone(),
            log.resource_type.clone(),
            log.resource_id.map(|r| r.to_string()).unwrap_or_default(),
            log.created_at.to_rfc3339(),
        ];
        let escaped: Vec<String> = row.iter().map(|field| csv_field(field)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
