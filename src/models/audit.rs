//! Audit domain models

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 审计操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    // 会话与密码
    AuthLogin,
    AuthRefresh,
    AuthLogout,
    AuthChangePassword,
    AuthForgotPassword,
    AuthResetPassword,

    // 请求追踪
    HttpRequest,

    // 用户管理
    UserCreate,
    UserUpdate,
    UserDelete,
    UserRoleAssign,
    UserRoleUnassign,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AuthLogin => "auth.login",
            AuditAction::AuthRefresh => "auth.refresh",
            AuditAction::AuthLogout => "auth.logout",
            AuditAction::AuthChangePassword => "auth.change_password",
            AuditAction::AuthForgotPassword => "auth.forgot_password",
            AuditAction::AuthResetPassword => "auth.reset_password",

            AuditAction::HttpRequest => "http.request",

            AuditAction::UserCreate => "user.create",
            AuditAction::UserUpdate => "user.update",
            AuditAction::UserDelete => "user.delete",
            AuditAction::UserRoleAssign => "user.role_assign",
            AuditAction::UserRoleUnassign => "user.role_unassign",
        }
    }
}

/// Audit log row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub old_values: Option<Value>,
    pub new_values: Value,
    pub created_at: DateTime<Utc>,
}

/// Entry to append
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub tenant_id: String,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub old_values: Option<Value>,
    pub new_values: Value,
}

impl NewAuditLog {
    pub fn new(action: AuditAction, tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: None,
            action,
            resource_type: "auth".to_string(),
            resource_id: None,
            old_values: None,
            new_values: Value::Object(Default::default()),
        }
    }

    pub fn user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn resource(mut self, resource_type: &str, resource_id: Option<Uuid>) -> Self {
        self.resource_type = resource_type.to_string();
        self.resource_id = resource_id;
        self
    }

    pub fn old_values(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn payload(mut self, values: Value) -> Self {
        self.new_values = values;
        self
    }

    /// `{"success": bool, "reason"?: str}`
    pub fn outcome(self, success: bool, reason: Option<&str>) -> Self {
        let mut values = serde_json::Map::new();
        values.insert("success".to_string(), Value::Bool(success));
        if let Some(reason) = reason {
            values.insert("reason".to_string(), Value::String(reason.to_string()));
        }
        self.payload(Value::Object(values))
    }
}

/// Typed audit filter
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Raw query string parameters for the audit endpoints
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_uuid(field: &str, value: &Option<String>) -> Result<Option<Uuid>, AppError> {
    non_empty(value)
        .map(|v| {
            Uuid::parse_str(v).map_err(|_| AppError::BadRequest(format!("invalid {field}")))
        })
        .transpose()
}

fn parse_time(field: &str, value: &Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    non_empty(value)
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| AppError::BadRequest(format!("invalid {field}, expected RFC3339")))
        })
        .transpose()
}

impl AuditLogQuery {
    pub fn to_filter(&self) -> Result<AuditLogFilter, AppError> {
        Ok(AuditLogFilter {
            user_id: parse_uuid("user_id", &self.user_id)?,
            action: non_empty(&self.action).map(str::to_string),
            resource_type: non_empty(&self.resource_type).map(str::to_string),
            resource_id: parse_uuid("resource_id", &self.resource_id)?,
            start: parse_time("start", &self.start)?,
            end: parse_time("end", &self.end)?,
        })
    }

    pub fn pagination(&self) -> super::Pagination {
        super::Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditLogPage {
    pub items: Vec<AuditLog>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_names() {
        assert_eq!(AuditAction::AuthLogin.as_str(), "auth.login");
        assert_eq!(AuditAction::HttpRequest.as_str(), "http.request");
        assert_eq!(AuditAction::UserRoleUnassign.as_str(), "user.role_unassign");
    }

    #[test]
    fn test_outcome_payload() {
        let entry = NewAuditLog::new(AuditAction::AuthLogin, "t1").outcome(false, Some("bad_password"));
        assert_eq!(entry.new_values, json!({"success": false, "reason": "bad_password"}));

        let entry = NewAuditLog::new(AuditAction::AuthLogin, "t1").outcome(true, None);
        assert_eq!(entry.new_values, json!({"success": true}));
        assert_eq!(entry.resource_type, "auth");
    }

    #[test]
    fn test_query_to_filter() {
        let user = Uuid::new_v4();
        let query = AuditLogQuery {
            user_id: Some(user.to_string()),
            action: Some(" auth.login ".into()),
            start: Some("2024-01-01T00:00:00Z".into()),
            resource_type: Some("".into()),
            ..Default::default()
        };

        let filter = query.to_filter().unwrap();
        assert_eq!(filter.user_id, Some(user));
        assert_eq!(filter.action.as_deref(), Some("auth.login"));
        assert!(filter.resource_type.is_none());
        assert!(filter.start.is_some());
        assert!(filter.end.is_none());
    }

    #[test]
    fn test_query_rejects_bad_values() {
        let query = AuditLogQuery {
            user_id: Some("nope".into()),
            ..Default::default()
        };
        assert!(matches!(query.to_filter(), Err(AppError::BadRequest(_))));

        let query = AuditLogQuery {
            end: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(matches!(query.to_filter(), Err(AppError::BadRequest(_))));
    }
}
