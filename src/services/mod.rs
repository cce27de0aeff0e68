//! Business logic services layer

pub mod audit_service;
pub mod password_service;
pub mod permission_service;
pub mod role_service;
pub mod session_service;
pub mod user_service;

pub use audit_service::AuditService;
pub use password_service::PasswordService;
pub use permission_service::PermissionService;
pub use role_service::RoleService;
pub use session_service::SessionService;
pub use user_service::UserService;
