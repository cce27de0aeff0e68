//! Database repository layer

pub mod audit_repo;
pub mod password_history_repo;
pub mod password_reset_repo;
pub mod permission_repo;
pub mod role_repo;
pub mod user_repo;

pub use audit_repo::AuditRepository;
pub use password_history_repo::PasswordHistoryRepository;
pub use password_reset_repo::PasswordResetRepository;
pub use permission_repo::PermissionRepository;
pub use role_repo::RoleRepository;
pub use user_repo::UserRepository;
