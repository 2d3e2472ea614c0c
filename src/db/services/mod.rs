pub mod audit_service;
pub mod user_service;

pub use audit_service::{AuditStore, SqliteAuditStore};
pub use user_service::{SqliteUserStore, UserStore};
