pub mod audit_logger;
pub mod auth_service;
pub mod authorizer;
pub mod host_service;
pub mod rate_limiter;
pub mod session_service;
pub mod stats_calculator;
