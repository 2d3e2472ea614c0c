pub mod config;
pub mod dispatcher;
