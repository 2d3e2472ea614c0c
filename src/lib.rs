pub mod db;
pub mod runtime;
pub mod server;
pub mod services;
pub mod version;
pub mod web;
