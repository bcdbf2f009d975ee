pub mod access;
pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod masking;
pub mod policy;
pub mod storage;

pub use error::AuditError;
