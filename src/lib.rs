pub mod common_utils;
pub mod configure;
pub mod logger;
pub mod models;
pub mod reconcile;
pub mod tsdb;
pub mod verifier;
pub mod wal;
