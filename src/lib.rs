pub mod app;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fs_util;
pub mod output;
pub mod reconcile;
pub mod scorer;
pub mod table;
pub mod workspace;
