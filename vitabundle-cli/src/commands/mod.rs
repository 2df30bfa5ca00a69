//! CLI command implementations.

pub mod build;
pub mod common;
pub mod config;
pub mod init;
pub mod key;
pub mod list;
