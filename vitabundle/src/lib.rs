//! vitabundle - builds device-ready sealed bundles for PS Vita Content Manager
//!
//! The library checks for cached artifacts, downloads and verifies what is
//! missing, unpacks the primary package and any user-selected bundles, and
//! seals each of them with the account's backup key.
//!
//! - [`manager`]: catalog, download, extraction and the external tools
//! - [`pipeline`]: the stage sequencer
//! - [`credentials`]: backup key lookup and storage
//! - [`config`]: `config.ini`
//! - [`logging`]: tracing setup

pub mod config;
pub mod credentials;
pub mod logging;
pub mod manager;
pub mod pipeline;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
