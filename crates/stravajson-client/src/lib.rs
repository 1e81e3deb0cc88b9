//! CLI, settings, credential storage and the fetch workflow.
//!
//! This crate provides the `stravajson` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod interrupt;
pub mod output;
pub mod secret;

pub use cli::Cli;
pub use config::Settings;
pub use credentials::CredentialStore;
pub use error::{ClientError, ClientResult};
