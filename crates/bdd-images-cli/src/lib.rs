//! bdd-images CLI library
//!
//! Shell access to the gallery renderer, the perceptual hash, the format
//! sniffer and asset provisioning.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{Cli, ColorArg, Commands, GalleryArgs, HashArgs, ProvisionArgs, SniffArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::Output;
