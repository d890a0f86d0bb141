//! Command line front end for the fabric prompt runner.
//!
//! Parses arguments, loads `.env` configuration, and dispatches to the
//! pattern catalog, session store and model providers.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod setup;
pub mod update;

pub use app::App;
pub use config::{Arguments, Command, FabricPaths};
pub use error::CliError;
