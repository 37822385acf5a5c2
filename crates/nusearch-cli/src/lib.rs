//! # nusearch-cli
//!
//! Command-line front end for NuSearch:
//! - `index`: build a generation from a package dump and make it live
//! - `promote`: move the live alias to an existing generation (rollback)
//! - `generations`: list generations and their aliases
//! - `search`: run one query against the live alias
//! - `config`: inspect and create configuration files

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config_handlers;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
