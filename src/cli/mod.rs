//! Command-line interface for image-infer
//!
//! Only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, run, Cli, CliScaling};
