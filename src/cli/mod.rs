//! CLI module for the bgremove-credits library
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{collect_inputs, main, output_path_for, Cli};
