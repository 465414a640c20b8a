//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (init, show, path)
//! - [`fetch`] - Load a single tile
//! - [`info`] - Resolve and print source metadata

pub mod common;
pub mod config;
pub mod fetch;
pub mod info;
