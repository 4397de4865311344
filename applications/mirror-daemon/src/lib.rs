//! ID Photo Mirror Daemon Library
//!
//! Host process for the mirror subsystem. This library exposes configuration
//! loading for testing purposes.

pub mod config;

pub use config::{load, DEFAULT_CONFIG_FILE, ENV_PREFIX};
