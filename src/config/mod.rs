//! # Configuration Module
//!
//! This module provides the configuration structure shared by the CLI and the
//! library.

pub mod config;

pub use config::FeedConfig;
