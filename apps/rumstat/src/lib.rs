//! # rumstat
//!
//! Application layer over `rumstat-core`: configuration, bundle file input
//! and the HTTP API. The binary adds the CLI on top.

pub mod api;
pub mod config;
pub mod input;
