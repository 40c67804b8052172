//! Beacon Common - Shared types and utilities
//!
//! This crate provides the service and announcement types, configuration
//! structures and error definitions used across all Beacon components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, DiscoveryConfig, StoreBackend, StoreConfig};
pub use error::{Error, Result};
pub use types::*;
