//! # Friend Rank Common Library
//!
//! Shared code for the friend-rank service including:
//! - Error types
//! - Bootstrap configuration loading (TOML, environment, CLI overrides)
//! - Result cache interface and its adapters (in-process store, fail-open
//!   wrapper, bypass adapter)

pub mod cache;
pub mod config;
pub mod error;

pub use error::{Error, Result};
