//! # qhost Common Library
//!
//! Shared code for the qhost services:
//! - Configuration loading and data root resolution
//! - Common error type

pub mod config;
pub mod error;

pub use error::{Error, Result};
