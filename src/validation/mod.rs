//! Configuration validation
//!
//! Checks run once at startup and on every reload, before the new settings
//! are put in place.

use std::error::Error;
use std::fmt;

pub mod config;

pub use config::*;

/// Generic validation error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	/// Invalid configuration
	ConfigError(String),
	/// Referenced file is missing
	PathError(String),
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationError::ConfigError(msg) => write!(f, "Config validation error: {}", msg),
			ValidationError::PathError(msg) => write!(f, "Path validation error: {}", msg),
		}
	}
}

impl Error for ValidationError {}


// vim: ts=4
