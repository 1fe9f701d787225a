//! # BMR Common Library
//!
//! Shared code for the book metadata reconciliation workspace:
//! - Common error type and `Result` alias
//! - Engine and provider configuration surface (JSON import/export,
//!   TOML file loading, human-readable validation)

pub mod config;
pub mod error;

pub use config::{EngineSettings, ProviderSettings, RateLimitSettings, TimeoutSettings};
pub use error::{Error, Result};
