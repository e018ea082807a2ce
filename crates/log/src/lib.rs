//! # Codenode Log
//!
//! Logging setup shared by codenode binaries.
//!
//! ```rust,ignore
//! fn main() -> codenode_log::Result<()> {
//!     let _guard = codenode_log::auto_init()?;
//!     tracing::info!(port = 8080, "starting");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Fields, Format};

/// Result type for logger operations
pub type Result<T> = std::result::Result<T, LogError>;

/// Error type for logger operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LogError {
    /// The level filter could not be parsed
    #[error("invalid filter '{filter}': {reason}")]
    Filter {
        /// Filter as given
        filter: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Auto-detect and initialize the best logging configuration
///
/// Environment configuration wins when `CODENODE_LOG` or `RUST_LOG` is set;
/// otherwise debug builds log in development style and release builds in
/// production style. An already installed subscriber is left in place.
pub fn auto_init() -> Result<LoggerGuard> {
    if tracing::dispatcher::has_been_set() {
        return Ok(LoggerGuard::noop());
    }

    let config = if std::env::var("CODENODE_LOG").is_ok() || std::env::var("RUST_LOG").is_ok() {
        Config::from_env()
    } else if cfg!(debug_assertions) {
        Config::development()
    } else {
        Config::production()
    };

    match init_with(config) {
        Err(LogError::AlreadyInitialized) => Ok(LoggerGuard::noop()),
        other => other,
    }
}

/// Initialize with default configuration
pub fn init() -> Result<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with custom configuration
pub fn init_with(config: Config) -> Result<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
