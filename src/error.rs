//! Unified error types for rmqdump.
//!
//! This module provides a single [`RmqDumpError`] enum that covers every
//! failure the dump/monitor pipeline can report.
//!
//! # Error Classes
//!
//! - **Configuration** errors ([`RmqDumpError::Config`],
//!   [`RmqDumpError::FilterCompilation`]) are raised while building the
//!   pipeline and abort the invocation.
//! - **Connection** errors ([`RmqDumpError::Connection`], [`RmqDumpError::Tls`])
//!   are raised while opening the broker connection or declaring topology.
//! - **I/O** errors ([`RmqDumpError::Io`], [`RmqDumpError::Json`]) are fatal
//!   while opening an output file, but only logged per message once the
//!   stream is running.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::core::query::QueryError;

/// A specialized [`Result`] type for rmqdump operations.
///
/// # Example
///
/// ```rust
/// use rmqdump::error::Result;
///
/// fn my_function() -> Result<u64> {
///     Ok(42)
/// }
/// ```
pub type Result<T> = std::result::Result<T, RmqDumpError>;

/// The error type for all rmqdump operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RmqDumpError {
    /// Invalid configuration value.
    ///
    /// This happens when:
    /// - The writer kind is not `console` or `file`
    /// - The file mode is not `append` or `overwrite`
    /// - The broker URL or virtual host is malformed
    /// - A file writer has no output path
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what's wrong
        message: String,
    },

    /// One or more filter patterns failed to compile.
    ///
    /// All invalid patterns are reported together.
    #[error("Invalid filters: {}", join_errors(errors))]
    FilterCompilation {
        /// Every compilation failure, in configuration order
        errors: Vec<FilterCompileError>,
    },

    /// A broker operation failed while setting up the consumer.
    #[error("Failed to {context}: {source}")]
    Connection {
        /// The step that failed (e.g. "connect to RabbitMQ", "bind queue")
        context: String,
        /// The underlying broker client error
        #[source]
        source: lapin::Error,
    },

    /// The receive loop ended abnormally.
    #[error("Consumer failed: {message}")]
    Consumer {
        /// What went wrong
        message: String,
    },

    /// The TLS connector could not be built.
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Acknowledging or rejecting a delivery failed.
    #[error("Failed to settle delivery: {0}")]
    Acknowledge(#[source] lapin::Error),

    /// An I/O error occurred.
    ///
    /// This typically happens when the output file cannot be created or
    /// written.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A structured query could not be parsed or evaluated.
    #[error("Query error: {0}")]
    Query(#[from] QueryError),
}

/// Which filter setting a [`FilterCompileError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// An entry of the include pattern list
    Include,
    /// An entry of the exclude pattern list
    Exclude,
    /// The single regex filter
    Regex,
    /// The structured (jq) query
    Query,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatternKind::Include => "include pattern",
            PatternKind::Exclude => "exclude pattern",
            PatternKind::Regex => "regex filter",
            PatternKind::Query => "JSON filter",
        };
        f.write_str(name)
    }
}

/// A single pattern or query that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{pattern}': {message}")]
pub struct FilterCompileError {
    /// The setting the pattern came from
    pub kind: PatternKind,
    /// The pattern source text
    pub pattern: String,
    /// Compiler diagnostic
    pub message: String,
}

impl FilterCompileError {
    pub fn new(kind: PatternKind, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
            message: message.into(),
        }
    }
}

fn join_errors(errors: &[FilterCompileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl RmqDumpError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        RmqDumpError::Config {
            message: message.into(),
        }
    }

    /// Creates a broker connection error for the given setup step.
    pub fn connection(context: impl Into<String>, source: lapin::Error) -> Self {
        RmqDumpError::Connection {
            context: context.into(),
            source,
        }
    }

    /// Creates a receive loop failure.
    pub fn consumer(message: impl Into<String>) -> Self {
        RmqDumpError::Consumer {
            message: message.into(),
        }
    }

    /// Creates an aggregated filter compilation error.
    pub fn filter_compilation(errors: Vec<FilterCompileError>) -> Self {
        RmqDumpError::FilterCompilation { errors }
    }

    /// Returns `true` if this is a configuration error (including filters).
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            RmqDumpError::Config { .. } | RmqDumpError::FilterCompilation { .. }
        )
    }

    /// Returns `true` if this error came from the broker connection.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            RmqDumpError::Connection { .. } | RmqDumpError::Tls(_)
        )
    }

    /// Returns `true` if the receive loop failed or stopped early.
    pub fn is_consumer(&self) -> bool {
        matches!(self, RmqDumpError::Consumer { .. })
    }

    /// Returns `true` if this is an IO error.
    pub fn is_io(&self) -> bool {
        matches!(self, RmqDumpError::Io(_))
    }
}

// ============================================================================
// Tests
// ============================================================================
