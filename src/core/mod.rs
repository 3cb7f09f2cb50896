//! Core processing logic for rmqdump.
//!
//! This module contains:
//! - [`filter`] - Message filtering by size, patterns and structured query
//! - [`query`] - The jq-compatible query language used by the filter
//! - [`models`] - The exported [`Envelope`](models::Envelope)
//! - [`output`] - Exporters (console, file)
//! - [`processor`] - The orchestrator and its statistics
//!
//! # Quick Start
//!
//! ```rust
//! use rmqdump::core::{Envelope, FilterSettings, MessageFilter};
//!
//! let filter = MessageFilter::new(&FilterSettings::new().with_include("order"));
//! assert!(filter.matches(b"order #1"));
//!
//! let line = Envelope::new("events", "order.created", b"{}".to_vec())
//!     .to_json_line(false)
//!     .unwrap();
//! assert!(line.contains("\"routingKey\":\"order.created\""));
//! ```

pub mod filter;
pub mod models;
pub mod output;
pub mod processor;
pub mod query;

pub use filter::MessageFilter;
pub use models::{Envelope, headers_to_json};
pub use output::{ConsoleWriter, Exporter, FileWriter, create_exporter};
pub use processor::{MessageProcessor, ProcessingStats, run};
pub use query::{Query, QueryError};

pub use crate::config::FilterSettings;
