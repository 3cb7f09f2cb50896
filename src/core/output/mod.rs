//! Envelope exporters.
//!
//! This module provides the [`Exporter`] trait and its two sinks:
//! - [`ConsoleWriter`] - one serialized envelope per line on stdout (or any
//!   [`Write`](std::io::Write) target)
//! - [`FileWriter`] - newline-delimited JSON in a file, append or overwrite
//!
//! # Choosing a Writer
//!
//! | Writer | Use Case | Close |
//! |--------|----------|-------|
//! | `console` | Watching a monitor session live | no-op |
//! | `file` | Draining a queue for later analysis | flushes and releases the file |
//!
//! # Example
//!
//! ```rust,no_run
//! # fn main() -> rmqdump::Result<()> {
//! use rmqdump::config::{FileMode, OutputConfig, WriterKind};
//! use rmqdump::core::models::Envelope;
//! use rmqdump::core::output::create_exporter;
//!
//! let config = OutputConfig {
//!     writer: WriterKind::File,
//!     output_file: Some("dump.jsonl".into()),
//!     file_mode: FileMode::Append,
//!     pretty_print: false,
//! };
//!
//! let mut exporter = create_exporter(&config)?;
//! exporter.write_envelope(&Envelope::new("events", "order.created", b"{}".to_vec()))?;
//! exporter.close()?;
//! # Ok(())
//! # }
//! ```

mod console_writer;
mod file_writer;

pub use console_writer::ConsoleWriter;
pub use file_writer::FileWriter;

use crate::config::{OutputConfig, WriterKind};
use crate::core::models::Envelope;
use crate::error::{Result, RmqDumpError};

/// A sink for exported envelopes.
///
/// Implementations own their output resource. `close` must be safe to call
/// more than once.
pub trait Exporter: Send {
    /// Serializes and writes one envelope.
    fn write_envelope(&mut self, envelope: &Envelope) -> Result<()>;

    /// Flushes and releases the output resource.
    fn close(&mut self) -> Result<()>;

    /// Short name for logging.
    fn name(&self) -> &'static str;
}

/// Creates the exporter selected by `config.writer`.
///
/// # Errors
///
/// Returns [`RmqDumpError::Config`] if the file writer has no output path,
/// or [`RmqDumpError::Io`] if the file cannot be opened.
pub fn create_exporter(config: &OutputConfig) -> Result<Box<dyn Exporter>> {
    match config.writer {
        WriterKind::Console => Ok(Box::new(ConsoleWriter::stdout(config.pretty_print))),
        WriterKind::File => {
            let path = config
                .output_file
                .as_deref()
                .ok_or_else(|| RmqDumpError::config("file writer requires an output file"))?;
            Ok(Box::new(FileWriter::open(
                path,
                config.file_mode,
                config.pretty_print,
            )?))
        }
    }
}
