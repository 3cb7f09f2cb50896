//! Console exporter.

use std::io::{self, Stdout, Write};

use crate::core::models::Envelope;
use crate::error::Result;

use super::Exporter;

/// Writes one serialized envelope per record to a terminal-like target.
///
/// Defaults to standard output; tests hand it an in-memory buffer.
pub struct ConsoleWriter<W: Write + Send = Stdout> {
    out: W,
    pretty: bool,
}

impl ConsoleWriter<Stdout> {
    /// Creates a writer on standard output.
    pub fn stdout(pretty: bool) -> Self {
        Self::new(io::stdout(), pretty)
    }
}

impl<W: Write + Send> ConsoleWriter<W> {
    pub fn new(out: W, pretty: bool) -> Self {
        Self { out, pretty }
    }

    /// Returns the underlying target.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Exporter for ConsoleWriter<W> {
    fn write_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        let line = envelope.to_json_line(self.pretty)?;
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "console"
    }
}
