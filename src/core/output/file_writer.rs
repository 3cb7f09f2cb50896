//! JSON Lines file exporter.
//!
//! Every write appends one newline-terminated envelope and flushes before
//! returning, so a crash loses at most the record being written.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::FileMode;
use crate::core::models::Envelope;
use crate::error::Result;

use super::Exporter;

/// Writes envelopes to a file, one per line.
#[derive(Debug)]
pub struct FileWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    pretty: bool,
}

impl FileWriter {
    /// Opens `path`, truncating it in [`FileMode::Overwrite`] and keeping
    /// prior content in [`FileMode::Append`]. The file is created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`RmqDumpError::Io`](crate::RmqDumpError::Io) if the file
    /// cannot be opened.
    pub fn open(path: impl AsRef<Path>, mode: FileMode, pretty: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            FileMode::Append => options.append(true),
            FileMode::Overwrite => options.write(true).truncate(true),
        };
        let file = options.open(&path)?;
        debug!(path = %path.display(), %mode, "Opened output file");

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            pretty,
        })
    }

    /// The output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` once [`close`](Exporter::close) has run.
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

impl Exporter for FileWriter {
    fn write_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "output file is already closed")
        })?;
        let line = envelope.to_json_line(self.pretty)?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!(path = %self.path.display(), "Closed output file");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
