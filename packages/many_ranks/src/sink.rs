//! Where report lines go.
//!
//! Only the collector rank holds a live sink; every other rank holds the
//! no-output variant so the writing paths stay rank-agnostic. A file target
//! is picked by suffix search: the first `<base><N>.pmtm` that does not
//! exist yet, claimed with an exclusive create so concurrent runs cannot
//! race each other onto the same file.

use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};

use crate::error::{Error, Result};
use crate::report;

#[derive(Debug)]
pub(crate) enum ReportSink {
    /// Discards everything.
    None,
    Stdout(Stdout),
    File { file: File, path: String },
}

impl ReportSink {
    /// Opens the sink a file-name base designates: empty means no output,
    /// `-` means standard output, anything else starts a suffix search.
    pub(crate) fn open(base: &str) -> Result<Self> {
        if base.is_empty() {
            return Ok(Self::None);
        }
        if base == "-" {
            return Ok(Self::Stdout(io::stdout()));
        }

        for suffix in 0..u32::MAX {
            let path = format!("{base}{suffix}.pmtm");
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok(Self::File { file, path }),
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {}
                Err(_) => return Err(Error::Sink),
            }
        }
        Err(Error::Sink)
    }

    /// Whether this sink reaches anywhere.
    pub(crate) fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// The name reported for the open target, if any.
    pub(crate) fn path(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Stdout(_) => Some("<stdout>"),
            Self::File { path, .. } => Some(path),
        }
    }

    pub(crate) fn writer(&mut self) -> Option<&mut dyn Write> {
        match self {
            Self::None => None,
            Self::Stdout(stdout) => Some(stdout),
            Self::File { file, .. } => Some(file),
        }
    }

    /// Drops the target without a footer, removing any file this sink
    /// created. Used when instance construction fails after the sink opened,
    /// so a failed run leaves nothing behind.
    pub(crate) fn abandon(&mut self) {
        let sink = std::mem::replace(self, Self::None);
        if let Self::File { file, path } = sink {
            drop(file);
            if std::fs::remove_file(&path).is_err() {
                tracing::warn!(path = %path, "abandoned report file could not be removed");
            }
        }
    }

    /// Writes the footer and releases the target. The sink is inactive
    /// afterwards; closing an inactive sink does nothing.
    pub(crate) fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer() {
            writer.write_all(report::REPORT_FOOTER.as_bytes())?;
            writer.flush()?;
        }
        *self = Self::None;
        Ok(())
    }
}
