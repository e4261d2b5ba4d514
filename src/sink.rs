//! Append-only CSV sink. Every row is written through its own open/append/close
//! cycle so a crash loses at most the row in flight.

use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::record::SequencedRecord;

/// Column names written as the first row of every output file.
pub const HEADER: [&str; 6] = [
    "Tweet_count",
    "Username",
    "Text",
    "Created At",
    "Retweets",
    "Likes",
];

/// Errors raised while writing the output file.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination (or its parent directory) could not be opened.
    #[error("failed to open {path:?}: {source}")]
    Open {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO failure.
        source: io::Error,
    },
    /// A row could not be encoded or written.
    #[error("failed to write row to {path:?}: {source}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying CSV failure.
        source: csv::Error,
    },
    /// Buffered bytes could not be flushed to the file.
    #[error("failed to flush {path:?}: {source}")]
    Flush {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO failure.
        source: io::Error,
    },
}

/// Destination for numbered records.
pub trait RecordSink {
    /// Persists one record. Failures are reported, never retried by the sink.
    fn append(&self, record: &SequencedRecord) -> Result<(), SinkError>;
}

impl<S: RecordSink + ?Sized> RecordSink for &S {
    fn append(&self, record: &SequencedRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    sequence: u64,
    username: &'a str,
    text: &'a str,
    created_at: &'a str,
    retweets: u64,
    likes: u64,
}

impl<'a> From<&'a SequencedRecord> for CsvRow<'a> {
    fn from(entry: &'a SequencedRecord) -> Self {
        Self {
            sequence: entry.sequence,
            username: &entry.record.author,
            text: &entry.record.text,
            created_at: &entry.record.created_at,
            retweets: entry.record.retweets,
            likes: entry.record.likes,
        }
    }
}

/// CSV file sink.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Creates (or truncates) `path` and writes the header row.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let sink = Self { path: path.into() };
        if let Some(parent) = sink.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SinkError::Open {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        sink.write_header(&HEADER)?;
        Ok(sink)
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncates the destination and writes `columns` as its only row.
    pub fn write_header(&self, columns: &[&str]) -> Result<(), SinkError> {
        let file = File::create(&self.path).map_err(|source| self.open_error(source))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(columns)
            .map_err(|source| self.write_error(source))?;
        writer.flush().map_err(|source| self.flush_error(source))
    }

    fn open_error(&self, source: io::Error) -> SinkError {
        SinkError::Open {
            path: self.path.clone(),
            source,
        }
    }

    fn write_error(&self, source: csv::Error) -> SinkError {
        SinkError::Write {
            path: self.path.clone(),
            source,
        }
    }

    fn flush_error(&self, source: io::Error) -> SinkError {
        SinkError::Flush {
            path: self.path.clone(),
            source,
        }
    }
}

impl RecordSink for CsvSink {
    fn append(&self, record: &SequencedRecord) -> Result<(), SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.open_error(source))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .serialize(CsvRow::from(record))
            .map_err(|source| self.write_error(source))?;
        writer.flush().map_err(|source| self.flush_error(source))
    }
}
