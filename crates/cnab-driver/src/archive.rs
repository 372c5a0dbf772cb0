//! Input archive building.
//!
//! Files are validated up front by [`ArchivePlan::new`]; no stream exists
//! until the plan is turned into an [`ArchiveStream`]. The tar bytes are then
//! written by a blocking producer task into a bounded in-memory pipe while the
//! engine reads the other end.

use crate::engine::ArchiveReader;
use crate::error::DriverError;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Component, Path};
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;

/// Permission mode of every staged file.
pub const FILE_MODE: u32 = 0o644;

/// Capacity of the pipe between producer and consumer.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Validated set of files ready to be archived.
#[derive(Debug, Clone, Default)]
pub struct ArchivePlan {
    files: Vec<(String, String)>,
}

impl ArchivePlan {
    /// Validate that every path is an absolute unix path naming a file.
    ///
    /// Fails on the first offending path; nothing is produced in that case.
    pub fn new(files: &BTreeMap<String, String>) -> Result<Self, DriverError> {
        for path in files.keys() {
            validate_path(path)?;
        }
        Ok(Self {
            files: files
                .iter()
                .map(|(path, content)| (path.clone(), content.clone()))
                .collect(),
        })
    }

    /// Number of files in the plan.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True if the plan holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Start producing the archive.
    ///
    /// Must be called within a tokio runtime.
    pub fn into_stream(self) -> ArchiveStream {
        let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
        let bridge = SyncIoBridge::new(writer);
        let files = self.files;
        let producer = tokio::task::spawn_blocking(move || write_archive(bridge, &files));
        ArchiveStream {
            reader: Box::pin(reader),
            producer: ArchiveProducer(producer),
        }
    }
}

/// A tar archive being produced concurrently with its consumption.
pub struct ArchiveStream {
    reader: ArchiveReader,
    producer: ArchiveProducer,
}

impl ArchiveStream {
    /// Split into the readable end and the producer handle.
    pub fn into_parts(self) -> (ArchiveReader, ArchiveProducer) {
        (self.reader, self.producer)
    }
}

/// Handle to the task writing the archive.
pub struct ArchiveProducer(JoinHandle<io::Result<()>>);

impl ArchiveProducer {
    /// Wait for the producer and report any write failure.
    pub async fn finish(self) -> io::Result<()> {
        self.0
            .await
            .map_err(|e| io::Error::other(format!("archive producer task failed: {e}")))?
    }
}

fn validate_path(path: &str) -> Result<(), DriverError> {
    let p = Path::new(path);
    let valid = p.is_absolute()
        && p.components().any(|c| matches!(c, Component::Normal(_)))
        && !p.components().any(|c| matches!(c, Component::ParentDir));
    if valid {
        Ok(())
    } else {
        Err(DriverError::InvalidPath {
            path: path.to_string(),
        })
    }
}

fn write_archive<W: Write>(writer: W, files: &[(String, String)]) -> io::Result<()> {
    let mut builder = tar::Builder::new(writer);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(FILE_MODE);
        header.set_size(content.len() as u64);
        // Archive names are relative; the engine extracts them at `/`.
        builder.append_data(&mut header, path.trim_start_matches('/'), content.as_bytes())?;
    }
    let mut writer = builder.into_inner()?;
    writer.flush()
}
