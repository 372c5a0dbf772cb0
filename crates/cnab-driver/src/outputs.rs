//! Output collection.
//!
//! After the container stops, the well-known outputs directory is copied out
//! as a tar archive and flattened into a path → content map. Entries read
//! before a failure are kept and returned alongside the error.

use crate::engine::{ArchiveReader, ContainerEngine};
use crate::error::DriverError;
use crate::types::OperationResult;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_util::io::SyncIoBridge;

/// Directory scanned for outputs after the container exits.
pub const OUTPUTS_DIR: &str = "/cnab/app/outputs";

/// Parent of [`OUTPUTS_DIR`]; archive entry names are relative to it.
const OUTPUTS_PARENT: &str = "/cnab/app";

/// Copy the outputs directory out of a container and flatten it.
///
/// The returned result holds every entry read before any failure.
pub async fn collect_outputs(
    engine: &dyn ContainerEngine,
    container_id: &str,
) -> (OperationResult, Result<(), DriverError>) {
    tracing::debug!(container_id = %container_id, path = OUTPUTS_DIR, "Copying outputs from container");
    let archive = match engine.copy_from_container(container_id, OUTPUTS_DIR).await {
        Ok(archive) => archive,
        Err(e) => return (OperationResult::default(), Err(DriverError::CopyOut(e))),
    };

    let (outputs, result) = read_archive(archive).await;
    match &result {
        Ok(()) => {
            tracing::debug!(container_id = %container_id, count = outputs.len(), "Outputs collected")
        }
        Err(e) => tracing::warn!(
            container_id = %container_id,
            collected = outputs.len(),
            error = %e,
            "Outputs archive read failed part-way"
        ),
    }
    (OperationResult { outputs }, result)
}

/// Parse an outputs archive on a blocking thread.
async fn read_archive(
    archive: ArchiveReader,
) -> (BTreeMap<String, String>, Result<(), DriverError>) {
    let bridge = SyncIoBridge::new(archive);
    let task = tokio::task::spawn_blocking(move || {
        let mut outputs = BTreeMap::new();
        let result = read_entries(bridge, &mut outputs);
        (outputs, result)
    });
    match task.await {
        Ok(parsed) => parsed,
        Err(e) => (
            BTreeMap::new(),
            Err(DriverError::OutputArchive(std::io::Error::other(format!(
                "outputs reader task failed: {e}"
            )))),
        ),
    }
}

fn read_entries<R: Read>(
    reader: R,
    outputs: &mut BTreeMap<String, String>,
) -> Result<(), DriverError> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive.entries().map_err(DriverError::OutputArchive)?;
    for entry in entries {
        let mut entry = entry.map_err(DriverError::OutputArchive)?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let path = container_path(&entry.path().map_err(DriverError::OutputArchive)?);

        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|source| DriverError::OutputEntry {
                path: path.clone(),
                source,
            })?;
        outputs.insert(path, String::from_utf8_lossy(&contents).into_owned());
    }
    Ok(())
}

/// Re-attach the prefix the copy stripped from an entry name.
fn container_path(name: &Path) -> String {
    Path::new(OUTPUTS_PARENT)
        .join(name)
        .components()
        .collect::<PathBuf>()
        .to_string_lossy()
        .into_owned()
}
