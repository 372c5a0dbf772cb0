//! Persisting collected outputs on the host.

use anyhow::Context;
use cnab_driver::{DriverError, OperationResult, OUTPUTS_DIR};
use std::path::{Component, Path, PathBuf};

/// Write every output under `dir`, mirroring its path below the outputs
/// directory. Returns the written host paths in output order.
pub fn write_outputs(dir: &Path, result: &OperationResult) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(result.outputs.len());
    for (container_path, content) in &result.outputs {
        let relative = relative_output_path(container_path)
            .with_context(|| format!("refusing to write output {container_path}"))?;
        let target = dir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&target, content)
            .with_context(|| format!("failed to write {}", target.display()))?;
        tracing::debug!(output = %container_path, path = %target.display(), "Output written");
        written.push(target);
    }
    Ok(written)
}

/// Write the run's outputs to `dir` and settle the command's result.
///
/// The run's own error is what the command reports: a failure to write the
/// outputs is logged alongside it and only returned when the run succeeded.
pub fn persist_outputs(
    dir: &Path,
    result: &OperationResult,
    run_error: Option<DriverError>,
) -> (Vec<PathBuf>, anyhow::Result<()>) {
    let written = if result.is_empty() {
        Ok(Vec::new())
    } else {
        write_outputs(dir, result)
    };
    match (written, run_error) {
        (Ok(written), None) => {
            log_written(dir, &written);
            (written, Ok(()))
        }
        (Ok(written), Some(run_error)) => {
            log_written(dir, &written);
            (written, Err(run_error.into()))
        }
        (Err(write_error), None) => (Vec::new(), Err(write_error)),
        (Err(write_error), Some(run_error)) => {
            tracing::error!(dir = %dir.display(), error = %format!("{write_error:#}"), "Failed to write outputs");
            (Vec::new(), Err(run_error.into()))
        }
    }
}

fn log_written(dir: &Path, written: &[PathBuf]) {
    if !written.is_empty() {
        tracing::info!(dir = %dir.display(), count = written.len(), "Outputs written");
    }
}

/// Path of an output relative to the outputs directory.
///
/// Only plain components survive; anything that could escape the target
/// directory yields `None`.
fn relative_output_path(container_path: &str) -> Option<PathBuf> {
    let path = Path::new(container_path);
    let relative = path.strip_prefix(OUTPUTS_DIR).unwrap_or(path);
    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}
