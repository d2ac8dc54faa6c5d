use anyhow::{Context, Result};
use crew_core::outputs::Artifact;
use crew_core::workflow::OutputCategory;
use std::path::{Path, PathBuf};

pub fn export_file_name(category: OutputCategory) -> String {
    format!(
        "feature_output_{}.{}",
        category.as_str(),
        category.file_extension()
    )
}

/// Writes the artifact payload byte-for-byte and returns the final path.
pub fn export_artifact(dir: &Path, artifact: &Artifact) -> Result<PathBuf> {
    let path = dir.join(export_file_name(artifact.category));
    write_atomic(&path, &artifact.payload)?;
    Ok(path)
}

fn write_atomic(path: &Path, payload: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create export directory {}", parent.display()))?;
    }

    let temp_path = match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    };

    std::fs::write(&temp_path, payload)
        .with_context(|| format!("Failed to write temp file {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
