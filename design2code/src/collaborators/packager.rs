//! Workspace archiving

use async_trait::async_trait;
use design2code_sdk::CollaboratorError;
use std::path::Path;
use tokio::process::Command;

/// Turns a finished workspace into a single downloadable archive
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(&self, source_dir: &Path, archive: &Path) -> Result<(), CollaboratorError>;
}

/// Archives with the system `zip` tool
///
/// Runs from the parent of `source_dir` so entries are rooted at the
/// workspace directory name.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipPackager;

#[async_trait]
impl Packager for ZipPackager {
    async fn package(&self, source_dir: &Path, archive: &Path) -> Result<(), CollaboratorError> {
        let process_err = |message: String| CollaboratorError::Process {
            program: "zip".to_string(),
            message,
        };
        let name = source_dir
            .file_name()
            .ok_or_else(|| process_err(format!("{} has no directory name", source_dir.display())))?;
        let parent = source_dir.parent().unwrap_or(source_dir);
        let archive = if archive.is_absolute() {
            archive.to_path_buf()
        } else {
            std::env::current_dir()?.join(archive)
        };
        if let Some(dir) = archive.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        tracing::info!("Packaging {} into {}", source_dir.display(), archive.display());
        let output = Command::new("zip")
            .arg("-qr")
            .arg(&archive)
            .arg(name)
            .current_dir(parent)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| process_err(format!("failed to start: {}", e)))?;
        if !output.status.success() {
            return Err(process_err(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}
