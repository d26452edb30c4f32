// Per-execution workspace on the host, bind-mounted into the sandbox

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Ephemeral directory holding one submission's source file.
///
/// Exclusively owned by one execution. The directory tree is deleted by
/// `release`, or by `Drop` on any path that never gets that far.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    mount_path: PathBuf,
    source_path: PathBuf,
}

impl Workspace {
    /// Create a uniquely named directory under `root` and write `source`
    /// to `<dir>/<filename>`.
    pub async fn acquire(root: &Path, filename: &str, source: &str) -> io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;

        let dir = tempfile::Builder::new().prefix("crucible-").tempdir_in(root)?;
        // Docker needs an absolute, symlink-free host path for the bind
        let mount_path = tokio::fs::canonicalize(dir.path()).await?;
        let source_path = mount_path.join(filename);

        tokio::fs::write(&source_path, source).await?;

        Ok(Self {
            dir,
            mount_path,
            source_path,
        })
    }

    /// Host path to bind-mount
    pub fn path(&self) -> &Path {
        &self.mount_path
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Delete the directory tree, reporting failures instead of swallowing them.
    /// Runs on the blocking pool; once started it completes even if the
    /// caller goes away.
    pub async fn release(self) -> io::Result<()> {
        let dir = self.dir;
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(io::Error::other)?
    }
}
