//! Per-job workspace management
//!
//! Each job gets a freshly created directory under the workspace root. The
//! directory is owned by exactly one job and removed when the job ends:
//! explicitly through [`Workspace::release`], or by the guard's `Drop` if a
//! code path never got that far.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Subdirectory holding the cloned working copy
pub const REPO_DIR: &str = "repo";

const MAX_NAME_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace under {root}: {source}")]
    Create {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove workspace {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Creates uniquely named job directories under a shared root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Creates the manager, making sure the root exists
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| WorkspaceError::Create {
            root: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates an empty directory that no other call can have returned
    ///
    /// `create_dir` fails on an existing path, so a name collision yields a
    /// retry with a fresh suffix rather than a shared directory.
    pub async fn acquire(&self, job_id: i64) -> Result<Workspace, WorkspaceError> {
        let mut last_err = None;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self
                .root
                .join(format!("job-{}-{}", job_id, Uuid::new_v4().simple()));

            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    debug!("Created workspace {} for job {}", path.display(), job_id);
                    return Ok(Workspace {
                        job_id,
                        path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!("Workspace name collision at {}, retrying", path.display());
                    last_err = Some(e);
                }
                Err(source) => {
                    return Err(WorkspaceError::Create {
                        root: self.root.clone(),
                        source,
                    });
                }
            }
        }

        Err(WorkspaceError::Create {
            root: self.root.clone(),
            source: last_err.unwrap_or_else(|| io::Error::other("no unique name found")),
        })
    }
}

/// Scoped ownership of one job directory
pub struct Workspace {
    job_id: i64,
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    /// Destination for the cloned working copy
    pub fn repo_dir(&self) -> PathBuf {
        self.path.join(REPO_DIR)
    }

    /// Directory mounted into the container
    ///
    /// The working copy when one was cloned, the workspace root otherwise.
    pub fn work_dir(&self) -> PathBuf {
        let repo = self.repo_dir();
        if repo.is_dir() { repo } else { self.path.clone() }
    }

    /// Writes a file into the working directory
    ///
    /// Whatever the cloned tree left at that name is unlinked first and the
    /// file is created exclusively, so a committed symlink is replaced
    /// rather than followed out of the workspace.
    pub async fn write_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf, WorkspaceError> {
        let path = self.work_dir().join(name);
        let write_err = |source| WorkspaceError::Write {
            path: path.clone(),
            source,
        };

        match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(write_err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "a directory exists at this path",
                )));
            }
            Ok(meta) => {
                if meta.file_type().is_symlink() {
                    warn!(
                        "Job {}: replacing symlink at {}",
                        self.job_id,
                        path.display()
                    );
                }
                tokio::fs::remove_file(&path).await.map_err(write_err)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(write_err(e)),
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_err)?;
        file.write_all(contents).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        Ok(path)
    }

    /// Removes the directory and everything in it
    ///
    /// Files left behind by containers may be unwritable; permissions are
    /// forced open and removal retried before giving up.
    pub async fn release(mut self) -> Result<(), WorkspaceError> {
        self.released = true;
        let path = self.path.clone();
        let job_id = self.job_id;

        let outcome = tokio::task::spawn_blocking(move || remove_forcefully(&path))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e.to_string())));

        match outcome {
            Ok(()) => {
                info!("Released workspace for job {}", job_id);
                Ok(())
            }
            Err(source) => Err(WorkspaceError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            "Workspace for job {} dropped without release, removing {}",
            self.job_id,
            self.path.display()
        );
        if let Err(e) = remove_forcefully(&self.path) {
            warn!("Failed to remove workspace {}: {}", self.path.display(), e);
        }
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("job_id", &self.job_id)
            .field("path", &self.path)
            .finish()
    }
}

fn remove_forcefully(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => debug!(
            "Removal of {} failed ({}), forcing permissions",
            path.display(),
            e
        ),
    }

    open_permissions(path);

    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Grants the owner full access to everything under `path`, ignoring failures
fn open_permissions(path: &Path) {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }

    let mut perms = meta.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let extra = if meta.is_dir() { 0o700 } else { 0o600 };
        perms.set_mode(perms.mode() | extra);
    }
    #[cfg(not(unix))]
    perms.set_readonly(false);

    let _ = std::fs::set_permissions(path, perms);

    if meta.is_dir() {
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                open_permissions(&entry.path());
            }
        }
    }
}
