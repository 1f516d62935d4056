//! File-based credential store.
//!
//! The transport's session credentials live in one directory. Updates are
//! written atomically; a reset quarantines the directory by renaming it
//! before deleting, so a reader still holding the old path open cannot make
//! the reset fail.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    anyhow::{Context, Result},
    tokio::{fs, io::AsyncWriteExt},
    tracing::{debug, info, warn},
};

/// File holding the serialized credentials inside the store directory.
pub const CREDS_FILE: &str = "creds.json";

const DELETE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
    delete_attempts: u32,
    retry_base: Duration,
    retry_step: Duration,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            delete_attempts: DELETE_ATTEMPTS,
            retry_base: Duration::from_millis(300),
            retry_step: Duration::from_millis(200),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))
    }

    /// Load stored credentials. `None` when nothing has been paired yet.
    pub async fn load(&self) -> Result<Option<serde_json::Value>> {
        let path = self.dir.join(CREDS_FILE);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            },
        };
        let creds = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt credentials in {}", path.display()))?;
        Ok(Some(creds))
    }

    /// Persist credentials: temp file, fsync, then rename over the old file.
    pub async fn save(&self, creds: &serde_json::Value) -> Result<()> {
        self.ensure_dir().await?;
        let final_path = self.dir.join(CREDS_FILE);
        let temp_path = self.dir.join(format!(
            "{CREDS_FILE}.{}.tmp",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        let data = serde_json::to_vec_pretty(creds)?;
        let mut file = fs::File::create(&temp_path)
            .await
            .with_context(|| format!("failed to create {}", temp_path.display()))?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        fs::rename(&temp_path, &final_path)
            .await
            .with_context(|| format!("failed to replace {}", final_path.display()))?;
        debug!(path = %final_path.display(), "saved credentials");
        Ok(())
    }

    /// True when the directory is missing or has no entries.
    pub async fn is_empty(&self) -> bool {
        let Ok(mut entries) = fs::read_dir(&self.dir).await else {
            return true;
        };
        matches!(entries.next_entry().await, Ok(None))
    }

    /// Destroy all stored credentials and recreate an empty store.
    ///
    /// The directory is first renamed to a backup path, then the backup is
    /// deleted with bounded retries at increasing delays. If the rename or
    /// all retries fail, the path is force-removed directly.
    pub async fn reset(&self) -> Result<()> {
        let backup = self.backup_path();
        let target = match fs::rename(&self.dir, &backup).await {
            Ok(()) => {
                debug!(backup = %backup.display(), "moved credential store aside");
                backup
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.ensure_dir().await?;
                return Ok(());
            },
            Err(e) => {
                warn!(error = %e, dir = %self.dir.display(), "rename failed, deleting in place");
                self.dir.clone()
            },
        };

        if !self.remove_with_retries(&target).await {
            force_remove(&target).await?;
        }
        if target != self.dir {
            force_remove(&self.dir).await?;
        }

        self.ensure_dir().await?;
        info!(dir = %self.dir.display(), "credential store reset");
        Ok(())
    }

    async fn remove_with_retries(&self, path: &Path) -> bool {
        for attempt in 0..self.delete_attempts {
            match fs::remove_dir_all(path).await {
                Ok(()) => return true,
                Err(e) if e.kind() == ErrorKind::NotFound => return true,
                Err(e) => {
                    let delay = self.retry_base + self.retry_step * attempt;
                    debug!(attempt, error = %e, ?delay, path = %path.display(), "delete failed, retrying");
                    tokio::time::sleep(delay).await;
                },
            }
        }
        false
    }

    fn backup_path(&self) -> PathBuf {
        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "auth".into());
        self.dir.with_file_name(format!(
            "{name}.bak-{}",
            chrono::Utc::now().timestamp_millis()
        ))
    }
}

async fn force_remove(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}
