//! Advisory run lock keyed by subject and run date
//!
//! Two runs for the same `{subject}_{date}` would write the same artifact
//! files, so a run holds `{root}/.locks/{subject}_{date}.lock` for its whole
//! lifetime. The lock is advisory: it coordinates phasegate processes and is
//! not a security boundary.
//!
//! An existing lock is overridden when its owning process is gone, when it
//! is older than the TTL, or when `force` is set. Otherwise acquisition fails
//! with [`LockError::ConcurrentExecution`].

use camino::{Utf8Path, Utf8PathBuf};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::process;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Default age after which a lock is considered abandoned (in seconds)
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3600;

/// Directory under the output root holding lock files
pub const LOCKS_DIR: &str = ".locks";

const MAX_ACQUIRE_ATTEMPTS: u32 = 3;

/// Contents of a lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID that created the lock
    pub pid: u32,
    /// Seconds since UNIX epoch when the lock was created
    pub created_at: u64,
    /// `{subject}_{date}` key being locked
    pub key: String,
    /// Execution id of the run holding the lock
    pub execution_id: String,
    /// phasegate version that created the lock
    pub version: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Concurrent run detected for '{key}' (PID {pid}, created {created_ago} ago)")]
    ConcurrentExecution {
        key: String,
        pid: u32,
        created_ago: String,
    },

    #[error("Lock file is corrupted or invalid: {reason}")]
    CorruptedLock { reason: String },

    #[error("Failed to acquire lock: {reason}")]
    AcquisitionFailed { reason: String },

    #[error("IO error during lock operation: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive lock for one subject/date; released on drop.
pub struct RunLock {
    lock_path: Utf8PathBuf,
    fd_lock: Option<Box<RwLock<fs::File>>>,
    info: LockInfo,
}

impl RunLock {
    /// Path of the lock file for `key` under `root`.
    #[must_use]
    pub fn lock_path(root: &Utf8Path, key: &str) -> Utf8PathBuf {
        root.join(LOCKS_DIR).join(format!("{key}.lock"))
    }

    /// Acquire the lock for `key`.
    ///
    /// Creation uses `create_new` so two processes can never both succeed.
    /// `ttl_seconds` of `None` uses [`DEFAULT_LOCK_TTL_SECS`].
    pub fn acquire(
        root: &Utf8Path,
        key: &str,
        execution_id: &str,
        force: bool,
        ttl_seconds: Option<u64>,
    ) -> Result<Self, LockError> {
        let lock_path = Self::lock_path(root, key);
        let locks_dir = root.join(LOCKS_DIR);
        fs::create_dir_all(&locks_dir).map_err(|e| LockError::AcquisitionFailed {
            reason: format!("Failed to create lock directory {locks_dir}: {e}"),
        })?;
        let ttl = ttl_seconds.unwrap_or(DEFAULT_LOCK_TTL_SECS);

        for attempt in 0..MAX_ACQUIRE_ATTEMPTS {
            let info = LockInfo {
                pid: process::id(),
                created_at: now_secs(),
                key: key.to_string(),
                execution_id: execution_id.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            };

            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&lock_path)
            {
                Ok(file) => return Self::finalize(lock_path, file, info),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Self::check_existing(&lock_path, key, force, ttl)?;
                    remove_overridable(&lock_path)?;
                    // Back off briefly in case another process grabs it first.
                    let delay_ms = 10u64 * 2u64.pow(attempt) + u64::from(process::id() % 7);
                    std::thread::sleep(Duration::from_millis(delay_ms.min(100)));
                }
                Err(e) => {
                    return Err(LockError::AcquisitionFailed {
                        reason: format!("Failed to create lock file {lock_path}: {e}"),
                    });
                }
            }
        }

        Err(LockError::AcquisitionFailed {
            reason: format!(
                "Lock for '{key}' was re-acquired by another process {MAX_ACQUIRE_ATTEMPTS} times in a row"
            ),
        })
    }

    fn finalize(lock_path: Utf8PathBuf, file: fs::File, info: LockInfo) -> Result<Self, LockError> {
        let json = serde_json::to_string_pretty(&info).map_err(|e| LockError::AcquisitionFailed {
            reason: format!("Failed to serialize lock info for '{}': {e}", info.key),
        })?;

        let mut rw_lock = Box::new(RwLock::new(file));
        {
            let guard = rw_lock
                .try_write()
                .map_err(|_| LockError::ConcurrentExecution {
                    key: info.key.clone(),
                    pid: 0,
                    created_ago: "unknown".to_string(),
                })?;
            let mut file_ref = &*guard;
            file_ref.write_all(json.as_bytes())?;
            file_ref.flush()?;
            file_ref.sync_all()?;
        }

        debug!(path = %lock_path, pid = info.pid, "Acquired run lock");
        Ok(Self {
            lock_path,
            fd_lock: Some(rw_lock),
            info,
        })
    }

    /// Decide whether an existing lock may be overridden.
    fn check_existing(lock_path: &Utf8Path, key: &str, force: bool, ttl: u64) -> Result<(), LockError> {
        let existing = match read_settled(lock_path) {
            Ok(Some(info)) => info,
            // Removed between our create attempt and the read.
            Ok(None) => return Ok(()),
            Err(e) if force => {
                warn!(path = %lock_path, error = %e, "Overriding unreadable lock (--force)");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if force {
            warn!(key = %key, pid = existing.pid, "Overriding existing run lock (--force)");
            return Ok(());
        }

        let age = now_secs().saturating_sub(existing.created_at);
        if !is_process_running(existing.pid) {
            warn!(key = %key, pid = existing.pid, "Reclaiming lock left by a process that is no longer running");
            return Ok(());
        }
        if age > ttl {
            warn!(key = %key, pid = existing.pid, age_secs = age, "Overriding lock older than TTL");
            return Ok(());
        }

        Err(LockError::ConcurrentExecution {
            key: key.to_string(),
            pid: existing.pid,
            created_ago: format_duration_since(existing.created_at),
        })
    }

    /// Read the lock for `key` without acquiring it.
    pub fn read_info(root: &Utf8Path, key: &str) -> Result<Option<LockInfo>, LockError> {
        read_lock_file(&Self::lock_path(root, key))
    }

    /// Release explicitly; dropping the lock does the same but ignores errors.
    pub fn release(mut self) -> Result<(), LockError> {
        self.fd_lock.take();
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::Io(e)),
        }
    }

    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.lock_path
    }
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock")
            .field("lock_path", &self.lock_path)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self.fd_lock.take().is_some() {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

fn read_lock_file(lock_path: &Utf8Path) -> Result<Option<LockInfo>, LockError> {
    let content = match fs::read_to_string(lock_path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LockError::CorruptedLock {
                reason: format!("Failed to read {lock_path}: {e}"),
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| LockError::CorruptedLock {
            reason: format!("Failed to parse {lock_path}: {e}"),
        })
}

/// Like [`read_lock_file`], but gives a lock that was just created a moment
/// to receive its content before calling it corrupted.
fn read_settled(lock_path: &Utf8Path) -> Result<Option<LockInfo>, LockError> {
    const SETTLE_ATTEMPTS: u32 = 3;
    let mut last = read_lock_file(lock_path);
    for _ in 1..SETTLE_ATTEMPTS {
        if !matches!(last, Err(LockError::CorruptedLock { .. })) {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
        last = read_lock_file(lock_path);
    }
    last
}

/// Rename-then-delete so a concurrent reader never sees a half-removed lock.
fn remove_overridable(lock_path: &Utf8Path) -> Result<(), LockError> {
    let stale = Utf8PathBuf::from(format!(
        "{lock_path}.stale.{}.{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default(),
        process::id()
    ));
    match fs::rename(lock_path, &stale) {
        Ok(()) => {
            let _ = fs::remove_file(&stale);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockError::AcquisitionFailed {
            reason: format!("Failed to remove overridable lock {lock_path}: {e}"),
        }),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Whether a process with `pid` currently exists.
///
/// Platforms without a liveness probe conservatively report `true`, leaving
/// the TTL as the only way an abandoned lock expires.
#[must_use]
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        // SAFETY: signal 0 performs only the existence and permission check.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            true
        } else {
            // EPERM: exists but belongs to someone else
            matches!(io::Error::last_os_error().raw_os_error(), Some(code) if code == libc::EPERM)
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

/// Compact age of a UNIX timestamp: `42s`, `5m`, `3h`, `2d`.
#[must_use]
pub fn format_duration_since(timestamp: u64) -> String {
    let secs = now_secs().saturating_sub(timestamp);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

/// Utility functions for lock management
pub mod utils {
    use super::{LockError, RunLock, format_duration_since, is_process_running, now_secs};
    use camino::Utf8Path;

    /// Check whether artifacts for `key` may be removed.
    ///
    /// Fails while a live, unexpired run holds the lock unless `force` is set.
    pub fn can_clean(root: &Utf8Path, key: &str, force: bool, ttl_seconds: Option<u64>) -> Result<(), LockError> {
        if force {
            return Ok(());
        }
        let ttl = ttl_seconds.unwrap_or(super::DEFAULT_LOCK_TTL_SECS);
        match RunLock::read_info(root, key)? {
            Some(info)
                if is_process_running(info.pid)
                    && now_secs().saturating_sub(info.created_at) <= ttl =>
            {
                Err(LockError::ConcurrentExecution {
                    key: key.to_string(),
                    pid: info.pid,
                    created_ago: format_duration_since(info.created_at),
                })
            }
            _ => Ok(()),
        }
    }
}
