//! Snapshot Persistence
//!
//! Saves the resumable part of a session under a single key and loads it
//! back on startup. Anything unreadable, tampered with, or older than
//! [`SNAPSHOT_MAX_AGE_MS`] is deleted and treated as absent.
//!
//! ## Stored Format
//!
//! ```text
//! { "version": 1, "checksum": "<sha256 hex of payload>", "payload": "<snapshot json>" }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::hash::{snapshot_checksum, verify_snapshot_checksum};
use crate::engine::collaborators::SnapshotStore;
use crate::error::{GameError, GameResult};
use crate::game::state::SessionSnapshot;

/// Storage key for the current game.
pub const SNAPSHOT_KEY: &str = "gh_current_game";

/// Snapshots at least this old are discarded (24 hours).
pub const SNAPSHOT_MAX_AGE_MS: i64 = 24 * 60 * 60 * 1000;

/// Envelope format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// What actually goes into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredSnapshot {
    /// Envelope format version.
    pub version: u32,
    /// SHA-256 of `payload`, hex.
    pub checksum: String,
    /// Serialized [`SessionSnapshot`].
    pub payload: String,
}

/// Current wall-clock time, Unix milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Whether a snapshot saved at `saved_at_ms` is too old at `now_ms`.
///
/// A save time in the future counts as fresh.
pub fn is_stale(saved_at_ms: i64, now_ms: i64) -> bool {
    now_ms.saturating_sub(saved_at_ms) >= SNAPSHOT_MAX_AGE_MS
}

/// Reads and writes the session snapshot through a [`SnapshotStore`].
pub struct SnapshotAdapter {
    store: Box<dyn SnapshotStore>,
}

impl SnapshotAdapter {
    /// Adapter over `store` using [`SNAPSHOT_KEY`].
    pub fn new(store: Box<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &dyn SnapshotStore {
        self.store.as_ref()
    }

    /// Write `snapshot`, replacing whatever was stored.
    pub fn save(&self, snapshot: &SessionSnapshot) -> GameResult<()> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| GameError::Persistence(format!("encode snapshot: {e}")))?;
        let stored = StoredSnapshot {
            version: SNAPSHOT_VERSION,
            checksum: snapshot_checksum(payload.as_bytes()),
            payload,
        };
        let encoded = serde_json::to_string(&stored)
            .map_err(|e| GameError::Persistence(format!("encode envelope: {e}")))?;

        self.store
            .set(SNAPSHOT_KEY, &encoded)
            .map_err(|e| GameError::Persistence(format!("{e:#}")))?;

        debug!(
            "Saved snapshot {} ({} results, {} bytes)",
            snapshot.session_id.short(),
            snapshot.round_results.len(),
            encoded.len()
        );
        Ok(())
    }

    /// Load the stored snapshot if it is present, intact, and fresh.
    pub fn load(&self) -> Option<SessionSnapshot> {
        self.load_at(now_epoch_ms())
    }

    /// [`load`](Self::load) against an explicit clock.
    pub fn load_at(&self, now_ms: i64) -> Option<SessionSnapshot> {
        let raw = match self.store.get(SNAPSHOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Snapshot read failed: {:#}", e);
                return None;
            }
        };

        match decode(&raw) {
            Ok(snapshot) if is_stale(snapshot.saved_at_epoch_ms, now_ms) => {
                info!("Discarding stale snapshot {}", snapshot.session_id.short());
                self.clear();
                None
            }
            Ok(snapshot) => Some(snapshot),
            Err(reason) => {
                warn!("Discarding unreadable snapshot: {}", reason);
                self.clear();
                None
            }
        }
    }

    /// Delete the stored snapshot. Failures are logged.
    pub fn clear(&self) {
        if let Err(e) = self.store.remove(SNAPSHOT_KEY) {
            warn!("Snapshot delete failed: {:#}", e);
        }
    }
}

fn decode(raw: &str) -> Result<SessionSnapshot, String> {
    let stored: StoredSnapshot =
        serde_json::from_str(raw).map_err(|e| format!("bad envelope: {e}"))?;
    if stored.version != SNAPSHOT_VERSION {
        return Err(format!("unsupported version {}", stored.version));
    }
    if !verify_snapshot_checksum(stored.payload.as_bytes(), &stored.checksum) {
        return Err("checksum mismatch".into());
    }
    let snapshot: SessionSnapshot =
        serde_json::from_str(&stored.payload).map_err(|e| format!("bad payload: {e}"))?;
    snapshot.validate().map_err(|e| e.to_string())?;
    Ok(snapshot)
}

// =============================================================================
// STORES
// =============================================================================

/// In-process store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<BTreeMap<String, String>>,
    fail_writes: Mutex<bool>,
}

impl MemorySnapshotStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail, as a full quota would.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    fn entries(&self) -> anyhow::Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries.lock().map_err(|_| anyhow::anyhow!("snapshot store poisoned"))
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.fail_writes.lock().map(|flag| *flag).unwrap_or(false) {
            anyhow::bail!("storage quota exceeded");
        }
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Store files under `dir`, creating it on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}
