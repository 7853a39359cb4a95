//! Persistent storage for the ledger world state.
//!
//! Implements:
//! - Write-ahead log (WAL) of committed write-sets
//! - Crash recovery (snapshot + WAL replay)
//! - Snapshot and WAL compaction
//!
//! WAL lines are JSON; a commit is appended before it is applied to the
//! in-memory world state.

use crate::ledger::VersionedValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

const WAL_FILE: &str = "wal.log";
const SNAPSHOT_FILE: &str = "snapshot.json";

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base directory for storage files
    pub dir: PathBuf,
    /// Flush to disk after every commit
    pub fsync_on_write: bool,
    /// Maximum WAL size before compaction (bytes)
    pub max_wal_size: u64,
    /// Maximum commits in WAL before snapshot
    pub snapshot_threshold: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./co-data"),
            fsync_on_write: true,
            max_wal_size: 10 * 1024 * 1024, // 10 MB
            snapshot_threshold: 1000,
        }
    }
}

impl StorageConfig {
    /// Storage rooted at `dir` with default limits
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }
}

/// One committed transaction as logged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub tx_id: String,
    /// Position in the global commit order
    pub height: u64,
    pub committed_at: DateTime<Utc>,
    /// Keys and values written, every key stamped with `height`
    pub writes: Vec<(String, Vec<u8>)>,
}

/// Full world state at a commit height
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub height: u64,
    pub entries: BTreeMap<String, VersionedValue>,
}

/// WAL entry for recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum WalEntry {
    #[serde(rename = "COMMIT")]
    Commit(CommitRecord),

    /// Snapshot marker (entries before it are covered by the snapshot file)
    #[serde(rename = "SNAPSHOT")]
    SnapshotMarker { height: u64 },
}

/// Recovered state from storage
#[derive(Debug, Default)]
pub struct RecoveredState {
    /// Latest snapshot (if any)
    pub snapshot: Option<LedgerSnapshot>,
    /// Commits after the snapshot, in commit order
    pub commits: Vec<CommitRecord>,
}

/// Persistent storage manager
pub struct Storage {
    config: StorageConfig,
    /// Current WAL file
    wal_file: Option<BufWriter<File>>,
    /// Current WAL size
    wal_size: u64,
    /// Commits written since last snapshot
    commits_since_snapshot: usize,
}

impl Storage {
    /// Create new storage instance
    pub fn new(config: StorageConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.dir)?;

        Ok(Self {
            config,
            wal_file: None,
            wal_size: 0,
            commits_since_snapshot: 0,
        })
    }

    /// Open storage and recover state
    pub fn open(&mut self) -> io::Result<RecoveredState> {
        let (state, valid_len) = self.recover()?;
        self.truncate_wal(valid_len)?;
        self.commits_since_snapshot = state.commits.len();
        self.open_wal()?;
        Ok(state)
    }

    /// Cut the WAL back to its last complete entry so appends start on a fresh line
    fn truncate_wal(&self, valid_len: u64) -> io::Result<()> {
        let wal_path = self.config.dir.join(WAL_FILE);
        if !wal_path.exists() {
            return Ok(());
        }

        let file = OpenOptions::new().write(true).open(&wal_path)?;
        let len = file.metadata()?.len();
        if len > valid_len {
            warn!(
                "Storage: Truncating WAL from {} to {} bytes (discarding incomplete tail)",
                len, valid_len
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Open WAL file for appending
    fn open_wal(&mut self) -> io::Result<()> {
        let wal_path = self.config.dir.join(WAL_FILE);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)?;

        self.wal_size = file.metadata()?.len();
        self.wal_file = Some(BufWriter::new(file));

        debug!("Storage: Opened WAL at {:?} (size={})", wal_path, self.wal_size);
        Ok(())
    }

    /// Recover state from WAL and snapshot.
    ///
    /// Replay stops at the first incomplete or unparsable entry; the returned
    /// length is the byte offset just past the last good entry.
    fn recover(&self) -> io::Result<(RecoveredState, u64)> {
        let mut state = RecoveredState::default();

        let snapshot_path = self.config.dir.join(SNAPSHOT_FILE);
        if snapshot_path.exists() {
            let data = fs::read_to_string(&snapshot_path)?;
            match serde_json::from_str::<LedgerSnapshot>(&data) {
                Ok(snap) => {
                    info!("Storage: Loaded snapshot at height {}", snap.height);
                    state.snapshot = Some(snap);
                }
                Err(e) => {
                    warn!("Storage: Failed to parse snapshot: {}", e);
                }
            }
        }

        let mut valid_len = 0u64;
        let wal_path = self.config.dir.join(WAL_FILE);
        if wal_path.exists() {
            let mut reader = BufReader::new(File::open(&wal_path)?);
            let mut line = String::new();
            let mut line_num = 0;

            loop {
                line.clear();
                let read = match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Storage: WAL read error at line {}: {}", line_num + 1, e);
                        break;
                    }
                };
                line_num += 1;

                // An entry is complete only once its newline is on disk
                if !line.ends_with('\n') {
                    warn!("Storage: Incomplete WAL entry at line {}", line_num);
                    break;
                }

                if !line.trim().is_empty() {
                    match serde_json::from_str::<WalEntry>(&line) {
                        Ok(entry) => Self::apply_wal_entry(&mut state, entry),
                        Err(e) => {
                            warn!("Storage: WAL parse error at line {}, stopping replay: {}", line_num, e);
                            break;
                        }
                    }
                }

                valid_len += read as u64;
            }

            info!(
                "Storage: Replayed {} WAL lines, {} commits recovered",
                line_num,
                state.commits.len()
            );
        }

        Ok((state, valid_len))
    }

    /// Apply a single WAL entry during recovery
    fn apply_wal_entry(state: &mut RecoveredState, entry: WalEntry) {
        match entry {
            WalEntry::Commit(commit) => {
                let min_height = state.snapshot.as_ref().map(|s| s.height).unwrap_or(0);
                if commit.height > min_height {
                    state.commits.push(commit);
                }
            }
            WalEntry::SnapshotMarker { height } => {
                state.commits.retain(|c| c.height > height);
            }
        }
    }

    /// Write entry to WAL
    fn write_wal(&mut self, entry: &WalEntry) -> io::Result<()> {
        let wal = self
            .wal_file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "WAL not open"))?;

        let data = serde_json::to_string(entry)?;
        writeln!(wal, "{}", data)?;

        if self.config.fsync_on_write {
            wal.flush()?;
            wal.get_ref().sync_data()?;
        }

        self.wal_size += data.len() as u64 + 1;
        Ok(())
    }

    /// Persist a committed write-set
    pub fn save_commit(&mut self, commit: &CommitRecord) -> io::Result<()> {
        self.write_wal(&WalEntry::Commit(commit.clone()))?;
        self.commits_since_snapshot += 1;
        debug!(
            "Storage: Saved commit {} at height {} ({} keys)",
            commit.tx_id,
            commit.height,
            commit.writes.len()
        );
        Ok(())
    }

    /// Persist snapshot and compact WAL
    pub fn save_snapshot(&mut self, snapshot: &LedgerSnapshot) -> io::Result<()> {
        // Write to temp file then rename (atomic)
        let snapshot_path = self.config.dir.join(SNAPSHOT_FILE);
        let temp_path = self.config.dir.join("snapshot.json.tmp");

        let data = serde_json::to_string(snapshot)?;
        fs::write(&temp_path, &data)?;
        fs::rename(&temp_path, &snapshot_path)?;

        self.write_wal(&WalEntry::SnapshotMarker {
            height: snapshot.height,
        })?;

        self.compact_wal()?;

        info!("Storage: Saved snapshot at height {}", snapshot.height);
        Ok(())
    }

    /// Compact WAL by starting a fresh file
    fn compact_wal(&mut self) -> io::Result<()> {
        if let Some(mut wal) = self.wal_file.take() {
            wal.flush()?;
        }

        let wal_path = self.config.dir.join(WAL_FILE);
        let old_path = self.config.dir.join("wal.old");

        if wal_path.exists() {
            fs::rename(&wal_path, &old_path)?;
        }

        self.wal_size = 0;
        self.commits_since_snapshot = 0;
        self.open_wal()?;

        if old_path.exists() {
            fs::remove_file(&old_path)?;
        }

        info!("Storage: WAL compacted");
        Ok(())
    }

    /// Check if snapshot should be taken
    pub fn should_snapshot(&self) -> bool {
        self.commits_since_snapshot >= self.config.snapshot_threshold
            || self.wal_size >= self.config.max_wal_size
    }

    /// Get storage statistics
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            wal_size: self.wal_size,
            commits_since_snapshot: self.commits_since_snapshot,
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub wal_size: u64,
    pub commits_since_snapshot: usize,
}
