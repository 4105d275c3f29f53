//! Timestamped snapshot backups with retention pruning
//!
//! Each backup is a full record store written to
//! `pld_backup_YYYYMMDD_HHMMSS.dat`. Names sort lexicographically by
//! creation time, so descending name order is most-recent-first. Two
//! backups within the same second get a `_NN` suffix instead of
//! overwriting each other.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::record::{
    RecordError, RecordStore, SummaryTable, STORE_SIZE, SUMMARY_CAPACITY, SUMMARY_OFFSET,
    SUMMARY_SIZE,
};

/// Number of snapshots kept unless configured otherwise.
pub const DEFAULT_RETENTION: usize = 10;

const PREFIX: &str = "pld_backup_";
const SUFFIX: &str = ".dat";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot is not a valid record store: {0}")]
    Record(#[from] RecordError),

    #[error("Snapshot not found: {0}")]
    NotFound(SnapshotId),

    #[error("Backup source must be {expected} bytes, got {actual}")]
    InvalidSize { expected: usize, actual: usize },
}

/// A snapshot's file name, e.g. `pld_backup_20240131_235959.dat`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    fn for_time(at: NaiveDateTime, seq: u32) -> Self {
        let stamp = at.format(STAMP_FORMAT);
        if seq == 0 {
            SnapshotId(format!("{}{}{}", PREFIX, stamp, SUFFIX))
        } else {
            SnapshotId(format!("{}{}_{:02}{}", PREFIX, stamp, seq, SUFFIX))
        }
    }

    /// Accept only names this store could have produced.
    pub fn parse(name: &str) -> Option<Self> {
        let id = SnapshotId(name.to_string());
        id.created_at().map(|_| id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time encoded in the name (local time, second resolution).
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        let body = self.0.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
        let (stamp, seq) = match body.len() {
            15 => (body, None),
            18 => (body.get(..15)?, Some(body.get(15..)?)),
            _ => return None,
        };
        if let Some(seq) = seq {
            let digits = seq.strip_prefix('_')?;
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
        }
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()
    }

    /// "YYYY-MM-DD HH:MM:SS" for display.
    pub fn label(&self) -> String {
        match self.created_at() {
            Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of snapshot timestamps.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

#[derive(Clone)]
pub struct BackupStore {
    dir: PathBuf,
    retention: usize,
    clock: Clock,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            dir: dir.into(),
            retention: retention.max(1),
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the wall clock, e.g. with a deterministic one in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn path_of(&self, id: &SnapshotId) -> PathBuf {
        self.dir.join(id.as_str())
    }

    /// Write `source` as a new snapshot, then prune beyond the retention limit.
    pub async fn backup(&self, source: &[u8]) -> Result<SnapshotId, BackupError> {
        if source.len() != STORE_SIZE {
            return Err(BackupError::InvalidSize {
                expected: STORE_SIZE,
                actual: source.len(),
            });
        }
        tokio::fs::create_dir_all(&self.dir).await?;

        let now = (self.clock)();
        let mut seq = 0;
        let id = loop {
            let candidate = SnapshotId::for_time(now, seq);
            if !tokio::fs::try_exists(self.path_of(&candidate)).await? || seq >= 99 {
                break candidate;
            }
            seq += 1;
        };

        tokio::fs::write(self.path_of(&id), source).await?;
        log::info!("Wrote backup {}", id);

        let removed = self.prune().await?;
        if !removed.is_empty() {
            log::info!("Pruned {} old backup(s)", removed.len());
        }
        Ok(id)
    }

    /// Snapshot the file at `path`. Returns `None` when it does not exist yet.
    pub async fn backup_file(&self, path: &Path) -> Result<Option<SnapshotId>, BackupError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => self.backup(&bytes).await.map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All snapshots, most recent first. A missing directory has none.
    pub async fn list(&self) -> Result<Vec<SnapshotId>, BackupError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = entry.file_name().to_str().and_then(SnapshotId::parse) {
                ids.push(id);
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    /// Delete the oldest snapshots until at most `retention` remain.
    pub async fn prune(&self) -> Result<Vec<SnapshotId>, BackupError> {
        let ids = self.list().await?;
        let stale: Vec<SnapshotId> = ids.into_iter().skip(self.retention).collect();
        for id in &stale {
            tokio::fs::remove_file(self.path_of(id)).await?;
            log::debug!("Removed backup {}", id);
        }
        Ok(stale)
    }

    /// Raw snapshot bytes, size-checked.
    pub async fn read(&self, id: &SnapshotId) -> Result<Vec<u8>, BackupError> {
        let bytes = match tokio::fs::read(self.path_of(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.len() != STORE_SIZE {
            return Err(BackupError::InvalidSize {
                expected: STORE_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    /// Decode a snapshot. Does not touch the active store; callers decide
    /// whether to adopt the result.
    pub async fn restore(&self, id: &SnapshotId) -> Result<RecordStore, BackupError> {
        let bytes = self.read(id).await?;
        Ok(RecordStore::decode(&bytes)?)
    }

    /// Number of live titles in a snapshot, reading only its summary table.
    pub async fn app_count(&self, id: &SnapshotId) -> Result<usize, BackupError> {
        let mut file = match tokio::fs::File::open(self.path_of(id)).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        file.seek(std::io::SeekFrom::Start(SUMMARY_OFFSET as u64)).await?;
        let mut region = vec![0u8; SUMMARY_CAPACITY * SUMMARY_SIZE];
        file.read_exact(&mut region).await?;
        Ok(SummaryTable::from_table_bytes(&region).len())
    }
}
