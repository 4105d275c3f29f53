//! SD working directory and the state lifecycle built on it

use std::path::{Path, PathBuf};

use crate::backup::{BackupStore, SnapshotId};
use crate::config::Config;
use crate::merge::{recompute_totals, RecordMerge};
use crate::record::{RecordStore, TitleNames};

use super::{RecordArchive, StorageError};

const MERGED_FILE: &str = "merged.dat";
const SYNC_COUNT_FILE: &str = "synccount";
const TITLE_NAMES_FILE: &str = "title_names.dat";
const CORRUPT_SUFFIX: &str = "corrupt";

/// Everything a device works with between startup and shutdown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub store: RecordStore,
    pub names: TitleNames,
    /// Completed syncs, for display only.
    pub sync_count: u32,
}

#[derive(Clone)]
pub struct Workspace {
    dir: PathBuf,
    backups: BackupStore,
}

impl Workspace {
    /// Backups live next to the merged snapshot.
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Self {
        let dir = dir.into();
        Self {
            backups: BackupStore::new(dir.clone(), retention),
            dir,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.data_dir.clone(), config.backup_retention)
    }

    pub fn with_backups(mut self, backups: BackupStore) -> Self {
        self.backups = backups;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn merged_path(&self) -> PathBuf {
        self.dir.join(MERGED_FILE)
    }

    pub fn sync_count_path(&self) -> PathBuf {
        self.dir.join(SYNC_COUNT_FILE)
    }

    pub fn names_path(&self) -> PathBuf {
        self.dir.join(TITLE_NAMES_FILE)
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// The merged snapshot, or `None` before the first write.
    pub async fn read_merged(&self) -> Result<Option<RecordStore>, StorageError> {
        match tokio::fs::read(self.merged_path()).await {
            Ok(bytes) => Ok(Some(RecordStore::decode(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_merged(&self, store: &RecordStore) -> Result<(), StorageError> {
        self.ensure_dir().await?;
        tokio::fs::write(self.merged_path(), store.encode()).await?;
        log::debug!("Wrote {}", self.merged_path().display());
        Ok(())
    }

    /// Snapshot the current merged file, if there is one.
    pub async fn backup_merged(&self) -> Result<Option<SnapshotId>, StorageError> {
        Ok(self.backups.backup_file(&self.merged_path()).await?)
    }

    /// Back up the previous merged snapshot, then replace it.
    pub async fn persist(&self, store: &RecordStore) -> Result<Option<SnapshotId>, StorageError> {
        let backup = self.backup_merged().await?;
        self.write_merged(store).await?;
        Ok(backup)
    }

    /// Missing or short counter files read as zero.
    pub async fn load_sync_count(&self) -> Result<u32, StorageError> {
        match tokio::fs::read(self.sync_count_path()).await {
            Ok(bytes) if bytes.len() >= 4 => {
                Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            Ok(_) => Ok(0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save_sync_count(&self, count: u32) -> Result<(), StorageError> {
        self.ensure_dir().await?;
        tokio::fs::write(self.sync_count_path(), count.to_le_bytes()).await?;
        Ok(())
    }

    pub async fn load_names(&self) -> Result<TitleNames, StorageError> {
        match tokio::fs::read(self.names_path()).await {
            Ok(bytes) => Ok(TitleNames::from_file_bytes(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TitleNames::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save_names(&self, names: &TitleNames) -> Result<(), StorageError> {
        self.ensure_dir().await?;
        tokio::fs::write(self.names_path(), names.to_file_bytes()).await?;
        Ok(())
    }

    /// The merged snapshot for startup. A file that does not decode, such
    /// as one cut short by a crash mid-write, is moved aside to
    /// `merged.dat.corrupt` and treated as missing.
    async fn read_merged_or_set_aside(&self) -> Result<Option<RecordStore>, StorageError> {
        match self.read_merged().await {
            Err(StorageError::Record(e)) => {
                let aside = self.dir.join(format!("{}.{}", MERGED_FILE, CORRUPT_SUFFIX));
                log::warn!(
                    "Unreadable merged snapshot ({}), moving it to {}",
                    e,
                    aside.display()
                );
                tokio::fs::rename(self.merged_path(), &aside).await?;
                Ok(None)
            }
            other => other,
        }
    }

    /// Startup: read the save region, absorb whatever the merged snapshot
    /// knows that it doesn't, recompute totals and write the result back
    /// as the new merged snapshot. Without a merged snapshot the save
    /// region's totals are kept as they are.
    pub async fn load_device_state(
        &self,
        archive: &dyn RecordArchive,
    ) -> Result<DeviceState, StorageError> {
        let mut store = RecordStore::decode(&archive.read().await?)?;
        log::info!(
            "Loaded {} sessions, {} titles from {}",
            store.sessions.len(),
            store.summaries.len(),
            archive.describe()
        );

        if let Some(merged) = self.read_merged_or_set_aside().await? {
            let new_sessions = store.sessions.absorb_new_only(merged.sessions.as_slice())?;
            let new_titles = store
                .summaries
                .absorb_new_only(&merged.summaries.live()[..])?;
            log::info!(
                "Absorbed {} sessions, {} titles from merged snapshot",
                new_sessions,
                new_titles
            );
            recompute_totals(&mut store.summaries, &store.sessions);
        }
        self.write_merged(&store).await?;

        Ok(DeviceState {
            store,
            names: self.load_names().await?,
            sync_count: self.load_sync_count().await?,
        })
    }

    /// Write `state` into the save region after backing up what it holds.
    pub async fn commit(
        &self,
        archive: &dyn RecordArchive,
        state: &DeviceState,
    ) -> Result<SnapshotId, StorageError> {
        let current = archive.read().await?;
        let backup = self.backups.backup(&current).await?;
        archive.write(&state.store.encode()).await?;
        log::info!(
            "Committed to {} (previous contents in {})",
            archive.describe(),
            backup
        );
        Ok(backup)
    }

    /// Throw away merged data: the merged snapshot becomes a copy of the
    /// save region again and the sync counter restarts.
    pub async fn reset_to_local(
        &self,
        archive: &dyn RecordArchive,
    ) -> Result<DeviceState, StorageError> {
        let store = RecordStore::decode(&archive.read().await?)?;
        self.persist(&store).await?;
        self.save_sync_count(0).await?;
        log::info!("Reset merged data to {}", archive.describe());
        Ok(DeviceState {
            store,
            names: self.load_names().await?,
            sync_count: 0,
        })
    }

    /// Make a backup the merged snapshot. The snapshot is read before the
    /// current merged file is backed up, so pruning cannot remove it first.
    pub async fn adopt_snapshot(&self, id: &SnapshotId) -> Result<RecordStore, StorageError> {
        let bytes = self.backups.read(id).await?;
        let store = RecordStore::decode(&bytes)?;
        self.backup_merged().await?;
        self.ensure_dir().await?;
        tokio::fs::write(self.merged_path(), &bytes).await?;
        log::info!("Restored {}", id);
        Ok(store)
    }
}
