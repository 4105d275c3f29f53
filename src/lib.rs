// pldsync - Activity log merge, backup and peer sync

pub mod backup;
pub mod config;
pub mod export;
pub mod merge;
pub mod network;
pub mod record;
pub mod storage;
pub mod sync;

pub use backup::{BackupStore, SnapshotId};
pub use config::{Config, NetConfig};
pub use network::{PeerState, Role, SyncPeer};
pub use record::RecordStore;
pub use storage::{DeviceState, FileArchive, RecordArchive, Workspace};
pub use sync::{run_sync, SyncError, SyncPhase, SyncReport, SyncWorker};
