//! Activity log record store
//!
//! Fixed-layout binary format shared by the hardware save region and the
//! SD snapshots. All multi-byte fields are little-endian; times count from
//! 2000-01-01 00:00:00 UTC.
//!
//! ```text
//! 0x00000  16 B      header (opaque)
//! 0x00010  800000 B  session table, 50000 x 16-byte records
//! 0xC3510  6144 B    summary table, 256 x 24-byte records
//! ```

pub mod format;
pub mod names;
pub mod session;
pub mod store;
pub mod summary;

pub use format::{fmt_days, fmt_duration, fmt_timestamp, hour_timestamp};
pub use names::{TitleName, TitleNames};
pub use session::{Session, SessionLog};
pub use store::{Header, RecordStore};
pub use summary::{Summary, SummaryTable};

use thiserror::Error;

/// Number of slots in the session table.
pub const SESSION_CAPACITY: usize = 50_000;
/// Number of slots in the summary table.
pub const SUMMARY_CAPACITY: usize = 256;
/// Maximum entries kept in the title-name table.
pub const TITLE_NAMES_CAPACITY: usize = 1024;

pub const HEADER_OFFSET: usize = 0x00000;
pub const SESSION_OFFSET: usize = 0x00010;
pub const SUMMARY_OFFSET: usize = 0xC3510;

pub const HEADER_SIZE: usize = 16;
pub const SESSION_SIZE: usize = 16;
pub const SUMMARY_SIZE: usize = 24;
pub const TITLE_NAME_SIZE: usize = 72;

/// Total size of an encoded record store.
pub const STORE_SIZE: usize = 806_160;

/// `title_id` of an unused slot.
pub const EMPTY_TITLE_ID: u64 = u64::MAX;

/// Upper bound of `play_secs` for one hour bucket.
pub const MAX_PLAY_SECS: u32 = 3600;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Format error: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecordError {
    pub(crate) fn short_read(what: &str, offset: usize, wanted: usize, got: usize) -> Self {
        RecordError::Format(format!(
            "short read of {} at {:#x}: wanted {} bytes, got {}",
            what, offset, wanted, got
        ))
    }
}

/// Copy a fixed-size little-endian field out of `data` at `at`.
pub(crate) fn le_array<const N: usize>(data: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[at..at + N]);
    out
}
