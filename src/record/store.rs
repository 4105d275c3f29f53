//! Whole-store codec: header + session table + summary table

use super::{
    RecordError, SessionLog, SummaryTable, HEADER_OFFSET, HEADER_SIZE, SESSION_CAPACITY,
    SESSION_OFFSET, SESSION_SIZE, STORE_SIZE, SUMMARY_CAPACITY, SUMMARY_OFFSET, SUMMARY_SIZE,
};

/// The 16-byte file header. Field meanings are unknown, so it is carried as
/// an opaque blob and written back byte-for-byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header(pub [u8; HEADER_SIZE]);

impl Header {
    /// The second 32-bit word, observed to track the session count.
    pub fn field04(&self) -> u32 {
        u32::from_le_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }
}

/// A decoded record store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordStore {
    pub header: Header,
    pub sessions: SessionLog,
    pub summaries: SummaryTable,
}

/// Borrow `len` bytes at `offset`, failing with a format error on a short read.
fn region<'a>(
    bytes: &'a [u8],
    what: &str,
    offset: usize,
    len: usize,
) -> Result<&'a [u8], RecordError> {
    let end = offset + len;
    if bytes.len() < end {
        return Err(RecordError::short_read(
            what,
            offset,
            len,
            bytes.len().saturating_sub(offset),
        ));
    }
    Ok(&bytes[offset..end])
}

impl RecordStore {
    pub fn new(header: Header, sessions: SessionLog, summaries: SummaryTable) -> Self {
        Self {
            header,
            sessions,
            summaries,
        }
    }

    /// Parse a full 806,160-byte store.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != STORE_SIZE {
            return Err(RecordError::Format(format!(
                "record store must be {} bytes, got {}",
                STORE_SIZE,
                bytes.len()
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(region(bytes, "header", HEADER_OFFSET, HEADER_SIZE)?);

        let sessions = SessionLog::from_table_bytes(region(
            bytes,
            "session table",
            SESSION_OFFSET,
            SESSION_CAPACITY * SESSION_SIZE,
        )?);

        let summaries = SummaryTable::from_table_bytes(region(
            bytes,
            "summary table",
            SUMMARY_OFFSET,
            SUMMARY_CAPACITY * SUMMARY_SIZE,
        )?);

        Ok(Self {
            header: Header(header),
            sessions,
            summaries,
        })
    }

    /// Serialize to exactly 806,160 bytes. Sessions are written compacted
    /// and padded with empty sentinels; summary slots keep their positions.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(STORE_SIZE);
        buf.extend_from_slice(&self.header.0);
        buf.extend_from_slice(&self.sessions.to_table_bytes());
        buf.extend_from_slice(&self.summaries.to_table_bytes());
        debug_assert_eq!(buf.len(), STORE_SIZE);
        buf
    }
}
