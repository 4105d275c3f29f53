//! Hour-granularity play sessions and the compacted session log

use super::{le_array, RecordError, EMPTY_TITLE_ID, SESSION_CAPACITY, SESSION_SIZE};

/// One hour of play for one title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Session {
    pub title_id: u64,
    /// Seconds since 2000-01-01, truncated to the hour.
    pub timestamp: u32,
    /// Seconds played during that hour (0..=3600).
    pub play_secs: u32,
}

impl Session {
    pub fn new(title_id: u64, timestamp: u32, play_secs: u32) -> Self {
        Self {
            title_id,
            timestamp,
            play_secs,
        }
    }

    /// The all-0xFF record that marks an unused slot.
    pub fn empty() -> Self {
        Self {
            title_id: EMPTY_TITLE_ID,
            timestamp: u32::MAX,
            play_secs: u32::MAX,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title_id == EMPTY_TITLE_ID
    }

    /// Natural key: at most one record per title per hour.
    pub fn key(&self) -> (u64, u32) {
        (self.title_id, self.timestamp)
    }

    pub fn to_bytes(&self) -> [u8; SESSION_SIZE] {
        let mut buf = [0u8; SESSION_SIZE];
        buf[0..8].copy_from_slice(&self.title_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[12..16].copy_from_slice(&self.play_secs.to_le_bytes());
        buf
    }

    /// Decode one record. `data` must hold at least 16 bytes.
    pub(crate) fn from_bytes(data: &[u8]) -> Self {
        Self {
            title_id: u64::from_le_bytes(le_array(data, 0)),
            timestamp: u32::from_le_bytes(le_array(data, 8)),
            play_secs: u32::from_le_bytes(le_array(data, 12)),
        }
    }
}

/// Live sessions only, in arbitrary order until sorted for a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionLog {
    entries: Vec<Session>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from live records. Empty-sentinel entries are dropped.
    pub fn from_entries(entries: Vec<Session>) -> Result<Self, RecordError> {
        let entries: Vec<Session> = entries.into_iter().filter(|s| !s.is_empty()).collect();
        if entries.len() > SESSION_CAPACITY {
            return Err(RecordError::Format(format!(
                "{} sessions exceed the table capacity of {}",
                entries.len(),
                SESSION_CAPACITY
            )));
        }
        Ok(Self { entries })
    }

    /// Compact a raw 50000-slot table region into its live entries.
    pub fn from_table_bytes(region: &[u8]) -> Self {
        let entries = region
            .chunks_exact(SESSION_SIZE)
            .take(SESSION_CAPACITY)
            .map(Session::from_bytes)
            .filter(|s| !s.is_empty())
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[Session] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.entries.iter()
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<Session> {
        &mut self.entries
    }

    /// Sort by `(title_id, timestamp)`.
    pub fn sort(&mut self) {
        self.entries.sort_unstable_by_key(Session::key);
    }

    /// Binary search for a key. Only meaningful after [`SessionLog::sort`].
    pub fn find(&self, title_id: u64, timestamp: u32) -> Option<usize> {
        self.entries
            .binary_search_by_key(&(title_id, timestamp), Session::key)
            .ok()
    }

    pub fn count_for(&self, title_id: u64) -> usize {
        self.entries.iter().filter(|s| s.title_id == title_id).count()
    }

    /// Longest run of consecutive calendar days with at least one session
    /// of `title_id`. Zero when the title has no sessions.
    pub fn longest_streak(&self, title_id: u64) -> u32 {
        let mut days: Vec<u32> = self
            .entries
            .iter()
            .filter(|s| s.title_id == title_id)
            .map(|s| s.timestamp / 86_400)
            .collect();
        days.sort_unstable();
        days.dedup();

        let mut best = 0;
        let mut run = 0;
        let mut prev: Option<u32> = None;
        for day in days {
            run = match prev {
                Some(p) if day == p + 1 => run + 1,
                _ => 1,
            };
            best = best.max(run);
            prev = Some(day);
        }
        best
    }

    /// Expand to the full on-disk table: live entries first, then empty
    /// sentinels up to the table capacity.
    pub fn to_table_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0xFFu8; SESSION_CAPACITY * SESSION_SIZE];
        for (slot, session) in buf.chunks_exact_mut(SESSION_SIZE).zip(&self.entries) {
            slot.copy_from_slice(&session.to_bytes());
        }
        buf
    }
}
