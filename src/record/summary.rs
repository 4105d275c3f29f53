//! Per-title aggregates and the 256-slot summary table
//!
//! The table keeps its on-disk positional layout: empty slots are holes at
//! arbitrary positions and are reused by later inserts. A title index and a
//! free-slot set are maintained alongside the slots so lookups and inserts
//! do not scan the whole table.

use std::collections::{BTreeSet, HashMap};

use super::{le_array, EMPTY_TITLE_ID, SUMMARY_CAPACITY, SUMMARY_SIZE};

/// Aggregated play statistics for one title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub title_id: u64,
    pub total_secs: u32,
    pub launch_count: u16,
    /// Opaque, preserved as read.
    pub unknown_e: u16,
    /// Days since 2000-01-01.
    pub first_played_days: u16,
    /// Days since 2000-01-01.
    pub last_played_days: u16,
    /// Opaque, observed zero.
    pub unknown_14: u32,
}

impl Summary {
    pub fn new(
        title_id: u64,
        total_secs: u32,
        launch_count: u16,
        first_played_days: u16,
        last_played_days: u16,
    ) -> Self {
        Self {
            title_id,
            total_secs,
            launch_count,
            unknown_e: 0,
            first_played_days,
            last_played_days,
            unknown_14: 0,
        }
    }

    /// The all-0xFF record written into never-used slots.
    pub fn empty() -> Self {
        Self::from_bytes(&[0xFF; SUMMARY_SIZE])
    }

    /// Unused slots carry either an all-ones or a zero `title_id`.
    pub fn is_empty(&self) -> bool {
        self.title_id == EMPTY_TITLE_ID || self.title_id == 0
    }

    pub fn to_bytes(&self) -> [u8; SUMMARY_SIZE] {
        let mut buf = [0u8; SUMMARY_SIZE];
        buf[0..8].copy_from_slice(&self.title_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.total_secs.to_le_bytes());
        buf[12..14].copy_from_slice(&self.launch_count.to_le_bytes());
        buf[14..16].copy_from_slice(&self.unknown_e.to_le_bytes());
        buf[16..18].copy_from_slice(&self.first_played_days.to_le_bytes());
        buf[18..20].copy_from_slice(&self.last_played_days.to_le_bytes());
        buf[20..24].copy_from_slice(&self.unknown_14.to_le_bytes());
        buf
    }

    /// Decode one record. `data` must hold at least 24 bytes.
    pub(crate) fn from_bytes(data: &[u8]) -> Self {
        Self {
            title_id: u64::from_le_bytes(le_array(data, 0)),
            total_secs: u32::from_le_bytes(le_array(data, 8)),
            launch_count: u16::from_le_bytes(le_array(data, 12)),
            unknown_e: u16::from_le_bytes(le_array(data, 14)),
            first_played_days: u16::from_le_bytes(le_array(data, 16)),
            last_played_days: u16::from_le_bytes(le_array(data, 18)),
            unknown_14: u32::from_le_bytes(le_array(data, 20)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryTable {
    slots: Vec<Summary>,
    /// title_id -> slot of its first occurrence.
    index: HashMap<u64, usize>,
    /// Empty slots, lowest first.
    free: BTreeSet<usize>,
}

impl Default for SummaryTable {
    fn default() -> Self {
        Self::from_slots(vec![Summary::empty(); SUMMARY_CAPACITY])
    }
}

impl SummaryTable {
    /// A table with every slot empty.
    pub fn new() -> Self {
        Self::default()
    }

    fn from_slots(slots: Vec<Summary>) -> Self {
        let mut index = HashMap::new();
        let mut free = BTreeSet::new();
        for (i, s) in slots.iter().enumerate() {
            if s.is_empty() {
                free.insert(i);
            } else {
                index.entry(s.title_id).or_insert(i);
            }
        }
        Self { slots, index, free }
    }

    /// Parse a raw 256-slot table region, keeping slot positions.
    pub fn from_table_bytes(region: &[u8]) -> Self {
        let slots = region
            .chunks_exact(SUMMARY_SIZE)
            .take(SUMMARY_CAPACITY)
            .map(Summary::from_bytes)
            .collect();
        Self::from_slots(slots)
    }

    pub fn to_table_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SUMMARY_CAPACITY * SUMMARY_SIZE);
        for slot in &self.slots {
            buf.extend_from_slice(&slot.to_bytes());
        }
        buf
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        SUMMARY_CAPACITY - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.len() == SUMMARY_CAPACITY
    }

    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Raw slot contents, including holes.
    pub fn slots(&self) -> &[Summary] {
        &self.slots
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Summary> {
        self.slots.iter().filter(|s| !s.is_empty())
    }

    /// Live entries in slot order, compacted (the wire representation).
    pub fn live(&self) -> Vec<Summary> {
        self.iter().copied().collect()
    }

    pub fn get(&self, title_id: u64) -> Option<&Summary> {
        self.index.get(&title_id).map(|&i| &self.slots[i])
    }

    pub fn contains(&self, title_id: u64) -> bool {
        self.index.contains_key(&title_id)
    }

    /// Mutable access to a live entry. Callers must not change `title_id`.
    pub(crate) fn get_mut(&mut self, title_id: u64) -> Option<&mut Summary> {
        let i = *self.index.get(&title_id)?;
        Some(&mut self.slots[i])
    }

    /// Mutable access to every live entry. Callers must not change `title_id`.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Summary> {
        self.slots.iter_mut().filter(|s| !s.is_empty())
    }

    /// Store `summary` in place of an existing entry for the same title, or
    /// in the lowest free slot. Returns the slot used, or `None` when the
    /// title is new and the table is full. Empty records are ignored.
    pub fn insert(&mut self, summary: Summary) -> Option<usize> {
        if summary.is_empty() {
            return None;
        }
        if let Some(&i) = self.index.get(&summary.title_id) {
            self.slots[i] = summary;
            return Some(i);
        }
        let slot = self.free.pop_first()?;
        self.slots[slot] = summary;
        self.index.insert(summary.title_id, slot);
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_bytes_layout() {
        let mut s = Summary::new(0x0004_0000_0005_5D00, 7200, 3, 8000, 8100);
        s.unknown_e = 2;
        let b = s.to_bytes();
        assert_eq!(&b[8..12], &7200u32.to_le_bytes());
        assert_eq!(&b[12..14], &3u16.to_le_bytes());
        assert_eq!(&b[14..16], &2u16.to_le_bytes());
        assert_eq!(&b[16..18], &8000u16.to_le_bytes());
        assert_eq!(&b[18..20], &8100u16.to_le_bytes());
        assert_eq!(&b[20..24], &[0, 0, 0, 0]);
        assert_eq!(Summary::from_bytes(&b), s);
    }

    #[test]
    fn test_zero_and_ff_slots_are_empty() {
        assert!(Summary::from_bytes(&[0u8; SUMMARY_SIZE]).is_empty());
        assert!(Summary::empty().is_empty());
        assert!(!Summary::new(1, 0, 0, 0, 0).is_empty());
    }

    #[test]
    fn test_holes_keep_position_and_are_reused_lowest_first() {
        let mut region = vec![0xFFu8; SUMMARY_CAPACITY * SUMMARY_SIZE];
        // slot 0 live, slot 1 zeroed hole, slot 2 live, rest 0xFF
        region[0..24].copy_from_slice(&Summary::new(10, 1, 1, 1, 1).to_bytes());
        region[24..48].copy_from_slice(&[0u8; 24]);
        region[48..72].copy_from_slice(&Summary::new(20, 2, 2, 2, 2).to_bytes());

        let mut table = SummaryTable::from_table_bytes(&region);
        assert_eq!(table.len(), 2);
        assert_eq!(table.to_table_bytes(), region);

        let slot = table.insert(Summary::new(30, 3, 3, 3, 3));
        assert_eq!(slot, Some(1));
        assert_eq!(table.slots()[1].title_id, 30);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_insert_existing_title_overwrites_in_place() {
        let mut table = SummaryTable::new();
        assert_eq!(table.insert(Summary::new(5, 10, 1, 1, 1)), Some(0));
        assert_eq!(table.insert(Summary::new(5, 99, 1, 1, 1)), Some(0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(5).unwrap().total_secs, 99);
    }

    #[test]
    fn test_insert_into_full_table() {
        let mut table = SummaryTable::new();
        for id in 1..=SUMMARY_CAPACITY as u64 {
            assert!(table.insert(Summary::new(id, 0, 0, 0, 0)).is_some());
        }
        assert_eq!(table.free_slots(), 0);
        assert_eq!(table.insert(Summary::new(9999, 0, 0, 0, 0)), None);
    }
}
