//! Title-name table
//!
//! Descriptive only: names never influence merge decisions. The table is
//! kept sorted by title id and persisted as a `u32` count followed by
//! 72-byte records (`u64` id + 64-byte NUL-terminated UTF-8 name).

use super::{le_array, TITLE_NAMES_CAPACITY, TITLE_NAME_SIZE};

/// Longest stored name in bytes, leaving room for the terminating NUL.
pub const MAX_NAME_BYTES: usize = TITLE_NAME_SIZE - 8 - 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleName {
    pub title_id: u64,
    pub name: String,
}

/// Cut `name` to at most `MAX_NAME_BYTES` without splitting a character.
fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NAME_BYTES {
        return name.to_string();
    }
    let mut end = MAX_NAME_BYTES;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

impl TitleName {
    pub fn new(title_id: u64, name: &str) -> Self {
        Self {
            title_id,
            name: truncate_name(name),
        }
    }

    pub fn to_bytes(&self) -> [u8; TITLE_NAME_SIZE] {
        let mut buf = [0u8; TITLE_NAME_SIZE];
        buf[0..8].copy_from_slice(&self.title_id.to_le_bytes());
        let name = truncate_name(&self.name);
        buf[8..8 + name.len()].copy_from_slice(name.as_bytes());
        buf
    }

    /// Decode one record. The name ends at the first NUL (or the 63rd
    /// byte); invalid UTF-8 is replaced rather than rejected.
    pub(crate) fn from_bytes(data: &[u8]) -> Self {
        let raw = &data[8..8 + MAX_NAME_BYTES];
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        Self {
            title_id: u64::from_le_bytes(le_array(data, 0)),
            name: String::from_utf8_lossy(&raw[..end]).into_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleNames {
    entries: Vec<TitleName>,
}

impl TitleNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, ascending by title id.
    pub fn as_slice(&self) -> &[TitleName] {
        &self.entries
    }

    pub fn lookup(&self, title_id: u64) -> Option<&str> {
        self.entries
            .binary_search_by_key(&title_id, |e| e.title_id)
            .ok()
            .map(|i| self.entries[i].name.as_str())
    }

    /// Add a name for an unknown title. Known titles are never overwritten;
    /// returns false for duplicates and when the table is full.
    pub fn insert(&mut self, title_id: u64, name: &str) -> bool {
        match self.entries.binary_search_by_key(&title_id, |e| e.title_id) {
            Ok(_) => false,
            Err(_) if self.entries.len() >= TITLE_NAMES_CAPACITY => false,
            Err(at) => {
                self.entries.insert(at, TitleName::new(title_id, name));
                true
            }
        }
    }

    pub fn to_file_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.entries.len() * TITLE_NAME_SIZE);
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            buf.extend_from_slice(&entry.to_bytes());
        }
        buf
    }

    /// Parse the persisted form. Reading stops at the capacity limit or at a
    /// truncated trailing record; duplicates keep their first occurrence.
    pub fn from_file_bytes(data: &[u8]) -> Self {
        let mut names = Self::new();
        if data.len() < 4 {
            return names;
        }
        let count = (u32::from_le_bytes(le_array(data, 0)) as usize).min(TITLE_NAMES_CAPACITY);
        for record in data[4..].chunks_exact(TITLE_NAME_SIZE).take(count) {
            let entry = TitleName::from_bytes(record);
            names.insert(entry.title_id, &entry.name);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_sorted_and_never_overwrites() {
        let mut names = TitleNames::new();
        assert!(names.insert(30, "Thirty"));
        assert!(names.insert(10, "Ten"));
        assert!(names.insert(20, "Twenty"));
        assert!(!names.insert(10, "Other"));

        let ids: Vec<u64> = names.as_slice().iter().map(|e| e.title_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(names.lookup(10), Some("Ten"));
        assert_eq!(names.lookup(11), None);
    }

    #[test]
    fn test_capacity_limit() {
        let mut names = TitleNames::new();
        for id in 0..TITLE_NAMES_CAPACITY as u64 {
            assert!(names.insert(id, "x"));
        }
        assert!(!names.insert(u64::MAX - 1, "late"));
        assert_eq!(names.len(), TITLE_NAMES_CAPACITY);
    }

    #[test]
    fn test_long_names_truncate_on_char_boundary() {
        let long = "é".repeat(40); // 80 bytes
        let entry = TitleName::new(1, &long);
        assert!(entry.name.len() <= MAX_NAME_BYTES);
        assert_eq!(entry.name.len(), 62);

        let bytes = entry.to_bytes();
        assert_eq!(bytes[TITLE_NAME_SIZE - 1], 0);
        assert_eq!(TitleName::from_bytes(&bytes), entry);
    }

    #[test]
    fn test_file_format() {
        let mut names = TitleNames::new();
        names.insert(0x0004_0000_0003_0800, "Mario Kart 7");
        names.insert(0x0004_0000_0005_5D00, "Pokémon X");

        let bytes = names.to_file_bytes();
        assert_eq!(bytes.len(), 4 + 2 * TITLE_NAME_SIZE);
        assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
        assert_eq!(TitleNames::from_file_bytes(&bytes), names);
    }

    #[test]
    fn test_truncated_file_keeps_complete_records() {
        let mut names = TitleNames::new();
        names.insert(1, "one");
        names.insert(2, "two");
        let mut bytes = names.to_file_bytes();
        bytes.truncate(4 + TITLE_NAME_SIZE + 10);

        let loaded = TitleNames::from_file_bytes(&bytes);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.lookup(1), Some("one"));
        assert!(TitleNames::from_file_bytes(&[1, 0]).is_empty());
    }
}
