//! Add-only title-name merge

use crate::record::{TitleName, TitleNames};

/// Insert names for unknown title ids; known ids are never overwritten.
/// Returns how many names were added.
pub fn merge_title_names(local: &mut TitleNames, remote: &[TitleName]) -> usize {
    let mut added = 0;
    for r in remote {
        if local.insert(r.title_id, &r.name) {
            added += 1;
        }
    }
    log::debug!("title-name merge: {} new, {} total", added, local.len());
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_add_only() {
        let mut local = TitleNames::new();
        local.insert(1, "Local One");

        let remote = vec![TitleName::new(1, "Remote One"), TitleName::new(2, "Two")];
        assert_eq!(merge_title_names(&mut local, &remote), 1);
        assert_eq!(local.lookup(1), Some("Local One"));
        assert_eq!(local.lookup(2), Some("Two"));

        assert_eq!(merge_title_names(&mut local, &remote), 0);
    }
}
