//! Session-log merging keyed by `(title_id, timestamp)`

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::record::{Session, SessionLog, MAX_PLAY_SECS, SESSION_CAPACITY};

use super::{MergeError, Mode, RecordMerge};

fn capped_sum(a: u32, b: u32) -> u32 {
    a.saturating_add(b).min(MAX_PLAY_SECS)
}

fn merge_sessions(
    local: &mut SessionLog,
    remote: &[Session],
    mode: Mode,
) -> Result<usize, MergeError> {
    local.sort();

    // Stage everything first so a capacity failure leaves `local` untouched
    // (apart from ordering).
    let mut overlaps: Vec<(usize, u32)> = Vec::new();
    let mut fresh: BTreeMap<(u64, u32), Session> = BTreeMap::new();

    for r in remote {
        if r.is_empty() || r.title_id == 0 {
            continue;
        }
        match local.find(r.title_id, r.timestamp) {
            Some(i) => {
                if mode == Mode::Reconcile {
                    overlaps.push((i, r.play_secs));
                }
            }
            None => match fresh.entry(r.key()) {
                Entry::Vacant(slot) => {
                    let mut s = *r;
                    s.play_secs = s.play_secs.min(MAX_PLAY_SECS);
                    slot.insert(s);
                }
                Entry::Occupied(mut slot) => {
                    if mode == Mode::Reconcile {
                        let s = slot.get_mut();
                        s.play_secs = capped_sum(s.play_secs, r.play_secs);
                    }
                }
            },
        }
    }

    let available = SESSION_CAPACITY - local.len().min(SESSION_CAPACITY);
    if fresh.len() > available {
        return Err(MergeError::Capacity {
            table: "session",
            needed: fresh.len(),
            available,
        });
    }

    let entries = local.entries_mut();
    for (i, secs) in overlaps {
        entries[i].play_secs = capped_sum(entries[i].play_secs, secs);
    }

    let added = fresh.len();
    if added > 0 {
        entries.extend(fresh.into_values());
        local.sort();
    }
    log::debug!("session merge ({:?}): {} new, {} total", mode, added, local.len());
    Ok(added)
}

impl RecordMerge<[Session]> for SessionLog {
    fn absorb_new_only(&mut self, remote: &[Session]) -> Result<usize, MergeError> {
        merge_sessions(self, remote, Mode::AbsorbNewOnly)
    }

    fn reconcile(&mut self, remote: &[Session]) -> Result<usize, MergeError> {
        merge_sessions(self, remote, Mode::Reconcile)
    }
}
