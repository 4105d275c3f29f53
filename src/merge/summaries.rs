//! Summary-table merging keyed by `title_id`

use std::collections::HashMap;

use crate::record::{Summary, SummaryTable};

use super::{MergeError, Mode, RecordMerge};

/// Fold `remote` into `local` for the same title.
fn fold(local: &mut Summary, remote: &Summary) {
    local.total_secs = local.total_secs.saturating_add(remote.total_secs);
    local.launch_count = local.launch_count.saturating_add(remote.launch_count);
    local.first_played_days = local.first_played_days.min(remote.first_played_days);
    local.last_played_days = local.last_played_days.max(remote.last_played_days);
}

fn merge_summaries(
    local: &mut SummaryTable,
    remote: &[Summary],
    mode: Mode,
) -> Result<usize, MergeError> {
    let mut overlaps: Vec<&Summary> = Vec::new();
    let mut fresh: Vec<Summary> = Vec::new();
    let mut fresh_index: HashMap<u64, usize> = HashMap::new();

    for r in remote.iter().filter(|r| !r.is_empty()) {
        if local.contains(r.title_id) {
            if mode == Mode::Reconcile {
                overlaps.push(r);
            }
        } else if let Some(&i) = fresh_index.get(&r.title_id) {
            if mode == Mode::Reconcile {
                fold(&mut fresh[i], r);
            }
        } else {
            fresh_index.insert(r.title_id, fresh.len());
            fresh.push(*r);
        }
    }

    if fresh.len() > local.free_slots() {
        return Err(MergeError::Capacity {
            table: "summary",
            needed: fresh.len(),
            available: local.free_slots(),
        });
    }

    for r in overlaps {
        if let Some(l) = local.get_mut(r.title_id) {
            fold(l, r);
        }
    }

    let added = fresh.len();
    for summary in fresh {
        local.insert(summary);
    }
    log::debug!("summary merge ({:?}): {} new, {} total", mode, added, local.len());
    Ok(added)
}

impl RecordMerge<[Summary]> for SummaryTable {
    fn absorb_new_only(&mut self, remote: &[Summary]) -> Result<usize, MergeError> {
        merge_summaries(self, remote, Mode::AbsorbNewOnly)
    }

    fn reconcile(&mut self, remote: &[Summary]) -> Result<usize, MergeError> {
        merge_summaries(self, remote, Mode::Reconcile)
    }
}
