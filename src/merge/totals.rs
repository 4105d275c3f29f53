//! Derived-total recomputation after a bidirectional exchange

use std::collections::HashMap;

use crate::record::{SessionLog, SummaryTable};

/// Set every summary's `total_secs` to the sum of `play_secs` over the
/// sessions of that title. Titles without sessions end up at zero.
///
/// Peer summaries can double- or under-count relative to the merged session
/// set, so the session log is the source of truth for totals.
pub fn recompute_totals(summaries: &mut SummaryTable, sessions: &SessionLog) {
    let mut per_title: HashMap<u64, u32> = HashMap::new();
    for s in sessions.iter() {
        let total = per_title.entry(s.title_id).or_insert(0);
        *total = total.saturating_add(s.play_secs);
    }
    for summary in summaries.iter_mut() {
        summary.total_secs = per_title.get(&summary.title_id).copied().unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::RecordMerge;
    use crate::record::{Session, Summary};

    #[test]
    fn test_totals_follow_sessions() {
        let mut summaries = SummaryTable::new();
        summaries.insert(Summary::new(1, 99_999, 4, 0, 0));
        summaries.insert(Summary::new(2, 5, 1, 0, 0));
        summaries.insert(Summary::new(3, 77, 1, 0, 0));

        let sessions = SessionLog::from_entries(vec![
            Session::new(1, 0, 3600),
            Session::new(1, 3600, 1200),
            Session::new(2, 0, 30),
        ])
        .unwrap();

        recompute_totals(&mut summaries, &sessions);
        assert_eq!(summaries.get(1).unwrap().total_secs, 4800);
        assert_eq!(summaries.get(2).unwrap().total_secs, 30);
        assert_eq!(summaries.get(3).unwrap().total_secs, 0);
        // Other fields are left alone.
        assert_eq!(summaries.get(1).unwrap().launch_count, 4);
    }

    #[test]
    fn test_totals_after_session_merge() {
        let mut local = SessionLog::from_entries(vec![
            Session::new(10, 0, 1000),
            Session::new(20, 0, 200),
        ])
        .unwrap();
        let remote = [Session::new(10, 0, 1000), Session::new(10, 3600, 600)];
        local.reconcile(&remote[..]).unwrap();

        let mut summaries = SummaryTable::new();
        summaries.insert(Summary::new(10, 1000, 1, 0, 0));
        summaries.insert(Summary::new(20, 200, 1, 0, 0));
        summaries.reconcile(&[Summary::new(10, 1600, 2, 0, 0)][..]).unwrap();
        recompute_totals(&mut summaries, &local);

        for summary in summaries.iter() {
            let expected: u32 = local
                .iter()
                .filter(|s| s.title_id == summary.title_id)
                .map(|s| s.play_secs)
                .sum();
            assert_eq!(summary.total_secs, expected);
        }
        assert_eq!(summaries.get(10).unwrap().total_secs, 2600);
    }
}
