//! Meta Aligner
//!
//! Single forward sweep over creation-sorted events and time-sorted commits.
//! The cursor only ever advances, so aligning N commits with M events is
//! O(N + M). An event created at exactly a commit's timestamp counts toward
//! that commit.

use std::collections::BTreeMap;
use log::warn;
use crate::scanner::messages::Commit;
use super::IssueEvent;

/// Running counts as of one commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub total: u64,
    pub open: u64,
    pub closed: u64,
}

/// Monotonic cursor over a creation-sorted event list
#[derive(Debug)]
pub struct MetaAligner<'a> {
    events: &'a [IssueEvent],
    cursor: usize,
    counts: StateCounts,
}

impl<'a> MetaAligner<'a> {
    pub fn new(events: &'a [IssueEvent]) -> Self {
        if events.windows(2).any(|pair| pair[0].created_at > pair[1].created_at) {
            warn!("Events are not sorted by creation time; counts will be understated");
        }
        Self {
            events,
            cursor: 0,
            counts: StateCounts::default(),
        }
    }

    /// Consume every event created at or before `timestamp_millis`
    ///
    /// An earlier timestamp than a previous call consumes nothing.
    pub fn advance_to(&mut self, timestamp_millis: i64) -> StateCounts {
        while let Some(event) = self.events.get(self.cursor) {
            if event.created_millis() > timestamp_millis {
                break;
            }
            self.counts.total += 1;
            if event.state.is_open() {
                self.counts.open += 1;
            } else {
                self.counts.closed += 1;
            }
            self.cursor += 1;
        }
        self.counts
    }

    pub fn consumed(&self) -> usize {
        self.cursor
    }
}

/// Counts per commit id for chronologically sorted `commits`
pub fn align(events: &[IssueEvent], commits: &[Commit]) -> BTreeMap<String, StateCounts> {
    let mut aligner = MetaAligner::new(events);
    commits
        .iter()
        .map(|commit| (commit.id.clone(), aligner.advance_to(commit.timestamp_millis())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{EventKind, EventState};
    use chrono::{DateTime, FixedOffset, TimeZone, Utc};
    use proptest::prelude::*;

    fn event(number: u64, millis: i64, state: EventState) -> IssueEvent {
        IssueEvent {
            number,
            kind: EventKind::Issue,
            state,
            created_at: DateTime::<Utc>::from_timestamp_millis(millis).unwrap(),
            closed_at: None,
        }
    }

    fn commit(id: &str, millis: i64) -> Commit {
        let utc = FixedOffset::east_opt(0).unwrap();
        Commit::new(id, utc.timestamp_millis_opt(millis).unwrap())
    }

    fn counts(total: u64, open: u64, closed: u64) -> StateCounts {
        StateCounts { total, open, closed }
    }

    #[test]
    fn test_running_counts_per_commit() {
        let events = vec![
            event(1, 50, EventState::Open),
            event(2, 150, EventState::Open),
            event(3, 250, EventState::Closed),
        ];
        let commits = vec![commit("a", 100), commit("b", 200), commit("c", 300)];

        let aligned = align(&events, &commits);
        assert_eq!(aligned["a"], counts(1, 1, 0));
        assert_eq!(aligned["b"], counts(2, 2, 0));
        assert_eq!(aligned["c"], counts(3, 2, 1));
    }

    #[test]
    fn test_equal_timestamp_is_inclusive() {
        let events = vec![event(1, 100, EventState::Merged)];
        let aligned = align(&events, &[commit("a", 100), commit("b", 101)]);
        assert_eq!(aligned["a"], counts(1, 0, 1));
        assert_eq!(aligned["b"], counts(1, 0, 1));
    }

    #[test]
    fn test_no_events_or_commits() {
        assert!(align(&[], &[]).is_empty());
        let aligned = align(&[], &[commit("a", 10)]);
        assert_eq!(aligned["a"], StateCounts::default());
    }

    #[test]
    fn test_cursor_never_rewinds() {
        let events = vec![event(1, 10, EventState::Open), event(2, 20, EventState::Open)];
        let mut aligner = MetaAligner::new(&events);
        assert_eq!(aligner.advance_to(20).total, 2);
        assert_eq!(aligner.advance_to(5).total, 2);
        assert_eq!(aligner.consumed(), 2);
    }

    proptest! {
        #[test]
        fn prop_totals_are_non_decreasing(
            mut event_times in prop::collection::vec(0i64..10_000, 0..60),
            mut commit_times in prop::collection::vec(0i64..10_000, 1..40),
        ) {
            event_times.sort_unstable();
            commit_times.sort_unstable();
            let events: Vec<IssueEvent> = event_times
                .iter()
                .enumerate()
                .map(|(i, &t)| event(i as u64, t, if i % 2 == 0 { EventState::Open } else { EventState::Closed }))
                .collect();
            let commits: Vec<Commit> = commit_times
                .iter()
                .enumerate()
                .map(|(i, &t)| commit(&format!("c{i}"), t))
                .collect();

            let aligned = align(&events, &commits);
            let totals: Vec<u64> = commits.iter().map(|c| aligned[&c.id].total).collect();
            prop_assert!(totals.windows(2).all(|w| w[0] <= w[1]));

            let last = *commit_times.last().unwrap();
            let expected = event_times.iter().filter(|&&t| t <= last).count() as u64;
            prop_assert_eq!(*totals.last().unwrap(), expected);
            for c in &commits {
                let StateCounts { total, open, closed } = aligned[&c.id];
                prop_assert_eq!(total, open + closed);
            }
        }
    }
}
