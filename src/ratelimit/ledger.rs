//! Per-task committed-until ledger.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Duration;

use super::clock::duration_to_nanos;
use super::delay::Delay;

/// Committed-until marks indexed by task name.
///
/// A mark is the instant (nanoseconds on the limiter clock) through which
/// the task's budget is consumed. A missing entry and any mark older than
/// `now - quantum` both mean "fully available".
///
/// The ledger is not synchronized; it is owned by the limiter actor.
#[derive(Debug)]
pub(crate) struct Ledger {
    /// Window length in nanoseconds
    quantum: i64,
    /// Committed-until marks
    marks: BTreeMap<String, i64>,
    /// Last key inspected by the previous sweep pass
    cursor: Option<String>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new(quantum: Duration) -> Self {
        Self {
            quantum: duration_to_nanos(quantum),
            marks: BTreeMap::new(),
            cursor: None,
        }
    }

    /// Clamp a mark to `[now - quantum, +inf)`.
    #[inline]
    fn floor(&self, mark: Option<i64>, now: i64) -> i64 {
        let horizon = now.saturating_sub(self.quantum);
        match mark {
            Some(mark) if mark > horizon => mark,
            _ => horizon,
        }
    }

    /// Try to commit `slice` of the task's budget at `now`.
    ///
    /// The ledger only changes when the request is granted.
    pub fn schedule(&mut self, task: &str, slice: Duration, now: i64) -> Delay {
        let projected = self
            .floor(self.marks.get(task).copied(), now)
            .saturating_add(duration_to_nanos(slice));
        let delay = projected.saturating_sub(now);

        if delay <= 0 {
            match self.marks.get_mut(task) {
                Some(mark) => *mark = projected,
                None => {
                    self.marks.insert(task.to_owned(), projected);
                }
            }
        }

        Delay::from_nanos(delay)
    }

    /// Inspect up to `batch` entries after the sweep cursor and evict those
    /// that have decayed below the window. Returns the number evicted.
    ///
    /// Decay is judged against `now`, not against when the mark was written.
    /// The cursor wraps to the first key once a pass reaches the end.
    pub fn sweep(&mut self, now: i64, batch: usize) -> usize {
        let (stale, next_cursor) = {
            let lower = match &self.cursor {
                Some(cursor) => Bound::Excluded(cursor.as_str()),
                None => Bound::Unbounded,
            };

            let mut stale = Vec::new();
            let mut last = None;
            let mut seen = 0;
            for (task, &mark) in self
                .marks
                .range::<str, _>((lower, Bound::Unbounded))
                .take(batch)
            {
                seen += 1;
                if self.floor(Some(mark), now) != mark {
                    stale.push(task.clone());
                }
                last = Some(task);
            }

            let next_cursor = if seen < batch { None } else { last.cloned() };
            (stale, next_cursor)
        };

        self.cursor = next_cursor;
        for task in &stale {
            self.marks.remove(task);
        }
        stale.len()
    }

    /// The stored mark for a task, if any.
    #[cfg(test)]
    pub fn mark(&self, task: &str) -> Option<i64> {
        self.marks.get(task).copied()
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.marks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 1_000_000_000;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_exhausts_after_quantum_slices() {
        let mut ledger = Ledger::new(secs(30));
        let now = 100 * SEC;

        let granted = (0..100)
            .take_while(|_| ledger.schedule("bar", secs(1), now).is_granted())
            .count();

        assert_eq!(granted, 30);
        assert_eq!(ledger.mark("bar"), Some(now));
    }

    #[test]
    fn test_grant_reports_spare_capacity() {
        let mut ledger = Ledger::new(secs(3));
        let now = 10 * SEC;

        assert_eq!(ledger.schedule("bar", secs(1), now), Delay::Ready(secs(2)));
        assert_eq!(ledger.schedule("bar", secs(1), now), Delay::Ready(secs(1)));
        assert_eq!(ledger.schedule("bar", secs(1), now), Delay::Ready(Duration::ZERO));
        assert_eq!(ledger.schedule("bar", secs(1), now), Delay::Wait(secs(1)));
    }

    #[test]
    fn test_denial_leaves_ledger_untouched() {
        let mut ledger = Ledger::new(secs(2));
        let now = 10 * SEC;

        ledger.schedule("a", secs(2), now);
        let before = ledger.mark("a");

        assert_eq!(ledger.schedule("a", secs(1), now), Delay::Wait(secs(1)));
        assert_eq!(ledger.schedule("a", secs(1), now), Delay::Wait(secs(1)));
        assert_eq!(ledger.mark("a"), before);

        // The wait shrinks as time passes
        let later = now + SEC / 2;
        assert_eq!(
            ledger.schedule("a", secs(1), later),
            Delay::Wait(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_idle_task_cannot_bank_more_than_quantum() {
        let mut ledger = Ledger::new(secs(3));
        ledger.schedule("bar", secs(1), 0);

        // Long idle: the floor clamps to now - quantum
        let now = 1_000 * SEC;
        let granted = (0..10)
            .take_while(|_| ledger.schedule("bar", secs(1), now).is_granted())
            .count();
        assert_eq!(granted, 3);
    }

    #[test]
    fn test_marks_are_monotonic_across_grants() {
        let mut ledger = Ledger::new(secs(5));
        let mut previous = i64::MIN;
        for step in 0..20 {
            let now = step * SEC / 3;
            if ledger.schedule("t", Duration::from_millis(700), now).is_granted() {
                let mark = ledger.mark("t").unwrap();
                assert!(mark >= previous);
                previous = mark;
            }
        }
    }

    #[test]
    fn test_oversized_slice_is_never_granted() {
        let mut ledger = Ledger::new(secs(2));
        assert_eq!(ledger.schedule("big", secs(5), 50 * SEC), Delay::Wait(secs(3)));
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn test_zero_slice_is_granted() {
        let mut ledger = Ledger::new(secs(2));
        assert!(ledger.schedule("free", Duration::ZERO, 10 * SEC).is_granted());
    }

    #[test]
    fn test_keys_are_independent() {
        let mut ledger = Ledger::new(secs(1));
        assert!(ledger.schedule("a", secs(1), 0).is_granted());
        assert!(!ledger.schedule("a", secs(1), 0).is_granted());
        assert!(ledger.schedule("b", secs(1), 0).is_granted());
    }

    #[test]
    fn test_sweep_evicts_decayed_entries_only() {
        let mut ledger = Ledger::new(secs(1));
        ledger.schedule("old", secs(1), 0);
        ledger.schedule("fresh", secs(1), 5 * SEC);

        // "old" is committed until 0, "fresh" until 5s
        let evicted = ledger.sweep(5 * SEC, 10);
        assert_eq!(evicted, 1);
        assert_eq!(ledger.mark("old"), None);
        assert_eq!(ledger.mark("fresh"), Some(5 * SEC));
    }

    #[test]
    fn test_sweep_keeps_mark_exactly_at_horizon() {
        let mut ledger = Ledger::new(secs(1));
        ledger.schedule("edge", secs(1), 0);

        // horizon == mark: clamping leaves it unchanged
        assert_eq!(ledger.sweep(SEC, 10), 0);
        assert_eq!(ledger.sweep(SEC + 1, 10), 1);
    }

    #[test]
    fn test_sweep_is_bounded_and_resumes() {
        let mut ledger = Ledger::new(secs(1));
        for i in 0..25 {
            ledger.schedule(&format!("task-{:02}", i), secs(1), 0);
        }

        let now = 10 * SEC;
        assert_eq!(ledger.sweep(now, 10), 10);
        assert_eq!(ledger.len(), 15);
        assert_eq!(ledger.sweep(now, 10), 10);
        assert_eq!(ledger.sweep(now, 10), 5);
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn test_sweep_cursor_reaches_entries_behind_live_ones() {
        let mut ledger = Ledger::new(secs(1));
        // Live keys sort first, stale keys after them
        for i in 0..4 {
            ledger.schedule(&format!("a-live-{}", i), secs(1), 0);
        }
        ledger.schedule("z-stale", secs(1), 0);

        let now = 10 * SEC;
        for i in 0..4 {
            ledger.schedule(&format!("a-live-{}", i), secs(1), now);
        }

        assert_eq!(ledger.sweep(now, 2), 0);
        assert_eq!(ledger.sweep(now, 2), 0);
        assert_eq!(ledger.sweep(now, 2), 1);
        assert_eq!(ledger.mark("z-stale"), None);
        assert_eq!(ledger.len(), 4);

        // Wrapped back to the start
        assert_eq!(ledger.sweep(now, 2), 0);
        assert_eq!(ledger.len(), 4);
    }
}
