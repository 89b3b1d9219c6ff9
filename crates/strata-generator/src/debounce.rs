//! Debouncing of filesystem change events.
//!
//! Editors and copy tools emit bursts of events per path. Events are held per
//! path until no new event arrived for the quiet period, and successive kinds
//! are folded into one.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A debounced change to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl Change {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[derive(Debug)]
struct Pending {
    kind: ChangeKind,
    deadline: Instant,
}

/// Per-path event debouncer, safe to feed from a watcher callback thread.
#[derive(Debug)]
pub struct EventDebouncer {
    pending: Mutex<BTreeMap<PathBuf, Pending>>,
    quiet: Duration,
}

impl EventDebouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            pending: Mutex::new(BTreeMap::new()),
            quiet,
        }
    }

    /// Record an event observed now.
    pub fn record(&self, path: PathBuf, kind: ChangeKind) {
        self.record_at(path, kind, Instant::now());
    }

    /// Record an event observed at `now`.
    pub fn record_at(&self, path: PathBuf, kind: ChangeKind, now: Instant) {
        let deadline = now + self.quiet;
        let mut pending = self.lock();
        match pending.get(&path).map(|p| p.kind) {
            None => {
                pending.insert(path, Pending { kind, deadline });
            }
            Some(existing) => match Self::coalesce(existing, kind) {
                Some(kind) => {
                    pending.insert(path, Pending { kind, deadline });
                }
                None => {
                    pending.remove(&path);
                }
            },
        }
    }

    /// Fold a new event kind into a pending one. `None` drops the path.
    pub fn coalesce(existing: ChangeKind, new: ChangeKind) -> Option<ChangeKind> {
        use ChangeKind::{Created, Modified, Removed};

        match (existing, new) {
            (Created, Removed) => None,
            (Created, _) | (Modified, Created) => Some(Created),
            (Modified, Modified) => Some(Modified),
            (Modified, Removed) | (Removed, Modified) | (Removed, Removed) => Some(Removed),
            // Replaced in place.
            (Removed, Created) => Some(Modified),
        }
    }

    /// Take every change whose quiet period is over.
    pub fn drain_ready(&self) -> Vec<Change> {
        self.drain_ready_at(Instant::now())
    }

    /// Take every change whose deadline is at or before `now`, sorted by path.
    pub fn drain_ready_at(&self, now: Instant) -> Vec<Change> {
        let mut pending = self.lock();
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|path| {
                let kind = pending.remove(&path)?.kind;
                Some(Change { path, kind })
            })
            .collect()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock().values().map(|p| p.deadline).min()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ChangeKind::{Created, Modified, Removed};

    const QUIET: Duration = Duration::from_millis(100);

    #[test]
    fn test_coalesce_matrix() {
        let cases = [
            (Created, Created, Some(Created)),
            (Created, Modified, Some(Created)),
            (Created, Removed, None),
            (Modified, Created, Some(Created)),
            (Modified, Modified, Some(Modified)),
            (Modified, Removed, Some(Removed)),
            (Removed, Created, Some(Modified)),
            (Removed, Modified, Some(Removed)),
            (Removed, Removed, Some(Removed)),
        ];
        for (existing, new, expected) in cases {
            assert_eq!(EventDebouncer::coalesce(existing, new), expected, "{existing:?} + {new:?}");
        }
    }

    #[test]
    fn test_waits_for_quiet_period() {
        let debouncer = EventDebouncer::new(QUIET);
        let t0 = Instant::now();
        debouncer.record_at(PathBuf::from("/s/a.html"), Modified, t0);

        assert!(debouncer.drain_ready_at(t0 + Duration::from_millis(50)).is_empty());
        let ready = debouncer.drain_ready_at(t0 + QUIET);
        assert_eq!(ready, vec![Change::new("/s/a.html", Modified)]);
        assert!(debouncer.is_empty());
    }

    #[test]
    fn test_new_event_extends_deadline() {
        let debouncer = EventDebouncer::new(QUIET);
        let t0 = Instant::now();
        let path = PathBuf::from("/s/a.html");
        debouncer.record_at(path.clone(), Created, t0);
        debouncer.record_at(path, Modified, t0 + Duration::from_millis(80));

        assert!(debouncer.drain_ready_at(t0 + QUIET).is_empty());
        let ready = debouncer.drain_ready_at(t0 + Duration::from_millis(180));
        assert_eq!(ready, vec![Change::new("/s/a.html", Created)]);
    }

    #[test]
    fn test_created_then_removed_is_dropped() {
        let debouncer = EventDebouncer::new(QUIET);
        let t0 = Instant::now();
        debouncer.record_at(PathBuf::from("/s/tmp.swp"), Created, t0);
        debouncer.record_at(PathBuf::from("/s/tmp.swp"), Removed, t0);
        assert!(debouncer.is_empty());
        assert_eq!(debouncer.next_deadline(), None);
    }

    #[test]
    fn test_drain_is_sorted_by_path() {
        let debouncer = EventDebouncer::new(QUIET);
        let t0 = Instant::now();
        debouncer.record_at(PathBuf::from("/s/z"), Removed, t0);
        debouncer.record_at(PathBuf::from("/s/a"), Created, t0);
        debouncer.record_at(PathBuf::from("/s/m"), Modified, t0 + Duration::from_millis(10));

        assert_eq!(debouncer.next_deadline(), Some(t0 + QUIET));
        let paths: Vec<_> = debouncer
            .drain_ready_at(t0 + Duration::from_secs(1))
            .into_iter()
            .map(|c| c.path)
            .collect();
        assert_eq!(paths, [PathBuf::from("/s/a"), PathBuf::from("/s/m"), PathBuf::from("/s/z")]);
    }
}
