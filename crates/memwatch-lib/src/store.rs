//! Per-system rolling window store
//!
//! Holds one bounded FIFO window of snapshots per system id. Windows are
//! created lazily on first append and kept until the process exits.
//!
//! Each window sits behind its own lock, so appends for different systems do
//! not wait on each other and a reader always sees a window either before or
//! after an append, never halfway through one.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::models::Snapshot;

/// Bounded history for one system, in arrival order
#[derive(Debug, Clone)]
pub struct Window {
    entries: VecDeque<Snapshot>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append, evicting the oldest entry once over capacity
    fn push(&mut self, snapshot: Snapshot) {
        self.entries.push_back(snapshot);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Most recent `min(k, len)` entries, oldest first
    pub fn recent(&self, k: usize) -> impl Iterator<Item = &Snapshot> {
        let skip = self.entries.len().saturating_sub(k);
        self.entries.iter().skip(skip)
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter()
    }
}

type SharedWindow = Arc<RwLock<Window>>;

fn read_window(window: &SharedWindow) -> RwLockReadGuard<'_, Window> {
    window.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_window(window: &SharedWindow) -> RwLockWriteGuard<'_, Window> {
    window.write().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide store of per-system windows
pub struct WindowStore {
    /// Map of system_id -> window
    windows: DashMap<String, SharedWindow>,
    /// Capacity given to every new window
    capacity: usize,
}

impl WindowStore {
    /// Create an empty store; every window will hold at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a snapshot to its system's window, returning the new length
    pub fn append(&self, snapshot: Snapshot) -> usize {
        let window = self.window_or_create(&snapshot.system_id);
        let mut guard = write_window(&window);
        guard.push(snapshot);
        guard.len()
    }

    /// Most recently appended snapshot, or `None` if the system is unknown
    pub fn latest(&self, system_id: &str) -> Option<Snapshot> {
        self.with_window(system_id, |w| w.latest().cloned())
            .flatten()
    }

    /// Last `min(k, len)` snapshots in arrival order, oldest first
    pub fn history(&self, system_id: &str, k: usize) -> Vec<Snapshot> {
        if k == 0 {
            return Vec::new();
        }
        self.with_window(system_id, |w| w.recent(k).cloned().collect::<Vec<_>>())
            .unwrap_or_default()
    }

    /// System ids with at least one snapshot, sorted
    pub fn known_systems(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .windows
            .iter()
            .filter(|entry| !read_window(entry.value()).is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of snapshots currently retained for a system
    pub fn len(&self, system_id: &str) -> usize {
        self.with_window(system_id, Window::len).unwrap_or(0)
    }

    pub fn system_count(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Run `f` against a consistent view of one system's window
    ///
    /// Returns `None` when the system has never reported.
    pub fn with_window<R>(&self, system_id: &str, f: impl FnOnce(&Window) -> R) -> Option<R> {
        let window = self.windows.get(system_id).map(|entry| Arc::clone(entry.value()))?;
        let guard = read_window(&window);
        Some(f(&guard))
    }

    fn window_or_create(&self, system_id: &str) -> SharedWindow {
        if let Some(entry) = self.windows.get(system_id) {
            return Arc::clone(entry.value());
        }

        let entry = self.windows.entry(system_id.to_string()).or_insert_with(|| {
            debug!(system_id = %system_id, capacity = self.capacity, "Creating window");
            Arc::new(RwLock::new(Window::new(self.capacity)))
        });
        Arc::clone(entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn snapshot(system_id: &str, ts: i64, allocated_kb: u64) -> Snapshot {
        Snapshot {
            system_id: system_id.to_string(),
            timestamp_secs: ts,
            allocated_kb,
            free_kb: 1024,
            process_name: None,
            pid: None,
            ratio: 100.0,
            leak_suspect: false,
        }
    }

    #[test]
    fn test_unknown_system_is_absent() {
        let store = WindowStore::new(10);
        assert!(store.latest("missing").is_none());
        assert!(store.history("missing", 5).is_empty());
        assert_eq!(store.len("missing"), 0);
        assert!(store.known_systems().is_empty());
    }

    #[test]
    fn test_history_returns_last_k_in_arrival_order() {
        let store = WindowStore::new(10);
        for i in 0..7 {
            store.append(snapshot("a", i, i as u64));
        }

        let history = store.history("a", 3);
        let values: Vec<u64> = history.iter().map(|s| s.allocated_kb).collect();
        assert_eq!(values, vec![4, 5, 6]);

        assert_eq!(store.history("a", 100).len(), 7);
        assert!(store.history("a", 0).is_empty());
    }

    #[test]
    fn test_eviction_keeps_window_bounded() {
        let store = WindowStore::new(5);
        for i in 0..23 {
            let len = store.append(snapshot("a", i, i as u64));
            assert!(len <= 5);
        }

        assert_eq!(store.len("a"), 5);
        let values: Vec<u64> = store.history("a", 5).iter().map(|s| s.allocated_kb).collect();
        assert_eq!(values, vec![18, 19, 20, 21, 22]);
    }

    #[test]
    fn test_late_snapshot_is_appended_at_tail() {
        let store = WindowStore::new(10);
        store.append(snapshot("a", 200, 1));
        store.append(snapshot("a", 100, 2));

        let latest = store.latest("a").unwrap();
        assert_eq!(latest.timestamp_secs, 100);
        assert_eq!(latest.allocated_kb, 2);
    }

    #[test]
    fn test_known_systems_sorted() {
        let store = WindowStore::new(10);
        store.append(snapshot("zeta", 1, 1));
        store.append(snapshot("alpha", 1, 1));
        store.append(snapshot("mid", 1, 1));

        assert_eq!(store.known_systems(), vec!["alpha", "mid", "zeta"]);
        assert_eq!(store.system_count(), 3);
    }

    #[test]
    fn test_history_is_a_copy() {
        let store = WindowStore::new(10);
        store.append(snapshot("a", 1, 1));

        let mut history = store.history("a", 10);
        history[0].allocated_kb = 999;

        assert_eq!(store.latest("a").unwrap().allocated_kb, 1);
    }

    #[test]
    fn test_concurrent_appends_for_many_systems() {
        let store = Arc::new(WindowStore::new(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let id = format!("sys-{}", t);
                    for i in 0..200 {
                        store.append(snapshot(&id, i, i as u64));
                        let _ = store.history(&id, 10);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.known_systems().len(), 8);
        for t in 0..8 {
            let id = format!("sys-{}", t);
            assert_eq!(store.len(&id), 50);
            assert_eq!(store.latest(&id).unwrap().allocated_kb, 199);
        }
    }

    #[test]
    fn test_readers_never_see_partial_windows() {
        let store = Arc::new(WindowStore::new(20));
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..2000 {
                    store.append(snapshot("a", i, i as u64));
                }
            })
        };

        for _ in 0..500 {
            let history = store.history("a", 20);
            assert!(history.len() <= 20);
            for pair in history.windows(2) {
                assert_eq!(pair[1].allocated_kb, pair[0].allocated_kb + 1);
            }
        }

        writer.join().unwrap();
        assert_eq!(store.len("a"), 20);
    }
}
