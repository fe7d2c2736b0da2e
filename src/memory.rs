//! In-memory coordination backends
//!
//! Zero-IO implementations of [`LockManager`], [`ChangelogStore`], and
//! [`IndexReconciler`] with the same observable contracts as the MongoDB
//! ones. They exist so the coordinator and migration runners can be tested
//! without a live database; the reconciler additionally counts drop/create
//! operations so tests can assert the exact reconciliation behavior.

use crate::changelog::ChangelogStore;
use crate::changeset::ChangeEntry;
use crate::error::CoordinatorError;
use crate::index::{plan_reconcile, IndexDescriptor, IndexReconciler, ReconcileAction};
use crate::lock::LockManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Lock document state, mirroring the three states of the on-disk document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockSlot {
    /// No lock document exists yet (semantically unlocked)
    Absent,
    Unlocked,
    Locked,
}

/// In-memory [`LockManager`]
///
/// The mutex-guarded slot plays the role of the storage engine's atomic
/// single-document update: concurrent acquires serialize on the mutex, and
/// exactly one observes the unlocked state.
pub struct MemoryLockManager {
    slot: Mutex<LockSlot>,
}

impl MemoryLockManager {
    /// Fresh manager with no lock document (the empty-collection state)
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(LockSlot::Absent),
        }
    }

    fn slot(&self) -> MutexGuard<'_, LockSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager for MemoryLockManager {
    fn initialize(&self) -> Result<(), CoordinatorError> {
        let mut slot = self.slot();
        if *slot == LockSlot::Absent {
            *slot = LockSlot::Unlocked;
        }
        Ok(())
    }

    fn acquire(&self) -> Result<bool, CoordinatorError> {
        let mut slot = self.slot();
        if *slot == LockSlot::Unlocked {
            *slot = LockSlot::Locked;
            Ok(true)
        } else {
            // Locked, or absent: the conditional update matches nothing
            Ok(false)
        }
    }

    fn release(&self) -> Result<(), CoordinatorError> {
        let mut slot = self.slot();
        if *slot == LockSlot::Locked {
            *slot = LockSlot::Unlocked;
        }
        Ok(())
    }

    fn is_held(&self) -> Result<bool, CoordinatorError> {
        Ok(*self.slot() == LockSlot::Locked)
    }
}

/// In-memory [`ChangelogStore`]
///
/// Carries the same capability flag as the MongoDB store and routes through
/// the same two suppression paths: with `enforce_unique` the insert itself
/// is rejected on a duplicate key pair (the in-memory stand-in for the
/// unique index) and translated into a silent no-op; without it an explicit
/// existence check runs before the insert. Either way a repeated record is
/// a silent success and never a second entry.
pub struct MemoryChangelogStore {
    entries: Mutex<Vec<ChangeEntry>>,
    /// Whether the simulated storage layer enforces `(changeId, author)`
    /// uniqueness
    enforce_unique: bool,
}

impl MemoryChangelogStore {
    #[must_use]
    pub fn new(enforce_unique: bool) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            enforce_unique,
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<ChangeEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of recorded entries (for asserting no duplication)
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries().len()
    }
}

impl Default for MemoryChangelogStore {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ChangelogStore for MemoryChangelogStore {
    fn has_executed(&self, change_id: &str, author: &str) -> Result<bool, CoordinatorError> {
        let found = self
            .entries()
            .iter()
            .any(|entry| entry.change_id == change_id && entry.author == author);
        Ok(found)
    }

    fn record_executed(&self, entry: &ChangeEntry) -> Result<(), CoordinatorError> {
        if !self.enforce_unique {
            // No uniqueness enforcement: duplicate suppression happens up
            // front, exactly like the MongoDB store's fallback path
            if self.has_executed(&entry.change_id, &entry.author)? {
                return Ok(());
            }
            self.entries().push(entry.clone());
            return Ok(());
        }

        // Enforced mode: the "index" rejects the duplicate insert and the
        // rejection is translated into a silent no-op
        let mut entries = self.entries();
        let duplicate = entries
            .iter()
            .any(|existing| existing.change_id == entry.change_id && existing.author == entry.author);
        if !duplicate {
            entries.push(entry.clone());
        }
        Ok(())
    }
}

/// In-memory [`IndexReconciler`] with operation counters
///
/// Applies the same reconciliation plan as the MongoDB reconciler to an
/// in-memory index slot, counting drops and creates so tests can assert
/// e.g. "exactly one drop followed by exactly one create" or "zero of each".
pub struct MemoryIndexReconciler {
    index: Mutex<Option<IndexDescriptor>>,
    drops: AtomicUsize,
    creates: AtomicUsize,
}

impl MemoryIndexReconciler {
    /// Reconciler over a collection with no changelog index yet
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: Mutex::new(None),
            drops: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
        }
    }

    /// Reconciler over a collection that already has the changelog index
    /// with the given uniqueness
    #[must_use]
    pub fn with_existing_index(unique: bool) -> Self {
        Self {
            index: Mutex::new(Some(IndexDescriptor::changelog(unique))),
            drops: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
        }
    }

    fn index_slot(&self) -> MutexGuard<'_, Option<IndexDescriptor>> {
        self.index
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current changelog index, if any
    #[must_use]
    pub fn index(&self) -> Option<IndexDescriptor> {
        self.index_slot().clone()
    }

    /// How many index drops reconciliation performed
    #[must_use]
    pub fn drop_count(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    /// How many index creates reconciliation performed
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

impl Default for MemoryIndexReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexReconciler for MemoryIndexReconciler {
    fn reconcile(&self, desired_unique: bool) -> Result<(), CoordinatorError> {
        let mut slot = self.index_slot();
        match plan_reconcile(slot.as_ref(), desired_unique) {
            ReconcileAction::Noop => {}
            ReconcileAction::Create { unique } => {
                self.creates.fetch_add(1, Ordering::SeqCst);
                *slot = Some(IndexDescriptor::changelog(unique));
            }
            ReconcileAction::Recreate { unique } => {
                self.drops.fetch_add(1, Ordering::SeqCst);
                self.creates.fetch_add(1, Ordering::SeqCst);
                *slot = Some(IndexDescriptor::changelog(unique));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_lock_round_trip() {
        let lock = MemoryLockManager::new();
        lock.initialize().unwrap();

        assert!(!lock.is_held().unwrap());
        assert!(lock.acquire().unwrap());
        assert!(lock.is_held().unwrap());
        lock.release().unwrap();
        assert!(!lock.is_held().unwrap());
        assert!(lock.acquire().unwrap());
    }

    #[test]
    fn test_acquire_fails_when_already_held() {
        let lock = MemoryLockManager::new();
        lock.initialize().unwrap();

        assert!(lock.acquire().unwrap());
        assert!(!lock.acquire().unwrap());
    }

    #[test]
    fn test_release_is_idempotent() {
        let lock = MemoryLockManager::new();
        lock.initialize().unwrap();

        lock.release().unwrap();
        lock.release().unwrap();
        assert!(!lock.is_held().unwrap());
        assert!(lock.acquire().unwrap());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let lock = MemoryLockManager::new();
        lock.initialize().unwrap();
        assert!(lock.acquire().unwrap());

        // A second initialize must not reset the held lock
        lock.initialize().unwrap();
        assert!(lock.is_held().unwrap());
        assert!(!lock.acquire().unwrap());
    }

    #[test]
    fn test_acquire_before_initialize_returns_false() {
        let lock = MemoryLockManager::new();
        // No document exists, so the conditional update matches nothing
        assert!(!lock.acquire().unwrap());
        assert!(!lock.is_held().unwrap());
    }

    #[test]
    fn test_exactly_one_concurrent_acquire_wins() {
        let lock = Arc::new(MemoryLockManager::new());
        lock.initialize().unwrap();

        let contenders = 8;
        let barrier = Arc::new(Barrier::new(contenders));
        let handles: Vec<_> = (0..contenders)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    lock.acquire().unwrap()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(winners, 1);
        assert!(lock.is_held().unwrap());
    }

    #[test]
    fn test_changelog_records_once_in_both_capability_modes() {
        for enforce_unique in [true, false] {
            let store = MemoryChangelogStore::new(enforce_unique);
            let entry = ChangeEntry::new("add-users", "alice", "InitialChangelog", "add_users");

            assert!(!store.has_executed("add-users", "alice").unwrap());
            store.record_executed(&entry).unwrap();
            assert!(store.has_executed("add-users", "alice").unwrap());

            // Replay: still recorded, still exactly one entry
            store.record_executed(&entry).unwrap();
            assert!(store.has_executed("add-users", "alice").unwrap());
            assert_eq!(store.entry_count(), 1, "enforce_unique: {}", enforce_unique);
        }
    }

    #[test]
    fn test_changelog_duplicate_key_rejection_is_silent_success() {
        // Enforced mode: the rejected re-insert must surface as Ok, never
        // as a storage error
        let store = MemoryChangelogStore::new(true);
        let entry = ChangeEntry::new("add-users", "alice", "InitialChangelog", "add_users");
        store.record_executed(&entry).unwrap();

        assert!(store.record_executed(&entry).is_ok());
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn test_changelog_existence_check_suppresses_without_enforcement() {
        // Capability absent: suppression relies on the explicit pre-insert
        // existence check, since the storage layer would accept a duplicate
        let store = MemoryChangelogStore::new(false);
        let entry = ChangeEntry::new("add-users", "alice", "InitialChangelog", "add_users");
        store.record_executed(&entry).unwrap();
        store.record_executed(&entry).unwrap();

        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn test_changelog_distinguishes_authors() {
        for enforce_unique in [true, false] {
            let store = MemoryChangelogStore::new(enforce_unique);
            store
                .record_executed(&ChangeEntry::new("add-users", "alice", "C", "m"))
                .unwrap();

            assert!(!store.has_executed("add-users", "bob").unwrap());
            store
                .record_executed(&ChangeEntry::new("add-users", "bob", "C", "m"))
                .unwrap();
            assert_eq!(store.entry_count(), 2);
        }
    }

    #[test]
    fn test_reconcile_creates_missing_index() {
        let reconciler = MemoryIndexReconciler::new();
        reconciler.reconcile(true).unwrap();

        let index = reconciler.index().unwrap();
        assert!(index.unique);
        assert_eq!(index.name, crate::index::CHANGE_ID_AUTHOR_INDEX);
        assert_eq!(reconciler.create_count(), 1);
        assert_eq!(reconciler.drop_count(), 0);
    }

    #[test]
    fn test_reconcile_creates_non_unique_index_when_unsupported() {
        let reconciler = MemoryIndexReconciler::new();
        reconciler.reconcile(false).unwrap();

        assert!(!reconciler.index().unwrap().unique);
        assert_eq!(reconciler.create_count(), 1);
        assert_eq!(reconciler.drop_count(), 0);
    }

    #[test]
    fn test_reconcile_never_downgrades_unique_index() {
        let reconciler = MemoryIndexReconciler::with_existing_index(true);
        reconciler.reconcile(false).unwrap();

        assert!(reconciler.index().unwrap().unique);
        assert_eq!(reconciler.create_count(), 0);
        assert_eq!(reconciler.drop_count(), 0);
    }

    #[test]
    fn test_reconcile_recreates_non_unique_index_as_unique() {
        let reconciler = MemoryIndexReconciler::with_existing_index(false);
        reconciler.reconcile(true).unwrap();

        assert!(reconciler.index().unwrap().unique);
        assert_eq!(reconciler.drop_count(), 1);
        assert_eq!(reconciler.create_count(), 1);
    }

    #[test]
    fn test_reconcile_is_noop_on_matching_index() {
        let reconciler = MemoryIndexReconciler::with_existing_index(true);
        reconciler.reconcile(true).unwrap();

        assert_eq!(reconciler.drop_count(), 0);
        assert_eq!(reconciler.create_count(), 0);
    }
}
