//! Process-lock management backed by a single lock document
//!
//! The lock is an advisory mutual-exclusion primitive for migration runs:
//! one document per lock collection, flipped between unlocked and locked by
//! an atomic conditional update. Correctness rests entirely on the storage
//! engine's single-document atomicity, never on in-process locking.
//!
//! # Limitations
//!
//! The lock carries no owner identity, fencing token, or lease: any process
//! may release a lock it did not acquire, and a holder that crashes leaves
//! the lock held until an operator clears it (e.g. by calling release or
//! resetting the lock document). This matches the deliberate design of the
//! coordination scheme; callers needing lease semantics must layer them on
//! top.
//!
//! First-time initialization assumes a serialized startup window, the same
//! assumption index reconciliation makes: the lock collection carries no
//! unique index on `key`, so two processes racing `initialize` against an
//! empty collection can each upsert-insert a lock document, and later
//! acquires could then match different unlocked documents.

use crate::error::CoordinatorError;
use bson::doc;
use mongodb::sync::{Collection, Database};
use serde::{Deserialize, Serialize};

/// Constant `key` value of the singleton lock document
pub const LOCK_KEY: &str = "LOCK";

/// The singleton lock document
///
/// At most one such document logically represents the lock; absence is
/// treated as unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Constant identifier (`"LOCK"`) distinguishing the lock document
    pub key: String,
    /// Whether the lock is currently held
    pub locked: bool,
}

/// Lifecycle of the migration process lock
///
/// Implementations are bound to their lock collection at construction; the
/// coordinator performs the binding at connect time. `acquire` never blocks
/// or retries internally: contention is an immediate `Ok(false)`, and any
/// retry/backoff policy belongs to the caller.
pub trait LockManager: Send + Sync {
    /// Ensure exactly one lock document exists, created unlocked if absent.
    ///
    /// Idempotent: repeated calls have no effect and never error.
    fn initialize(&self) -> Result<(), CoordinatorError>;

    /// Atomically transition the lock from unlocked to locked.
    ///
    /// Returns `Ok(true)` only if this caller performed the transition, and
    /// `Ok(false)` with no side effects if the lock was already held. The
    /// transition is a single conditional read-modify-write against the
    /// storage engine, so concurrent callers cannot both succeed.
    fn acquire(&self) -> Result<bool, CoordinatorError>;

    /// Unconditionally return the lock to the unlocked state.
    ///
    /// Idempotent: succeeds as a no-op when already unlocked, when the
    /// document is absent, or when this caller never acquired the lock.
    fn release(&self) -> Result<(), CoordinatorError>;

    /// Whether the lock is currently held. Pure query, no side effects.
    fn is_held(&self) -> Result<bool, CoordinatorError>;
}

/// [`LockManager`] over a MongoDB lock collection
pub struct MongoLockManager {
    collection: Collection<LockEntry>,
}

impl MongoLockManager {
    /// Bind a lock manager to the lock collection in `db`
    #[must_use]
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection::<LockEntry>(collection_name),
        }
    }
}

impl LockManager for MongoLockManager {
    fn initialize(&self) -> Result<(), CoordinatorError> {
        // $setOnInsert + upsert: creates the unlocked document when absent
        // and leaves an existing document (locked or not) untouched
        self.collection
            .update_one(
                doc! { "key": LOCK_KEY },
                doc! { "$setOnInsert": { "key": LOCK_KEY, "locked": false } },
            )
            .upsert(true)
            .run()?;
        log::debug!("migration lock document initialized");
        Ok(())
    }

    fn acquire(&self) -> Result<bool, CoordinatorError> {
        // Single atomic conditional update: the filter only matches the
        // unlocked document, so exactly one concurrent caller can win
        let claimed = self
            .collection
            .find_one_and_update(
                doc! { "key": LOCK_KEY, "locked": false },
                doc! { "$set": { "locked": true } },
            )
            .run()?;

        if claimed.is_some() {
            log::info!("acquired migration process lock");
            Ok(true)
        } else {
            log::debug!("migration process lock already held, not acquired");
            Ok(false)
        }
    }

    fn release(&self) -> Result<(), CoordinatorError> {
        // No upsert: an absent document is already semantically unlocked
        self.collection
            .update_one(
                doc! { "key": LOCK_KEY },
                doc! { "$set": { "locked": false } },
            )
            .run()?;
        log::debug!("migration process lock released");
        Ok(())
    }

    fn is_held(&self) -> Result<bool, CoordinatorError> {
        let held = self
            .collection
            .find_one(doc! { "key": LOCK_KEY, "locked": true })
            .run()?
            .is_some();
        Ok(held)
    }
}
