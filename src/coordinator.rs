//! Migration coordinator - connect-time composition and the lock facade
//!
//! The coordinator wires the index reconciler, lock manager, and changelog
//! store to one database at connect time, in a fixed order: validate the
//! configuration, reconcile the changelog index, initialize the lock
//! document. Afterwards it is a narrow lock facade for the migration runner
//! that actually executes changesets.

use crate::changelog::{ChangelogStore, MongoChangelogStore};
use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::index::{IndexReconciler, MongoIndexReconciler};
use crate::lock::{LockManager, MongoLockManager};
use mongodb::sync::Client;
use std::sync::Arc;

/// Composes the coordination substrate and exposes pass-through lock
/// operations to the migration runner
pub struct MigrationCoordinator {
    lock: Arc<dyn LockManager>,
    changelog: Arc<dyn ChangelogStore>,
}

impl MigrationCoordinator {
    /// Connect the coordinator to a database.
    ///
    /// Validates the configuration before any lock or index operation is
    /// attempted, binds the MongoDB-backed components, reconciles the
    /// changelog index against the declared uniqueness capability, and
    /// initializes the lock document.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Configuration` for invalid collection or
    /// database names, `CoordinatorError::Index` if reconciliation fails
    /// (fatal: idempotency cannot be guaranteed without the index), and
    /// `CoordinatorError::Database` for other driver failures.
    pub fn connect(
        client: &Client,
        database_name: &str,
        config: &CoordinatorConfig,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        if database_name.trim().is_empty() {
            return Err(CoordinatorError::Configuration(
                "database name must not be empty".to_string(),
            ));
        }

        let db = client.database(database_name);
        let reconciler = MongoIndexReconciler::new(&db, &config.changelog_collection);
        let lock = Arc::new(MongoLockManager::new(&db, &config.lock_collection));
        let changelog = Arc::new(MongoChangelogStore::new(
            &db,
            &config.changelog_collection,
            config.supports_unique_indexes,
        ));

        log::info!(
            "coordinating migrations on database '{}' (changelog: '{}', lock: '{}', unique indexes: {})",
            database_name,
            config.changelog_collection,
            config.lock_collection,
            config.supports_unique_indexes
        );

        Self::from_components(&reconciler, lock, changelog, config.supports_unique_indexes)
    }

    /// Compose a coordinator from caller-supplied components.
    ///
    /// Runs the same connect-time sequence as [`connect`](Self::connect):
    /// index reconciliation first, then lock initialization. This is the
    /// seam for swapping in the in-memory backends from [`crate::memory`]
    /// (or any other implementation) without a live database.
    pub fn from_components(
        reconciler: &dyn IndexReconciler,
        lock: Arc<dyn LockManager>,
        changelog: Arc<dyn ChangelogStore>,
        desired_unique: bool,
    ) -> Result<Self, CoordinatorError> {
        reconciler.reconcile(desired_unique)?;
        lock.initialize()?;
        Ok(Self { lock, changelog })
    }

    /// Try to acquire the process lock. Non-blocking: `Ok(false)` means
    /// another process holds it, and retry policy is the caller's.
    pub fn acquire_process_lock(&self) -> Result<bool, CoordinatorError> {
        self.lock.acquire()
    }

    /// Release the process lock. Idempotent; safe from any process.
    pub fn release_process_lock(&self) -> Result<(), CoordinatorError> {
        self.lock.release()
    }

    /// Whether the process lock is currently held (by anyone)
    pub fn is_process_lock_held(&self) -> Result<bool, CoordinatorError> {
        self.lock.is_held()
    }

    /// The changelog store, for the migration runner's bookkeeping
    #[must_use]
    pub fn changelog(&self) -> &dyn ChangelogStore {
        self.changelog.as_ref()
    }

    /// Acquire the process lock as a guard that releases on drop.
    ///
    /// Returns `Ok(None)` when the lock is contended. The guard ensures the
    /// lock is released even if the migration run errors or panics, but it
    /// cannot protect against a crashed process (see the limitation notes in
    /// [`crate::lock`]).
    pub fn try_lock(&self) -> Result<Option<ProcessLockGuard<'_>>, CoordinatorError> {
        if self.acquire_process_lock()? {
            Ok(Some(ProcessLockGuard { coordinator: self }))
        } else {
            Ok(None)
        }
    }
}

/// Holds the process lock, releasing it when dropped
pub struct ProcessLockGuard<'a> {
    coordinator: &'a MigrationCoordinator,
}

impl Drop for ProcessLockGuard<'_> {
    fn drop(&mut self) {
        // Errors cannot propagate out of drop
        if let Err(e) = self.coordinator.release_process_lock() {
            log::warn!("failed to release migration process lock: {}", e);
        }
    }
}
