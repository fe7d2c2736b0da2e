//! # Mongrate
//!
//! Coordination substrate for safe, exactly-once application of ordered
//! MongoDB migrations across application instances that may start
//! concurrently against the same database:
//!
//! - a distributed advisory lock backed by a single lock document,
//! - a changelog store with idempotent execution bookkeeping,
//! - an index reconciler keeping the changelog's uniqueness guarantee
//!   aligned with the declared database capability,
//! - a [`MigrationCoordinator`] composing the three at connect time.
//!
//! Discovery, ordering, and execution of the migration bodies themselves are
//! the caller's concern: a migration runner acquires the process lock,
//! checks [`ChangelogStore::has_executed`] per changeset, records each
//! successful changeset, and releases the lock.
//!
//! ```rust,no_run
//! use mongrate::{ChangeEntry, CoordinatorConfig, MigrationCoordinator};
//! use mongodb::sync::Client;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::with_uri_str("mongodb://localhost:27017")?;
//!     let config = CoordinatorConfig::default();
//!     let coordinator = MigrationCoordinator::connect(&client, "appdb", &config)?;
//!
//!     if let Some(_guard) = coordinator.try_lock()? {
//!         let changelog = coordinator.changelog();
//!         if !changelog.has_executed("add-users", "alice")? {
//!             // ... run the changeset body ...
//!             changelog.record_executed(&ChangeEntry::new(
//!                 "add-users",
//!                 "alice",
//!                 "InitialChangelog",
//!                 "add_users",
//!             ))?;
//!         }
//!         // lock released when _guard drops
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The lock has no lease or owner identity: a holder that crashes leaves it
//! held until an operator intervenes. See the [`lock`] module docs.

pub mod changelog;
pub mod changeset;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod index;
pub mod lock;
pub mod memory;

pub use changelog::{ChangelogStore, MongoChangelogStore};
pub use changeset::ChangeEntry;
pub use config::CoordinatorConfig;
pub use coordinator::{MigrationCoordinator, ProcessLockGuard};
pub use error::CoordinatorError;
pub use index::{IndexDescriptor, IndexReconciler, MongoIndexReconciler, CHANGE_ID_AUTHOR_INDEX};
pub use lock::{LockEntry, LockManager, MongoLockManager, LOCK_KEY};
