//! Changelog store - execution bookkeeping for applied changesets

use crate::changeset::{search_filter, ChangeEntry};
use crate::error::{is_duplicate_key, CoordinatorError};
use mongodb::sync::{Collection, Database};

/// Records executed changesets and answers whether a `(changeId, author)`
/// pair has already run
///
/// Idempotent replay relies on the changelog index: when the database
/// edition enforces uniqueness, a duplicate insert is rejected by the
/// storage layer and translated into "already applied" here; when it does
/// not, the store falls back to an explicit existence check before insert.
pub trait ChangelogStore: Send + Sync {
    /// Whether a changeset with this `(changeId, author)` pair has executed
    fn has_executed(&self, change_id: &str, author: &str) -> Result<bool, CoordinatorError>;

    /// Record an executed changeset.
    ///
    /// Recording the same `(changeId, author)` pair twice is a silent
    /// success, never an error and never a second record.
    fn record_executed(&self, entry: &ChangeEntry) -> Result<(), CoordinatorError>;
}

/// [`ChangelogStore`] over a MongoDB changelog collection
pub struct MongoChangelogStore {
    collection: Collection<ChangeEntry>,
    /// Whether the storage layer enforces `(changeId, author)` uniqueness
    enforce_unique: bool,
}

impl MongoChangelogStore {
    /// Bind a changelog store to the changelog collection in `db`
    ///
    /// `enforce_unique` must match the capability flag the index was
    /// reconciled with; it selects between duplicate-key translation and
    /// the explicit pre-insert existence check.
    #[must_use]
    pub fn new(db: &Database, collection_name: &str, enforce_unique: bool) -> Self {
        Self {
            collection: db.collection::<ChangeEntry>(collection_name),
            enforce_unique,
        }
    }
}

impl ChangelogStore for MongoChangelogStore {
    fn has_executed(&self, change_id: &str, author: &str) -> Result<bool, CoordinatorError> {
        let count = self
            .collection
            .count_documents(search_filter(change_id, author))
            .run()?;
        Ok(count > 0)
    }

    fn record_executed(&self, entry: &ChangeEntry) -> Result<(), CoordinatorError> {
        if !self.enforce_unique {
            // Without storage-layer uniqueness the insert would not be
            // rejected, so duplicate suppression happens up front
            if self.has_executed(&entry.change_id, &entry.author)? {
                log::debug!(
                    "changeset '{}' by '{}' already recorded, skipping insert",
                    entry.change_id,
                    entry.author
                );
                return Ok(());
            }
            self.collection.insert_one(entry).run()?;
            return Ok(());
        }

        match self.collection.insert_one(entry).run() {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                // The unique index rejected a replay: already applied
                log::debug!(
                    "changeset '{}' by '{}' already recorded (duplicate key), skipping",
                    entry.change_id,
                    entry.author
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
