//! Changelog index reconciliation
//!
//! Keeps the `(changeId, author)` index on the changelog collection aligned
//! with the declared database capability. The policy is asymmetric on
//! purpose: reconciliation recreates toward a stronger (unique) index
//! freely, but never drops an existing unique index just because the
//! current capability flag is weaker. Conservative capability detection
//! must not silently downgrade a guarantee already in place.

use crate::changeset::{ChangeEntry, KEY_AUTHOR, KEY_CHANGE_ID};
use crate::error::CoordinatorError;
use bson::{doc, Bson};
use mongodb::options::IndexOptions;
use mongodb::sync::{Collection, Database};
use mongodb::IndexModel;

/// Deterministic name of the changelog's `(changeId, author)` index
pub const CHANGE_ID_AUTHOR_INDEX: &str = "changeId_1_author_1";

/// Live index metadata, read transiently during reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Index name as reported by the database
    pub name: String,
    /// Ordered `(field, direction)` key list
    pub keys: Vec<(String, i32)>,
    /// Whether the index enforces uniqueness
    pub unique: bool,
}

impl IndexDescriptor {
    /// Descriptor for the canonical changelog index
    #[must_use]
    pub fn changelog(unique: bool) -> Self {
        Self {
            name: CHANGE_ID_AUTHOR_INDEX.to_string(),
            keys: vec![(KEY_CHANGE_ID.to_string(), 1), (KEY_AUTHOR.to_string(), 1)],
            unique,
        }
    }
}

/// What reconciliation decided to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReconcileAction {
    /// Existing index already satisfies the policy (or downgrade refused)
    Noop,
    /// No index yet: create one with the given uniqueness
    Create { unique: bool },
    /// Mismatched index: exactly one drop followed by exactly one create
    Recreate { unique: bool },
}

/// Decide how to bring an existing index in line with the desired policy
pub(crate) fn plan_reconcile(
    existing: Option<&IndexDescriptor>,
    desired_unique: bool,
) -> ReconcileAction {
    match existing {
        None => ReconcileAction::Create {
            unique: desired_unique,
        },
        Some(index) if index.unique == desired_unique => ReconcileAction::Noop,
        Some(_) if desired_unique => ReconcileAction::Recreate { unique: true },
        // Mismatched but the capability cannot enforce uniqueness: leave the
        // stronger existing index alone rather than downgrade it
        Some(_) => ReconcileAction::Noop,
    }
}

/// Inspects and repairs the changelog's `(changeId, author)` index
pub trait IndexReconciler: Send + Sync {
    /// Bring the changelog index in line with `desired_unique`.
    ///
    /// # Errors
    ///
    /// Index lookup, drop, and create failures are fatal: without the
    /// reconciled index the changelog's idempotency guarantee cannot be
    /// upheld, so startup must abort.
    fn reconcile(&self, desired_unique: bool) -> Result<(), CoordinatorError>;
}

/// [`IndexReconciler`] over a MongoDB changelog collection
pub struct MongoIndexReconciler {
    collection: Collection<ChangeEntry>,
}

impl MongoIndexReconciler {
    /// Bind a reconciler to the changelog collection in `db`
    #[must_use]
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection::<ChangeEntry>(collection_name),
        }
    }

    /// Look up the changelog index by its deterministic name
    fn find_changelog_index(&self) -> Result<Option<IndexDescriptor>, CoordinatorError> {
        let cursor = self
            .collection
            .list_indexes()
            .run()
            .map_err(index_error)?;

        for result in cursor {
            let descriptor = descriptor_from_model(&result.map_err(index_error)?);
            if descriptor.name == CHANGE_ID_AUTHOR_INDEX {
                return Ok(Some(descriptor));
            }
        }
        Ok(None)
    }

    fn create_changelog_index(&self, unique: bool) -> Result<(), CoordinatorError> {
        let model = IndexModel::builder()
            .keys(doc! { KEY_CHANGE_ID: 1, KEY_AUTHOR: 1 })
            .options(
                IndexOptions::builder()
                    .name(CHANGE_ID_AUTHOR_INDEX.to_string())
                    .unique(unique)
                    .build(),
            )
            .build();

        self.collection
            .create_index(model)
            .run()
            .map_err(index_error)?;
        log::info!(
            "created changelog index '{}' (unique: {})",
            CHANGE_ID_AUTHOR_INDEX,
            unique
        );
        Ok(())
    }

    fn drop_changelog_index(&self) -> Result<(), CoordinatorError> {
        self.collection
            .drop_index(CHANGE_ID_AUTHOR_INDEX)
            .run()
            .map_err(index_error)?;
        log::info!("dropped mismatched changelog index '{}'", CHANGE_ID_AUTHOR_INDEX);
        Ok(())
    }
}

impl IndexReconciler for MongoIndexReconciler {
    fn reconcile(&self, desired_unique: bool) -> Result<(), CoordinatorError> {
        let existing = self.find_changelog_index()?;
        match plan_reconcile(existing.as_ref(), desired_unique) {
            ReconcileAction::Noop => {
                log::debug!("changelog index '{}' already satisfies policy", CHANGE_ID_AUTHOR_INDEX);
                Ok(())
            }
            ReconcileAction::Create { unique } => self.create_changelog_index(unique),
            ReconcileAction::Recreate { unique } => {
                self.drop_changelog_index()?;
                self.create_changelog_index(unique)
            }
        }
    }
}

fn index_error(source: mongodb::error::Error) -> CoordinatorError {
    CoordinatorError::Index {
        name: CHANGE_ID_AUTHOR_INDEX.to_string(),
        source,
    }
}

fn descriptor_from_model(model: &IndexModel) -> IndexDescriptor {
    let keys: Vec<(String, i32)> = model
        .keys
        .iter()
        .map(|(field, value)| (field.clone(), key_direction(value)))
        .collect();
    let name = model
        .options
        .as_ref()
        .and_then(|options| options.name.clone())
        .unwrap_or_else(|| derived_index_name(&keys));
    let unique = model
        .options
        .as_ref()
        .and_then(|options| options.unique)
        .unwrap_or(false);
    IndexDescriptor { name, keys, unique }
}

/// Fallback name for metadata missing an explicit name, matching the
/// server's own `field_direction` naming convention
fn derived_index_name(keys: &[(String, i32)]) -> String {
    keys.iter()
        .map(|(field, direction)| format!("{}_{}", field, direction))
        .collect::<Vec<_>>()
        .join("_")
}

fn key_direction(value: &Bson) -> i32 {
    match value {
        Bson::Int32(v) => *v,
        Bson::Int64(v) => *v as i32,
        Bson::Double(v) => *v as i32,
        _ => 0,
    }
}
