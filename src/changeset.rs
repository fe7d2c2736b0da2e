//! `ChangeEntry` - Represents entries in the migration changelog collection

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Changelog field holding the changeset identifier
pub const KEY_CHANGE_ID: &str = "changeId";
/// Changelog field holding the changeset author
pub const KEY_AUTHOR: &str = "author";

/// One executed changeset, recorded in the changelog collection
///
/// The pair `(change_id, author)` uniquely identifies a changeset; the
/// changelog's reconciled index enforces that uniqueness when the database
/// edition supports it. Entries are created once, at the moment a changeset
/// is applied, and are never updated or deleted by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    /// Changeset identifier, unique together with `author`
    pub change_id: String,

    /// Author of the changeset
    pub author: String,

    /// When the changeset was applied
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub executed_at: DateTime<Utc>,

    /// Name of the changelog class/module the changeset came from
    pub change_log_class: String,

    /// Name of the changeset method/function that was executed
    pub change_set_method: String,
}

impl ChangeEntry {
    /// Create a `ChangeEntry` stamped with the current time
    #[must_use]
    pub fn new(
        change_id: impl Into<String>,
        author: impl Into<String>,
        change_log_class: impl Into<String>,
        change_set_method: impl Into<String>,
    ) -> Self {
        Self {
            change_id: change_id.into(),
            author: author.into(),
            executed_at: Utc::now(),
            change_log_class: change_log_class.into(),
            change_set_method: change_set_method.into(),
        }
    }

    /// Filter matching this entry's `(changeId, author)` pair
    #[must_use]
    pub fn search_filter(&self) -> Document {
        search_filter(&self.change_id, &self.author)
    }
}

/// Filter matching a `(changeId, author)` pair
///
/// This is the one query shape the changelog store uses for existence
/// checks, so lookups and the reconciled index always agree on the key pair.
#[must_use]
pub fn search_filter(change_id: &str, author: &str) -> Document {
    doc! {
        KEY_CHANGE_ID: change_id,
        KEY_AUTHOR: author,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_filter_uses_wire_field_names() {
        let filter = search_filter("add-users", "alice");
        assert_eq!(filter.get_str("changeId").unwrap(), "add-users");
        assert_eq!(filter.get_str("author").unwrap(), "alice");
    }

    #[test]
    fn test_entry_search_filter_matches_its_own_key_pair() {
        let entry = ChangeEntry::new("add-users", "alice", "InitialChangelog", "add_users");
        assert_eq!(entry.search_filter(), search_filter("add-users", "alice"));
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let entry = ChangeEntry::new("add-users", "alice", "InitialChangelog", "add_users");
        let doc = bson::to_document(&entry).unwrap();
        assert!(doc.contains_key("changeId"));
        assert!(doc.contains_key("executedAt"));
        assert!(doc.contains_key("changeLogClass"));
        assert!(doc.contains_key("changeSetMethod"));
        // executedAt must land as a native BSON datetime, not a string
        assert!(matches!(doc.get("executedAt"), Some(bson::Bson::DateTime(_))));
    }
}
