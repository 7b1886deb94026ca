//! Run-scoped map from source ids to resolved remote records.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Depth value of a record whose hierarchy has not been resolved.
pub const UNRESOLVED_DEPTH: i32 = -1;

/// What is known about one source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMapEntry {
    /// The source id as it appeared in the import.
    pub source_id: String,
    /// The remote id, once written (or found remotely).
    pub target_id: Option<String>,
    /// The source id of the parent record, if any.
    pub related_id: Option<String>,
    /// Hierarchy depth, [`UNRESOLVED_DEPTH`] until computed.
    pub depth: i32,
    /// Whether validation already reported an error for the row.
    pub rejected: bool,
    /// Whether the record already existed remotely and needs no write.
    pub external: bool,
    /// The source row number, 0 for external records.
    pub row_number: u64,
    /// The instance the row came from.
    pub instance_name: String,
}

impl RecordMapEntry {
    /// Creates an entry for an imported row.
    #[must_use]
    pub fn new(source_id: impl Into<String>, row_number: u64) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: None,
            related_id: None,
            depth: UNRESOLVED_DEPTH,
            rejected: false,
            external: false,
            row_number,
            instance_name: String::new(),
        }
    }

    /// Creates an entry for a record that already exists remotely.
    #[must_use]
    pub fn external(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            target_id: Some(target_id.into()),
            depth: 0,
            external: true,
            ..Self::new(source_id, 0)
        }
    }

    /// Sets the parent source id.
    #[must_use]
    pub fn with_related(mut self, related_id: Option<String>) -> Self {
        self.related_id = related_id;
        self
    }

    /// Sets the originating instance name.
    #[must_use]
    pub fn with_instance(mut self, instance_name: impl Into<String>) -> Self {
        self.instance_name = instance_name.into();
        self
    }

    /// Marks the row as having failed validation.
    #[must_use]
    pub fn rejected(mut self, rejected: bool) -> Self {
        self.rejected = rejected;
        self
    }

    /// Returns true once a finite depth has been assigned.
    #[must_use]
    pub fn has_depth(&self) -> bool {
        self.depth >= 0
    }
}

/// Concurrent, case-insensitive map keyed by source id.
///
/// Insertion is add-if-absent: the first writer wins and later inserts of
/// the same id are rejected. Target ids and depths are filled in afterwards
/// through the dedicated setters.
#[derive(Debug, Default)]
pub struct RecordMap {
    entries: DashMap<String, RecordMapEntry>,
}

fn key(source_id: &str) -> String {
    source_id.to_lowercase()
}

impl RecordMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the entry unless its id is already present.
    ///
    /// Returns true if this call inserted it.
    pub fn insert(&self, entry: RecordMapEntry) -> bool {
        match self.entries.entry(key(&entry.source_id)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    /// Returns a copy of the entry for an id.
    #[must_use]
    pub fn get(&self, source_id: &str) -> Option<RecordMapEntry> {
        self.entries.get(&key(source_id)).map(|e| e.value().clone())
    }

    /// Returns true if the id is present.
    #[must_use]
    pub fn contains(&self, source_id: &str) -> bool {
        self.entries.contains_key(&key(source_id))
    }

    /// Returns the resolved target id for a source id.
    #[must_use]
    pub fn target_id(&self, source_id: &str) -> Option<String> {
        self.entries
            .get(&key(source_id))
            .and_then(|e| e.target_id.clone())
    }

    /// Returns the depth for a source id.
    #[must_use]
    pub fn depth(&self, source_id: &str) -> Option<i32> {
        self.entries.get(&key(source_id)).map(|e| e.depth)
    }

    /// Records the remote id of a written record. Returns false if absent.
    pub fn set_target_id(&self, source_id: &str, target_id: impl Into<String>) -> bool {
        match self.entries.get_mut(&key(source_id)) {
            Some(mut entry) => {
                entry.target_id = Some(target_id.into());
                true
            }
            None => false,
        }
    }

    /// Records the computed depth. Returns false if absent.
    pub fn set_depth(&self, source_id: &str, depth: i32) -> bool {
        match self.entries.get_mut(&key(source_id)) {
            Some(mut entry) => {
                entry.depth = depth;
                true
            }
            None => false,
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a copy of all entries ordered by row number, then id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RecordMapEntry> {
        let mut entries: Vec<RecordMapEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| {
            a.row_number
                .cmp(&b.row_number)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        entries
    }
}
