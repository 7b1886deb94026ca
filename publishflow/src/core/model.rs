//! Imports, rows and configured data source instances.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One persisted row of an import: its 1-based row number plus raw
/// positional values in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    /// The source row number.
    pub row_number: u64,
    /// Raw values, positionally matching [`Import::schema`].
    pub values: Vec<Value>,
}

impl ImportRow {
    /// Creates a new row.
    #[must_use]
    pub fn new(row_number: u64, values: Vec<Value>) -> Self {
        Self { row_number, values }
    }
}

/// A batch of rows handed to a batch handler.
pub type RowBatch = Vec<ImportRow>;

/// One tabular dataset attached to a data source instance.
///
/// The rows themselves live in the import row store and are fetched on
/// demand; an `Import` only carries identity and schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// The import identifier used to page rows.
    pub id: String,
    /// Ordered property names.
    pub schema: Vec<String>,
}

impl Import {
    /// Creates a new import.
    #[must_use]
    pub fn new(id: impl Into<String>, schema: Vec<String>) -> Self {
        Self {
            id: id.into(),
            schema,
        }
    }

    /// Returns the position of a property, ignoring case.
    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.schema
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))
    }

    /// Returns the raw value of a property in a row.
    #[must_use]
    pub fn value<'a>(&self, row: &'a ImportRow, column: &str) -> Option<&'a Value> {
        self.column_index(column).and_then(|idx| row.values.get(idx))
    }

    /// Returns a property as trimmed text; empty and null values are `None`.
    #[must_use]
    pub fn text(&self, row: &ImportRow, column: &str) -> Option<String> {
        let text = match self.value(row, column)? {
            Value::Null => return None,
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Zips a row's values with the schema. Missing trailing values map to null.
    #[must_use]
    pub fn map_row(&self, row: &ImportRow) -> Map<String, Value> {
        self.schema
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                (
                    name.clone(),
                    row.values.get(idx).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }
}

/// A reference record extracted from the remote system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestedRecord {
    /// The remote identifier.
    pub id: String,
    /// Whether the user selected this record for reconciliation.
    #[serde(default)]
    pub selected: bool,
    /// The record body.
    pub body: Value,
}

impl HarvestedRecord {
    /// Creates a selected harvested record.
    #[must_use]
    pub fn selected(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            selected: true,
            body,
        }
    }
}

/// A configured data source: a named instance of a data source type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceInstance {
    /// The instance name.
    pub name: String,
    /// The data source type name.
    pub type_name: String,
    /// Opaque, type-specific configuration.
    #[serde(default)]
    pub config: Value,
    /// Attached imports.
    #[serde(default)]
    pub imports: Vec<Import>,
    /// Harvested reference records.
    #[serde(default)]
    pub harvested: Vec<HarvestedRecord>,
}

impl DataSourceInstance {
    /// Creates an instance without imports.
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            config: Value::Null,
            imports: Vec::new(),
            harvested: Vec::new(),
        }
    }

    /// Sets the configuration payload.
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Attaches an import.
    #[must_use]
    pub fn with_import(mut self, import: Import) -> Self {
        self.imports.push(import);
        self
    }

    /// Adds a harvested record.
    #[must_use]
    pub fn with_harvested(mut self, record: HarvestedRecord) -> Self {
        self.harvested.push(record);
        self
    }

    /// Returns the harvested records selected for reconciliation.
    pub fn selected_harvested(&self) -> impl Iterator<Item = &HarvestedRecord> {
        self.harvested.iter().filter(|r| r.selected)
    }
}
