//! Column resolution for the results step.
//!
//! A report's column list is stored as plain identifiers. On every results
//! request the identifiers are resolved once into [`ResolvedColumn`]s, each
//! tagged with where its value comes from; nothing downstream inspects the
//! record type again.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::filter::FieldErrors;
use crate::record::{Record, RecordSchema, Value};
use crate::store::ReportColumn;

/// Form field name of the column selection.
pub const DISPLAY_FIELDS: &str = "display_fields";

/// Errors raised while resolving columns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColumnError {
    #[error("Column '{0}' is neither a stored attribute nor a computed accessor")]
    Unresolvable(String),
}

/// Where a column's value comes from.
#[derive(Debug, Clone)]
pub enum ColumnSource {
    /// Read the stored attribute at this path.
    Attribute(String),
    /// Call a computed accessor.
    Computed(crate::record::ComputedAccessor),
}

/// A column identifier paired with its value accessor and metadata.
#[derive(Debug, Clone)]
pub struct ResolvedColumn {
    pub id: String,
    pub source: ColumnSource,
    pub label: String,
    pub sort_key: String,
}

impl ResolvedColumn {
    pub fn value(&self, record: &Record) -> Value {
        match &self.source {
            ColumnSource::Attribute(path) => record.lookup(path).cloned().unwrap_or(Value::Null),
            ColumnSource::Computed(accessor) => accessor.call(record),
        }
    }

    /// Value used to order rows by this column.
    ///
    /// A sort key equal to the column's own id sorts by the column value;
    /// any other sort key is read as an attribute path.
    pub fn sort_value(&self, record: &Record) -> Value {
        if self.sort_key == self.id {
            self.value(record)
        } else {
            record.lookup(&self.sort_key).cloned().unwrap_or(Value::Null)
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self.source, ColumnSource::Computed(_))
    }
}

/// Resolve identifiers against a schema, preserving their order.
///
/// Computed accessors take precedence over attributes of the same name.
/// An identifier that is neither fails the whole resolution.
pub fn resolve(ids: &[String], schema: &RecordSchema) -> Result<Vec<ResolvedColumn>, ColumnError> {
    ids.iter()
        .map(|id| {
            if let Some(accessor) = schema.computed(id) {
                Ok(ResolvedColumn {
                    id: id.clone(),
                    label: accessor.label.clone().unwrap_or_else(|| id.clone()),
                    sort_key: accessor.sort_key.clone().unwrap_or_else(|| id.clone()),
                    source: ColumnSource::Computed(accessor.clone()),
                })
            } else if schema.has_attribute(id) {
                Ok(ResolvedColumn {
                    id: id.clone(),
                    source: ColumnSource::Attribute(id.clone()),
                    label: id.clone(),
                    sort_key: id.clone(),
                })
            } else {
                Err(ColumnError::Unresolvable(id.clone()))
            }
        })
        .collect()
}

/// One selectable column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnChoice {
    pub id: String,
    pub label: String,
}

/// The columns a user may pick in the columns step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ColumnChoices {
    choices: Vec<ColumnChoice>,
}

impl ColumnChoices {
    /// Registered columns, configured inclusions and computed accessors,
    /// minus configured exclusions, ordered by identifier.
    pub fn build(
        registered: &[ReportColumn],
        inclusions: &[String],
        exclusions: &[String],
        schema: &RecordSchema,
    ) -> Self {
        let mut by_id: BTreeMap<String, String> = BTreeMap::new();

        for column in registered {
            by_id
                .entry(column.relation.clone())
                .or_insert_with(|| column.human_name.clone());
        }
        for accessor in schema.computed_accessors() {
            by_id
                .entry(accessor.name.clone())
                .or_insert_with(|| accessor.label.clone().unwrap_or_else(|| accessor.name.clone()));
        }
        for id in inclusions {
            by_id.entry(id.clone()).or_insert_with(|| id.clone());
        }
        for id in exclusions {
            by_id.remove(id);
        }

        Self {
            choices: by_id
                .into_iter()
                .map(|(id, label)| ColumnChoice { id, label })
                .collect(),
        }
    }

    pub fn choices(&self) -> &[ColumnChoice] {
        &self.choices
    }

    pub fn contains(&self, id: &str) -> bool {
        self.choices.iter().any(|c| c.id == id)
    }

    /// Validate a submitted column selection, keeping its order.
    pub fn clean(&self, submitted: &[String]) -> Result<Vec<String>, FieldErrors> {
        let mut errors = FieldErrors::new();
        let selected: Vec<&String> = submitted.iter().filter(|s| !s.trim().is_empty()).collect();

        if selected.is_empty() {
            errors.add(DISPLAY_FIELDS, "This field is required.");
            return Err(errors);
        }

        let mut seen = Vec::with_capacity(selected.len());
        for id in selected {
            if !self.contains(id) {
                errors.add(
                    DISPLAY_FIELDS,
                    format!("Select a valid choice. {} is not one of the available choices.", id),
                );
            } else if seen.contains(id) {
                errors.add(DISPLAY_FIELDS, format!("Column {} was selected more than once.", id));
            } else {
                seen.push(id.clone());
            }
        }

        if errors.is_empty() {
            Ok(seen)
        } else {
            Err(errors)
        }
    }
}
