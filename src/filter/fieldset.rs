//! Named groupings of filter fields for display.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::FilterSet;

/// A titled group of filter field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    #[serde(default)]
    pub title: Option<String>,
    pub fields: Vec<String>,
}

impl FieldSet {
    pub fn new<I, S>(title: Option<&str>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.map(str::to_string),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Misconfigured field-sets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldSetError {
    #[error("Unaccounted field {0} in fieldset")]
    Unaccounted(String),

    #[error("Field {0} is listed in more than one fieldset")]
    Duplicate(String),

    #[error("Fieldset names unknown filter field {0}")]
    Unknown(String),
}

/// Validated display layout of a filter form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldSetLayout {
    groups: Vec<FieldSet>,
}

impl FieldSetLayout {
    /// Build the layout for `filters`.
    ///
    /// Without declared field-sets every field lands in one untitled group.
    /// Declared field-sets must place each filter field exactly once.
    pub fn new(filters: &FilterSet, declared: Option<Vec<FieldSet>>) -> Result<Self, FieldSetError> {
        let Some(declared) = declared else {
            return Ok(Self {
                groups: vec![FieldSet {
                    title: None,
                    fields: filters.fields().iter().map(|f| f.name.clone()).collect(),
                }],
            });
        };

        let mut accounted = BTreeSet::new();
        for set in &declared {
            for name in &set.fields {
                if filters.field(name).is_none() {
                    return Err(FieldSetError::Unknown(name.clone()));
                }
                if !accounted.insert(name.as_str()) {
                    return Err(FieldSetError::Duplicate(name.clone()));
                }
            }
        }

        if let Some(missing) = filters
            .fields()
            .iter()
            .find(|f| !accounted.contains(f.name.as_str()))
        {
            return Err(FieldSetError::Unaccounted(missing.name.clone()));
        }

        Ok(Self { groups: declared })
    }

    pub fn groups(&self) -> &[FieldSet] {
        &self.groups
    }
}
