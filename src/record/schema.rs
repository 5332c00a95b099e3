//! Introspection of a site's record type.
//!
//! The column resolver asks the schema two questions about an identifier:
//! is it a zero-argument computed accessor, and if not, is it a readable
//! stored attribute path.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::{canonical_path, Record, Value};

/// Value-producing function of a computed accessor.
pub type ComputedFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// A named computed accessor with optional display metadata.
#[derive(Clone)]
pub struct ComputedAccessor {
    pub name: String,
    /// Declared display label.
    pub label: Option<String>,
    /// Declared sort key (an attribute path), if any.
    pub sort_key: Option<String>,
    func: ComputedFn,
}

impl ComputedAccessor {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            label: None,
            sort_key: None,
            func: Arc::new(func),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    /// Join the text of several attribute values with a separator.
    ///
    /// Missing and null values are skipped.
    pub fn concat(name: impl Into<String>, fields: Vec<String>, separator: String) -> Self {
        Self::new(name, move |record| {
            let parts: Vec<String> = fields
                .iter()
                .filter_map(|f| record.lookup(f))
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
                .collect();
            Value::Text(parts.join(&separator))
        })
    }

    /// Numeric sum of several attribute values.
    ///
    /// Non-numeric values are skipped; the result is null when nothing was
    /// numeric, an integer when every addend was an integer and the total
    /// fits in `i64`, a float otherwise.
    pub fn sum(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self::new(name, move |record| {
            let values: Vec<&Value> = fields
                .iter()
                .filter_map(|f| record.lookup(f))
                .filter(|v| v.as_f64().is_some())
                .collect();
            if values.is_empty() {
                return Value::Null;
            }
            let int_sum = values.iter().try_fold(0i64, |acc, v| match v {
                Value::Int(i) => acc.checked_add(*i),
                _ => None,
            });
            match int_sum {
                Some(total) => Value::Int(total),
                None => Value::Float(values.iter().filter_map(|v| v.as_f64()).sum()),
            }
        })
    }

    /// Call the accessor on a record.
    pub fn call(&self, record: &Record) -> Value {
        (self.func)(record)
    }
}

impl fmt::Debug for ComputedAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedAccessor")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("sort_key", &self.sort_key)
            .finish_non_exhaustive()
    }
}

/// Stored attributes and computed accessors of a record type.
#[derive(Debug, Clone, Default)]
pub struct RecordSchema {
    attributes: BTreeSet<String>,
    computed: BTreeMap<String, ComputedAccessor>,
}

impl RecordSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare stored attribute paths.
    pub fn with_attributes<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attributes
            .extend(paths.into_iter().map(|p| canonical_path(p.as_ref())));
        self
    }

    /// Infer attribute paths from the union of the records' leaf paths.
    pub fn infer(records: &[Record]) -> Self {
        let mut schema = Self::new();
        for record in records {
            schema.attributes.extend(record.attribute_paths());
        }
        schema
    }

    pub fn with_computed(mut self, accessor: ComputedAccessor) -> Self {
        self.add_computed(accessor);
        self
    }

    pub fn add_computed(&mut self, accessor: ComputedAccessor) {
        self.computed.insert(accessor.name.clone(), accessor);
    }

    pub fn has_attribute(&self, path: &str) -> bool {
        self.attributes.contains(&canonical_path(path))
    }

    pub fn computed(&self, name: &str) -> Option<&ComputedAccessor> {
        self.computed.get(name)
    }

    /// Stored attribute paths in sorted order.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(String::as_str)
    }

    pub fn computed_accessors(&self) -> impl Iterator<Item = &ComputedAccessor> {
        self.computed.values()
    }
}
