//! Filter application engine.
//!
//! A site declares its filter vocabulary as a [`FilterSet`]. Submitted input
//! arrives as a [`RawQuery`]; cleaning turns it into [`FilterCriteria`] or a
//! set of [`FieldErrors`], and applying criteria to a base [`QuerySet`]
//! yields the filtered collection.
//!
//! ```text
//! RawQuery ──clean──► FilterCriteria ──apply──► QuerySet
//!     │                                  ▲
//!     └───────────── apply (cleans first)┘
//! ```
//!
//! Applying is deterministic: records are kept or dropped in place, so the
//! base order survives filtering unchanged.

mod fieldset;

pub use fieldset::{FieldSet, FieldSetError, FieldSetLayout};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use inflector::Inflector;
use serde::{Deserialize, Serialize};

use crate::record::{QuerySet, Record, Value};

const REQUIRED: &str = "This field is required.";
const INVALID_INTEGER: &str = "Enter a whole number.";
const INVALID_NUMBER: &str = "Enter a number.";

/// How a filter value is compared against a record attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lookup {
    #[default]
    Exact,
    IExact,
    Contains,
    IContains,
    StartsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    IsNull,
}

/// Value type accepted by a filter field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Integer,
    Decimal,
    Boolean,
    Choice(Vec<String>),
}

impl FieldKind {
    fn clean(&self, raw: &str) -> Result<Value, String> {
        match self {
            FieldKind::Text => Ok(Value::Text(raw.to_string())),
            FieldKind::Integer => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| INVALID_INTEGER.to_string()),
            FieldKind::Decimal => match raw.parse::<f64>() {
                Ok(x) if x.is_finite() => Ok(Value::Float(x)),
                _ => Err(INVALID_NUMBER.to_string()),
            },
            FieldKind::Boolean => parse_bool(raw)
                .map(Value::Bool)
                .ok_or_else(|| invalid_choice(raw)),
            FieldKind::Choice(choices) => {
                if choices.iter().any(|c| c == raw) {
                    Ok(Value::Text(raw.to_string()))
                } else {
                    Err(invalid_choice(raw))
                }
            }
        }
    }
}

fn invalid_choice(raw: &str) -> String {
    format!(
        "Select a valid choice. {} is not one of the available choices.",
        raw
    )
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// One field of a site's filter form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterField {
    pub name: String,
    pub label: String,
    /// Attribute path the field filters on.
    pub path: String,
    pub lookup: Lookup,
    pub kind: FieldKind,
    pub required: bool,
}

impl FilterField {
    /// A field filtering `name` by exact match; the label is the
    /// sentence-cased name.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            label: name.to_sentence_case(),
            path: name.clone(),
            name,
            lookup: Lookup::Exact,
            kind,
            required: false,
        }
    }

    pub fn with_lookup(mut self, lookup: Lookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Clean the non-empty submitted values for this field.
    ///
    /// Single-valued lookups use the last submitted value.
    fn clean_values(&self, values: &[&str]) -> Result<Value, String> {
        match self.lookup {
            Lookup::In => values
                .iter()
                .map(|v| self.kind.clean(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Lookup::IsNull => {
                let raw = values.last().copied().unwrap_or_default();
                parse_bool(raw)
                    .map(Value::Bool)
                    .ok_or_else(|| invalid_choice(raw))
            }
            _ => self.kind.clean(values.last().copied().unwrap_or_default()),
        }
    }

    /// Whether `record` satisfies `criterion` under this field's lookup.
    pub fn matches(&self, record: &Record, criterion: &Value) -> bool {
        let actual = record.lookup(&self.path);

        if self.lookup == Lookup::IsNull {
            let want_null = criterion.as_bool().unwrap_or(true);
            let is_null = actual.map_or(true, Value::is_null);
            return is_null == want_null;
        }

        match actual {
            None | Some(Value::Null) => false,
            Some(value) => self.matches_value(value, criterion),
        }
    }

    fn matches_value(&self, actual: &Value, criterion: &Value) -> bool {
        // To-many relations match when any related value does.
        if let Value::List(items) = actual {
            return items.iter().any(|item| self.matches_value(item, criterion));
        }

        match self.lookup {
            Lookup::Exact => values_equal(actual, criterion),
            Lookup::IExact => actual.to_string().to_lowercase() == criterion.to_string().to_lowercase(),
            Lookup::Contains => actual.to_string().contains(&criterion.to_string()),
            Lookup::IContains => actual
                .to_string()
                .to_lowercase()
                .contains(&criterion.to_string().to_lowercase()),
            Lookup::StartsWith => actual.to_string().starts_with(&criterion.to_string()),
            Lookup::Gt => ordered(actual, criterion) == Some(Ordering::Greater),
            Lookup::Gte => matches!(
                ordered(actual, criterion),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Lookup::Lt => ordered(actual, criterion) == Some(Ordering::Less),
            Lookup::Lte => matches!(
                ordered(actual, criterion),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Lookup::In => match criterion {
                Value::List(options) => options.iter().any(|o| values_equal(actual, o)),
                other => values_equal(actual, other),
            },
            Lookup::IsNull => false,
        }
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match ordered(actual, expected) {
        Some(ord) => ord == Ordering::Equal,
        None => actual.to_string() == expected.to_string(),
    }
}

/// Ordering between two values of comparable types.
fn ordered(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Text(_), Value::Text(_)) | (Value::Bool(_), Value::Bool(_)) => Some(a.compare(b)),
        _ if a.as_f64().is_some() && b.as_f64().is_some() => Some(a.compare(b)),
        _ => None,
    }
}

/// Unvalidated filter input: ordered, multi-valued key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawQuery(Vec<(String, String)>);

impl RawQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Last value submitted for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value submitted for `key`, in submission order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawQuery {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RawQuery(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Cleaned filter values keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterCriteria(BTreeMap<String, Value>);

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

/// What to filter a collection with.
#[derive(Debug, Clone, Copy)]
pub enum FilterInput<'a> {
    /// No filtering.
    None,
    /// Criteria that were already cleaned.
    Criteria(&'a FilterCriteria),
    /// Raw input, cleaned before applying.
    Raw(&'a RawQuery),
}

/// A site's filter vocabulary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    fields: Vec<FilterField>,
}

impl FilterSet {
    pub fn new(fields: Vec<FilterField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FilterField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FilterField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate raw input into criteria.
    ///
    /// Keys that are not filter fields are ignored and blank values count as
    /// absent.
    pub fn clean(&self, raw: &RawQuery) -> Result<FilterCriteria, FieldErrors> {
        let mut criteria = FilterCriteria::new();
        let mut errors = FieldErrors::new();

        for field in &self.fields {
            let values: Vec<&str> = raw
                .get_all(&field.name)
                .into_iter()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .collect();

            if values.is_empty() {
                if field.required {
                    errors.add(&field.name, REQUIRED);
                }
                continue;
            }

            match field.clean_values(&values) {
                Ok(value) => criteria.insert(&field.name, value),
                Err(message) => errors.add(&field.name, message),
            }
        }

        if errors.is_empty() {
            Ok(criteria)
        } else {
            Err(errors)
        }
    }

    /// Filter `base` by the given input.
    pub fn apply(&self, input: FilterInput<'_>, base: QuerySet) -> Result<QuerySet, FieldErrors> {
        match input {
            FilterInput::None => Ok(base),
            FilterInput::Criteria(criteria) => Ok(self.apply_criteria(criteria, base)),
            FilterInput::Raw(raw) => {
                let criteria = self.clean(raw)?;
                Ok(self.apply_criteria(&criteria, base))
            }
        }
    }

    fn apply_criteria(&self, criteria: &FilterCriteria, base: QuerySet) -> QuerySet {
        let active: Vec<(&FilterField, &Value)> = criteria
            .iter()
            .filter_map(|(name, value)| match self.field(name) {
                Some(field) => Some((field, value)),
                None => {
                    tracing::debug!(field = %name, "ignoring criterion for unknown filter field");
                    None
                }
            })
            .collect();

        base.filter(|record| {
            active
                .iter()
                .all(|(field, value)| field.matches(record, value))
        })
    }
}
