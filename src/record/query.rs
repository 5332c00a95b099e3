//! Ordered, owned record collections.

use serde::Serialize;

use super::{Record, Value};

/// An ordered collection of records.
///
/// Every operation is stable: records that compare equal keep their
/// relative order, so the same input always yields the same output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySet {
    records: Vec<Record>,
}

/// One page of a paginated query set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// 1-based page number actually served.
    pub number: usize,
    pub num_pages: usize,
    pub per_page: usize,
    /// Total records across all pages.
    pub total: usize,
    #[serde(skip)]
    pub records: Vec<Record>,
}

impl QuerySet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Keep the records matching `predicate`.
    pub fn filter<F>(self, mut predicate: F) -> Self
    where
        F: FnMut(&Record) -> bool,
    {
        Self {
            records: self.records.into_iter().filter(|r| predicate(r)).collect(),
        }
    }

    /// Stable sort by a derived key.
    pub fn order_by<F>(mut self, key: F, descending: bool) -> Self
    where
        F: Fn(&Record) -> Value,
    {
        self.records.sort_by(|a, b| {
            let ord = key(a).compare(&key(b));
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        self
    }

    /// Sort by the value at an attribute path; missing values sort as null.
    pub fn order_by_path(self, path: &str, descending: bool) -> Self {
        self.order_by(
            |r| r.lookup(path).cloned().unwrap_or(Value::Null),
            descending,
        )
    }

    /// Slice out one page.
    ///
    /// Pages are 1-based. Page 0 is treated as page 1 and pages past the end
    /// clamp to the last page; an empty set has a single empty page.
    pub fn paginate(&self, page: usize, per_page: usize) -> Page {
        let per_page = per_page.max(1);
        let total = self.records.len();
        let num_pages = total.div_ceil(per_page).max(1);
        let number = page.clamp(1, num_pages);
        let start = (number - 1) * per_page;
        let end = (start + per_page).min(total);

        Page {
            number,
            num_pages,
            per_page,
            total,
            records: self.records[start.min(total)..end].to_vec(),
        }
    }
}

impl FromIterator<Record> for QuerySet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
