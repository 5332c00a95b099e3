//! Per-site registry of selectable columns.

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::params;
use serde::Serialize;

use super::{Store, StoreError, StoreResult};
use crate::record::{canonical_path, path_segments};

static RELATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:(?:\.|__)[A-Za-z_][A-Za-z0-9_]*)*$").unwrap()
});

/// A column a site offers for selection, with its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportColumn {
    pub relation: String,
    pub human_name: String,
}

pub fn is_valid_relation(relation: &str) -> bool {
    RELATION_PATTERN.is_match(relation)
}

/// `"<site name> :: segment :: segment"`.
pub fn default_human_name(site_name: &str, relation: &str) -> String {
    std::iter::once(site_name)
        .chain(path_segments(relation))
        .collect::<Vec<_>>()
        .join(" :: ")
}

impl Store {
    /// Register `relations` for `site`, keeping existing display names.
    ///
    /// Returns the columns that were newly created.
    pub fn register_columns(
        &self,
        site: &str,
        site_name: &str,
        relations: &[String],
    ) -> StoreResult<Vec<ReportColumn>> {
        for relation in relations {
            if !is_valid_relation(relation) {
                return Err(StoreError::InvalidRelation(relation.clone()));
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut created = Vec::new();
        for relation in relations {
            let relation = canonical_path(relation);
            let human_name = default_human_name(site_name, &relation);
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO report_columns (site_label, relation, human_name)
                 VALUES (?, ?, ?)",
                params![site, relation, human_name],
            )?;
            if inserted > 0 {
                created.push(ReportColumn {
                    relation,
                    human_name,
                });
            }
        }
        tx.commit()?;

        if !created.is_empty() {
            tracing::debug!(site, count = created.len(), "registered columns");
        }
        Ok(created)
    }

    /// Columns registered for `site`, by relation descending.
    pub fn list_columns(&self, site: &str) -> StoreResult<Vec<ReportColumn>> {
        let mut stmt = self.conn.prepare(
            "SELECT relation, human_name FROM report_columns
             WHERE site_label = ? ORDER BY relation DESC",
        )?;
        let columns = stmt
            .query_map(params![site], |row| {
                Ok(ReportColumn {
                    relation: row.get(0)?,
                    human_name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Change a column's display name. Returns `false` if it is not registered.
    pub fn rename_column(&self, site: &str, relation: &str, human_name: &str) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE report_columns SET human_name = ? WHERE site_label = ? AND relation = ?",
            params![human_name, site, canonical_path(relation)],
        )?;
        Ok(changed > 0)
    }

    /// Unregister a column. Returns `false` if it was not registered.
    pub fn remove_column(&self, site: &str, relation: &str) -> StoreResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM report_columns WHERE site_label = ? AND relation = ?",
            params![site, canonical_path(relation)],
        )?;
        Ok(removed > 0)
    }
}
