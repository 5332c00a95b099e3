//! Saved report definitions.

use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{unix_now, Store, StoreError, StoreResult, WizardState};

/// Name shown for a report that was never given one.
pub const UNTITLED_REPORT: &str = "Untitled report";

/// A persisted snapshot of wizard state, owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDefinition {
    pub id: String,
    pub app_label: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub data: WizardState,
    pub added_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ReportDefinition {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNTITLED_REPORT)
    }

    pub fn is_owned_by(&self, user: &str) -> bool {
        self.added_by == user
    }
}

const SELECT_REPORT: &str = "SELECT id, app_label, name, description, data, added_by, created_at, updated_at
     FROM reports";

/// A write that touched no row means the report vanished after it was read.
fn expect_row(changed: usize, id: &str, site: &str) -> StoreResult<()> {
    if changed == 0 {
        return Err(StoreError::NotFound {
            site: site.to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<ReportDefinition> {
    let data: String = row.get(4)?;
    let data: WizardState = serde_json::from_str(&data)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(ReportDefinition {
        id: row.get(0)?,
        app_label: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        data,
        added_by: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Store {
    /// Save wizard state as a report.
    ///
    /// With `existing_id` and `as_new == false` the existing report's data is
    /// replaced, provided `owner` owns it. Otherwise a fresh report is created
    /// with `owner` as its owner.
    pub fn save_report(
        &self,
        existing_id: Option<&str>,
        as_new: bool,
        site: &str,
        data: &WizardState,
        owner: &str,
    ) -> StoreResult<ReportDefinition> {
        if let (Some(id), false) = (existing_id, as_new) {
            let mut report = self.get_report(id, site)?;
            if !report.is_owned_by(owner) {
                return Err(StoreError::PermissionDenied { id: id.to_string() });
            }

            let now = unix_now();
            self.write_report_data(id, site, data, now)?;
            tracing::debug!(report = id, site, "updated report data");

            report.data = data.clone();
            report.updated_at = now;
            return Ok(report);
        }

        let now = unix_now();
        let report = ReportDefinition {
            id: uuid::Uuid::new_v4().to_string(),
            app_label: site.to_string(),
            name: None,
            description: None,
            data: data.clone(),
            added_by: owner.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO reports (id, app_label, name, description, data, added_by, created_at, updated_at)
             VALUES (?, ?, NULL, NULL, ?, ?, ?, ?)",
            params![
                report.id,
                report.app_label,
                serde_json::to_string(&report.data)?,
                report.added_by,
                report.created_at,
                report.updated_at
            ],
        )?;
        tracing::debug!(report = %report.id, site, "created report");

        Ok(report)
    }

    /// Fetch a report scoped to `site`.
    pub fn get_report(&self, id: &str, site: &str) -> StoreResult<ReportDefinition> {
        self.conn
            .query_row(
                &format!("{} WHERE id = ? AND app_label = ?", SELECT_REPORT),
                params![id, site],
                report_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                site: site.to_string(),
                id: id.to_string(),
            })
    }

    /// The wizard state stored in a report.
    pub fn recall_report(&self, id: &str, site: &str) -> StoreResult<WizardState> {
        Ok(self.get_report(id, site)?.data)
    }

    /// Delete a report owned by `requester`, returning what was deleted.
    pub fn delete_report(
        &self,
        id: &str,
        site: &str,
        requester: &str,
    ) -> StoreResult<ReportDefinition> {
        let report = self.get_report(id, site)?;
        if !report.is_owned_by(requester) {
            return Err(StoreError::PermissionDenied { id: id.to_string() });
        }

        self.remove_report_row(id, site)?;
        tracing::debug!(report = id, site, "deleted report");
        Ok(report)
    }

    /// Replace a report's data. The row may have gone since the ownership read.
    fn write_report_data(&self, id: &str, site: &str, data: &WizardState, now: i64) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE reports SET data = ?, updated_at = ? WHERE id = ? AND app_label = ?",
            params![serde_json::to_string(data)?, now, id, site],
        )?;
        expect_row(changed, id, site)
    }

    fn remove_report_row(&self, id: &str, site: &str) -> StoreResult<()> {
        let removed = self.conn.execute(
            "DELETE FROM reports WHERE id = ? AND app_label = ?",
            params![id, site],
        )?;
        expect_row(removed, id, site)
    }

    /// Reports on `site` owned by `owner`, newest first.
    pub fn list_reports(&self, site: &str, owner: &str) -> StoreResult<Vec<ReportDefinition>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE app_label = ? AND added_by = ? ORDER BY created_at DESC, rowid DESC",
            SELECT_REPORT
        ))?;
        let reports = stmt
            .query_map(params![site, owner], report_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reports)
    }

    /// Set a report's name and description.
    pub fn update_report_details(
        &self,
        id: &str,
        site: &str,
        requester: &str,
        name: &str,
        description: Option<&str>,
    ) -> StoreResult<ReportDefinition> {
        let mut report = self.get_report(id, site)?;
        if !report.is_owned_by(requester) {
            return Err(StoreError::PermissionDenied { id: id.to_string() });
        }

        let now = unix_now();
        let changed = self.conn.execute(
            "UPDATE reports SET name = ?, description = ?, updated_at = ?
             WHERE id = ? AND app_label = ?",
            params![name, description, now, id, site],
        )?;
        expect_row(changed, id, site)?;

        report.name = Some(name.to_string());
        report.description = description.map(str::to_string);
        report.updated_at = now;
        Ok(report)
    }
}
