//! The report wizard.
//!
//! Each public method on [`Wizard`] handles one request for one wizard
//! state. A step loads what earlier steps stored in the session, validates
//! any submitted input, writes the result back and redirects to the next
//! step. Only Results runs the filter engine and the column
//! resolver together.
//!
//! ```text
//! Fields ──► Results ◄── Columns
//!               │
//!               ▼
//!             Save ──► Details ──► Index
//!
//! Recall ──► Results      Delete ──► Index      Reset ──► Fields
//! ```
//!
//! The wizard is transport independent: it returns a [`StepOutcome`] and
//! the web layer turns that into a response.

mod outcome;

pub use outcome::{
    AdminPage, ColumnHeader, ColumnsPage, DetailsPage, FieldsPage, IndexPage, Location, Notice,
    NoticeLevel, ResultsPage, Step, StepOutcome,
};

use std::collections::BTreeSet;

use crate::columns::{self, ColumnChoices};
use crate::filter::{FieldErrors, FilterCriteria, FilterInput, RawQuery};
use crate::record::canonical_path;
use crate::site::ReportSite;
use crate::store::{is_valid_relation, SiteSession, Store, StoreError, COLUMNS, FILTER_CRITERIA};

/// Longest accepted report name.
pub const MAX_NAME_LENGTH: usize = 100;

const SAVED: &str = "Your report has been saved";
const DETAILS_SAVED: &str = "Report has been saved";
const ADMIN_SAVED: &str = "Report information has been saved";
const SAVE_DENIED: &str = "You do not have permission to change that report.";
const DELETE_DENIED: &str = "You do not have permission to delete that report.";
const STALE_FILTERS: &str = "The saved filters are no longer valid. Please review them.";
const REQUIRED: &str = "This field is required.";

/// Errors that end a wizard request without a page or redirect.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Report {report_id} not found for site '{site}'")]
    ReportNotFound { site: String, report_id: String },

    #[error("Column '{relation}' is not registered for site '{site}'")]
    ColumnNotFound { site: String, relation: String },

    #[error("This action requires an authenticated user")]
    Unauthenticated,
}

impl From<StoreError> for WizardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { site, id } => WizardError::ReportNotFound {
                site,
                report_id: id,
            },
            other => WizardError::Store(other),
        }
    }
}

impl WizardError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WizardError::ReportNotFound { .. } | WizardError::ColumnNotFound { .. }
        )
    }
}

pub type WizardResult<T> = Result<T, WizardError>;

/// Options of the Save step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Create a new report even when saving against an existing one.
    pub as_new: bool,
    /// Where to go after saving; honoured only for local absolute paths.
    pub return_url: Option<String>,
}

/// Parameters of the Results step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultsParams {
    pub page: Option<usize>,
    /// A column id, `-` prefixed for descending order.
    pub ordering: Option<String>,
}

/// Submitted report details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailsForm {
    pub name: String,
    pub description: Option<String>,
}

/// Submitted column administration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminForm {
    /// Relations to register.
    pub register: Vec<String>,
    /// `(relation, human name)` pairs to rename.
    pub rename: Vec<(String, String)>,
}

/// Whether `url` is a path on this host.
pub fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains('\\')
}

/// The wizard for one site, one session and one requester.
pub struct Wizard<'a> {
    site: &'a ReportSite,
    store: &'a Store,
    session_id: &'a str,
    requester: Option<&'a str>,
}

impl<'a> Wizard<'a> {
    pub fn new(
        site: &'a ReportSite,
        store: &'a Store,
        session_id: &'a str,
        requester: Option<&'a str>,
    ) -> Self {
        Self {
            site,
            store,
            session_id,
            requester,
        }
    }

    fn session(&self) -> SiteSession<'a, Store> {
        SiteSession::new(self.store, self.session_id, self.site.label())
    }

    fn requester(&self) -> WizardResult<&'a str> {
        self.requester.ok_or(WizardError::Unauthenticated)
    }

    fn label(&self) -> &'a str {
        self.site.label()
    }

    // ========================================================================
    // Fields
    // ========================================================================

    /// Show the filter form, or validate and store a submission.
    ///
    /// An absent or empty query is a plain display of the form.
    pub fn fields(
        &self,
        report_id: Option<&str>,
        submitted: Option<&RawQuery>,
    ) -> WizardResult<StepOutcome> {
        let session = self.session();
        let initial: Option<FilterCriteria> = session.get(FILTER_CRITERIA)?;

        let Some(raw) = submitted.filter(|q| !q.is_empty()) else {
            return Ok(StepOutcome::Fields(self.fields_page(
                report_id,
                initial,
                None,
                FieldErrors::new(),
            )));
        };

        match self.site.filters().clean(raw) {
            Ok(criteria) => {
                session.store_filters(&criteria, raw)?;
                tracing::info!(
                    site = self.label(),
                    criteria = criteria.len(),
                    "stored filter criteria"
                );
                Ok(StepOutcome::redirect(Location::step(
                    self.label(),
                    report_id,
                    Step::Results,
                )))
            }
            Err(errors) => {
                tracing::debug!(site = self.label(), %errors, "filter input rejected");
                Ok(StepOutcome::Fields(self.fields_page(
                    report_id,
                    initial,
                    Some(raw.clone()),
                    errors,
                )))
            }
        }
    }

    fn fields_page(
        &self,
        report_id: Option<&str>,
        initial: Option<FilterCriteria>,
        submitted: Option<RawQuery>,
        errors: FieldErrors,
    ) -> FieldsPage {
        FieldsPage {
            site: self.label().to_string(),
            report_id: report_id.map(str::to_string),
            fieldsets: self.site.layout().groups().to_vec(),
            fields: self.site.filters().fields().to_vec(),
            initial,
            submitted,
            errors,
        }
    }

    // ========================================================================
    // Columns
    // ========================================================================

    /// The columns this site offers right now.
    pub fn column_choices(&self) -> WizardResult<ColumnChoices> {
        let registered = self.store.list_columns(self.label())?;
        Ok(ColumnChoices::build(
            &registered,
            self.site.column_inclusions(),
            self.site.column_exclusions(),
            self.site.schema(),
        ))
    }

    /// Show the column form, or validate and store a selection.
    pub fn columns(
        &self,
        report_id: Option<&str>,
        submitted: Option<&[String]>,
    ) -> WizardResult<StepOutcome> {
        let session = self.session();
        let choices = self.column_choices()?;
        let initial: Option<Vec<String>> = session.get(COLUMNS)?;

        let page = |submitted: Option<Vec<String>>, errors: FieldErrors| {
            StepOutcome::Columns(ColumnsPage {
                site: self.label().to_string(),
                report_id: report_id.map(str::to_string),
                choices: choices.clone(),
                initial: initial.clone(),
                submitted,
                errors,
            })
        };

        let Some(ids) = submitted else {
            return Ok(page(None, FieldErrors::new()));
        };

        match choices.clean(ids) {
            Ok(columns) => {
                session.store_columns(&columns)?;
                tracing::info!(site = self.label(), columns = columns.len(), "stored columns");
                Ok(StepOutcome::redirect(Location::step(
                    self.label(),
                    report_id,
                    Step::Results,
                )))
            }
            Err(errors) => Ok(page(Some(ids.to_vec()), errors)),
        }
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// Materialize one page of the current report.
    ///
    /// The raw filter input is preferred over stored criteria. Raw input
    /// that no longer validates sends the user back to Fields; a column
    /// that no longer resolves sends the user back to Columns.
    pub fn results(
        &self,
        report_id: Option<&str>,
        params: &ResultsParams,
    ) -> WizardResult<StepOutcome> {
        let state = self.session().load_state()?;

        let input = match (&state.filter_query, &state.filter_criteria) {
            (Some(raw), _) => FilterInput::Raw(raw),
            (None, Some(criteria)) => FilterInput::Criteria(criteria),
            (None, None) => FilterInput::None,
        };
        let filtered = match self.site.filters().apply(input, self.site.base_collection()) {
            Ok(filtered) => filtered,
            Err(errors) => {
                tracing::warn!(site = self.label(), %errors, "stored filters no longer validate");
                return Ok(StepOutcome::redirect_with(
                    Location::step(self.label(), report_id, Step::Fields),
                    Notice::error(STALE_FILTERS),
                ));
            }
        };

        let ids = state.columns.unwrap_or_default();
        let resolved = match columns::resolve(&ids, self.site.schema()) {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(site = self.label(), error = %err, "column resolution failed");
                return Ok(StepOutcome::redirect_with(
                    Location::step(self.label(), report_id, Step::Columns),
                    Notice::error(err.to_string()),
                ));
            }
        };

        let ordering = params.ordering.as_deref().and_then(|o| {
            let (descending, id) = match o.strip_prefix('-') {
                Some(id) => (true, id),
                None => (false, o),
            };
            resolved
                .iter()
                .find(|c| c.id == id)
                .map(|column| (column, descending, o.to_string()))
        });

        let ordered = match &ordering {
            Some((column, descending, _)) => {
                filtered.order_by(|record| column.sort_value(record), *descending)
            }
            None => filtered,
        };

        let page = ordered.paginate(params.page.unwrap_or(1), self.site.per_page());
        let rows: Vec<Vec<_>> = page
            .records
            .iter()
            .map(|record| resolved.iter().map(|c| c.value(record)).collect())
            .collect();

        tracing::debug!(
            site = self.label(),
            total = page.total,
            page = page.number,
            "rendered results"
        );

        Ok(StepOutcome::Results(ResultsPage {
            site: self.label().to_string(),
            report_id: report_id.map(str::to_string),
            columns: resolved
                .iter()
                .map(|c| ColumnHeader {
                    id: c.id.clone(),
                    label: c.label.clone(),
                    sort_key: c.sort_key.clone(),
                })
                .collect(),
            rows,
            pagination: page,
            ordering: ordering.map(|(_, _, o)| o),
        }))
    }

    // ========================================================================
    // Save, Recall, Details, Delete
    // ========================================================================

    /// Persist the session state as a report.
    ///
    /// Saving over an existing report requires owning it; a non-owner is
    /// sent to the index with a notice and nothing is written.
    pub fn save(&self, report_id: Option<&str>, options: &SaveOptions) -> WizardResult<StepOutcome> {
        let owner = self.requester()?;
        let state = self.session().load_state()?;

        match self
            .store
            .save_report(report_id, options.as_new, self.label(), &state, owner)
        {
            Ok(report) => {
                tracing::info!(site = self.label(), report = %report.id, "saved report");
                let to = match &options.return_url {
                    Some(url) if is_local_path(url) => Location::Path { path: url.clone() },
                    _ => Location::step(self.label(), Some(&report.id), Step::Details),
                };
                Ok(StepOutcome::redirect_with(to, Notice::success(SAVED)))
            }
            Err(StoreError::PermissionDenied { id }) => {
                tracing::warn!(site = self.label(), report = %id, user = owner, "save denied");
                Ok(StepOutcome::redirect_with(
                    Location::index(self.label()),
                    Notice::error(SAVE_DENIED),
                ))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Copy a saved report's state into the session, replacing what is there.
    pub fn recall(&self, report_id: &str) -> WizardResult<StepOutcome> {
        let data = self.store.recall_report(report_id, self.label())?;
        self.session().store_state(&data)?;
        tracing::info!(site = self.label(), report = report_id, "recalled report");

        Ok(StepOutcome::redirect(Location::step(
            self.label(),
            Some(report_id),
            Step::Results,
        )))
    }

    /// Show a saved report, or update its name and description.
    pub fn details(
        &self,
        report_id: &str,
        form: Option<&DetailsForm>,
    ) -> WizardResult<StepOutcome> {
        let report = self.store.get_report(report_id, self.label())?;

        let Some(form) = form else {
            return Ok(StepOutcome::Details(DetailsPage {
                site: self.label().to_string(),
                report,
                errors: FieldErrors::new(),
            }));
        };
        let requester = self.requester()?;

        let name = form.name.trim();
        let mut errors = FieldErrors::new();
        if name.is_empty() {
            errors.add("name", REQUIRED);
        } else if name.chars().count() > MAX_NAME_LENGTH {
            errors.add(
                "name",
                format!(
                    "Ensure this value has at most {} characters (it has {}).",
                    MAX_NAME_LENGTH,
                    name.chars().count()
                ),
            );
        }
        if !errors.is_empty() {
            return Ok(StepOutcome::Details(DetailsPage {
                site: self.label().to_string(),
                report,
                errors,
            }));
        }

        let description = form
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());

        match self
            .store
            .update_report_details(report_id, self.label(), requester, name, description)
        {
            Ok(_) => Ok(StepOutcome::redirect_with(
                Location::index(self.label()),
                Notice::success(DETAILS_SAVED),
            )),
            Err(StoreError::PermissionDenied { .. }) => Ok(StepOutcome::redirect_with(
                Location::index(self.label()),
                Notice::error(SAVE_DENIED),
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete a report owned by the requester.
    /// An anonymous requester owns nothing, so the delete is denied.
    pub fn delete(&self, report_id: &str) -> WizardResult<StepOutcome> {
        let Some(requester) = self.requester else {
            self.store.get_report(report_id, self.label())?;
            tracing::warn!(site = self.label(), report = report_id, "anonymous delete denied");
            return Ok(StepOutcome::redirect_with(
                Location::index(self.label()),
                Notice::error(DELETE_DENIED),
            ));
        };

        let notice = match self.store.delete_report(report_id, self.label(), requester) {
            Ok(report) => {
                tracing::info!(site = self.label(), report = report_id, "deleted report");
                Notice::success(format!(
                    "Your report, \"{}\" has been deleted.",
                    report.display_name()
                ))
            }
            Err(StoreError::PermissionDenied { .. }) => {
                tracing::warn!(
                    site = self.label(),
                    report = report_id,
                    user = requester,
                    "delete denied"
                );
                Notice::error(DELETE_DENIED)
            }
            Err(err) => return Err(err.into()),
        };

        Ok(StepOutcome::redirect_with(Location::index(self.label()), notice))
    }

    // ========================================================================
    // Reset, Index
    // ========================================================================

    /// Forget the in-progress report for this site.
    pub fn reset(&self) -> WizardResult<StepOutcome> {
        self.session().reset()?;
        tracing::info!(site = self.label(), "reset wizard state");
        Ok(StepOutcome::redirect(Location::step(
            self.label(),
            None,
            Step::Fields,
        )))
    }

    /// The requester's saved reports. Anonymous requesters see none.
    pub fn index(&self) -> WizardResult<StepOutcome> {
        let reports = match self.requester {
            Some(user) => self.store.list_reports(self.label(), user)?,
            None => Vec::new(),
        };

        Ok(StepOutcome::Index(IndexPage {
            site: self.label().to_string(),
            name: self.site.name().to_string(),
            reports,
            in_progress: self.session().has_key(FILTER_CRITERIA)?,
        }))
    }

    // ========================================================================
    // Column administration
    // ========================================================================

    /// List column registrations, or apply a submitted change.
    pub fn admin(&self, form: Option<&AdminForm>) -> WizardResult<StepOutcome> {
        let registered = self.store.list_columns(self.label())?;

        let Some(form) = form else {
            return Ok(StepOutcome::Admin(self.admin_page(registered, FieldErrors::new())));
        };
        self.requester()?;

        let schema = self.site.schema();
        let known: BTreeSet<String> = registered.iter().map(|c| c.relation.clone()).collect();
        let mut errors = FieldErrors::new();

        for relation in &form.register {
            if !is_valid_relation(relation) {
                errors.add(
                    "register",
                    format!("{} is not a valid column relation.", relation),
                );
            } else if schema.computed(relation).is_none() && !schema.has_attribute(relation) {
                errors.add(
                    "register",
                    format!("{} is not an attribute of this report.", relation),
                );
            }
        }
        for (relation, human_name) in &form.rename {
            if !known.contains(&canonical_path(relation)) {
                errors.add("rename", format!("Column {} is not registered.", relation));
            } else if human_name.trim().is_empty() {
                errors.add("rename", REQUIRED);
            }
        }
        if !errors.is_empty() {
            return Ok(StepOutcome::Admin(self.admin_page(registered, errors)));
        }

        let created = self
            .store
            .register_columns(self.label(), self.site.name(), &form.register)?;
        for (relation, human_name) in &form.rename {
            self.store
                .rename_column(self.label(), relation, human_name.trim())?;
        }
        tracing::info!(
            site = self.label(),
            registered = created.len(),
            renamed = form.rename.len(),
            "updated column registrations"
        );

        Ok(StepOutcome::redirect_with(
            Location::admin(self.label()),
            Notice::success(ADMIN_SAVED),
        ))
    }

    /// Unregister one column.
    pub fn remove_column(&self, relation: &str) -> WizardResult<StepOutcome> {
        self.requester()?;

        if !self.store.remove_column(self.label(), relation)? {
            return Err(WizardError::ColumnNotFound {
                site: self.label().to_string(),
                relation: relation.to_string(),
            });
        }
        tracing::info!(site = self.label(), relation, "removed column");

        Ok(StepOutcome::redirect_with(
            Location::admin(self.label()),
            Notice::success(format!("Column '{}' removed", relation)),
        ))
    }

    fn admin_page(
        &self,
        columns: Vec<crate::store::ReportColumn>,
        errors: FieldErrors,
    ) -> AdminPage {
        let schema = self.site.schema();
        let registered: BTreeSet<&str> = columns.iter().map(|c| c.relation.as_str()).collect();
        let mut available: Vec<String> = schema
            .attributes()
            .chain(schema.computed_accessors().map(|a| a.name.as_str()))
            .filter(|id| is_valid_relation(id) && !registered.contains(id))
            .map(str::to_string)
            .collect();
        available.sort();
        available.dedup();

        AdminPage {
            site: self.label().to_string(),
            columns,
            available,
            errors,
        }
    }
}
