//! What a wizard step hands back to the transport.

use serde::Serialize;

use crate::columns::ColumnChoices;
use crate::filter::{FieldErrors, FieldSet, FilterCriteria, FilterField, RawQuery};
use crate::record::{Page, Value};
use crate::store::{ReportColumn, ReportDefinition};

/// Wizard states that have their own endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Fields,
    Columns,
    Results,
    Save,
    Reset,
    Recall,
    Details,
    Delete,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Fields => "fields",
            Step::Columns => "columns",
            Step::Results => "results",
            Step::Save => "save",
            Step::Reset => "reset",
            Step::Recall => "recall",
            Step::Details => "details",
            Step::Delete => "delete",
        }
    }
}

/// A redirect target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Location {
    Index {
        site: String,
    },
    Step {
        site: String,
        report_id: Option<String>,
        step: Step,
    },
    Admin {
        site: String,
    },
    /// A caller-supplied local path.
    Path {
        path: String,
    },
}

impl Location {
    pub fn index(site: &str) -> Self {
        Location::Index {
            site: site.to_string(),
        }
    }

    pub fn step(site: &str, report_id: Option<&str>, step: Step) -> Self {
        Location::Step {
            site: site.to_string(),
            report_id: report_id.map(str::to_string),
            step,
        }
    }

    pub fn admin(site: &str) -> Self {
        Location::Admin {
            site: site.to_string(),
        }
    }

    /// The URL this location reverses to.
    pub fn url(&self) -> String {
        match self {
            Location::Index { site } => format!("/{}", site),
            Location::Step {
                site,
                report_id: Some(id),
                step,
            } => format!("/{}/{}/{}", site, id, step.as_str()),
            Location::Step {
                site,
                report_id: None,
                step,
            } => format!("/{}/{}", site, step.as_str()),
            Location::Admin { site } => format!("/{}/admin", site),
            Location::Path { path } => path.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-visible message delivered with the next response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Result of one wizard request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "page", rename_all = "lowercase")]
pub enum StepOutcome {
    Redirect { to: Location, notices: Vec<Notice> },
    Fields(FieldsPage),
    Columns(ColumnsPage),
    Results(ResultsPage),
    Details(DetailsPage),
    Index(IndexPage),
    Admin(AdminPage),
}

impl StepOutcome {
    pub fn redirect(to: Location) -> Self {
        StepOutcome::Redirect {
            to,
            notices: Vec::new(),
        }
    }

    pub fn redirect_with(to: Location, notice: Notice) -> Self {
        StepOutcome::Redirect {
            to,
            notices: vec![notice],
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, StepOutcome::Redirect { .. })
    }
}

/// The filter form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldsPage {
    pub site: String,
    pub report_id: Option<String>,
    pub fieldsets: Vec<FieldSet>,
    pub fields: Vec<FilterField>,
    /// Previously stored criteria, used as form defaults.
    pub initial: Option<FilterCriteria>,
    /// Submitted input being redisplayed with its errors.
    pub submitted: Option<RawQuery>,
    pub errors: FieldErrors,
}

/// The column selection form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnsPage {
    pub site: String,
    pub report_id: Option<String>,
    pub choices: ColumnChoices,
    pub initial: Option<Vec<String>>,
    pub submitted: Option<Vec<String>>,
    pub errors: FieldErrors,
}

/// Header cell of a results table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnHeader {
    pub id: String,
    pub label: String,
    pub sort_key: String,
}

/// One page of materialized results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsPage {
    pub site: String,
    pub report_id: Option<String>,
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<Vec<Value>>,
    pub pagination: Page,
    pub ordering: Option<String>,
}

/// A saved report and its details form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailsPage {
    pub site: String,
    pub report: ReportDefinition,
    pub errors: FieldErrors,
}

/// Saved reports of the requester.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexPage {
    pub site: String,
    pub name: String,
    pub reports: Vec<ReportDefinition>,
    /// Whether filter criteria are stored for this site in the session.
    pub in_progress: bool,
}

/// Column registrations of a site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminPage {
    pub site: String,
    pub columns: Vec<ReportColumn>,
    /// Attribute paths and computed accessors not yet registered.
    pub available: Vec<String>,
    pub errors: FieldErrors,
}
