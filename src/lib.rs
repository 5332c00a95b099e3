//! # reportkit
//!
//! A session-backed wizard for building ad-hoc reports over structured
//! record collections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            web (axum routes, one per wizard step)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │     wizard (Fields → Columns → Results → Save, ...)      │
//! └─────────────────────────────────────────────────────────┘
//!          │               │                  │
//!          ▼               ▼                  ▼
//! ┌────────────────┐ ┌──────────────┐ ┌──────────────────────┐
//! │ filter engine  │ │   columns    │ │ store (SQLite):      │
//! │ + field-sets   │ │  resolver    │ │ sessions, reports,   │
//! └────────────────┘ └──────────────┘ │ column registrations │
//!          │               │          └──────────────────────┘
//!          ▼               ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │         record (values, query sets, schema)              │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Report sites are declared in `reportkit.toml` (see [`config`]) and
//! collected into a [`site::SiteRegistry`] at startup.

pub mod columns;
pub mod config;
pub mod filter;
pub mod record;
pub mod site;
pub mod store;
pub mod wizard;

#[cfg(feature = "web")]
pub mod web;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::columns::{resolve, ColumnChoices, ColumnSource, ResolvedColumn};
    pub use crate::config::Settings;
    pub use crate::filter::{
        FieldKind, FieldSet, FilterCriteria, FilterField, FilterInput, FilterSet, Lookup, RawQuery,
    };
    pub use crate::record::{ComputedAccessor, Record, RecordSchema, Value};
    pub use crate::site::{ReportSite, SiteRegistry};
    pub use crate::store::{SiteSession, Store, WizardState};
    pub use crate::wizard::{Location, Notice, StepOutcome, Wizard};
}
