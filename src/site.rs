//! Report sites and the registry that holds them.
//!
//! A [`ReportSite`] is one reporting domain: a base record collection, the
//! filter vocabulary offered over it, the display layout of that vocabulary
//! and the introspection schema used for columns. Sites are constructed and
//! validated once at process start and handed to the wizard through a
//! [`SiteRegistry`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{Settings, SettingsError, SiteSettings};
use crate::filter::{FieldSet, FieldSetError, FieldSetLayout, FilterField, FilterSet};
use crate::record::{
    ComputedAccessor, JsonFileSource, MemorySource, QuerySet, Record, RecordSchema, RecordSource,
    SourceError,
};

/// Rows per results page when nothing else is configured.
pub const DEFAULT_PER_PAGE: usize = 25;

/// A report site that cannot be constructed.
#[derive(Debug, thiserror::Error)]
pub enum SiteConfigError {
    #[error("Invalid site label '{0}': use letters, digits, '-' and '_'")]
    InvalidLabel(String),

    #[error("Site '{0}' is registered more than once")]
    DuplicateSite(String),

    #[error("Site '{site}' declares filter field '{field}' more than once")]
    DuplicateFilter { site: String, field: String },

    #[error("Site '{site}': {source}")]
    FieldSet {
        site: String,
        #[source]
        source: FieldSetError,
    },

    #[error("Site '{site}' lists column '{column}', which is neither a stored attribute nor a computed accessor")]
    UnknownColumn { site: String, column: String },

    #[error("Site '{0}' has no record source")]
    MissingSource(String),

    #[error("Site '{site}': {source}")]
    Source {
        site: String,
        #[source]
        source: SourceError,
    },

    #[error("Site '{site}': {source}")]
    Settings {
        site: String,
        #[source]
        source: SettingsError,
    },
}

/// One configured reporting domain.
pub struct ReportSite {
    label: String,
    name: String,
    filters: FilterSet,
    layout: FieldSetLayout,
    schema: RecordSchema,
    source: Arc<dyn RecordSource>,
    per_page: usize,
    column_inclusions: Vec<String>,
    column_exclusions: Vec<String>,
}

impl fmt::Debug for ReportSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportSite")
            .field("label", &self.label)
            .field("name", &self.name)
            .field("filters", &self.filters.fields().len())
            .field("per_page", &self.per_page)
            .finish_non_exhaustive()
    }
}

impl ReportSite {
    pub fn builder(label: impl Into<String>) -> ReportSiteBuilder {
        ReportSiteBuilder::new(label)
    }

    /// Build a site from its settings section, loading its data file.
    pub fn from_settings(
        label: &str,
        site: &SiteSettings,
        settings: &Settings,
    ) -> Result<Self, SiteConfigError> {
        let settings_error = |source| SiteConfigError::Settings {
            site: label.to_string(),
            source,
        };

        let filters = site
            .filters
            .iter()
            .map(|f| f.to_field())
            .collect::<Result<Vec<_>, _>>()
            .map_err(settings_error)?;

        let path = site.resolved_data_path().map_err(settings_error)?;
        let source = JsonFileSource::load(&path).map_err(|source| SiteConfigError::Source {
            site: label.to_string(),
            source,
        })?;

        let mut builder = ReportSite::builder(label)
            .filters(filters)
            .source(source)
            .per_page(settings.per_page_for(site))
            .include_columns(site.display_field_inclusions.clone())
            .exclude_columns(site.display_field_exclusions.clone());

        if let Some(name) = &site.name {
            builder = builder.name(name.clone());
        }
        if let Some(fieldsets) = &site.fieldsets {
            builder = builder.fieldsets(fieldsets.clone());
        }
        if let Some(attributes) = &site.attributes {
            builder = builder.attributes(attributes.clone());
        }
        for computed in &site.computed {
            builder = builder.computed(computed.to_accessor());
        }

        builder.build()
    }

    /// Identifier used in URLs and session keys (the `app_label`).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn layout(&self) -> &FieldSetLayout {
        &self.layout
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn base_collection(&self) -> QuerySet {
        self.source.base_collection()
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn column_inclusions(&self) -> &[String] {
        &self.column_inclusions
    }

    pub fn column_exclusions(&self) -> &[String] {
        &self.column_exclusions
    }
}

/// Builder for [`ReportSite`]; `build` validates the whole configuration.
pub struct ReportSiteBuilder {
    label: String,
    name: Option<String>,
    filters: Vec<FilterField>,
    fieldsets: Option<Vec<FieldSet>>,
    attributes: Option<Vec<String>>,
    computed: Vec<ComputedAccessor>,
    source: Option<Arc<dyn RecordSource>>,
    per_page: usize,
    column_inclusions: Vec<String>,
    column_exclusions: Vec<String>,
}

impl ReportSiteBuilder {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            name: None,
            filters: Vec::new(),
            fieldsets: None,
            attributes: None,
            computed: Vec::new(),
            source: None,
            per_page: DEFAULT_PER_PAGE,
            column_inclusions: Vec::new(),
            column_exclusions: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn filter(mut self, field: FilterField) -> Self {
        self.filters.push(field);
        self
    }

    pub fn filters(mut self, fields: Vec<FilterField>) -> Self {
        self.filters.extend(fields);
        self
    }

    pub fn fieldsets(mut self, fieldsets: Vec<FieldSet>) -> Self {
        self.fieldsets = Some(fieldsets);
        self
    }

    /// Declare the stored attributes explicitly instead of inferring them.
    pub fn attributes<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn computed(mut self, accessor: ComputedAccessor) -> Self {
        self.computed.push(accessor);
        self
    }

    pub fn source(mut self, source: impl RecordSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Use an in-memory base collection.
    pub fn records(self, records: Vec<Record>) -> Self {
        self.source(MemorySource::new(records))
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn include_columns(mut self, ids: Vec<String>) -> Self {
        self.column_inclusions = ids;
        self
    }

    pub fn exclude_columns(mut self, ids: Vec<String>) -> Self {
        self.column_exclusions = ids;
        self
    }

    pub fn build(self) -> Result<ReportSite, SiteConfigError> {
        let label = self.label;
        if label.is_empty()
            || !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(SiteConfigError::InvalidLabel(label));
        }

        let filters = FilterSet::new(self.filters);
        for (i, field) in filters.fields().iter().enumerate() {
            if filters.fields()[..i].iter().any(|f| f.name == field.name) {
                return Err(SiteConfigError::DuplicateFilter {
                    site: label,
                    field: field.name.clone(),
                });
            }
        }

        let layout = FieldSetLayout::new(&filters, self.fieldsets).map_err(|source| {
            SiteConfigError::FieldSet {
                site: label.clone(),
                source,
            }
        })?;

        let Some(source) = self.source else {
            return Err(SiteConfigError::MissingSource(label));
        };

        let mut schema = match self.attributes {
            Some(paths) => RecordSchema::new().with_attributes(paths),
            None => RecordSchema::infer(source.base_collection().records()),
        };
        for accessor in self.computed {
            schema.add_computed(accessor);
        }

        if let Some(column) = self
            .column_inclusions
            .iter()
            .chain(&self.column_exclusions)
            .find(|id| schema.computed(id.as_str()).is_none() && !schema.has_attribute(id.as_str()))
        {
            return Err(SiteConfigError::UnknownColumn {
                site: label,
                column: column.clone(),
            });
        }

        tracing::debug!(site = %label, filters = filters.fields().len(), "built report site");

        Ok(ReportSite {
            name: self.name.unwrap_or_else(|| label.clone()),
            label,
            filters,
            layout,
            schema,
            source,
            per_page: self.per_page,
            column_inclusions: self.column_inclusions,
            column_exclusions: self.column_exclusions,
        })
    }
}

/// Sites by label, constructed at process start.
#[derive(Debug, Default)]
pub struct SiteRegistry {
    sites: BTreeMap<String, Arc<ReportSite>>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every site declared in `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, SiteConfigError> {
        let mut registry = Self::new();
        for (label, site) in &settings.sites {
            registry.register(ReportSite::from_settings(label, site, settings)?)?;
        }
        tracing::info!(sites = registry.len(), "report sites loaded");
        Ok(registry)
    }

    pub fn register(&mut self, site: ReportSite) -> Result<(), SiteConfigError> {
        if self.sites.contains_key(site.label()) {
            return Err(SiteConfigError::DuplicateSite(site.label().to_string()));
        }
        self.sites.insert(site.label().to_string(), Arc::new(site));
        Ok(())
    }

    pub fn with_site(mut self, site: ReportSite) -> Result<Self, SiteConfigError> {
        self.register(site)?;
        Ok(self)
    }

    pub fn get(&self, label: &str) -> Option<Arc<ReportSite>> {
        self.sites.get(label).cloned()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
