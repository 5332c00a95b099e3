//! TOML-based configuration for reportkit.
//!
//! Supports a config file (reportkit.toml) with environment variable
//! expansion in paths.
//!
//! Example configuration:
//! ```toml
//! [server]
//! bind = "127.0.0.1"
//! port = 3000
//!
//! [storage]
//! path = "${HOME}/.local/share/reportkit/reports.db"
//!
//! [results]
//! per_page = 25
//!
//! [sites.orders]
//! name = "Orders"
//! data = "./data/orders.json"
//! display_field_exclusions = ["internal_ref"]
//!
//! [[sites.orders.filters]]
//! name = "status"
//! kind = "choice"
//! choices = ["paid", "pending"]
//!
//! [[sites.orders.filters]]
//! name = "total_min"
//! path = "total"
//! lookup = "gte"
//! kind = "decimal"
//!
//! [[sites.orders.computed]]
//! name = "customer_label"
//! kind = "concat"
//! fields = ["customer.first_name", "customer.last_name"]
//! label = "Customer"
//! sort_key = "customer.last_name"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::filter::{FieldKind, FieldSet, FilterField, Lookup};
use crate::record::ComputedAccessor;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "REPORTKIT_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Failed to determine data directory")]
    NoDataDir,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,

    pub storage: StorageSettings,

    pub results: ResultsSettings,

    /// Report sites by label.
    pub sites: BTreeMap<String, SiteSettings>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Database file (supports ${ENV_VAR} expansion).
    pub path: Option<String>,
}

impl StorageSettings {
    /// The configured database path, or `<data dir>/reportkit/reports.db`.
    pub fn resolved_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.path {
            Some(path) => Ok(PathBuf::from(expand_env_vars(path)?)),
            None => dirs::data_dir()
                .map(|dir| dir.join("reportkit").join("reports.db"))
                .ok_or(SettingsError::NoDataDir),
        }
    }
}

/// Results step defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResultsSettings {
    /// Rows per results page.
    pub per_page: usize,
}

impl Default for ResultsSettings {
    fn default() -> Self {
        Self { per_page: 25 }
    }
}

/// One report site.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteSettings {
    /// Display name; defaults to the label.
    #[serde(default)]
    pub name: Option<String>,

    /// JSON file holding the base collection (supports ${ENV_VAR} expansion).
    pub data: String,

    /// Attribute paths offered as columns. Inferred from the data when absent.
    #[serde(default)]
    pub attributes: Option<Vec<String>>,

    /// Overrides `[results] per_page`.
    #[serde(default)]
    pub per_page: Option<usize>,

    #[serde(default)]
    pub display_field_inclusions: Vec<String>,

    #[serde(default)]
    pub display_field_exclusions: Vec<String>,

    #[serde(default)]
    pub filters: Vec<FilterSettings>,

    #[serde(default)]
    pub fieldsets: Option<Vec<FieldSet>>,

    #[serde(default)]
    pub computed: Vec<ComputedSettings>,
}

impl SiteSettings {
    /// The data file path with environment variables expanded.
    pub fn resolved_data_path(&self) -> Result<PathBuf, SettingsError> {
        Ok(PathBuf::from(expand_env_vars(&self.data)?))
    }
}

/// Value type of a configured filter field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Text,
    Integer,
    Decimal,
    Boolean,
    Choice,
}

/// One configured filter field.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterSettings {
    pub name: String,

    #[serde(default)]
    pub label: Option<String>,

    /// Attribute path; defaults to the field name.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub lookup: Lookup,

    #[serde(default)]
    pub kind: FilterKind,

    /// Allowed values when `kind = "choice"`.
    #[serde(default)]
    pub choices: Vec<String>,

    #[serde(default)]
    pub required: bool,
}

impl FilterSettings {
    pub fn to_field(&self) -> Result<FilterField, SettingsError> {
        let kind = match self.kind {
            FilterKind::Text => FieldKind::Text,
            FilterKind::Integer => FieldKind::Integer,
            FilterKind::Decimal => FieldKind::Decimal,
            FilterKind::Boolean => FieldKind::Boolean,
            FilterKind::Choice if self.choices.is_empty() => {
                return Err(SettingsError::InvalidConfig(format!(
                    "filter '{}' is a choice field without choices",
                    self.name
                )))
            }
            FilterKind::Choice => FieldKind::Choice(self.choices.clone()),
        };

        let mut field = FilterField::new(self.name.clone(), kind).with_lookup(self.lookup);
        if let Some(label) = &self.label {
            field = field.with_label(label.clone());
        }
        if let Some(path) = &self.path {
            field = field.with_path(path.clone());
        }
        if self.required {
            field = field.required();
        }
        Ok(field)
    }
}

/// How a configured computed column derives its value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ComputedKind {
    /// Join the display text of several attributes.
    Concat {
        fields: Vec<String>,
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// Add up numeric attributes.
    Sum { fields: Vec<String> },
}

fn default_separator() -> String {
    " ".to_string()
}

/// One configured computed column.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComputedSettings {
    pub name: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub sort_key: Option<String>,

    #[serde(flatten)]
    pub kind: ComputedKind,
}

impl ComputedSettings {
    pub fn to_accessor(&self) -> ComputedAccessor {
        let mut accessor = match &self.kind {
            ComputedKind::Concat { fields, separator } => {
                ComputedAccessor::concat(self.name.clone(), fields.clone(), separator.clone())
            }
            ComputedKind::Sum { fields } => ComputedAccessor::sum(self.name.clone(), fields.clone()),
        };
        if let Some(label) = &self.label {
            accessor = accessor.with_label(label.clone());
        }
        if let Some(sort_key) = &self.sort_key {
            accessor = accessor.with_sort_key(sort_key.clone());
        }
        accessor
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), sites = settings.sites.len(), "loaded settings");
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `REPORTKIT_CONFIG`
    /// 2. `./reportkit.toml`
    /// 3. `~/.config/reportkit/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("reportkit.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("reportkit").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Load from `path` if given, otherwise from the default locations.
    pub fn load_from(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    /// Rows per page for `site`.
    pub fn per_page_for(&self, site: &SiteSettings) -> usize {
        site.per_page.unwrap_or(self.results.per_page).max(1)
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.next_if_eq(&'{').is_some() {
            let name: String = std::iter::from_fn(|| chars.next_if(|&ch| ch != '}')).collect();
            chars.next_if_eq(&'}');
            name
        } else {
            std::iter::from_fn(|| chars.next_if(|&ch| ch.is_alphanumeric() || ch == '_')).collect()
        };

        if var_name.is_empty() {
            // A lone $ is kept
            result.push('$');
            continue;
        }

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}
