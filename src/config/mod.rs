//! Configuration module for reportkit.
//!
//! Handles the config file, environment variables, and site definitions.

mod settings;

pub use settings::{
    expand_env_vars, ComputedKind, ComputedSettings, FilterKind, FilterSettings, ResultsSettings,
    ServerSettings, Settings, SettingsError, SiteSettings, StorageSettings, CONFIG_ENV_VAR,
};
