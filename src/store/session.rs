//! Per-session wizard state.

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{unix_now, Store, StoreResult};
use crate::filter::{FilterCriteria, RawQuery};

/// Session key of the validated filter criteria.
pub const FILTER_CRITERIA: &str = "filter_criteria";
/// Session key of the raw submitted filter input.
pub const FILTER_QUERY: &str = "filter_query";
/// Session key of the chosen column identifiers.
pub const COLUMNS: &str = "columns";

const STATE_KEYS: [&str; 3] = [FILTER_CRITERIA, FILTER_QUERY, COLUMNS];

/// Namespaced storage key: `"<site>:<key>"`.
pub fn session_key(site: &str, key: &str) -> String {
    format!("{}:{}", site, key)
}

/// Key/value storage scoped by session id.
pub trait SessionStore {
    fn get_value(&self, session_id: &str, key: &str) -> StoreResult<Option<serde_json::Value>>;

    fn set_value(&self, session_id: &str, key: &str, value: &serde_json::Value) -> StoreResult<()>;

    /// Remove all `keys` atomically.
    fn clear_values(&self, session_id: &str, keys: &[String]) -> StoreResult<()>;
}

impl SessionStore for Store {
    fn get_value(&self, session_id: &str, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM session_state WHERE session_id = ? AND key = ?",
                params![session_id, key],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set_value(&self, session_id: &str, key: &str, value: &serde_json::Value) -> StoreResult<()> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO session_state (session_id, key, value, updated_at)
             VALUES (?, ?, ?, ?)",
            params![session_id, key, json, unix_now()],
        )?;
        Ok(())
    }

    fn clear_values(&self, session_id: &str, keys: &[String]) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for key in keys {
            tx.execute(
                "DELETE FROM session_state WHERE session_id = ? AND key = ?",
                params![session_id, key],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// The wizard's working state for one site.
///
/// This is also the payload of a saved report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WizardState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_criteria: Option<FilterCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_query: Option<RawQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

/// A session store view limited to one session and one site.
pub struct SiteSession<'a, S: SessionStore + ?Sized> {
    store: &'a S,
    session_id: &'a str,
    site: &'a str,
}

impl<'a, S: SessionStore + ?Sized> SiteSession<'a, S> {
    pub fn new(store: &'a S, session_id: &'a str, site: &'a str) -> Self {
        Self {
            store,
            session_id,
            site,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self
            .store
            .get_value(self.session_id, &session_key(self.site, key))?
        {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value)?;
        self.store
            .set_value(self.session_id, &session_key(self.site, key), &value)
    }

    pub fn has_key(&self, key: &str) -> StoreResult<bool> {
        Ok(self
            .store
            .get_value(self.session_id, &session_key(self.site, key))?
            .is_some())
    }

    pub fn load_state(&self) -> StoreResult<WizardState> {
        Ok(WizardState {
            filter_criteria: self.get(FILTER_CRITERIA)?,
            filter_query: self.get(FILTER_QUERY)?,
            columns: self.get(COLUMNS)?,
        })
    }

    /// Replace the whole state; keys absent from `state` are cleared.
    pub fn store_state(&self, state: &WizardState) -> StoreResult<()> {
        let mut absent = Vec::new();

        match &state.filter_criteria {
            Some(criteria) => self.set(FILTER_CRITERIA, criteria)?,
            None => absent.push(session_key(self.site, FILTER_CRITERIA)),
        }
        match &state.filter_query {
            Some(query) => self.set(FILTER_QUERY, query)?,
            None => absent.push(session_key(self.site, FILTER_QUERY)),
        }
        match &state.columns {
            Some(columns) => self.set(COLUMNS, columns)?,
            None => absent.push(session_key(self.site, COLUMNS)),
        }

        if absent.is_empty() {
            Ok(())
        } else {
            self.store.clear_values(self.session_id, &absent)
        }
    }

    /// Store validated filter criteria along with the raw input they came from.
    pub fn store_filters(&self, criteria: &FilterCriteria, raw: &RawQuery) -> StoreResult<()> {
        self.set(FILTER_CRITERIA, criteria)?;
        self.set(FILTER_QUERY, raw)
    }

    pub fn store_columns(&self, columns: &[String]) -> StoreResult<()> {
        self.set(COLUMNS, &columns)
    }

    /// Clear every wizard key for this site.
    pub fn reset(&self) -> StoreResult<()> {
        let keys: Vec<String> = STATE_KEYS
            .iter()
            .map(|key| session_key(self.site, key))
            .collect();
        self.store.clear_values(self.session_id, &keys)
    }
}
