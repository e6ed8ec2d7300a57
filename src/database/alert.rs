use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Database, Iter, TryFromKeyValue};
use crate::filter::PropertyFilter;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum AlertFrequency {
    Instant,
    #[default]
    Daily,
    Weekly,
}

/// A saved search. `criteria` is the very filter type live search runs on,
/// normalized once when the alert is saved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Alert {
    pub(crate) id: u64,
    pub(crate) user_id: u64,
    pub(crate) name: String,
    pub(crate) criteria: PropertyFilter,
    pub(crate) is_active: bool,
    pub(crate) frequency: AlertFrequency,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl TryFromKeyValue for Alert {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> Result<Self> {
        super::decode(key, value)
    }
}

impl Database {
    pub(crate) fn insert_alert(&self, mut alert: Alert) -> Result<Alert> {
        alert.id = self.generate_id()?;
        Database::insert(&self.alerts, alert.id, &alert)?;
        Ok(alert)
    }

    pub(crate) fn alert(&self, id: u64) -> Result<Option<Alert>> {
        Database::get(&self.alerts, id)
    }

    pub(crate) fn alerts(&self) -> Iter<Alert> {
        Iter::new(self.alerts.iter())
    }

    pub(crate) fn modify_alert<E, F>(&self, id: u64, f: F) -> Result<Option<Alert>, E>
    where
        E: From<anyhow::Error>,
        F: FnMut(&mut Alert) -> Result<(), E>,
    {
        Database::modify(&self.alerts, id, f)
    }

    pub(crate) fn remove_alert(&self, id: u64) -> Result<bool> {
        Database::remove(&self.alerts, id)
    }
}
