//! Saved searches and the matcher that runs them against live inventory.

use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::{
    database::{Alert, AlertFrequency, Database, Property},
    error::{AppError, AppResult},
    filter::{PropertyFilter, SearchParams},
    identity::Identity,
    listing::Listing,
    pagination::PageRequest,
    query::{self, ListingQuery, Scope, SortKey},
};

/// Most listings a single alert evaluation returns.
pub(crate) const MATCH_LIMIT: usize = 20;
const DEFAULT_NAME: &str = "Property alert";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct AlertInput {
    pub(crate) name: Option<String>,
    pub(crate) criteria: Option<Value>,
    pub(crate) frequency: Option<AlertFrequency>,
}

/// Normalizes alert criteria through the same path as live search. Criteria
/// that constrain nothing would match the whole inventory and are refused.
fn normalize_criteria(criteria: Option<&Value>) -> AppResult<PropertyFilter> {
    let Some(Value::Object(criteria)) = criteria else {
        return Err(AppError::validation("criteria must be an object"));
    };
    let filter = PropertyFilter::normalize(&SearchParams::from_json(criteria));
    if filter.is_empty() {
        return Err(AppError::validation(
            "criteria must contain at least one valid search field",
        ));
    }
    Ok(filter)
}

fn alert_name(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => DEFAULT_NAME.to_string(),
    }
}

pub(crate) fn create(db: &Database, identity: &Identity, input: AlertInput) -> AppResult<Alert> {
    let criteria = normalize_criteria(input.criteria.as_ref())?;
    let now = Utc::now();
    let alert = db.insert_alert(Alert {
        id: 0,
        user_id: identity.user_id,
        name: alert_name(input.name.as_deref()),
        criteria,
        is_active: true,
        frequency: input.frequency.unwrap_or_default(),
        created_at: now,
        updated_at: now,
    })?;
    info!(id = alert.id, user = alert.user_id, "alert saved");
    Ok(alert)
}

/// The caller's alerts, newest first.
pub(crate) fn list(db: &Database, identity: &Identity) -> AppResult<Vec<Alert>> {
    let mut alerts = Vec::new();
    for alert in db.alerts().rev() {
        let alert = alert?;
        if alert.user_id == identity.user_id {
            alerts.push(alert);
        }
    }
    Ok(alerts)
}

/// Someone else's alert is reported as absent rather than forbidden.
pub(crate) fn get(db: &Database, identity: &Identity, id: u64) -> AppResult<Alert> {
    match db.alert(id)? {
        Some(alert) if alert.user_id == identity.user_id => Ok(alert),
        _ => Err(AppError::NotFound("alert")),
    }
}

fn modify_owned(
    db: &Database,
    identity: &Identity,
    id: u64,
    mut f: impl FnMut(&mut Alert) -> AppResult<()>,
) -> AppResult<Alert> {
    db.modify_alert(id, |alert: &mut Alert| -> AppResult<()> {
        if alert.user_id != identity.user_id {
            return Err(AppError::NotFound("alert"));
        }
        f(alert)?;
        alert.updated_at = Utc::now();
        Ok(())
    })?
    .ok_or(AppError::NotFound("alert"))
}

pub(crate) fn update(
    db: &Database,
    identity: &Identity,
    id: u64,
    input: AlertInput,
) -> AppResult<Alert> {
    let criteria = match &input.criteria {
        Some(criteria) => Some(normalize_criteria(Some(criteria))?),
        None => None,
    };
    modify_owned(db, identity, id, |alert| {
        if let Some(name) = &input.name {
            alert.name = alert_name(Some(name));
        }
        if let Some(criteria) = &criteria {
            alert.criteria = criteria.clone();
        }
        if let Some(frequency) = input.frequency {
            alert.frequency = frequency;
        }
        Ok(())
    })
}

pub(crate) fn toggle(db: &Database, identity: &Identity, id: u64) -> AppResult<Alert> {
    modify_owned(db, identity, id, |alert| {
        alert.is_active = !alert.is_active;
        Ok(())
    })
}

pub(crate) fn delete(db: &Database, identity: &Identity, id: u64) -> AppResult<()> {
    get(db, identity, id)?;
    db.remove_alert(id)?;
    Ok(())
}

/// Evaluates saved criteria against current inventory: available listings
/// only, newest first, at most [`MATCH_LIMIT`] of them.
pub(crate) fn matching_properties(
    db: &Database,
    criteria: &PropertyFilter,
) -> Result<Vec<Property>> {
    let query = ListingQuery {
        filter: criteria.clone(),
        scope: Scope::available(),
        sort: SortKey::Newest,
        page: PageRequest::first(MATCH_LIMIT),
    };
    Ok(query::execute(db, &query)?.items)
}

pub(crate) fn matches(db: &Database, identity: &Identity, id: u64) -> AppResult<Vec<Listing>> {
    let alert = get(db, identity, id)?;
    let listings = matching_properties(db, &alert.criteria)?
        .into_iter()
        .map(|property| Listing::populate(db, property))
        .collect::<Result<_>>()?;
    Ok(listings)
}
