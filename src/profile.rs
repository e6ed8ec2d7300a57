use chrono::Utc;
use serde::Deserialize;

use crate::{
    database::{Database, UserProfile},
    error::{AppError, AppResult},
    identity::Identity,
};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ProfileInput {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) phone: Option<String>,
}

/// Publishes the caller's contact details so listings can show them as
/// owner. The role is whatever the gateway says it is right now.
pub(crate) fn update_profile(
    db: &Database,
    identity: &Identity,
    input: ProfileInput,
) -> AppResult<UserProfile> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name is required"));
    }
    let email = input.email.trim();
    if !email.contains('@') {
        return Err(AppError::validation("a valid email is required"));
    }
    let profile = UserProfile {
        id: identity.user_id,
        name: name.to_string(),
        email: email.to_string(),
        phone: input
            .phone
            .map(|phone| phone.trim().to_string())
            .filter(|phone| !phone.is_empty()),
        role: identity.role,
        updated_at: Utc::now(),
    };
    db.upsert_user(&profile)?;
    Ok(profile)
}
