use anyhow::Result;
use async_graphql::SimpleObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{pair_key, parse_id, Database};
use crate::identity::Role;

/// Contact details of a user, as far as this service knows them.
///
/// Accounts themselves live with the authentication provider; a profile is
/// only what a user chose to publish so that listings can show an owner.
#[derive(SimpleObject, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserProfile {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) phone: Option<String>,
    pub(crate) role: Role,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Database {
    pub(crate) fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        Database::insert(&self.users, profile.id, profile)
    }

    pub(crate) fn user(&self, id: u64) -> Result<Option<UserProfile>> {
        Database::get(&self.users, id)
    }

    pub(crate) fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Flips whether `property_id` is among the user's favorites and returns
    /// the new state.
    pub(crate) fn toggle_favorite(&self, user_id: u64, property_id: u64) -> Result<bool> {
        let key = pair_key(user_id, property_id);
        if self.favorites.remove(key)?.is_some() {
            return Ok(false);
        }
        self.favorites.insert(key, Vec::<u8>::new())?;
        Ok(true)
    }

    /// Ids of the user's favorite listings, in the order they were listed.
    pub(crate) fn favorite_ids(&self, user_id: u64) -> Result<Vec<u64>> {
        self.favorites
            .scan_prefix(user_id.to_be_bytes())
            .keys()
            .map(|key| parse_id(&key?[8..]))
            .collect()
    }

    /// Drops every favorite pointing at a listing that is going away.
    pub(crate) fn remove_favorites_of(&self, property_id: u64) -> Result<()> {
        for key in self.favorites.iter().keys() {
            let key = key?;
            if parse_id(&key[8..])? == property_id {
                self.favorites.remove(key)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::database::TestDatabase;

    #[test]
    fn favorites_toggle() {
        let db = TestDatabase::new();
        assert!(db.toggle_favorite(1, 10).unwrap());
        assert!(db.toggle_favorite(1, 11).unwrap());
        assert!(db.toggle_favorite(2, 10).unwrap());
        assert_eq!(db.favorite_ids(1).unwrap(), vec![10, 11]);

        assert!(!db.toggle_favorite(1, 10).unwrap());
        assert_eq!(db.favorite_ids(1).unwrap(), vec![11]);
        assert_eq!(db.favorite_ids(2).unwrap(), vec![10]);
    }

    #[test]
    fn removing_a_listing_clears_its_favorites() {
        let db = TestDatabase::new();
        db.toggle_favorite(1, 10).unwrap();
        db.toggle_favorite(2, 10).unwrap();
        db.toggle_favorite(2, 11).unwrap();
        db.remove_favorites_of(10).unwrap();
        assert!(db.favorite_ids(1).unwrap().is_empty());
        assert_eq!(db.favorite_ids(2).unwrap(), vec![11]);
    }
}
