use std::{collections::BTreeSet, str::FromStr};

use anyhow::Result;
use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{pair_key, Database, Iter, TryFromKeyValue};

#[derive(Enum, Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown review status `{other}`")),
        }
    }
}

/// Optional per-aspect scores, each 1 to 5.
#[derive(SimpleObject, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubRatings {
    pub(crate) location: Option<u8>,
    pub(crate) value_for_money: Option<u8>,
    pub(crate) amenities: Option<u8>,
    pub(crate) connectivity: Option<u8>,
    pub(crate) maintenance: Option<u8>,
}

impl SubRatings {
    pub(crate) fn scores(&self) -> [(&'static str, Option<u8>); 5] {
        [
            ("location", self.location),
            ("valueForMoney", self.value_for_money),
            ("amenities", self.amenities),
            ("connectivity", self.connectivity),
            ("maintenance", self.maintenance),
        ]
    }
}

#[derive(SimpleObject, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OwnerResponse {
    pub(crate) message: String,
    pub(crate) responded_at: DateTime<Utc>,
}

#[derive(SimpleObject, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Review {
    pub(crate) id: u64,
    pub(crate) property_id: u64,
    pub(crate) user_id: u64,
    pub(crate) rating: u8,
    pub(crate) title: String,
    pub(crate) comment: String,
    pub(crate) ratings: SubRatings,
    pub(crate) pros: Vec<String>,
    pub(crate) cons: Vec<String>,
    pub(crate) status: ReviewStatus,
    #[graphql(skip)]
    pub(crate) voted_by: BTreeSet<u64>,
    pub(crate) helpful_votes: u32,
    pub(crate) owner_response: Option<OwnerResponse>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl TryFromKeyValue for Review {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> Result<Self> {
        super::decode(key, value)
    }
}

impl Database {
    /// Stores a review unless the same user already reviewed the same
    /// property, in which case nothing is written and `None` is returned.
    ///
    /// The (property, user) slot is claimed with an atomic insert-if-absent
    /// before the review itself is written, so two racing submissions cannot
    /// both succeed.
    pub(crate) fn insert_review(&self, mut review: Review) -> Result<Option<Review>> {
        review.id = self.generate_id()?;
        let slot = pair_key(review.property_id, review.user_id);
        let claimed = self.review_index.compare_and_swap(
            slot,
            None as Option<&[u8]>,
            Some(review.id.to_be_bytes().to_vec()),
        )?;
        if claimed.is_err() {
            return Ok(None);
        }
        Database::insert(&self.reviews, review.id, &review)?;
        Ok(Some(review))
    }

    pub(crate) fn review(&self, id: u64) -> Result<Option<Review>> {
        Database::get(&self.reviews, id)
    }

    pub(crate) fn reviews(&self) -> Iter<Review> {
        Iter::new(self.reviews.iter())
    }

    pub(crate) fn modify_review<E, F>(&self, id: u64, f: F) -> Result<Option<Review>, E>
    where
        E: From<anyhow::Error>,
        F: FnMut(&mut Review) -> Result<(), E>,
    {
        Database::modify(&self.reviews, id, f)
    }

    /// Deletes the review and frees its (property, user) slot.
    pub(crate) fn remove_review(&self, review: &Review) -> Result<bool> {
        self.review_index
            .remove(pair_key(review.property_id, review.user_id))?;
        Database::remove(&self.reviews, review.id)
    }

    pub(crate) fn remove_reviews_of(&self, property_id: u64) -> Result<()> {
        let doomed = self
            .reviews()
            .filter(|review| {
                review
                    .as_ref()
                    .map_or(true, |review| review.property_id == property_id)
            })
            .collect::<Result<Vec<_>>>()?;
        for review in &doomed {
            self.remove_review(review)?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::review;
    use crate::database::TestDatabase;

    #[test]
    fn one_review_per_property_and_user() {
        let db = TestDatabase::new();
        let first = db.insert_review(review(10, 1, 4)).unwrap().unwrap();
        assert!(db.insert_review(review(10, 1, 1)).unwrap().is_none());
        assert!(db.insert_review(review(11, 1, 2)).unwrap().is_some());
        assert!(db.insert_review(review(10, 2, 2)).unwrap().is_some());

        let stored = db.review(first.id).unwrap().unwrap();
        assert_eq!(stored.rating, 4);
    }

    #[test]
    fn removal_frees_the_slot() {
        let db = TestDatabase::new();
        let first = db.insert_review(review(10, 1, 4)).unwrap().unwrap();
        assert!(db.remove_review(&first).unwrap());
        assert!(db.insert_review(review(10, 1, 5)).unwrap().is_some());
    }

    #[test]
    fn removing_a_listing_removes_its_reviews() {
        let db = TestDatabase::new();
        db.insert_review(review(10, 1, 4)).unwrap();
        db.insert_review(review(10, 2, 4)).unwrap();
        let kept = db.insert_review(review(11, 1, 4)).unwrap().unwrap();
        db.remove_reviews_of(10).unwrap();

        let left: Vec<u64> = db.reviews().map(|r| r.unwrap().id).collect();
        assert_eq!(left, vec![kept.id]);
    }
}
