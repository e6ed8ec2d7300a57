//! Reviews of listings and their moderation.

use std::collections::BTreeSet;

use async_graphql::SimpleObject;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    database::{Database, OwnerResponse, Review, ReviewStatus, SubRatings},
    error::{AppError, AppResult},
    identity::Identity,
    pagination::{Page, PageRequest, ADMIN_PAGE_SIZE, INBOX_PAGE_SIZE, MAX_PAGE_SIZE},
};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ReviewInput {
    pub(crate) rating: Option<u8>,
    pub(crate) title: Option<String>,
    pub(crate) comment: Option<String>,
    pub(crate) ratings: Option<SubRatings>,
    pub(crate) pros: Option<Vec<String>>,
    pub(crate) cons: Option<Vec<String>>,
}

/// Aggregate of the approved reviews of one listing.
#[derive(SimpleObject, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RatingSummary {
    /// Mean rating rounded to one decimal; 0 without reviews.
    pub(crate) average_rating: f64,
    pub(crate) total_reviews: usize,
    /// Review counts for one to five stars, in that order.
    pub(crate) distribution: Vec<usize>,
}

impl RatingSummary {
    fn of(reviews: &[Review]) -> Self {
        let mut distribution = vec![0; 5];
        let mut sum = 0_u64;
        for review in reviews {
            if let Some(slot) = distribution.get_mut(usize::from(review.rating).wrapping_sub(1)) {
                *slot += 1;
            }
            sum += u64::from(review.rating);
        }
        let average_rating = if reviews.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let mean = sum as f64 / reviews.len() as f64;
            (mean * 10.0).round() / 10.0
        };
        Self {
            average_rating,
            total_reviews: reviews.len(),
            distribution,
        }
    }
}

fn score(value: u8, field: &str) -> AppResult<u8> {
    if (1..=5).contains(&value) {
        Ok(value)
    } else {
        Err(AppError::validation(format!("{field} must be between 1 and 5")))
    }
}

fn checked_sub_ratings(ratings: SubRatings) -> AppResult<SubRatings> {
    for (field, value) in ratings.scores() {
        if let Some(value) = value {
            score(value, field)?;
        }
    }
    Ok(ratings)
}

fn required_text(value: Option<String>, field: &str) -> AppResult<String> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(AppError::validation(format!("{field} is required"))),
    }
}

fn newest_first(reviews: &mut [Review]) {
    reviews.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Submits a review. It stays invisible until an admin approves it.
pub(crate) fn create(
    db: &Database,
    identity: &Identity,
    property_id: u64,
    input: ReviewInput,
) -> AppResult<Review> {
    let property = db
        .property(property_id)?
        .ok_or(AppError::NotFound("property"))?;
    if property.owner_id == identity.user_id {
        return Err(AppError::forbidden("you cannot review your own property"));
    }
    let rating = score(
        input
            .rating
            .ok_or_else(|| AppError::validation("rating is required"))?,
        "rating",
    )?;
    let now = Utc::now();
    let review = Review {
        id: 0,
        property_id,
        user_id: identity.user_id,
        rating,
        title: required_text(input.title, "title")?,
        comment: required_text(input.comment, "comment")?,
        ratings: checked_sub_ratings(input.ratings.unwrap_or_default())?,
        pros: input.pros.unwrap_or_default(),
        cons: input.cons.unwrap_or_default(),
        status: ReviewStatus::Pending,
        voted_by: BTreeSet::new(),
        helpful_votes: 0,
        owner_response: None,
        created_at: now,
        updated_at: now,
    };
    let review = db
        .insert_review(review)?
        .ok_or_else(|| AppError::validation("you have already reviewed this property"))?;
    info!(id = review.id, property_id, "review submitted");
    Ok(review)
}

/// Approved reviews of a listing, newest first, with the summary over all
/// of them.
pub(crate) fn approved(
    db: &Database,
    property_id: u64,
    request: PageRequest,
) -> AppResult<(Page<Review>, RatingSummary)> {
    if db.property(property_id)?.is_none() {
        return Err(AppError::NotFound("property"));
    }
    let mut reviews = Vec::new();
    for review in db.reviews() {
        let review = review?;
        if review.property_id == property_id && review.status == ReviewStatus::Approved {
            reviews.push(review);
        }
    }
    newest_first(&mut reviews);
    let summary = RatingSummary::of(&reviews);
    Ok((Page::slice(reviews, request), summary))
}

pub(crate) fn approved_page(
    db: &Database,
    property_id: u64,
    page: Option<&str>,
    limit: Option<&str>,
) -> AppResult<(Page<Review>, RatingSummary)> {
    let request = PageRequest::parse(page, limit, INBOX_PAGE_SIZE, MAX_PAGE_SIZE);
    approved(db, property_id, request)
}

/// The author edits a review, which sends it back to moderation.
pub(crate) fn update(
    db: &Database,
    identity: &Identity,
    id: u64,
    input: ReviewInput,
) -> AppResult<Review> {
    db.modify_review(id, |review: &mut Review| -> AppResult<()> {
        if review.user_id != identity.user_id {
            return Err(AppError::forbidden("only the author can edit a review"));
        }
        let input = input.clone();
        if let Some(rating) = input.rating {
            review.rating = score(rating, "rating")?;
        }
        if input.title.is_some() {
            review.title = required_text(input.title, "title")?;
        }
        if input.comment.is_some() {
            review.comment = required_text(input.comment, "comment")?;
        }
        if let Some(ratings) = input.ratings {
            review.ratings = checked_sub_ratings(ratings)?;
        }
        if let Some(pros) = input.pros {
            review.pros = pros;
        }
        if let Some(cons) = input.cons {
            review.cons = cons;
        }
        review.status = ReviewStatus::Pending;
        review.updated_at = Utc::now();
        Ok(())
    })?
    .ok_or(AppError::NotFound("review"))
}

pub(crate) fn delete(db: &Database, identity: &Identity, id: u64) -> AppResult<()> {
    let review = db.review(id)?.ok_or(AppError::NotFound("review"))?;
    identity.require_owner_or_admin(review.user_id, "review")?;
    db.remove_review(&review)?;
    Ok(())
}

/// Records the caller's "helpful" vote. Each user votes once; authors
/// cannot vote for themselves.
pub(crate) fn vote_helpful(db: &Database, identity: &Identity, id: u64) -> AppResult<Review> {
    db.modify_review(id, |review: &mut Review| -> AppResult<()> {
        if review.user_id == identity.user_id {
            return Err(AppError::validation("you cannot vote on your own review"));
        }
        if !review.voted_by.insert(identity.user_id) {
            return Err(AppError::validation("you have already voted on this review"));
        }
        review.helpful_votes = u32::try_from(review.voted_by.len()).unwrap_or(u32::MAX);
        Ok(())
    })?
    .ok_or(AppError::NotFound("review"))
}

/// Attaches the listing owner's reply, replacing any earlier one.
pub(crate) fn respond(
    db: &Database,
    identity: &Identity,
    id: u64,
    message: &str,
) -> AppResult<Review> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::validation("message is required"));
    }
    let review = db.review(id)?.ok_or(AppError::NotFound("review"))?;
    let property = db
        .property(review.property_id)?
        .ok_or(AppError::NotFound("property"))?;
    if property.owner_id != identity.user_id {
        return Err(AppError::forbidden(
            "only the property owner can respond to reviews",
        ));
    }
    let now = Utc::now();
    db.modify_review(id, |review: &mut Review| -> AppResult<()> {
        review.owner_response = Some(OwnerResponse {
            message: message.to_string(),
            responded_at: now,
        });
        Ok(())
    })?
    .ok_or(AppError::NotFound("review"))
}

/// Admin view of reviews in one moderation status, `pending` by default.
pub(crate) fn moderation_queue(
    db: &Database,
    identity: &Identity,
    status: Option<&str>,
    page: Option<&str>,
    limit: Option<&str>,
) -> AppResult<Page<Review>> {
    identity.require_admin()?;
    let status: ReviewStatus = match status {
        Some(raw) => raw.parse().map_err(AppError::Validation)?,
        None => ReviewStatus::Pending,
    };
    let mut reviews = Vec::new();
    for review in db.reviews() {
        let review = review?;
        if review.status == status {
            reviews.push(review);
        }
    }
    newest_first(&mut reviews);
    let request = PageRequest::parse(page, limit, ADMIN_PAGE_SIZE, MAX_PAGE_SIZE);
    Ok(Page::slice(reviews, request))
}

pub(crate) fn moderate(
    db: &Database,
    identity: &Identity,
    id: u64,
    status: &str,
) -> AppResult<Review> {
    identity.require_admin()?;
    let status: ReviewStatus = status.parse().map_err(AppError::Validation)?;
    if status == ReviewStatus::Pending {
        return Err(AppError::validation("status must be approved or rejected"));
    }
    let review = db
        .modify_review(id, |review: &mut Review| -> AppResult<()> {
            review.status = status;
            review.updated_at = Utc::now();
            Ok(())
        })?
        .ok_or(AppError::NotFound("review"))?;
    info!(id, ?status, "review moderated");
    Ok(review)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::{
            property::fixtures::{insert_on, property},
            TestDatabase,
        },
        identity::Role,
    };

    fn buyer(id: u64) -> Identity {
        Identity::new(id, Role::Buyer)
    }

    fn admin() -> Identity {
        Identity::new(99, Role::Admin)
    }

    fn input(rating: u8) -> ReviewInput {
        ReviewInput {
            rating: Some(rating),
            title: Some("Good".to_string()),
            comment: Some("Bright and airy".to_string()),
            ..ReviewInput::default()
        }
    }

    #[test]
    fn second_review_is_rejected_and_first_kept() {
        let db = TestDatabase::new();
        let listing = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let first = create(&db, &buyer(5), listing.id, input(4)).unwrap();
        assert_eq!(first.status, ReviewStatus::Pending);

        let second = create(&db, &buyer(5), listing.id, input(1));
        assert!(matches!(second, Err(AppError::Validation(_))));
        assert_eq!(db.review(first.id).unwrap().unwrap().rating, 4);
        assert_eq!(db.reviews().count(), 1);
    }

    #[test]
    fn owners_cannot_review_themselves() {
        let db = TestDatabase::new();
        let listing = insert_on(&db, property(1, "Pune", 1, 2), 1);
        assert!(matches!(
            create(&db, &buyer(1), listing.id, input(5)),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn ratings_are_validated() {
        let db = TestDatabase::new();
        let listing = insert_on(&db, property(1, "Pune", 1, 2), 1);
        assert!(create(&db, &buyer(5), listing.id, input(0)).is_err());
        assert!(create(&db, &buyer(5), listing.id, input(6)).is_err());

        let mut bad_sub = input(3);
        bad_sub.ratings = Some(SubRatings {
            connectivity: Some(9),
            ..SubRatings::default()
        });
        assert!(create(&db, &buyer(5), listing.id, bad_sub).is_err());

        let mut untitled = input(3);
        untitled.title = Some("   ".to_string());
        assert!(create(&db, &buyer(5), listing.id, untitled).is_err());
        assert_eq!(db.reviews().count(), 0);
    }

    #[test]
    fn only_approved_reviews_are_listed() {
        let db = TestDatabase::new();
        let listing = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let a = create(&db, &buyer(5), listing.id, input(5)).unwrap();
        let b = create(&db, &buyer(6), listing.id, input(4)).unwrap();
        create(&db, &buyer(7), listing.id, input(1)).unwrap();
        moderate(&db, &admin(), a.id, "approved").unwrap();
        moderate(&db, &admin(), b.id, "approved").unwrap();

        let (page, summary) = approved_page(&db, listing.id, None, None).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, b.id);
        assert_eq!(summary.total_reviews, 2);
        assert!((summary.average_rating - 4.5).abs() < f64::EPSILON);
        assert_eq!(summary.distribution, vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn editing_returns_to_moderation() {
        let db = TestDatabase::new();
        let listing = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let review = create(&db, &buyer(5), listing.id, input(5)).unwrap();
        moderate(&db, &admin(), review.id, "approved").unwrap();

        assert!(matches!(
            update(&db, &buyer(6), review.id, input(1)),
            Err(AppError::Forbidden(_))
        ));
        let edited = update(&db, &buyer(5), review.id, input(3)).unwrap();
        assert_eq!(edited.rating, 3);
        assert_eq!(edited.status, ReviewStatus::Pending);
    }

    #[test]
    fn helpful_votes_are_counted_once() {
        let db = TestDatabase::new();
        let listing = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let review = create(&db, &buyer(5), listing.id, input(5)).unwrap();

        assert!(vote_helpful(&db, &buyer(5), review.id).is_err());
        assert_eq!(vote_helpful(&db, &buyer(6), review.id).unwrap().helpful_votes, 1);
        assert!(vote_helpful(&db, &buyer(6), review.id).is_err());
        assert_eq!(vote_helpful(&db, &buyer(7), review.id).unwrap().helpful_votes, 2);
    }

    #[test]
    fn owner_response_and_deletion() {
        let db = TestDatabase::new();
        let listing = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let review = create(&db, &buyer(5), listing.id, input(2)).unwrap();

        assert!(respond(&db, &buyer(6), review.id, "thanks").is_err());
        let answered = respond(&db, &buyer(1), review.id, "We fixed the lift").unwrap();
        assert_eq!(
            answered.owner_response.map(|r| r.message).as_deref(),
            Some("We fixed the lift")
        );

        assert!(matches!(
            delete(&db, &buyer(6), review.id),
            Err(AppError::Forbidden(_))
        ));
        delete(&db, &admin(), review.id).unwrap();
        assert!(create(&db, &buyer(5), listing.id, input(4)).is_ok());
    }

    #[test]
    fn moderation_queue_defaults_to_pending() {
        let db = TestDatabase::new();
        let listing = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let pending = create(&db, &buyer(5), listing.id, input(2)).unwrap();
        let approved = create(&db, &buyer(6), listing.id, input(2)).unwrap();
        moderate(&db, &admin(), approved.id, "approved").unwrap();

        let queue = moderation_queue(&db, &admin(), None, None, None).unwrap();
        assert_eq!(queue.items.len(), 1);
        assert_eq!(queue.items[0].id, pending.id);
        assert!(moderation_queue(&db, &buyer(5), None, None, None).is_err());
        assert!(moderate(&db, &admin(), pending.id, "pending").is_err());
    }
}
