//! Listing operations: search, the owner and admin tables, detail views,
//! the listing lifecycle, featuring and favorites.

use std::collections::{BTreeSet, HashMap};

use async_graphql::SimpleObject;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    database::{
        Database, Image, ListingType, Location, Property, PropertyStatus, PropertyType,
        Specifications,
    },
    error::{AppError, AppResult},
    filter::SearchParams,
    identity::Identity,
    pagination::{Page, PageRequest, ADMIN_PAGE_SIZE, MAX_PAGE_SIZE, SEARCH_PAGE_SIZE},
    query::{self, ListingQuery, Scope, SortKey},
};

pub(crate) const FEATURED_DEFAULT: usize = 6;
pub(crate) const FEATURED_MAX: usize = 24;
const MAX_FEATURE_DAYS: i64 = 365;

/// The public face of a listing's owner.
///
/// Only the id is known for owners who never published a profile.
#[derive(SimpleObject, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OwnerInfo {
    pub(crate) id: u64,
    pub(crate) name: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) phone: Option<String>,
}

impl OwnerInfo {
    pub(crate) fn load(db: &Database, owner_id: u64) -> anyhow::Result<Self> {
        Ok(match db.user(owner_id)? {
            Some(profile) => OwnerInfo {
                id: owner_id,
                name: Some(profile.name),
                email: Some(profile.email),
                phone: profile.phone,
            },
            None => OwnerInfo {
                id: owner_id,
                name: None,
                email: None,
                phone: None,
            },
        })
    }
}

/// A property together with its populated owner, as rendered in JSON.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Listing {
    #[serde(flatten)]
    pub(crate) property: Property,
    pub(crate) owner: OwnerInfo,
}

impl Listing {
    pub(crate) fn populate(db: &Database, property: Property) -> anyhow::Result<Self> {
        let owner = OwnerInfo::load(db, property.owner_id)?;
        Ok(Listing { property, owner })
    }

    /// Populates owners for a whole page, reading each profile once.
    pub(crate) fn populate_page(
        db: &Database,
        page: Page<Property>,
    ) -> anyhow::Result<Page<Listing>> {
        let mut owners: HashMap<u64, OwnerInfo> = HashMap::new();
        page.try_map(|property| {
            let owner = match owners.get(&property.owner_id) {
                Some(owner) => owner.clone(),
                None => {
                    let owner = OwnerInfo::load(db, property.owner_id)?;
                    owners.insert(property.owner_id, owner.clone());
                    owner
                }
            };
            Ok(Listing { property, owner })
        })
    }
}

/// Listing fields a seller may send. Every field is optional so that the
/// same shape serves creation and partial updates.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct PropertyInput {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) listing_type: Option<ListingType>,
    pub(crate) property_type: Option<PropertyType>,
    pub(crate) price: Option<u64>,
    pub(crate) location: Option<Location>,
    pub(crate) specifications: Option<Specifications>,
    pub(crate) amenities: Option<BTreeSet<String>>,
    pub(crate) highlights: Option<Vec<String>>,
    pub(crate) images: Option<Vec<Image>>,
}

fn required_text(value: Option<&str>, field: &str) -> AppResult<String> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(AppError::validation(format!("{field} is required"))),
    }
}

fn positive_price(price: Option<u64>) -> AppResult<u64> {
    match price {
        Some(price) if price > 0 => Ok(price),
        _ => Err(AppError::validation("price must be a positive number")),
    }
}

fn checked_location(location: Option<Location>) -> AppResult<Location> {
    let mut location = location.unwrap_or_default();
    location.city = required_text(Some(&location.city), "city")?;
    Ok(location)
}

fn trimmed_set(items: BTreeSet<String>) -> BTreeSet<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub(crate) fn create(
    db: &Database,
    identity: &Identity,
    input: PropertyInput,
) -> AppResult<Listing> {
    identity.require_seller()?;
    let now = Utc::now();
    let property = Property {
        id: 0,
        title: required_text(input.title.as_deref(), "title")?,
        description: required_text(input.description.as_deref(), "description")?,
        listing_type: input
            .listing_type
            .ok_or_else(|| AppError::validation("listingType is required"))?,
        property_type: input
            .property_type
            .ok_or_else(|| AppError::validation("propertyType is required"))?,
        price: positive_price(input.price)?,
        location: checked_location(input.location)?,
        specifications: input.specifications.unwrap_or_default(),
        amenities: trimmed_set(input.amenities.unwrap_or_default()),
        highlights: input.highlights.unwrap_or_default(),
        images: input.images.unwrap_or_default(),
        owner_id: identity.user_id,
        status: PropertyStatus::Available,
        is_verified: false,
        is_featured: false,
        featured_until: None,
        views: 0,
        inquiries: 0,
        created_at: now,
        updated_at: now,
    };
    let property = db.insert_property(property)?;
    info!(id = property.id, owner = property.owner_id, "listing created");
    Ok(Listing::populate(db, property)?)
}

/// Public search: only available listings are visible.
pub(crate) fn search(db: &Database, params: &SearchParams) -> AppResult<Page<Listing>> {
    let query =
        ListingQuery::from_params(params, Scope::available(), SEARCH_PAGE_SIZE, MAX_PAGE_SIZE);
    let page = query::execute(db, &query)?;
    Ok(Listing::populate_page(db, page)?)
}

/// Drops an unknown status the way the normalizer drops any other bad
/// value.
fn status_param(params: &SearchParams) -> Option<PropertyStatus> {
    params.status.as_deref().and_then(|raw| raw.parse().ok())
}

/// The caller's own listings, in any status.
pub(crate) fn mine(
    db: &Database,
    identity: &Identity,
    params: &SearchParams,
) -> AppResult<Page<Listing>> {
    let scope = Scope {
        owner: Some(identity.user_id),
        status: status_param(params),
    };
    let query = ListingQuery::from_params(params, scope, SEARCH_PAGE_SIZE, MAX_PAGE_SIZE);
    let page = query::execute(db, &query)?;
    Ok(Listing::populate_page(db, page)?)
}

pub(crate) fn admin_table(
    db: &Database,
    identity: &Identity,
    params: &SearchParams,
) -> AppResult<Page<Listing>> {
    identity.require_admin()?;
    let scope = Scope {
        owner: None,
        status: status_param(params),
    };
    let query = ListingQuery::from_params(params, scope, ADMIN_PAGE_SIZE, MAX_PAGE_SIZE);
    let page = query::execute(db, &query)?;
    Ok(Listing::populate_page(db, page)?)
}

/// Reads one listing and counts the view. Every call counts, including
/// repeated ones from the same visitor.
pub(crate) fn detail(db: &Database, id: u64) -> AppResult<Listing> {
    let mut property = db.property(id)?.ok_or(AppError::NotFound("property"))?;
    db.record_view(id)?;
    property.views += 1;
    Ok(Listing::populate(db, property)?)
}

pub(crate) fn update(
    db: &Database,
    identity: &Identity,
    id: u64,
    input: PropertyInput,
) -> AppResult<Listing> {
    let property = db
        .modify_property(id, |property: &mut Property| -> AppResult<()> {
            identity.require_owner_or_admin(property.owner_id, "property")?;
            let input = input.clone();
            if let Some(title) = input.title {
                property.title = required_text(Some(&title), "title")?;
            }
            if let Some(description) = input.description {
                property.description = required_text(Some(&description), "description")?;
            }
            if let Some(listing_type) = input.listing_type {
                property.listing_type = listing_type;
            }
            if let Some(property_type) = input.property_type {
                property.property_type = property_type;
            }
            if input.price.is_some() {
                property.price = positive_price(input.price)?;
            }
            if input.location.is_some() {
                property.location = checked_location(input.location)?;
            }
            if let Some(specifications) = input.specifications {
                property.specifications = specifications;
            }
            if let Some(amenities) = input.amenities {
                property.amenities = trimmed_set(amenities);
            }
            if let Some(highlights) = input.highlights {
                property.highlights = highlights;
            }
            if let Some(images) = input.images {
                property.images = images;
            }
            property.updated_at = Utc::now();
            Ok(())
        })?
        .ok_or(AppError::NotFound("property"))?;
    Ok(Listing::populate(db, property)?)
}

/// Removes a listing along with its counters, the favorites pointing at it
/// and its reviews.
pub(crate) fn delete(db: &Database, identity: &Identity, id: u64) -> AppResult<()> {
    let property = db.property(id)?.ok_or(AppError::NotFound("property"))?;
    identity.require_owner_or_admin(property.owner_id, "property")?;
    db.remove_property(id)?;
    db.remove_favorites_of(id)?;
    db.remove_reviews_of(id)?;
    info!(id, by = identity.user_id, "listing deleted");
    Ok(())
}

pub(crate) fn change_status(
    db: &Database,
    identity: &Identity,
    id: u64,
    status: &str,
) -> AppResult<Listing> {
    let next: PropertyStatus = status.parse().map_err(AppError::Validation)?;
    let property = db
        .modify_property(id, |property: &mut Property| -> AppResult<()> {
            identity.require_owner_or_admin(property.owner_id, "property")?;
            if !property.status.can_transition_to(next) {
                return Err(AppError::validation(format!(
                    "cannot change status from {} to {next}",
                    property.status
                )));
            }
            property.status = next;
            property.updated_at = Utc::now();
            Ok(())
        })?
        .ok_or(AppError::NotFound("property"))?;
    Ok(Listing::populate(db, property)?)
}

pub(crate) fn verify(
    db: &Database,
    identity: &Identity,
    id: u64,
    verified: bool,
) -> AppResult<Listing> {
    identity.require_admin()?;
    let property = db
        .modify_property(id, |property: &mut Property| -> AppResult<()> {
            property.is_verified = verified;
            property.updated_at = Utc::now();
            Ok(())
        })?
        .ok_or(AppError::NotFound("property"))?;
    info!(id, verified, "listing verification changed");
    Ok(Listing::populate(db, property)?)
}

/// Marks a listing featured for `days` days from `now`. Payment happens
/// elsewhere; this only records the promotion.
pub(crate) fn feature(
    db: &Database,
    identity: &Identity,
    id: u64,
    days: i64,
    now: DateTime<Utc>,
) -> AppResult<Listing> {
    identity.require_admin()?;
    if !(1..=MAX_FEATURE_DAYS).contains(&days) {
        return Err(AppError::validation(format!(
            "days must be between 1 and {MAX_FEATURE_DAYS}"
        )));
    }
    let until = now + Duration::days(days);
    let property = db
        .modify_property(id, |property: &mut Property| -> AppResult<()> {
            property.is_featured = true;
            property.featured_until = Some(until);
            property.updated_at = now;
            Ok(())
        })?
        .ok_or(AppError::NotFound("property"))?;
    info!(id, %until, "listing featured");
    Ok(Listing::populate(db, property)?)
}

/// Available listings whose promotion is still running at `now`, newest
/// first. Expired flags are skipped, not rewritten.
pub(crate) fn featured_properties(
    db: &Database,
    limit: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<Property>> {
    let limit = PageRequest::parse(None, limit, FEATURED_DEFAULT, FEATURED_MAX).limit;
    let mut featured = Vec::new();
    for property in db.properties() {
        let property = property?;
        if property.status == PropertyStatus::Available && property.is_featured_at(now) {
            featured.push(db.with_counters(property)?);
        }
    }
    SortKey::Newest.sort(&mut featured);
    featured.truncate(limit);
    Ok(featured)
}

pub(crate) fn featured(
    db: &Database,
    limit: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Vec<Listing>> {
    let properties = featured_properties(db, limit, now)?;
    let listings = properties
        .into_iter()
        .map(|property| Listing::populate(db, property))
        .collect::<anyhow::Result<_>>()?;
    Ok(listings)
}

/// Flips the listing in or out of the caller's favorites and returns the
/// new state.
pub(crate) fn toggle_favorite(db: &Database, identity: &Identity, id: u64) -> AppResult<bool> {
    if db.property(id)?.is_none() {
        return Err(AppError::NotFound("property"));
    }
    Ok(db.toggle_favorite(identity.user_id, id)?)
}

/// The caller's favorites that still exist, newest listing first.
pub(crate) fn favorites(
    db: &Database,
    identity: &Identity,
    page: Option<&str>,
    limit: Option<&str>,
) -> AppResult<Page<Listing>> {
    let request = PageRequest::parse(page, limit, SEARCH_PAGE_SIZE, MAX_PAGE_SIZE);
    let mut properties = Vec::new();
    for id in db.favorite_ids(identity.user_id)? {
        if let Some(property) = db.property(id)? {
            properties.push(property);
        }
    }
    SortKey::Newest.sort(&mut properties);
    Ok(Listing::populate_page(db, Page::slice(properties, request))?)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        database::{
            property::fixtures::{day, insert_on, property},
            review::fixtures::review,
            TestDatabase, UserProfile,
        },
        identity::Role,
    };

    fn seller(id: u64) -> Identity {
        Identity::new(id, Role::Seller)
    }

    fn admin() -> Identity {
        Identity::new(99, Role::Admin)
    }

    fn input() -> PropertyInput {
        serde_json::from_value(serde_json::json!({
            "title": " Sunny 2 BHK ",
            "description": "Close to the station",
            "listingType": "buy",
            "propertyType": "apartment",
            "price": 6500000,
            "location": {"city": "Pune", "address": "Baner Road"},
            "specifications": {"bedrooms": 2, "carpetArea": 850.0},
            "amenities": ["gym", " ", "parking"],
        }))
        .unwrap()
    }

    #[test]
    fn create_starts_available_and_unverified() {
        let db = TestDatabase::new();
        let listing = create(&db, &seller(4), input()).unwrap();
        let property = &listing.property;
        assert_eq!(property.title, "Sunny 2 BHK");
        assert_eq!(property.status, PropertyStatus::Available);
        assert!(!property.is_verified);
        assert!(!property.is_featured);
        assert_eq!(property.owner_id, 4);
        assert_eq!(property.amenities.len(), 2);
        assert_eq!(listing.owner.id, 4);
        assert!(listing.owner.name.is_none());
    }

    #[test]
    fn create_rejects_buyers_and_bad_input() {
        let db = TestDatabase::new();
        let buyer = Identity::new(4, Role::Buyer);
        assert!(matches!(
            create(&db, &buyer, input()),
            Err(AppError::Forbidden(_))
        ));

        let mut no_price = input();
        no_price.price = Some(0);
        assert!(matches!(
            create(&db, &seller(4), no_price),
            Err(AppError::Validation(_))
        ));

        let mut no_city = input();
        no_city.location = Some(Location::default());
        assert!(matches!(
            create(&db, &seller(4), no_city),
            Err(AppError::Validation(_))
        ));
        assert_eq!(db.property_count(), 0);
    }

    #[test]
    fn detail_counts_every_view_and_shows_owner() {
        let db = TestDatabase::new();
        db.upsert_user(&UserProfile {
            id: 1,
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            phone: None,
            role: Role::Seller,
            updated_at: day(0),
        })
        .unwrap();
        let stored = insert_on(&db, property(1, "Pune", 1, 2), 1);

        assert_eq!(detail(&db, stored.id).unwrap().property.views, 1);
        let second = detail(&db, stored.id).unwrap();
        assert_eq!(second.property.views, 2);
        assert_eq!(second.owner.name.as_deref(), Some("Asha"));
        assert!(matches!(detail(&db, 12345), Err(AppError::NotFound(_))));
    }

    #[test]
    fn update_is_partial_and_owner_only() {
        let db = TestDatabase::new();
        let stored = insert_on(&db, property(1, "Pune", 100, 2), 1);
        let change = PropertyInput {
            price: Some(250),
            ..PropertyInput::default()
        };

        assert!(matches!(
            update(&db, &seller(2), stored.id, change.clone()),
            Err(AppError::Forbidden(_))
        ));
        let updated = update(&db, &seller(1), stored.id, change).unwrap();
        assert_eq!(updated.property.price, 250);
        assert_eq!(updated.property.title, stored.title);
        assert!(matches!(
            update(&db, &seller(1), 777, PropertyInput::default()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn delete_cascades() {
        let db = TestDatabase::new();
        let doomed = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let kept = insert_on(&db, property(1, "Pune", 1, 2), 2);
        db.toggle_favorite(5, doomed.id).unwrap();
        db.toggle_favorite(5, kept.id).unwrap();
        db.record_view(doomed.id).unwrap();
        db.insert_review(review(doomed.id, 5, 4)).unwrap();

        assert!(matches!(
            delete(&db, &seller(2), doomed.id),
            Err(AppError::Forbidden(_))
        ));
        delete(&db, &seller(1), doomed.id).unwrap();

        assert!(db.property(doomed.id).unwrap().is_none());
        assert_eq!(db.favorite_ids(5).unwrap(), vec![kept.id]);
        assert_eq!(db.reviews().count(), 0);
        // the (property, user) review slot was freed
        assert!(db.insert_review(review(doomed.id, 5, 4)).unwrap().is_some());
    }

    #[test]
    fn status_follows_the_transition_table() {
        let db = TestDatabase::new();
        let stored = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let owner = seller(1);

        let sold = change_status(&db, &owner, stored.id, "sold").unwrap();
        assert_eq!(sold.property.status, PropertyStatus::Sold);
        assert!(matches!(
            change_status(&db, &owner, stored.id, "rented"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            change_status(&db, &owner, stored.id, "demolished"),
            Err(AppError::Validation(_))
        ));
        let relisted = change_status(&db, &admin(), stored.id, "available").unwrap();
        assert_eq!(relisted.property.status, PropertyStatus::Available);
    }

    #[test]
    fn verify_and_feature_are_admin_only() {
        let db = TestDatabase::new();
        let stored = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

        assert!(verify(&db, &seller(1), stored.id, true).is_err());
        assert!(verify(&db, &admin(), stored.id, true).unwrap().property.is_verified);

        assert!(feature(&db, &seller(1), stored.id, 7, now).is_err());
        assert!(matches!(
            feature(&db, &admin(), stored.id, 0, now),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            feature(&db, &admin(), stored.id, 366, now),
            Err(AppError::Validation(_))
        ));
        let featured = feature(&db, &admin(), stored.id, 7, now).unwrap();
        assert_eq!(
            featured.property.featured_until,
            Some(now + Duration::days(7))
        );
    }

    #[test]
    fn featured_skips_expired_and_unavailable() {
        let db = TestDatabase::new();
        let admin = admin();
        let now = day(10);
        let running = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let expired = insert_on(&db, property(1, "Pune", 1, 2), 2);
        let sold = insert_on(&db, property(1, "Pune", 1, 2), 3);
        let newest = insert_on(&db, property(1, "Pune", 1, 2), 4);
        insert_on(&db, property(1, "Pune", 1, 2), 5);

        feature(&db, &admin, running.id, 30, day(0)).unwrap();
        feature(&db, &admin, expired.id, 5, day(0)).unwrap();
        feature(&db, &admin, sold.id, 30, day(0)).unwrap();
        change_status(&db, &admin, sold.id, "sold").unwrap();
        feature(&db, &admin, newest.id, 30, day(0)).unwrap();

        let ids: Vec<u64> = featured(&db, None, now)
            .unwrap()
            .iter()
            .map(|listing| listing.property.id)
            .collect();
        assert_eq!(ids, vec![newest.id, running.id]);
        assert_eq!(featured(&db, Some("1"), now).unwrap().len(), 1);
        assert!(db.property(expired.id).unwrap().unwrap().is_featured);
    }

    #[test]
    fn mine_and_admin_scopes() {
        let db = TestDatabase::new();
        let mine_id = insert_on(&db, property(1, "Pune", 1, 2), 1).id;
        insert_on(&db, property(2, "Pune", 1, 2), 2);
        change_status(&db, &seller(1), mine_id, "sold").unwrap();

        let params = SearchParams::default();
        let page = super::mine(&db, &seller(1), &params).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].property.id, mine_id);

        assert!(admin_table(&db, &seller(1), &params).is_err());
        let all = admin_table(&db, &admin(), &params).unwrap();
        assert_eq!(all.total, 2);

        let sold_only = SearchParams {
            status: Some("sold".to_string()),
            ..SearchParams::default()
        };
        assert_eq!(admin_table(&db, &admin(), &sold_only).unwrap().total, 1);
        assert_eq!(search(&db, &params).unwrap().total, 1);
    }

    #[test]
    fn favorites_round_trip() {
        let db = TestDatabase::new();
        let buyer = Identity::new(5, Role::Buyer);
        let older = insert_on(&db, property(1, "Pune", 1, 2), 1);
        let newer = insert_on(&db, property(1, "Pune", 1, 2), 2);

        assert!(toggle_favorite(&db, &buyer, older.id).unwrap());
        assert!(toggle_favorite(&db, &buyer, newer.id).unwrap());
        assert!(matches!(
            toggle_favorite(&db, &buyer, 4242),
            Err(AppError::NotFound(_))
        ));

        let page = favorites(&db, &buyer, None, None).unwrap();
        let ids: Vec<u64> = page.items.iter().map(|l| l.property.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        assert!(!toggle_favorite(&db, &buyer, newer.id).unwrap());
        assert_eq!(favorites(&db, &buyer, None, None).unwrap().total, 1);
    }
}
