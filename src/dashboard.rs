use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    database::{Database, PropertyStatus, ReviewStatus},
    error::AppResult,
    identity::{Identity, Role},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BuyerStats {
    pub(crate) favorites: usize,
    pub(crate) inquiries_sent: usize,
    pub(crate) inquiries_answered: usize,
    pub(crate) active_alerts: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListingCounts {
    pub(crate) total: usize,
    pub(crate) available: usize,
    pub(crate) sold: usize,
    pub(crate) rented: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SellerStats {
    pub(crate) listings: ListingCounts,
    pub(crate) total_views: u64,
    pub(crate) inquiries_received: usize,
    pub(crate) unread_inquiries: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdminStats {
    pub(crate) total_properties: usize,
    pub(crate) verified_properties: usize,
    pub(crate) featured_properties: usize,
    pub(crate) users: usize,
    pub(crate) pending_reviews: usize,
    pub(crate) total_inquiries: usize,
}

/// The summary shown on the caller's dashboard, shaped by role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub(crate) enum Dashboard {
    Buyer(BuyerStats),
    Seller(SellerStats),
    Admin(AdminStats),
}

pub(crate) fn dashboard(
    db: &Database,
    identity: &Identity,
    now: DateTime<Utc>,
) -> AppResult<Dashboard> {
    Ok(match identity.role {
        Role::Buyer => Dashboard::Buyer(buyer(db, identity.user_id)?),
        Role::Seller => Dashboard::Seller(seller(db, identity.user_id)?),
        Role::Admin => Dashboard::Admin(admin(db, now)?),
    })
}

fn buyer(db: &Database, user_id: u64) -> anyhow::Result<BuyerStats> {
    let mut stats = BuyerStats {
        favorites: db.favorite_ids(user_id)?.len(),
        ..BuyerStats::default()
    };
    for inquiry in db.inquiries() {
        let inquiry = inquiry?;
        if inquiry.sender_id != user_id {
            continue;
        }
        stats.inquiries_sent += 1;
        if inquiry
            .responses
            .iter()
            .any(|response| response.responder_id != user_id)
        {
            stats.inquiries_answered += 1;
        }
    }
    for alert in db.alerts() {
        let alert = alert?;
        if alert.user_id == user_id && alert.is_active {
            stats.active_alerts += 1;
        }
    }
    Ok(stats)
}

fn seller(db: &Database, user_id: u64) -> anyhow::Result<SellerStats> {
    let mut stats = SellerStats::default();
    for property in db.properties() {
        let property = property?;
        if property.owner_id != user_id {
            continue;
        }
        let property = db.with_counters(property)?;
        stats.listings.total += 1;
        match property.status {
            PropertyStatus::Available => stats.listings.available += 1,
            PropertyStatus::Sold => stats.listings.sold += 1,
            PropertyStatus::Rented => stats.listings.rented += 1,
        }
        stats.total_views += property.views;
    }
    for inquiry in db.inquiries() {
        let inquiry = inquiry?;
        if inquiry.receiver_id == user_id {
            stats.inquiries_received += 1;
            if !inquiry.is_read {
                stats.unread_inquiries += 1;
            }
        }
    }
    Ok(stats)
}

fn admin(db: &Database, now: DateTime<Utc>) -> anyhow::Result<AdminStats> {
    let mut stats = AdminStats {
        total_properties: db.property_count(),
        users: db.user_count(),
        total_inquiries: db.inquiries().count(),
        ..AdminStats::default()
    };
    for property in db.properties() {
        let property = property?;
        if property.is_verified {
            stats.verified_properties += 1;
        }
        if property.is_featured_at(now) {
            stats.featured_properties += 1;
        }
    }
    for review in db.reviews() {
        if review?.status == ReviewStatus::Pending {
            stats.pending_reviews += 1;
        }
    }
    Ok(stats)
}
