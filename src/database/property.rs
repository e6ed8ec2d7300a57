use std::{collections::BTreeSet, fmt, str::FromStr};

use anyhow::Result;
use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Database, Iter, TryFromKeyValue};

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ListingType {
    Buy,
    Rent,
}

impl FromStr for ListingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "sale" | "sell" => Ok(Self::Buy),
            "rent" => Ok(Self::Rent),
            other => Err(format!("unknown listing type `{other}`")),
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PropertyType {
    Apartment,
    House,
    Villa,
    Plot,
    Commercial,
    Office,
    Shop,
    Warehouse,
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apartment" | "flat" => Ok(Self::Apartment),
            "house" => Ok(Self::House),
            "villa" => Ok(Self::Villa),
            "plot" | "land" => Ok(Self::Plot),
            "commercial" => Ok(Self::Commercial),
            "office" => Ok(Self::Office),
            "shop" => Ok(Self::Shop),
            "warehouse" => Ok(Self::Warehouse),
            other => Err(format!("unknown property type `{other}`")),
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum Furnishing {
    Furnished,
    SemiFurnished,
    Unfurnished,
}

impl FromStr for Furnishing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(char::is_ascii_alphabetic)
            .collect();
        match normalized.as_str() {
            "furnished" | "fullyfurnished" => Ok(Self::Furnished),
            "semifurnished" => Ok(Self::SemiFurnished),
            "unfurnished" => Ok(Self::Unfurnished),
            _ => Err(format!("unknown furnishing `{}`", s.trim())),
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PropertyStatus {
    #[default]
    Available,
    Sold,
    Rented,
}

impl PropertyStatus {
    /// Allowed status changes. A listing leaves the market as sold or
    /// rented and may be relisted; nothing else moves.
    pub(crate) fn can_transition_to(self, next: PropertyStatus) -> bool {
        matches!(
            (self, next),
            (PropertyStatus::Available, PropertyStatus::Sold | PropertyStatus::Rented)
                | (PropertyStatus::Sold | PropertyStatus::Rented, PropertyStatus::Available)
        )
    }
}

impl fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyStatus::Available => "available",
            PropertyStatus::Sold => "sold",
            PropertyStatus::Rented => "rented",
        };
        f.write_str(name)
    }
}

impl FromStr for PropertyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "sold" => Ok(Self::Sold),
            "rented" => Ok(Self::Rented),
            other => Err(format!("unknown property status `{other}`")),
        }
    }
}

#[derive(SimpleObject, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Location {
    pub(crate) address: String,
    pub(crate) city: String,
    pub(crate) state: String,
    pub(crate) pincode: String,
}

#[derive(SimpleObject, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Specifications {
    pub(crate) bedrooms: Option<u32>,
    pub(crate) bathrooms: Option<u32>,
    /// Square feet.
    pub(crate) carpet_area: Option<f64>,
    /// Square feet.
    pub(crate) built_up_area: Option<f64>,
    pub(crate) floor_number: Option<i32>,
    pub(crate) total_floors: Option<u32>,
    pub(crate) furnishing: Option<Furnishing>,
    pub(crate) facing: Option<String>,
    pub(crate) age_of_property: Option<String>,
    pub(crate) possession_status: Option<String>,
}

impl Specifications {
    /// The area used by area filters: carpet area when known, otherwise
    /// built-up area.
    pub(crate) fn area(&self) -> Option<f64> {
        self.carpet_area.or(self.built_up_area)
    }
}

#[derive(SimpleObject, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Image {
    pub(crate) url: String,
    pub(crate) caption: Option<String>,
    #[serde(default)]
    pub(crate) is_primary: bool,
}

#[derive(SimpleObject, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[graphql(complex)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Property {
    pub(crate) id: u64,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) listing_type: ListingType,
    pub(crate) property_type: PropertyType,
    pub(crate) price: u64,
    pub(crate) location: Location,
    pub(crate) specifications: Specifications,
    pub(crate) amenities: BTreeSet<String>,
    pub(crate) highlights: Vec<String>,
    pub(crate) images: Vec<Image>,
    pub(crate) owner_id: u64,
    pub(crate) status: PropertyStatus,
    pub(crate) is_verified: bool,
    pub(crate) is_featured: bool,
    pub(crate) featured_until: Option<DateTime<Utc>>,
    /// Filled from the view counter on every read.
    pub(crate) views: u64,
    /// Filled from the inquiry counter on every read.
    pub(crate) inquiries: u64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Property {
    pub(crate) fn is_featured_at(&self, now: DateTime<Utc>) -> bool {
        self.is_featured && self.featured_until.is_some_and(|until| until > now)
    }
}

impl TryFromKeyValue for Property {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> Result<Self> {
        super::decode(key, value)
    }
}

impl Database {
    /// Stores a new listing under a fresh id and returns it.
    pub(crate) fn insert_property(&self, mut property: Property) -> Result<Property> {
        property.id = self.generate_id()?;
        property.views = 0;
        property.inquiries = 0;
        Database::insert(&self.properties, property.id, &property)?;
        Ok(property)
    }

    pub(crate) fn property(&self, id: u64) -> Result<Option<Property>> {
        Database::get(&self.properties, id)?
            .map(|property| self.with_counters(property))
            .transpose()
    }

    /// All listings in creation order. Counters are not filled in; see
    /// [`Database::with_counters`].
    pub(crate) fn properties(&self) -> Iter<Property> {
        Iter::new(self.properties.iter())
    }

    pub(crate) fn with_counters(&self, mut property: Property) -> Result<Property> {
        property.views = Database::counter(&self.property_views, property.id)?;
        property.inquiries = Database::counter(&self.property_inquiries, property.id)?;
        Ok(property)
    }

    pub(crate) fn modify_property<E, F>(&self, id: u64, f: F) -> Result<Option<Property>, E>
    where
        E: From<anyhow::Error>,
        F: FnMut(&mut Property) -> Result<(), E>,
    {
        Database::modify(&self.properties, id, f)?
            .map(|property| self.with_counters(property).map_err(E::from))
            .transpose()
    }

    /// Removes the listing and its counters. Returns `false` if it did not
    /// exist.
    pub(crate) fn remove_property(&self, id: u64) -> Result<bool> {
        let removed = Database::remove(&self.properties, id)?;
        Database::remove(&self.property_views, id)?;
        Database::remove(&self.property_inquiries, id)?;
        Ok(removed)
    }

    pub(crate) fn record_view(&self, id: u64) -> Result<()> {
        Database::increment(&self.property_views, id)
    }

    pub(crate) fn record_inquiry(&self, id: u64) -> Result<()> {
        Database::increment(&self.property_inquiries, id)
    }

    pub(crate) fn property_count(&self) -> usize {
        self.properties.len()
    }
}
