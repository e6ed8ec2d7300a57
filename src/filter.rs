//! Turning raw search input into the criteria listings are matched against.
//!
//! Live search, seller and admin listing tables, and saved alerts all go
//! through [`PropertyFilter::normalize`]. An alert's stored criteria is a
//! [`PropertyFilter`] value, so a saved search and a live search with the
//! same input cannot disagree about what matches.
//!
//! Normalization never fails. A value that does not parse (`minPrice=abc`,
//! `listingType=castle`) is dropped and the field is left unconstrained,
//! exactly as if it had not been sent.

use std::{fmt, str::FromStr};

use anyhow::Result;
use async_graphql::InputObject;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::database::{Furnishing, ListingType, Property, PropertyStatus, PropertyType};

/// Search input exactly as received, before any parsing.
///
/// Multi-valued fields (`propertyType`, `city`, `bedrooms`, `furnishing`)
/// accept comma-separated lists.
#[derive(InputObject, Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchParams {
    pub(crate) search: Option<String>,
    pub(crate) listing_type: Option<String>,
    pub(crate) property_type: Option<String>,
    pub(crate) city: Option<String>,
    pub(crate) min_price: Option<String>,
    pub(crate) max_price: Option<String>,
    /// A count such as `2`, or `5+` for five or more.
    pub(crate) bedrooms: Option<String>,
    pub(crate) min_area: Option<String>,
    pub(crate) max_area: Option<String>,
    pub(crate) furnishing: Option<String>,
    /// Honored only by owner and admin listing tables.
    pub(crate) status: Option<String>,
    pub(crate) sort: Option<String>,
    pub(crate) page: Option<String>,
    pub(crate) limit: Option<String>,
}

impl SearchParams {
    /// Reads alert criteria sent as JSON. Numbers and arrays are accepted
    /// where the query string would carry text, and the plural keys
    /// `cities` and `propertyTypes` are merged into their singular forms.
    pub(crate) fn from_json(criteria: &Map<String, Value>) -> Self {
        let field = |keys: &[&str]| {
            let parts: Vec<String> = keys
                .iter()
                .filter_map(|key| criteria.get(*key).and_then(json_text))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        };

        Self {
            search: field(&["search"]),
            listing_type: field(&["listingType"]),
            property_type: field(&["propertyType", "propertyTypes"]),
            city: field(&["city", "cities"]),
            min_price: field(&["minPrice"]),
            max_price: field(&["maxPrice"]),
            bedrooms: field(&["bedrooms"]),
            min_area: field(&["minArea"]),
            max_area: field(&["maxArea"]),
            furnishing: field(&["furnishing"]),
            ..Self::default()
        }
    }

    /// Reads decoded query-string pairs. A key repeated on a multi-valued
    /// field (`city=Pune&city=Mumbai`) is the same as a comma-separated
    /// list; on any other field the first value wins. Unknown keys are
    /// ignored.
    pub(crate) fn from_query(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let (slot, multi) = match key.as_str() {
                "search" => (&mut params.search, false),
                "listingType" => (&mut params.listing_type, false),
                "propertyType" => (&mut params.property_type, true),
                "city" => (&mut params.city, true),
                "minPrice" => (&mut params.min_price, false),
                "maxPrice" => (&mut params.max_price, false),
                "bedrooms" => (&mut params.bedrooms, true),
                "minArea" => (&mut params.min_area, false),
                "maxArea" => (&mut params.max_area, false),
                "furnishing" => (&mut params.furnishing, true),
                "status" => (&mut params.status, false),
                "sort" => (&mut params.sort, false),
                "page" => (&mut params.page, false),
                "limit" => (&mut params.limit, false),
                _ => continue,
            };
            match slot {
                Some(existing) => {
                    if multi {
                        existing.push(',');
                        existing.push_str(&value);
                    }
                }
                None => *slot = Some(value),
            }
        }
        params
    }
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(json_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        }
        Value::Null | Value::Bool(_) | Value::Object(_) => None,
    }
}

/// A bedroom constraint: an exact count, or "this many or more".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub(crate) enum BedroomCount {
    Exactly(u32),
    AtLeast(u32),
}

impl BedroomCount {
    pub(crate) fn admits(self, bedrooms: u32) -> bool {
        match self {
            BedroomCount::Exactly(n) => bedrooms == n,
            BedroomCount::AtLeast(n) => bedrooms >= n,
        }
    }
}

impl FromStr for BedroomCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, at_least) = match s.strip_suffix('+') {
            Some(digits) => (digits.trim_end(), true),
            None => (s, false),
        };
        let n = digits
            .parse::<u32>()
            .map_err(|e| format!("invalid bedroom count `{s}`: {e}"))?;
        Ok(if at_least {
            BedroomCount::AtLeast(n)
        } else {
            BedroomCount::Exactly(n)
        })
    }
}

impl fmt::Display for BedroomCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BedroomCount::Exactly(n) => write!(f, "{n}"),
            BedroomCount::AtLeast(n) => write!(f, "{n}+"),
        }
    }
}

impl From<BedroomCount> for String {
    fn from(count: BedroomCount) -> Self {
        count.to_string()
    }
}

impl TryFrom<String> for BedroomCount {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Normalized search criteria. An empty list or `None` means the field is
/// unconstrained; several values in one list are alternatives.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PropertyFilter {
    pub(crate) search: Option<String>,
    pub(crate) listing_type: Option<ListingType>,
    pub(crate) property_types: Vec<PropertyType>,
    pub(crate) cities: Vec<String>,
    pub(crate) min_price: Option<f64>,
    pub(crate) max_price: Option<f64>,
    pub(crate) bedrooms: Vec<BedroomCount>,
    pub(crate) min_area: Option<f64>,
    pub(crate) max_area: Option<f64>,
    pub(crate) furnishing: Vec<Furnishing>,
}

impl PropertyFilter {
    pub(crate) fn normalize(params: &SearchParams) -> Self {
        Self {
            search: text(params.search.as_deref()),
            listing_type: parsed("listingType", params.listing_type.as_deref()),
            property_types: parsed_list("propertyType", params.property_type.as_deref()),
            cities: list(params.city.as_deref()),
            min_price: amount("minPrice", params.min_price.as_deref()),
            max_price: amount("maxPrice", params.max_price.as_deref()),
            bedrooms: parsed_list("bedrooms", params.bedrooms.as_deref()),
            min_area: amount("minArea", params.min_area.as_deref()),
            max_area: amount("maxArea", params.max_area.as_deref()),
            furnishing: parsed_list("furnishing", params.furnishing.as_deref()),
        }
    }

    /// True when the filter constrains nothing.
    pub(crate) fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Translates the filter into store predicates. All of them must hold
    /// for a listing to match.
    pub(crate) fn predicates(&self) -> Result<Vec<Predicate>> {
        let mut predicates = Vec::new();
        if let Some(listing_type) = self.listing_type {
            predicates.push(Predicate::ListingType(listing_type));
        }
        if !self.property_types.is_empty() {
            predicates.push(Predicate::PropertyTypeIn(self.property_types.clone()));
        }
        if !self.cities.is_empty() {
            predicates.push(Predicate::City(case_insensitive(&self.cities)?));
        }
        if self.min_price.is_some() || self.max_price.is_some() {
            predicates.push(Predicate::PriceRange {
                min: self.min_price,
                max: self.max_price,
            });
        }
        if !self.bedrooms.is_empty() {
            predicates.push(Predicate::Bedrooms(self.bedrooms.clone()));
        }
        if self.min_area.is_some() || self.max_area.is_some() {
            predicates.push(Predicate::AreaRange {
                min: self.min_area,
                max: self.max_area,
            });
        }
        if !self.furnishing.is_empty() {
            predicates.push(Predicate::FurnishingIn(self.furnishing.clone()));
        }
        if let Some(search) = &self.search {
            predicates.push(Predicate::Text(case_insensitive(std::slice::from_ref(
                search,
            ))?));
        }
        Ok(predicates)
    }
}

/// One condition on a listing, mirroring the equality, range, set
/// membership, and case-insensitive pattern conditions of a document store.
/// A listing without a value for a constrained field never matches.
#[derive(Clone, Debug)]
pub(crate) enum Predicate {
    ListingType(ListingType),
    PropertyTypeIn(Vec<PropertyType>),
    /// Case-insensitive pattern on `location.city`.
    City(Regex),
    PriceRange { min: Option<f64>, max: Option<f64> },
    Bedrooms(Vec<BedroomCount>),
    AreaRange { min: Option<f64>, max: Option<f64> },
    FurnishingIn(Vec<Furnishing>),
    /// Case-insensitive pattern on title, description, address and city.
    Text(Regex),
    Status(PropertyStatus),
    Owner(u64),
}

impl Predicate {
    pub(crate) fn matches(&self, property: &Property) -> bool {
        let specs = &property.specifications;
        match self {
            Predicate::ListingType(listing_type) => property.listing_type == *listing_type,
            Predicate::PropertyTypeIn(types) => types.contains(&property.property_type),
            Predicate::City(pattern) => pattern.is_match(&property.location.city),
            Predicate::PriceRange { min, max } => {
                #[allow(clippy::cast_precision_loss)]
                let price = property.price as f64;
                in_range(price, *min, *max)
            }
            Predicate::Bedrooms(counts) => specs
                .bedrooms
                .is_some_and(|bedrooms| counts.iter().any(|count| count.admits(bedrooms))),
            Predicate::AreaRange { min, max } => {
                specs.area().is_some_and(|area| in_range(area, *min, *max))
            }
            Predicate::FurnishingIn(kinds) => specs
                .furnishing
                .is_some_and(|furnishing| kinds.contains(&furnishing)),
            Predicate::Text(pattern) => {
                pattern.is_match(&property.title)
                    || pattern.is_match(&property.description)
                    || pattern.is_match(&property.location.address)
                    || pattern.is_match(&property.location.city)
            }
            Predicate::Status(status) => property.status == *status,
            Predicate::Owner(owner_id) => property.owner_id == *owner_id,
        }
    }
}

fn in_range<T: PartialOrd>(value: T, min: Option<T>, max: Option<T>) -> bool {
    min.as_ref().is_none_or(|min| value >= *min) && max.as_ref().is_none_or(|max| value <= *max)
}

/// Builds a pattern matching any of `terms` literally, ignoring case.
fn case_insensitive(terms: &[String]) -> Result<Regex> {
    let alternatives: Vec<String> = terms.iter().map(|term| regex::escape(term)).collect();
    Ok(Regex::new(&format!("(?i){}", alternatives.join("|")))?)
}

fn text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn list(raw: Option<&str>) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in raw.unwrap_or_default().split(',').map(str::trim) {
        if !item.is_empty() && !items.iter().any(|seen| seen.eq_ignore_ascii_case(item)) {
            items.push(item.to_string());
        }
    }
    items
}

fn parsed<T>(field: &str, raw: Option<&str>) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = text(raw)?;
    raw.parse()
        .map_err(|e| debug!("Ignoring {field}={raw:?}: {e}"))
        .ok()
}

fn parsed_list<T>(field: &str, raw: Option<&str>) -> Vec<T>
where
    T: FromStr + PartialEq,
    T::Err: fmt::Display,
{
    let mut values = Vec::new();
    for item in list(raw) {
        if let Some(value) = parsed::<T>(field, Some(&item)) {
            if !values.contains(&value) {
                values.push(value);
            }
        }
    }
    values
}

/// A price or an area: any finite, non-negative number, fractions included.
fn amount(field: &str, raw: Option<&str>) -> Option<f64> {
    parsed::<f64>(field, raw).filter(|amount| amount.is_finite() && *amount >= 0.0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::database::property::fixtures;

    fn params(pairs: &[(&str, &str)]) -> SearchParams {
        let map: Map<String, Value> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect();
        serde_json::from_value(Value::Object(map)).unwrap()
    }

    #[test]
    fn repeated_query_keys_are_alternatives() {
        let pairs = [
            ("city", "Pune"),
            ("city", "Mumbai"),
            ("bedrooms", "2"),
            ("bedrooms", "5+"),
            ("minPrice", "100"),
            ("minPrice", "900"),
            ("utm_source", "mail"),
        ];
        let params = SearchParams::from_query(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        assert_eq!(params.city.as_deref(), Some("Pune,Mumbai"));
        assert_eq!(params.min_price.as_deref(), Some("100"));

        let filter = PropertyFilter::normalize(&params);
        assert_eq!(filter.cities, vec!["Pune", "Mumbai"]);
        assert_eq!(
            filter.bedrooms,
            vec![BedroomCount::Exactly(2), BedroomCount::AtLeast(5)]
        );
        assert_eq!(filter.min_price, Some(100.0));
    }

    #[test]
    fn absent_and_blank_values_are_omitted() {
        let filter = PropertyFilter::normalize(&params(&[
            ("city", "  "),
            ("search", ""),
            ("minPrice", ""),
            ("furnishing", ",,"),
        ]));
        assert!(filter.is_empty());
        assert!(filter.predicates().unwrap().is_empty());
    }

    #[test]
    fn unparsable_numbers_behave_as_absent() {
        let with_garbage = PropertyFilter::normalize(&params(&[
            ("city", "Pune"),
            ("minPrice", "abc"),
            ("maxPrice", "-5"),
            ("minArea", "NaN"),
            ("maxArea", "lots"),
            ("bedrooms", "many"),
        ]));
        let without = PropertyFilter::normalize(&params(&[("city", "Pune")]));
        assert_eq!(with_garbage, without);
    }

    #[test]
    fn unknown_enum_values_are_dropped() {
        let filter = PropertyFilter::normalize(&params(&[
            ("listingType", "castle"),
            ("propertyType", "villa,igloo"),
            ("furnishing", "semi-furnished,bare"),
        ]));
        assert_eq!(filter.listing_type, None);
        assert_eq!(filter.property_types, vec![PropertyType::Villa]);
        assert_eq!(filter.furnishing, vec![Furnishing::SemiFurnished]);
    }

    #[test]
    fn five_plus_means_at_least_five() {
        let filter = PropertyFilter::normalize(&params(&[("bedrooms", "5+")]));
        assert_eq!(filter.bedrooms, vec![BedroomCount::AtLeast(5)]);

        let predicates = filter.predicates().unwrap();
        let admits = |bedrooms| {
            let property = fixtures::property(1, "Pune", 1, bedrooms);
            predicates.iter().all(|p| p.matches(&property))
        };
        assert!(!admits(4));
        assert!(admits(5));
        assert!(admits(6));
        assert!(admits(9));
    }

    #[test]
    fn exact_bedrooms() {
        let filter = PropertyFilter::normalize(&params(&[("bedrooms", "2")]));
        assert_eq!(filter.bedrooms, vec![BedroomCount::Exactly(2)]);
        let predicates = filter.predicates().unwrap();
        assert!(predicates[0].matches(&fixtures::property(1, "Pune", 1, 2)));
        assert!(!predicates[0].matches(&fixtures::property(1, "Pune", 1, 3)));
    }

    #[test]
    fn listings_without_bedrooms_do_not_match_a_bedroom_filter() {
        let mut plot = fixtures::property(1, "Pune", 1, 0);
        plot.specifications.bedrooms = None;
        let filter = PropertyFilter::normalize(&params(&[("bedrooms", "0+")]));
        assert!(!filter.predicates().unwrap()[0].matches(&plot));
    }

    #[test]
    fn city_is_case_insensitive_and_literal() {
        let filter = PropertyFilter::normalize(&params(&[("city", "pune")]));
        let city = &filter.predicates().unwrap()[0];
        assert!(city.matches(&fixtures::property(1, "Pune", 1, 1)));
        assert!(city.matches(&fixtures::property(1, "PUNE", 1, 1)));
        assert!(!city.matches(&fixtures::property(1, "Mumbai", 1, 1)));

        let dotted = PropertyFilter::normalize(&params(&[("city", "P.ne")]));
        assert!(!dotted.predicates().unwrap()[0].matches(&fixtures::property(1, "Pune", 1, 1)));
    }

    #[test]
    fn price_range_is_inclusive() {
        let filter = PropertyFilter::normalize(&params(&[
            ("minPrice", "5000000"),
            ("maxPrice", "10000000"),
        ]));
        let range = &filter.predicates().unwrap()[0];
        assert!(range.matches(&fixtures::property(1, "Pune", 5_000_000, 1)));
        assert!(range.matches(&fixtures::property(1, "Pune", 10_000_000, 1)));
        assert!(!range.matches(&fixtures::property(1, "Pune", 10_000_001, 1)));
        assert!(!range.matches(&fixtures::property(1, "Pune", 4_999_999, 1)));
    }

    #[test]
    fn fractional_price_bounds_are_kept() {
        let filter = PropertyFilter::normalize(&params(&[
            ("minPrice", "7000000.5"),
            ("maxPrice", "9000000.75"),
        ]));
        assert_eq!(filter.min_price, Some(7_000_000.5));
        assert_eq!(filter.max_price, Some(9_000_000.75));
        let range = &filter.predicates().unwrap()[0];
        assert!(!range.matches(&fixtures::property(1, "Pune", 6_000_000, 1)));
        assert!(!range.matches(&fixtures::property(1, "Pune", 7_000_000, 1)));
        assert!(range.matches(&fixtures::property(1, "Pune", 7_000_001, 1)));
        assert!(range.matches(&fixtures::property(1, "Pune", 9_000_000, 1)));
        assert!(!range.matches(&fixtures::property(1, "Pune", 9_000_001, 1)));
    }

    #[test]
    fn text_search_covers_title_and_address() {
        let mut property = fixtures::property(1, "Pune", 1, 1);
        property.title = "Sunny penthouse".to_string();
        property.location.address = "Koregaon Park".to_string();
        for term in ["PENTHOUSE", "koregaon", "pune"] {
            let filter = PropertyFilter::normalize(&params(&[("search", term)]));
            assert!(filter.predicates().unwrap()[0].matches(&property), "{term}");
        }
        let filter = PropertyFilter::normalize(&params(&[("search", "bungalow")]));
        assert!(!filter.predicates().unwrap()[0].matches(&property));
    }

    #[test]
    fn alert_json_and_query_string_normalize_alike() {
        let criteria = json!({
            "cities": ["Mumbai", "Thane"],
            "maxPrice": 8_000_000,
            "propertyTypes": ["apartment"],
            "bedrooms": [2, "3"],
            "isVerified": true,
        });
        let from_json = SearchParams::from_json(criteria.as_object().unwrap());
        let from_query = params(&[
            ("city", "Mumbai,Thane"),
            ("maxPrice", "8000000"),
            ("propertyType", "apartment"),
            ("bedrooms", "2,3"),
        ]);
        assert_eq!(
            PropertyFilter::normalize(&from_json),
            PropertyFilter::normalize(&from_query)
        );
    }

    #[test]
    fn bedroom_counts_render_as_text() {
        let filter = PropertyFilter {
            bedrooms: vec![BedroomCount::Exactly(2), BedroomCount::AtLeast(5)],
            ..PropertyFilter::default()
        };
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["bedrooms"], json!(["2", "5+"]));
        let back: PropertyFilter = serde_json::from_value(json).unwrap();
        assert_eq!(back, filter);
    }
}
