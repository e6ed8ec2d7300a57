pub(crate) mod alert;
pub(crate) mod inquiry;
pub(crate) mod property;
pub(crate) mod review;
pub(crate) mod user;

use std::{marker::PhantomData, path::Path};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};

pub(crate) use self::{
    alert::{Alert, AlertFrequency},
    inquiry::{Inquiry, InquiryResponse, InquiryStatus, InquiryType},
    property::{
        Furnishing, Image, ListingType, Location, Property, PropertyStatus, PropertyType,
        Specifications,
    },
    review::{OwnerResponse, Review, ReviewStatus, SubRatings},
    user::UserProfile,
};

const PROPERTIES: &str = "properties";
const USERS: &str = "users";
const FAVORITES: &str = "favorites";
const REVIEWS: &str = "reviews";
const REVIEW_INDEX: &str = "review_index";
const INQUIRIES: &str = "inquiries";
const ALERTS: &str = "alerts";
const PROPERTY_VIEWS: &str = "property_views";
const PROPERTY_INQUIRIES: &str = "property_inquiries";

/// Handle to the embedded store. Cloning is cheap; every clone shares the
/// same trees.
#[derive(Clone)]
pub(crate) struct Database {
    db: Db,
    properties: Tree,
    users: Tree,
    favorites: Tree,
    reviews: Tree,
    review_index: Tree,
    inquiries: Tree,
    alerts: Tree,
    property_views: Tree,
    property_inquiries: Tree,
}

impl Database {
    pub(crate) fn connect(path: &Path) -> Result<Database> {
        let db = sled::open(path)
            .with_context(|| format!("cannot open database at {}", path.display()))?;

        let property_views = db.open_tree(PROPERTY_VIEWS)?;
        property_views.set_merge_operator(add_counter);
        let property_inquiries = db.open_tree(PROPERTY_INQUIRIES)?;
        property_inquiries.set_merge_operator(add_counter);

        Ok(Database {
            properties: db.open_tree(PROPERTIES)?,
            users: db.open_tree(USERS)?,
            favorites: db.open_tree(FAVORITES)?,
            reviews: db.open_tree(REVIEWS)?,
            review_index: db.open_tree(REVIEW_INDEX)?,
            inquiries: db.open_tree(INQUIRIES)?,
            alerts: db.open_tree(ALERTS)?,
            property_views,
            property_inquiries,
            db,
        })
    }

    /// Writes buffered changes to disk.
    pub(crate) fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Returns a fresh, positive document id. Ids grow monotonically, so key
    /// order in every tree is also creation order.
    fn generate_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()? + 1)
    }

    fn insert<T: Serialize>(tree: &Tree, id: u64, value: &T) -> Result<()> {
        tree.insert(id.to_be_bytes(), bincode::serialize(value)?)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(tree: &Tree, id: u64) -> Result<Option<T>> {
        match tree.get(id.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn remove(tree: &Tree, id: u64) -> Result<bool> {
        Ok(tree.remove(id.to_be_bytes())?.is_some())
    }

    /// Applies `f` to the stored document and writes the result back with a
    /// compare-and-swap, retrying from a fresh read if another writer got
    /// there first. Returns `None` when the document does not exist.
    fn modify<T, E, F>(tree: &Tree, id: u64, mut f: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<anyhow::Error>,
        F: FnMut(&mut T) -> Result<(), E>,
    {
        let key = id.to_be_bytes();
        loop {
            let Some(old) = tree.get(key).map_err(anyhow::Error::from)? else {
                return Ok(None);
            };
            let mut value: T = bincode::deserialize(&old).map_err(anyhow::Error::from)?;
            f(&mut value)?;
            let new = bincode::serialize(&value).map_err(anyhow::Error::from)?;
            if tree
                .compare_and_swap(key, Some(&old), Some(new))
                .map_err(anyhow::Error::from)?
                .is_ok()
            {
                return Ok(Some(value));
            }
        }
    }

    fn increment(tree: &Tree, id: u64) -> Result<()> {
        tree.merge(id.to_be_bytes(), 1_u64.to_be_bytes())?;
        Ok(())
    }

    fn counter(tree: &Tree, id: u64) -> Result<u64> {
        match tree.get(id.to_be_bytes())? {
            Some(value) => decode_u64(&value),
            None => Ok(0),
        }
    }
}

pub(crate) trait TryFromKeyValue: Sized {
    fn try_from_key_value(key: &[u8], value: &[u8]) -> Result<Self>;
}

pub(crate) struct Iter<T> {
    inner: sled::Iter,
    phantom: PhantomData<T>,
}

impl<T> Iter<T> {
    fn new(inner: sled::Iter) -> Self {
        Self {
            inner,
            phantom: PhantomData,
        }
    }
}

impl<T: TryFromKeyValue> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(
            item.map_err(anyhow::Error::from)
                .and_then(|(key, value)| T::try_from_key_value(&key, &value)),
        )
    }
}

impl<T: TryFromKeyValue> DoubleEndedIterator for Iter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let item = self.inner.next_back()?;
        Some(
            item.map_err(anyhow::Error::from)
                .and_then(|(key, value)| T::try_from_key_value(&key, &value)),
        )
    }
}

pub(crate) fn parse_id(key: &[u8]) -> Result<u64> {
    let bytes = key
        .get(..8)
        .with_context(|| format!("key too short: {key:02x?}"))?;
    decode_u64(bytes)
}

/// Key made of two ids, so that a prefix scan on the first yields all pairs.
fn pair_key(first: u64, second: u64) -> [u8; 16] {
    let mut key = [0; 16];
    key[..8].copy_from_slice(&first.to_be_bytes());
    key[8..].copy_from_slice(&second.to_be_bytes());
    key
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = bytes
        .try_into()
        .with_context(|| format!("invalid counter value: {bytes:02x?}"))?;
    Ok(u64::from_be_bytes(bytes))
}

fn decode<T: DeserializeOwned>(key: &[u8], value: &[u8]) -> Result<T> {
    bincode::deserialize(value)
        .with_context(|| format!("invalid value in database for key {key:02x?}"))
}

/// Merge operator for counter trees: adds the big-endian operand to the
/// stored value.
fn add_counter(_key: &[u8], old: Option<&[u8]>, operand: &[u8]) -> Option<Vec<u8>> {
    let current = old.and_then(|old| decode_u64(old).ok()).unwrap_or(0);
    let delta = decode_u64(operand).unwrap_or(0);
    Some(current.saturating_add(delta).to_be_bytes().to_vec())
}

#[cfg(test)]
pub(crate) struct TestDatabase {
    _dir: tempfile::TempDir, // keeps the data directory alive for the test
    pub(crate) db: Database,
}

#[cfg(test)]
impl TestDatabase {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path()).unwrap();
        Self { _dir: dir, db }
    }
}

#[cfg(test)]
impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn ids_are_positive_and_increasing() {
        let db = TestDatabase::new();
        let first = db.generate_id().unwrap();
        let second = db.generate_id().unwrap();
        assert!(first > 0);
        assert!(second > first);
    }

    #[test]
    fn counters_add_atomically() {
        let db = Arc::new(TestDatabase::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for _ in 0..50 {
                        Database::increment(&db.property_views, 42).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(Database::counter(&db.property_views, 42).unwrap(), 400);
        assert_eq!(Database::counter(&db.property_views, 43).unwrap(), 0);
    }

    #[test]
    fn modify_missing_document() {
        let db = TestDatabase::new();
        let result: Result<Option<u32>> = Database::modify(&db.alerts, 1, |n: &mut u32| {
            *n += 1;
            Ok(())
        });
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn concurrent_modifications_are_not_lost() {
        let db = Arc::new(TestDatabase::new());
        Database::insert(&db.alerts, 1, &0_u32).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for _ in 0..25 {
                        let _: Option<u32> =
                            Database::modify(&db.alerts, 1, |n: &mut u32| -> Result<()> {
                                *n += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let value: Option<u32> = Database::get(&db.alerts, 1).unwrap();
        assert_eq!(value, Some(100));
    }

    #[test]
    fn pair_keys_sort_by_first_id() {
        assert!(pair_key(1, u64::MAX) < pair_key(2, 0));
        assert_eq!(parse_id(&pair_key(5, 9)).unwrap(), 5);
    }
}
