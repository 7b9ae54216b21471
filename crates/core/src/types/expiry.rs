//! Expiry results produced by the recognition pipeline.

use core::fmt;

use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::id::{ItemUid, PurchaseUid};

/// A resolved expiry for one item of one purchase.
///
/// Only the duration of an item is durable. An `ExpiryRecord` is derived per
/// purchase from that duration and the scan instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryRecord {
    #[serde(rename = "itemUID")]
    pub item_uid: ItemUid,
    pub name: String,
    pub expires_on: NaiveDate,
}

/// One entry of a recognition result: the item name and, when known, its
/// expiry date. Serializes `expiresOn` as `null` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemExpiry {
    pub name: String,
    pub expires_on: Option<NaiveDate>,
}

/// Recognized items keyed by item UID, in recognition order.
///
/// Serializes as a JSON object. Duplicate UIDs are collapsed on insert, the
/// first occurrence keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchaseItems(Vec<(ItemUid, ItemExpiry)>);

impl PurchaseItems {
    /// Create an empty item set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert an item, returning `false` if its UID was already present.
    pub fn insert(&mut self, uid: ItemUid, name: impl Into<String>) -> bool {
        if self.contains(&uid) {
            return false;
        }
        self.0.push((
            uid,
            ItemExpiry {
                name: name.into(),
                expires_on: None,
            },
        ));
        true
    }

    #[must_use]
    pub fn contains(&self, uid: &ItemUid) -> bool {
        self.0.iter().any(|(existing, _)| existing == uid)
    }

    #[must_use]
    pub fn get(&self, uid: &ItemUid) -> Option<&ItemExpiry> {
        self.0
            .iter()
            .find_map(|(existing, item)| (existing == uid).then_some(item))
    }

    /// Set the expiry date of an already inserted item.
    ///
    /// Returns `false` if the UID is unknown.
    pub fn set_expiry(&mut self, uid: &ItemUid, expires_on: NaiveDate) -> bool {
        match self.0.iter_mut().find(|(existing, _)| existing == uid) {
            Some((_, item)) => {
                item.expires_on = Some(expires_on);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemUid, &ItemExpiry)> {
        self.0.iter().map(|(uid, item)| (uid, item))
    }

    /// Item UIDs in recognition order.
    pub fn uids(&self) -> impl Iterator<Item = &ItemUid> {
        self.0.iter().map(|(uid, _)| uid)
    }

    /// Items that have a resolved expiry, as durable records.
    #[must_use]
    pub fn resolved_records(&self) -> Vec<ExpiryRecord> {
        self.0
            .iter()
            .filter_map(|(uid, item)| {
                item.expires_on.map(|expires_on| ExpiryRecord {
                    item_uid: uid.clone(),
                    name: item.name.clone(),
                    expires_on,
                })
            })
            .collect()
    }
}

impl Serialize for PurchaseItems {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (uid, item) in &self.0 {
            map.serialize_entry(uid, item)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PurchaseItems {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ItemsVisitor;

        impl<'de> Visitor<'de> for ItemsVisitor {
            type Value = PurchaseItems;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of item UID to item expiry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut items = PurchaseItems::new();
                while let Some((uid, item)) = access.next_entry::<ItemUid, ItemExpiry>()? {
                    if !items.contains(&uid) {
                        items.0.push((uid, item));
                    }
                }
                Ok(items)
            }
        }

        deserializer.deserialize_map(ItemsVisitor)
    }
}

/// The `DATA` payload of a successful recognition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOutcome {
    #[serde(rename = "purchaseUID")]
    pub purchase_uid: PurchaseUid,
    pub items: PurchaseItems,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_insert_collapses_duplicates() {
        let mut items = PurchaseItems::new();
        assert!(items.insert(ItemUid::new("a"), "Apple"));
        assert!(items.insert(ItemUid::new("b"), "Banana"));
        assert!(!items.insert(ItemUid::new("a"), "Apple"));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_serializes_in_recognition_order() {
        let mut items = PurchaseItems::new();
        items.insert(ItemUid::new("zz"), "Milk");
        items.insert(ItemUid::new("aa"), "Apple");
        items.set_expiry(&ItemUid::new("aa"), date(2024, 1, 15));

        let json = serde_json::to_string(&items).unwrap();
        assert_eq!(
            json,
            r#"{"zz":{"name":"Milk","expiresOn":null},"aa":{"name":"Apple","expiresOn":"2024-01-15"}}"#
        );
    }

    #[test]
    fn test_resolved_records_skip_missing_expiry() {
        let mut items = PurchaseItems::new();
        items.insert(ItemUid::new("a"), "Apple");
        items.insert(ItemUid::new("k"), "Kale");
        items.set_expiry(&ItemUid::new("a"), date(2024, 1, 15));

        let records = items.resolved_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Apple");
        assert_eq!(records[0].item_uid.as_str(), "a");
    }

    #[test]
    fn test_set_expiry_unknown_uid() {
        let mut items = PurchaseItems::new();
        assert!(!items.set_expiry(&ItemUid::new("nope"), date(2024, 1, 1)));
    }

    #[test]
    fn test_outcome_wire_shape() {
        let mut items = PurchaseItems::new();
        items.insert(ItemUid::new("a"), "Apple");
        let outcome = RecognitionOutcome {
            purchase_uid: PurchaseUid::new("p1"),
            items,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["purchaseUID"], "p1");
        assert_eq!(json["items"]["a"]["name"], "Apple");

        let back: RecognitionOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_expiry_record_wire_names() {
        let record = ExpiryRecord {
            item_uid: ItemUid::new("a"),
            name: "Apple".to_string(),
            expires_on: date(2024, 1, 15),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["itemUID"], "a");
        assert_eq!(json["expiresOn"], "2024-01-15");
    }
}
