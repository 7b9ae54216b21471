//! Purchase inspection.

use std::collections::BTreeMap;

use bestby_core::{ExpiryRecord, ItemUid, PurchaseUid, UserUid};
use bestby_recognition::db::{Purchase, PurchaseRepository, PurchaseStore};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{CommandError, connect};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseView {
    #[serde(rename = "purchaseUID")]
    purchase_uid: PurchaseUid,
    #[serde(rename = "ownerUID")]
    owner: UserUid,
    recognized_items: Vec<ItemUid>,
    expiry_results: BTreeMap<ItemUid, ExpiryRecord>,
    created_at: DateTime<Utc>,
}

impl From<Purchase> for PurchaseView {
    fn from(purchase: Purchase) -> Self {
        Self {
            purchase_uid: purchase.purchase_uid,
            owner: purchase.owner,
            recognized_items: purchase.recognized_items,
            expiry_results: purchase.expiry_results,
            created_at: purchase.created_at,
        }
    }
}

/// Print the purchase `purchase_uid` as pretty JSON.
pub async fn show(purchase_uid: &str) -> Result<(), CommandError> {
    let uid = PurchaseUid::new(purchase_uid);
    let pool = connect("CORE_DATABASE_URL").await?;

    let purchase = PurchaseRepository::new(pool)
        .get(&uid)
        .await?
        .ok_or_else(|| CommandError::NotFound(format!("purchase {uid}")))?;

    let json = serde_json::to_string_pretty(&PurchaseView::from(purchase))?;
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    #[test]
    fn test_purchase_view_shape() {
        let item = ItemUid::new("i1");
        let purchase = Purchase {
            purchase_uid: PurchaseUid::new("p1"),
            owner: UserUid::new("u1"),
            recognized_items: vec![item.clone()],
            expiry_results: BTreeMap::from([(
                item.clone(),
                ExpiryRecord {
                    item_uid: item,
                    name: "Milk".to_string(),
                    expires_on: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
                },
            )]),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        };

        let json = serde_json::to_value(PurchaseView::from(purchase)).unwrap();
        assert_eq!(json["purchaseUID"], "p1");
        assert_eq!(json["ownerUID"], "u1");
        assert_eq!(json["recognizedItems"][0], "i1");
        assert_eq!(json["expiryResults"]["i1"]["expiresOn"], "2024-01-08");
    }
}
