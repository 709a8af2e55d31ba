//! Inventory batch models and FEFO ordering

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A dated lot of stock for a single product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity_available: i32,
    /// `None` sorts after every dated batch
    pub expiration_date: Option<NaiveDate>,
    /// Delivery whose unload created this batch
    pub delivery_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Batch about to be added to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub product_id: Uuid,
    pub quantity_available: i32,
    pub expiration_date: Option<NaiveDate>,
    pub delivery_id: Option<Uuid>,
}

/// First-expired-first-out comparison: earliest expiration first, undated
/// batches last, ties broken by ascending batch id.
pub fn fefo_cmp(a: &Batch, b: &Batch) -> Ordering {
    let by_expiration = match (a.expiration_date, b.expiration_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_expiration.then_with(|| a.id.cmp(&b.id))
}

/// Sort batches in ledger order
pub fn sort_fefo(batches: &mut [Batch]) {
    batches.sort_by(fefo_cmp);
}

/// Total stock currently available for a product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity_available: i64,
    pub batch_count: i64,
}
