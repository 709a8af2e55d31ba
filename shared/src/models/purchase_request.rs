//! Purchase request aggregate and its status machine

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, TransitionError};

/// Status of a purchase request
///
/// `pending` is the only non-terminal status; once a request is accepted or
/// denied it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Denied,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Denied => "denied",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "denied" => Some(RequestStatus::Denied),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// Check a transition and return the new status
    pub fn transition(self, to: RequestStatus) -> Result<RequestStatus, TransitionError> {
        match (self, to) {
            (RequestStatus::Pending, RequestStatus::Accepted)
            | (RequestStatus::Pending, RequestStatus::Denied) => Ok(to),
            (from, _) if from.is_terminal() => Err(TransitionError::new(
                Entity::PurchaseRequest,
                from.as_str(),
                to.as_str(),
            )
            .with_reason("request is already resolved")),
            (from, to) => Err(TransitionError::new(
                Entity::PurchaseRequest,
                from.as_str(),
                to.as_str(),
            )),
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One product/quantity pair inside a purchase request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub item_id: Uuid,
    pub product_id: Uuid,
    /// Denormalized from the catalog at checkout
    pub product_name: String,
    pub quantity_requested: i32,
}

/// Quantity of one batch assigned to one line item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchAssignment {
    #[serde(alias = "itemID")]
    pub item_id: Uuid,
    #[serde(alias = "batchID")]
    pub batch_id: Uuid,
    pub quantity: i32,
}

/// Purchase request aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: RequestStatus,
    pub items: Vec<LineItem>,
    /// Committed assignments; empty until the request is accepted
    pub assignments: Vec<BatchAssignment>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Candidate batch as shown to a reviewer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateBatch {
    pub batch_id: Uuid,
    pub quantity_available: i32,
    pub expiration_date: Option<NaiveDate>,
    /// Quantity the default FEFO proposal assigns to this batch
    pub proposed_quantity: i32,
    /// Quantity in the stored draft, when one exists
    pub draft_quantity: Option<i32>,
}

/// Line item with its candidate batches in ledger order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetail {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity_requested: i32,
    pub batches: Vec<CandidateBatch>,
}

/// Review view of a purchase request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub has_draft: bool,
    pub items: Vec<ItemDetail>,
}
