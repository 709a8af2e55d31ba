//! Supplier delivery (ordered product) models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, TransitionError};

/// Status of a supplier delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Ordered, not yet confirmed as arrived
    Pending,
    /// Delivery report accepted and unload task dispatched
    Fulfilled,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Fulfilled => "fulfilled",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "fulfilled" => Some(DeliveryStatus::Fulfilled),
            "cancelled" => Some(DeliveryStatus::Cancelled),
            _ => None,
        }
    }

    pub fn transition(self, to: DeliveryStatus) -> Result<DeliveryStatus, TransitionError> {
        match (self, to) {
            (DeliveryStatus::Pending, DeliveryStatus::Fulfilled)
            | (DeliveryStatus::Pending, DeliveryStatus::Cancelled) => Ok(to),
            (from, to) => Err(TransitionError::new(
                Entity::SupplierDelivery,
                from.as_str(),
                to.as_str(),
            )
            .with_reason("delivery is no longer pending")),
        }
    }
}

/// A supplier order expected to arrive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SupplierDelivery {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub expiration_date: Option<NaiveDate>,
    pub status: DeliveryStatus,
    /// Batch created when the delivery was unloaded
    pub batch_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_delivery_can_be_fulfilled() {
        assert!(DeliveryStatus::Pending
            .transition(DeliveryStatus::Fulfilled)
            .is_ok());
        assert!(DeliveryStatus::Fulfilled
            .transition(DeliveryStatus::Fulfilled)
            .is_err());
        assert!(DeliveryStatus::Cancelled
            .transition(DeliveryStatus::Fulfilled)
            .is_err());
        assert!(DeliveryStatus::Fulfilled
            .transition(DeliveryStatus::Cancelled)
            .is_err());
    }
}
