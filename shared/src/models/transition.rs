//! State transition errors shared by every status machine

use std::fmt;

use thiserror::Error;

/// Aggregate whose status machine rejected a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    PurchaseRequest,
    Report,
    SupplierDelivery,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::PurchaseRequest => write!(f, "purchase request"),
            Entity::Report => write!(f, "report"),
            Entity::SupplierDelivery => write!(f, "supplier delivery"),
        }
    }
}

/// A status change that the aggregate's state machine does not allow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot move {entity} from {from} to {to}{}", describe_reason(.reason))]
pub struct TransitionError {
    pub entity: Entity,
    pub from: String,
    pub to: String,
    pub reason: Option<String>,
}

impl TransitionError {
    pub fn new(entity: Entity, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            entity,
            from: from.into(),
            to: to.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

fn describe_reason(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {}", r))
        .unwrap_or_default()
}
