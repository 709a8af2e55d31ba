//! Worker task models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BatchAssignment, LineItem, NewBatch, SupplierDelivery};

/// Kind of physical work a task represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Unload an arrived supplier delivery into stock
    Unload,
    /// Pick the committed batches of an accepted purchase request
    Prepare,
    /// Dispose of the committed batches of a purchase request
    Dispose,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Unload => "unload",
            TaskType::Prepare => "prepare",
            TaskType::Dispose => "dispose",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unload" => Some(TaskType::Unload),
            "prepare" => Some(TaskType::Prepare),
            "dispose" => Some(TaskType::Dispose),
            _ => None,
        }
    }

    /// Unload tasks reference a supplier delivery, the others a purchase request
    pub fn references_delivery(&self) -> bool {
        matches!(self, TaskType::Unload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Complete,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Complete => "complete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(TaskStatus::Open),
            "complete" => Some(TaskStatus::Complete),
            _ => None,
        }
    }

    /// Completing is idempotent: a complete task stays complete.
    pub fn complete(self) -> CompletionOutcome {
        match self {
            TaskStatus::Open => CompletionOutcome::Completed,
            TaskStatus::Complete => CompletionOutcome::AlreadyComplete,
        }
    }
}

/// Result of a completion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// The task moved from open to complete; side effects must run
    Completed,
    /// Duplicate call; nothing to do
    AlreadyComplete,
}

/// One product line of a worker task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub batch_id: Option<Uuid>,
    pub quantity: i32,
}

/// Unit of physical work assigned to a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTask {
    pub task_id: Uuid,
    pub worker_id: Uuid,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub delivery_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub status: TaskStatus,
    pub items: Vec<TaskItem>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Work that must run in the transaction that completes a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEffect {
    /// Close the task, nothing else
    Close,
    /// Close the task and stock the unloaded delivery as a new batch
    StockDelivery { delivery_id: Uuid },
}

impl WorkerTask {
    /// Effect of completing this task, or `None` when it is already complete
    pub fn completion_effect(&self) -> Option<CompletionEffect> {
        match self.status.complete() {
            CompletionOutcome::AlreadyComplete => None,
            CompletionOutcome::Completed => match (self.task_type, self.delivery_id) {
                (TaskType::Unload, Some(delivery_id)) => {
                    Some(CompletionEffect::StockDelivery { delivery_id })
                }
                _ => Some(CompletionEffect::Close),
            },
        }
    }
}

/// Batch an unloaded delivery turns into
pub fn stocked_batch(delivery: &SupplierDelivery) -> NewBatch {
    NewBatch {
        product_id: delivery.product_id,
        quantity_available: delivery.quantity,
        expiration_date: delivery.expiration_date,
        delivery_id: Some(delivery.id),
    }
}

/// Items of an unload task: the delivered product, with its batch once known
pub fn unload_items(delivery: &SupplierDelivery) -> Vec<TaskItem> {
    vec![TaskItem {
        product_id: delivery.product_id,
        product_name: delivery.product_name.clone(),
        batch_id: delivery.batch_id,
        quantity: delivery.quantity,
    }]
}

/// Items of a prepare/dispose task: every committed assignment with stock
/// actually drawn from the batch
pub fn request_items(items: &[LineItem], assignments: &[BatchAssignment]) -> Vec<TaskItem> {
    assignments
        .iter()
        .filter(|a| a.quantity > 0)
        .filter_map(|a| {
            items.iter().find(|i| i.item_id == a.item_id).map(|item| TaskItem {
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                batch_id: Some(a.batch_id),
                quantity: a.quantity,
            })
        })
        .collect()
}
