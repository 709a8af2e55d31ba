//! Allocation planner
//!
//! Turns the line items of a purchase request into a batch allocation and
//! decides whether an allocation may be committed. Everything here works on
//! snapshots passed in by the caller; the backend is responsible for taking
//! those snapshots under the right locks.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{sort_fefo, Batch, BatchAssignment, LineItem};

/// Why an allocation cannot be stored or committed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// The batches assigned to an item do not add up to the requested quantity
    #[error("Incomplete allocation for item {item_id}: requested {requested}, assigned {assigned}")]
    Incomplete {
        item_id: Uuid,
        requested: i64,
        assigned: i64,
    },

    /// A batch is assigned more than it holds in the validation snapshot
    #[error("Overallocated batch {batch_id}: assigned {assigned}, available {available}")]
    Overallocated {
        batch_id: Uuid,
        assigned: i64,
        available: i64,
    },

    /// Stock disappeared between validation and reservation
    #[error("InsufficientStock on batch {batch_id}: requested {requested}, available {available}")]
    InsufficientStock {
        batch_id: Uuid,
        requested: i64,
        available: i64,
    },

    /// The assignment itself is malformed
    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),
}

/// Allocation of a whole request: item id -> batch id -> quantity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    items: BTreeMap<Uuid, BTreeMap<Uuid, i32>>,
}

/// Quantity to take from one batch at commit time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub batch_id: Uuid,
    pub quantity: i32,
}

impl AllocationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a plan from submitted assignments, rejecting negative quantities
    /// and duplicate item/batch pairs.
    pub fn from_assignments(assignments: &[BatchAssignment]) -> Result<Self, AllocationError> {
        let mut plan = Self::new();
        for a in assignments {
            if a.quantity < 0 {
                return Err(AllocationError::InvalidAssignment(format!(
                    "quantity for item {} on batch {} is negative",
                    a.item_id, a.batch_id
                )));
            }
            let previous = plan
                .items
                .entry(a.item_id)
                .or_default()
                .insert(a.batch_id, a.quantity);
            if previous.is_some() {
                return Err(AllocationError::InvalidAssignment(format!(
                    "batch {} is assigned twice to item {}",
                    a.batch_id, a.item_id
                )));
            }
        }
        Ok(plan)
    }

    pub fn set(&mut self, item_id: Uuid, batch_id: Uuid, quantity: i32) {
        self.items
            .entry(item_id)
            .or_default()
            .insert(batch_id, quantity);
    }

    pub fn quantity(&self, item_id: Uuid, batch_id: Uuid) -> Option<i32> {
        self.items.get(&item_id).and_then(|b| b.get(&batch_id)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum assigned to one item across all its batches
    pub fn item_total(&self, item_id: Uuid) -> i64 {
        self.items
            .get(&item_id)
            .map(|batches| batches.values().map(|q| i64::from(*q)).sum())
            .unwrap_or(0)
    }

    /// Sum assigned to each batch across the whole request, by ascending id
    pub fn batch_totals(&self) -> BTreeMap<Uuid, i64> {
        let mut totals = BTreeMap::new();
        for batches in self.items.values() {
            for (batch_id, quantity) in batches {
                *totals.entry(*batch_id).or_insert(0) += i64::from(*quantity);
            }
        }
        totals
    }

    /// Batches that would actually be drawn from, ascending
    pub fn drawn_batch_ids(&self) -> Vec<Uuid> {
        self.batch_totals()
            .into_iter()
            .filter(|(_, total)| *total > 0)
            .map(|(id, _)| id)
            .collect()
    }

    /// Flatten back into assignment rows, ordered by item then batch id
    pub fn assignments(&self) -> Vec<BatchAssignment> {
        self.items
            .iter()
            .flat_map(|(item_id, batches)| {
                batches.iter().map(move |(batch_id, quantity)| BatchAssignment {
                    item_id: *item_id,
                    batch_id: *batch_id,
                    quantity: *quantity,
                })
            })
            .collect()
    }
}

/// Default FEFO proposal.
///
/// Each item walks the batches of its product in ledger order and takes
/// `min(remaining, available)` from each until satisfied. Stock taken by an
/// earlier item is not offered again to a later item of the same product.
/// Every candidate batch appears in the result, with an explicit 0 once the
/// item is satisfied. An item whose product has too little stock gets a
/// partial proposal; `validate` reports it as `Incomplete`.
pub fn propose_default(items: &[LineItem], batches: &[Batch]) -> AllocationPlan {
    let mut by_product: HashMap<Uuid, Vec<Batch>> = HashMap::new();
    for batch in batches {
        by_product
            .entry(batch.product_id)
            .or_default()
            .push(batch.clone());
    }
    for candidates in by_product.values_mut() {
        sort_fefo(candidates);
    }

    let mut remaining_stock: HashMap<Uuid, i32> = batches
        .iter()
        .map(|b| (b.id, b.quantity_available.max(0)))
        .collect();

    let mut plan = AllocationPlan::new();
    for item in items {
        let mut outstanding = item.quantity_requested.max(0);
        plan.items.entry(item.item_id).or_default();

        let Some(candidates) = by_product.get(&item.product_id) else {
            continue;
        };
        for batch in candidates {
            let left = remaining_stock.entry(batch.id).or_insert(0);
            let take = outstanding.min(*left);
            *left -= take;
            outstanding -= take;
            plan.set(item.item_id, batch.id, take);
        }
    }
    plan
}

/// Check that the plan only references the request's items and batches that
/// hold the item's product. Does not look at sums or stock.
pub fn validate_shape(
    items: &[LineItem],
    batches: &[Batch],
    plan: &AllocationPlan,
) -> Result<(), AllocationError> {
    let products: HashMap<Uuid, Uuid> = items.iter().map(|i| (i.item_id, i.product_id)).collect();
    let batch_products: HashMap<Uuid, Uuid> = batches.iter().map(|b| (b.id, b.product_id)).collect();

    for (item_id, assigned) in &plan.items {
        let product_id = products.get(item_id).ok_or_else(|| {
            AllocationError::InvalidAssignment(format!("item {} is not part of this request", item_id))
        })?;
        for (batch_id, quantity) in assigned {
            if *quantity < 0 {
                return Err(AllocationError::InvalidAssignment(format!(
                    "quantity for item {} on batch {} is negative",
                    item_id, batch_id
                )));
            }
            match batch_products.get(batch_id) {
                Some(batch_product) if batch_product == product_id => {}
                Some(_) => {
                    return Err(AllocationError::InvalidAssignment(format!(
                        "batch {} does not hold the product of item {}",
                        batch_id, item_id
                    )))
                }
                None => {
                    return Err(AllocationError::InvalidAssignment(format!(
                        "batch {} does not exist",
                        batch_id
                    )))
                }
            }
        }
    }
    Ok(())
}

/// Validate a plan against a ledger snapshot.
///
/// Every item must be assigned exactly its requested quantity (`Incomplete`
/// otherwise, checked in line-item order), then no batch may be assigned more
/// than it holds (`Overallocated`, checked by ascending batch id).
pub fn validate(
    items: &[LineItem],
    batches: &[Batch],
    plan: &AllocationPlan,
) -> Result<(), AllocationError> {
    validate_shape(items, batches, plan)?;

    for item in items {
        let assigned = plan.item_total(item.item_id);
        let requested = i64::from(item.quantity_requested);
        if assigned != requested {
            return Err(AllocationError::Incomplete {
                item_id: item.item_id,
                requested,
                assigned,
            });
        }
    }

    let available: HashMap<Uuid, i64> = batches
        .iter()
        .map(|b| (b.id, i64::from(b.quantity_available)))
        .collect();
    for (batch_id, assigned) in plan.batch_totals() {
        let stock = available.get(&batch_id).copied().unwrap_or(0);
        if assigned > stock {
            return Err(AllocationError::Overallocated {
                batch_id,
                assigned,
                available: stock,
            });
        }
    }
    Ok(())
}

/// Plan an accept commits: the stored draft, or a fresh FEFO default when
/// there is none, validated against the pre-commit snapshot.
pub fn plan_for_accept(
    items: &[LineItem],
    snapshot: &[Batch],
    draft: &[BatchAssignment],
) -> Result<AllocationPlan, AllocationError> {
    let plan = if draft.is_empty() {
        propose_default(items, snapshot)
    } else {
        AllocationPlan::from_assignments(draft)?
    };
    validate(items, snapshot, &plan)?;
    Ok(plan)
}

/// Commit-time check against batches re-read under lock.
///
/// Returns one reservation per batch actually drawn from, by ascending id.
/// A shortfall here means another commit consumed the stock after `validate`
/// ran, so it is reported as `InsufficientStock` rather than `Overallocated`.
pub fn reserve(locked: &[Batch], plan: &AllocationPlan) -> Result<Vec<Reservation>, AllocationError> {
    let available: HashMap<Uuid, i32> = locked.iter().map(|b| (b.id, b.quantity_available)).collect();

    let mut reservations = Vec::new();
    for (batch_id, requested) in plan.batch_totals() {
        if requested == 0 {
            continue;
        }
        let stock = available.get(&batch_id).copied().unwrap_or(0);
        if requested > i64::from(stock) {
            return Err(AllocationError::InsufficientStock {
                batch_id,
                requested,
                available: i64::from(stock),
            });
        }
        let quantity = i32::try_from(requested).map_err(|_| {
            AllocationError::InvalidAssignment(format!("quantity for batch {} is too large", batch_id))
        })?;
        reservations.push(Reservation { batch_id, quantity });
    }
    Ok(reservations)
}

/// In-memory model of the ledger's guarded decrement, for callers that hold
/// batches in memory rather than in storage (the test harnesses). Checks
/// every reservation before applying any of them.
pub fn apply_reservations(
    batches: &mut [Batch],
    reservations: &[Reservation],
) -> Result<(), AllocationError> {
    let wanted: HashSet<Uuid> = reservations.iter().map(|r| r.batch_id).collect();
    for r in reservations {
        let batch = batches
            .iter()
            .find(|b| b.id == r.batch_id)
            .ok_or(AllocationError::InsufficientStock {
                batch_id: r.batch_id,
                requested: i64::from(r.quantity),
                available: 0,
            })?;
        if batch.quantity_available < r.quantity {
            return Err(AllocationError::InsufficientStock {
                batch_id: r.batch_id,
                requested: i64::from(r.quantity),
                available: i64::from(batch.quantity_available),
            });
        }
    }
    for batch in batches.iter_mut().filter(|b| wanted.contains(&b.id)) {
        let taken: i32 = reservations
            .iter()
            .filter(|r| r.batch_id == batch.id)
            .map(|r| r.quantity)
            .sum();
        batch.quantity_available -= taken;
    }
    Ok(())
}
