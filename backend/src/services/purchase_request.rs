//! Purchase request lifecycle: checkout, review drafts, accept and deny
//!
//! Accepting a request is the only operation that moves stock. It runs as a
//! single transaction: lock the request, validate the plan against a fresh
//! snapshot, lock the drawn batches, re-check them and decrement. Any failure
//! rolls the whole thing back, so a request is either accepted with every
//! decrement applied or still pending with the ledger untouched.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    allocation, validation, AllocationPlan, BatchAssignment, CandidateBatch, Entity, ItemDetail,
    LineItem, PaginatedResponse, Pagination, PurchaseRequest, RequestDetails, RequestStatus,
    TransitionError,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::{decode_status, LedgerService};
use crate::error::{AppError, AppResult};
use crate::retry::{with_retry, RetryConfig};

/// Purchase request service
#[derive(Clone)]
pub struct PurchaseRequestService {
    db: PgPool,
    retry: RetryConfig,
}

/// Input for submitting a purchase request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseRequestInput {
    #[serde(alias = "userID")]
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "A purchase request needs at least one item"))]
    pub items: Vec<PurchaseItemInput>,
}

/// Requested product/quantity pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItemInput {
    #[serde(alias = "productID")]
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Draft assignment payload from a reviewer
#[derive(Debug, Deserialize)]
pub struct AssignBatchesInput {
    pub batches: Vec<BatchAssignment>,
}

#[derive(Debug, FromRow)]
struct RequestRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    request_id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity_requested: i32,
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    request_id: Uuid,
    item_id: Uuid,
    batch_id: Uuid,
    quantity: i32,
}

impl From<AssignmentRow> for BatchAssignment {
    fn from(row: AssignmentRow) -> Self {
        BatchAssignment {
            item_id: row.item_id,
            batch_id: row.batch_id,
            quantity: row.quantity,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProductNameRow {
    id: Uuid,
    name: String,
}

impl PurchaseRequestService {
    /// Create a new PurchaseRequestService instance
    pub fn new(db: PgPool, retry: RetryConfig) -> Self {
        Self { db, retry }
    }

    /// Submit a new request. Starts `pending`.
    pub async fn create(&self, input: CreatePurchaseRequestInput) -> AppResult<PurchaseRequest> {
        input.validate()?;

        let pairs: Vec<(Uuid, i32)> = input.items.iter().map(|i| (i.product_id, i.quantity)).collect();
        validation::validate_line_items(&pairs).map_err(|message| AppError::Validation {
            field: "items".to_string(),
            message: message.to_string(),
        })?;

        let product_ids: Vec<Uuid> = input.items.iter().map(|i| i.product_id).collect();
        let names: HashMap<Uuid, String> = sqlx::query_as::<_, ProductNameRow>(
            "SELECT id, name FROM products WHERE id = ANY($1)",
        )
        .bind(&product_ids)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|r| (r.id, r.name))
        .collect();

        if let Some(missing) = product_ids.iter().find(|id| !names.contains_key(id)) {
            return Err(AppError::Validation {
                field: "items".to_string(),
                message: format!("Unknown product {}", missing),
            });
        }

        let mut tx = self.db.begin().await?;

        let request = sqlx::query_as::<_, RequestRow>(
            r#"
            INSERT INTO purchase_requests (user_id, status)
            VALUES ($1, $2)
            RETURNING id, user_id, status, created_at, resolved_at
            "#,
        )
        .bind(input.user_id)
        .bind(RequestStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(input.items.len());
        for (position, item) in input.items.iter().enumerate() {
            let product_name = names.get(&item.product_id).cloned().unwrap_or_default();
            let item_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO purchase_items (request_id, position, product_id, product_name, quantity_requested)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(request.id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(&product_name)
            .bind(item.quantity)
            .fetch_one(&mut *tx)
            .await?;

            items.push(LineItem {
                item_id,
                product_id: item.product_id,
                product_name,
                quantity_requested: item.quantity,
            });
        }

        tx.commit().await?;

        tracing::info!(request_id = %request.id, user_id = %request.user_id, items = items.len(), "Purchase request created");

        Ok(PurchaseRequest {
            id: request.id,
            user_id: request.user_id,
            status: RequestStatus::Pending,
            items,
            assignments: Vec::new(),
            created_at: request.created_at,
            resolved_at: None,
        })
    }

    /// All requests, newest first
    pub async fn list(&self, pagination: &Pagination) -> AppResult<PaginatedResponse<PurchaseRequest>> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM purchase_requests")
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, user_id, status, created_at, resolved_at
            FROM purchase_requests
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let requests = self.assemble(rows).await?;
        Ok(PaginatedResponse::new(requests, pagination, total.max(0) as u64))
    }

    /// Requests submitted by one user, newest first
    pub async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PurchaseRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, user_id, status, created_at, resolved_at
            FROM purchase_requests
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        self.assemble(rows).await
    }

    /// Get a request with its items and committed assignments
    pub async fn get(&self, request_id: Uuid) -> AppResult<PurchaseRequest> {
        let row = sqlx::query_as::<_, RequestRow>(
            "SELECT id, user_id, status, created_at, resolved_at FROM purchase_requests WHERE id = $1",
        )
        .bind(request_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase request".to_string()))?;

        self.assemble(vec![row])
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound("Purchase request".to_string()))
    }

    /// Review view: every line item with its candidate batches in FEFO order,
    /// the default proposal and the stored draft side by side.
    ///
    /// For a resolved request the proposal is computed against current stock
    /// and is informational only.
    pub async fn details(&self, request_id: Uuid) -> AppResult<RequestDetails> {
        let mut conn = self.db.acquire().await?;

        let status = read_status(&mut conn, request_id, false).await?;
        let items = load_items(&mut conn, request_id).await?;
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let batches = LedgerService::candidate_batches(&mut conn, &product_ids).await?;
        let draft = load_assignments(&mut conn, "draft_assignments", &[request_id]).await?;

        let proposal = allocation::propose_default(&items, &batches);
        let draft_plan = AllocationPlan::from_assignments(&draft)?;

        let items = items
            .into_iter()
            .map(|item| {
                let candidates = batches
                    .iter()
                    .filter(|b| b.product_id == item.product_id)
                    .map(|b| CandidateBatch {
                        batch_id: b.id,
                        quantity_available: b.quantity_available,
                        expiration_date: b.expiration_date,
                        proposed_quantity: proposal.quantity(item.item_id, b.id).unwrap_or(0),
                        draft_quantity: draft_plan.quantity(item.item_id, b.id),
                    })
                    .collect();
                ItemDetail {
                    item_id: item.item_id,
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity_requested: item.quantity_requested,
                    batches: candidates,
                }
            })
            .collect();

        Ok(RequestDetails {
            request_id,
            status,
            has_draft: !draft.is_empty(),
            items,
        })
    }

    /// Store a reviewer's draft, replacing any previous one.
    ///
    /// Only the shape is checked here; sums and stock are checked at accept
    /// time against the ledger as it is then.
    pub async fn assign_batches(
        &self,
        request_id: Uuid,
        input: AssignBatchesInput,
    ) -> AppResult<Vec<BatchAssignment>> {
        for assignment in &input.batches {
            validation::validate_assigned_quantity(assignment.quantity).map_err(|message| {
                AppError::Validation {
                    field: "batches".to_string(),
                    message: message.to_string(),
                }
            })?;
        }
        let plan = AllocationPlan::from_assignments(&input.batches)?;

        let mut tx = self.db.begin().await?;

        let status = read_status(&mut tx, request_id, true).await?;
        if status != RequestStatus::Pending {
            return Err(TransitionError::new(Entity::PurchaseRequest, status.as_str(), "draft")
                .with_reason("request is already resolved")
                .into());
        }

        let items = load_items(&mut tx, request_id).await?;
        let referenced: Vec<Uuid> = input
            .batches
            .iter()
            .map(|a| a.batch_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let batches = LedgerService::batches_by_id(&mut tx, &referenced).await?;
        allocation::validate_shape(&items, &batches, &plan)?;

        sqlx::query("DELETE FROM draft_assignments WHERE request_id = $1")
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

        let stored = plan.assignments();
        insert_assignments(&mut tx, "draft_assignments", request_id, &stored).await?;

        tx.commit().await?;

        tracing::info!(%request_id, assignments = stored.len(), "Draft assignment stored");
        Ok(stored)
    }

    /// Accept a pending request, reserving stock for every line item.
    ///
    /// Uses the stored draft when there is one, otherwise a fresh FEFO
    /// proposal. Serialization failures from concurrent commits are retried
    /// with backoff; each attempt starts from a clean transaction.
    pub async fn accept(&self, request_id: Uuid) -> AppResult<PurchaseRequest> {
        let result = with_retry(&self.retry, || self.try_accept(request_id)).await;

        if let Err(ref err) = result {
            tracing::warn!(%request_id, kind = ?err.kind(), error = %err, "Purchase request not accepted");
        }
        result
    }

    async fn try_accept(&self, request_id: Uuid) -> AppResult<PurchaseRequest> {
        let mut tx = self.db.begin().await?;

        let status = read_status(&mut tx, request_id, true).await?;
        status.transition(RequestStatus::Accepted)?;

        let items = load_items(&mut tx, request_id).await?;
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let snapshot = LedgerService::candidate_batches(&mut tx, &product_ids).await?;

        let draft = load_assignments(&mut tx, "draft_assignments", &[request_id]).await?;
        let plan = allocation::plan_for_accept(&items, &snapshot, &draft)?;

        let locked = LedgerService::lock_batches(&mut tx, &plan.drawn_batch_ids()).await?;
        let reservations = allocation::reserve(&locked, &plan)?;
        for reservation in &reservations {
            LedgerService::reserve(&mut tx, reservation.batch_id, reservation.quantity).await?;
        }

        let row = resolve(&mut tx, request_id, RequestStatus::Accepted).await?;

        let committed = committed_assignments(&items, &plan);
        insert_assignments(&mut tx, "committed_assignments", request_id, &committed).await?;

        tx.commit().await?;

        tracing::info!(
            %request_id,
            batches = reservations.len(),
            from_draft = !draft.is_empty(),
            "Purchase request accepted"
        );

        into_request(row, items, committed)
    }

    /// Deny a pending request. The ledger is not touched.
    pub async fn deny(&self, request_id: Uuid) -> AppResult<PurchaseRequest> {
        let mut tx = self.db.begin().await?;

        let status = read_status(&mut tx, request_id, true).await?;
        status.transition(RequestStatus::Denied)?;

        let items = load_items(&mut tx, request_id).await?;
        let row = resolve(&mut tx, request_id, RequestStatus::Denied).await?;

        tx.commit().await?;

        tracing::info!(%request_id, "Purchase request denied");
        into_request(row, items, Vec::new())
    }

    /// Attach items and committed assignments to request rows, keeping row order
    async fn assemble(&self, rows: Vec<RequestRow>) -> AppResult<Vec<PurchaseRequest>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut conn = self.db.acquire().await?;

        let mut items: HashMap<Uuid, Vec<LineItem>> = HashMap::new();
        for row in load_item_rows(&mut conn, &ids).await? {
            items.entry(row.request_id).or_default().push(LineItem {
                item_id: row.id,
                product_id: row.product_id,
                product_name: row.product_name,
                quantity_requested: row.quantity_requested,
            });
        }

        let mut assignments: HashMap<Uuid, Vec<BatchAssignment>> = HashMap::new();
        for row in load_assignment_rows(&mut conn, "committed_assignments", &ids).await? {
            assignments.entry(row.request_id).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let request_items = items.remove(&row.id).unwrap_or_default();
                let committed = assignments.remove(&row.id).unwrap_or_default();
                into_request(row, request_items, committed)
            })
            .collect()
    }
}

fn into_request(
    row: RequestRow,
    items: Vec<LineItem>,
    assignments: Vec<BatchAssignment>,
) -> AppResult<PurchaseRequest> {
    Ok(PurchaseRequest {
        id: row.id,
        user_id: row.user_id,
        status: decode_status(&row.status, RequestStatus::from_str, "request status")?,
        items,
        assignments,
        created_at: row.created_at,
        resolved_at: row.resolved_at,
    })
}

/// Rows drawing stock, in line-item order then batch id
fn committed_assignments(items: &[LineItem], plan: &AllocationPlan) -> Vec<BatchAssignment> {
    let position: HashMap<Uuid, usize> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.item_id, i))
        .collect();

    let mut committed: Vec<BatchAssignment> =
        plan.assignments().into_iter().filter(|a| a.quantity > 0).collect();
    committed.sort_by_key(|a| (position.get(&a.item_id).copied().unwrap_or(usize::MAX), a.batch_id));
    committed
}

/// Move a locked pending request to its final status and drop its draft.
/// Returns the updated row so callers answer without re-reading after commit.
async fn resolve(
    conn: &mut PgConnection,
    request_id: Uuid,
    status: RequestStatus,
) -> AppResult<RequestRow> {
    let row = sqlx::query_as::<_, RequestRow>(
        r#"
        UPDATE purchase_requests
        SET status = $1, resolved_at = NOW()
        WHERE id = $2
        RETURNING id, user_id, status, created_at, resolved_at
        "#,
    )
    .bind(status.as_str())
    .bind(request_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM draft_assignments WHERE request_id = $1")
        .bind(request_id)
        .execute(&mut *conn)
        .await?;

    Ok(row)
}

/// Read a request's status, optionally locking the row until the
/// transaction ends
async fn read_status(
    conn: &mut PgConnection,
    request_id: Uuid,
    for_update: bool,
) -> AppResult<RequestStatus> {
    let sql = if for_update {
        "SELECT status FROM purchase_requests WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT status FROM purchase_requests WHERE id = $1"
    };

    let status = sqlx::query_scalar::<_, String>(sql)
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase request".to_string()))?;

    decode_status(&status, RequestStatus::from_str, "request status")
}

/// Line items of one request in checkout order
pub(crate) async fn load_items(conn: &mut PgConnection, request_id: Uuid) -> AppResult<Vec<LineItem>> {
    Ok(load_item_rows(conn, &[request_id])
        .await?
        .into_iter()
        .map(|row| LineItem {
            item_id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity_requested: row.quantity_requested,
        })
        .collect())
}

async fn load_item_rows(conn: &mut PgConnection, request_ids: &[Uuid]) -> AppResult<Vec<ItemRow>> {
    let rows = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT id, request_id, product_id, product_name, quantity_requested
        FROM purchase_items
        WHERE request_id = ANY($1)
        ORDER BY request_id, position
        "#,
    )
    .bind(request_ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Assignments of one or more requests from `draft_assignments` or
/// `committed_assignments`
pub(crate) async fn load_assignments(
    conn: &mut PgConnection,
    table: &'static str,
    request_ids: &[Uuid],
) -> AppResult<Vec<BatchAssignment>> {
    Ok(load_assignment_rows(conn, table, request_ids)
        .await?
        .into_iter()
        .map(BatchAssignment::from)
        .collect())
}

async fn load_assignment_rows(
    conn: &mut PgConnection,
    table: &'static str,
    request_ids: &[Uuid],
) -> AppResult<Vec<AssignmentRow>> {
    let sql = format!(
        r#"
        SELECT a.request_id, a.item_id, a.batch_id, a.quantity
        FROM {} a
        JOIN purchase_items i ON i.id = a.item_id
        WHERE a.request_id = ANY($1)
        ORDER BY i.position, a.batch_id
        "#,
        table
    );

    let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
        .bind(request_ids)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows)
}

async fn insert_assignments(
    conn: &mut PgConnection,
    table: &'static str,
    request_id: Uuid,
    assignments: &[BatchAssignment],
) -> AppResult<()> {
    let sql = format!(
        "INSERT INTO {} (request_id, item_id, batch_id, quantity) VALUES ($1, $2, $3, $4)",
        table
    );

    for assignment in assignments {
        sqlx::query(&sql)
            .bind(request_id)
            .bind(assignment.item_id)
            .bind(assignment.batch_id)
            .bind(assignment.quantity)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i32) -> LineItem {
        LineItem {
            item_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Widget".to_string(),
            quantity_requested: quantity,
        }
    }

    #[test]
    fn test_checkout_needs_at_least_one_item() {
        let empty = CreatePurchaseRequestInput {
            user_id: Uuid::new_v4(),
            items: vec![],
        };
        assert!(empty.validate().is_err());

        let one = CreatePurchaseRequestInput {
            user_id: Uuid::new_v4(),
            items: vec![PurchaseItemInput {
                product_id: Uuid::new_v4(),
                quantity: 1,
            }],
        };
        assert!(one.validate().is_ok());
    }

    #[test]
    fn test_accepted_request_is_built_from_the_committed_row() {
        let items = vec![item(3)];
        let assignments = vec![BatchAssignment {
            item_id: items[0].item_id,
            batch_id: Uuid::new_v4(),
            quantity: 3,
        }];
        let row = RequestRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: "accepted".to_string(),
            created_at: Utc::now(),
            resolved_at: Some(Utc::now()),
        };
        let id = row.id;

        let request = into_request(row, items.clone(), assignments.clone()).unwrap();
        assert_eq!(request.id, id);
        assert_eq!(request.status, RequestStatus::Accepted);
        assert_eq!(request.items, items);
        assert_eq!(request.assignments, assignments);
        assert!(request.resolved_at.is_some());
    }

    #[test]
    fn test_unknown_stored_status_is_rejected() {
        let row = RequestRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: "shipped".to_string(),
            created_at: Utc::now(),
            resolved_at: None,
        };
        assert!(into_request(row, vec![], vec![]).is_err());
    }

    #[test]
    fn test_committed_rows_skip_zero_and_follow_item_order() {
        let items = vec![item(2), item(1)];
        let (first, second) = (items[0].item_id, items[1].item_id);
        let batch = Uuid::new_v4();
        let plan = AllocationPlan::from_assignments(&[
            BatchAssignment { item_id: second, batch_id: batch, quantity: 1 },
            BatchAssignment { item_id: first, batch_id: batch, quantity: 2 },
            BatchAssignment { item_id: first, batch_id: Uuid::new_v4(), quantity: 0 },
        ])
        .unwrap();

        let committed = committed_assignments(&items, &plan);
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].item_id, first);
        assert_eq!(committed[1].item_id, second);
    }
}
