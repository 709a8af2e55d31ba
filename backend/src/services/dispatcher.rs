//! Task dispatcher: turns accepted work into worker tasks and applies their
//! completion effects
//!
//! Unload tasks are created inside the transaction that accepted the
//! delivery report, so a report is never accepted without its task.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{
    request_items, stocked_batch, unload_items, CompletionEffect, DeliveryStatus, ReportCascade,
    RequestStatus, TaskItem, TaskStatus, TaskType, WorkerTask,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::purchase_request::{load_assignments, load_items};
use super::{decode_status, DeliveryService, LedgerService};
use crate::error::{AppError, AppResult};

/// Task dispatcher service
#[derive(Clone)]
pub struct TaskDispatcher {
    db: PgPool,
}

/// Input for creating a task by hand
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskInput {
    #[serde(alias = "workerID")]
    pub worker_id: Uuid,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(alias = "orderId", alias = "orderID")]
    pub delivery_id: Option<Uuid>,
    #[serde(alias = "requestID")]
    pub request_id: Option<Uuid>,
}

/// Query filter for a worker's task list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTaskQuery {
    #[serde(alias = "workerID")]
    pub worker_id: Uuid,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    worker_id: Uuid,
    task_type: String,
    delivery_id: Option<Uuid>,
    request_id: Option<Uuid>,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct TaskItemRow {
    task_id: Uuid,
    product_id: Uuid,
    product_name: String,
    batch_id: Option<Uuid>,
    quantity: i32,
}

const TASK_COLUMNS: &str =
    "id, worker_id, task_type, delivery_id, request_id, status, created_at, completed_at";

impl TaskDispatcher {
    /// Create a new TaskDispatcher instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Run the side effect of a report transition inside its transaction
    pub(crate) async fn apply_cascade(
        conn: &mut PgConnection,
        cascade: ReportCascade,
    ) -> AppResult<WorkerTask> {
        match cascade {
            ReportCascade::DispatchUnload {
                delivery_id,
                worker_id,
            } => Self::dispatch_unload(conn, delivery_id, worker_id).await,
        }
    }

    /// Create the unload task for a pending delivery and mark the delivery
    /// fulfilled. A second dispatch for the same delivery fails because the
    /// delivery is no longer pending.
    pub(crate) async fn dispatch_unload(
        conn: &mut PgConnection,
        delivery_id: Uuid,
        worker_id: Uuid,
    ) -> AppResult<WorkerTask> {
        let delivery = DeliveryService::fetch(conn, delivery_id, true).await?;
        let status = delivery.status.transition(DeliveryStatus::Fulfilled)?;

        let task = insert_task(
            conn,
            worker_id,
            TaskType::Unload,
            Some(delivery_id),
            None,
            unload_items(&delivery),
        )
        .await?;

        DeliveryService::set_status(conn, delivery_id, status).await?;

        tracing::info!(task_id = %task.task_id, %delivery_id, %worker_id, "Unload task dispatched");
        Ok(task)
    }

    /// Create a task on behalf of an admin
    pub async fn create_task(&self, input: CreateTaskInput) -> AppResult<WorkerTask> {
        let mut tx = self.db.begin().await?;

        let task = if input.task_type.references_delivery() {
            let delivery_id = input.delivery_id.ok_or_else(|| AppError::Validation {
                field: "deliveryId".to_string(),
                message: "Delivery ID required for an unload task".to_string(),
            })?;
            Self::dispatch_unload(&mut tx, delivery_id, input.worker_id).await?
        } else {
            let request_id = input.request_id.ok_or_else(|| AppError::Validation {
                field: "requestId".to_string(),
                message: format!("Request ID required for a {} task", input.task_type.as_str()),
            })?;

            let status = sqlx::query_scalar::<_, String>(
                "SELECT status FROM purchase_requests WHERE id = $1",
            )
            .bind(request_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase request".to_string()))?;

            if decode_status(&status, RequestStatus::from_str, "request status")? != RequestStatus::Accepted {
                return Err(AppError::Validation {
                    field: "requestId".to_string(),
                    message: "Tasks can only be created for accepted requests".to_string(),
                });
            }

            let items = load_items(&mut tx, request_id).await?;
            let committed = load_assignments(&mut tx, "committed_assignments", &[request_id]).await?;
            let task = insert_task(
                &mut tx,
                input.worker_id,
                input.task_type,
                None,
                Some(request_id),
                request_items(&items, &committed),
            )
            .await?;

            tracing::info!(task_id = %task.task_id, %request_id, task_type = task.task_type.as_str(), "Task created");
            task
        };

        tx.commit().await?;
        Ok(task)
    }

    /// Tasks assigned to a worker, open ones by default
    pub async fn list_worker_tasks(&self, query: WorkerTaskQuery) -> AppResult<Vec<WorkerTask>> {
        let status = query.status.unwrap_or(TaskStatus::Open);
        let sql = format!(
            "SELECT {} FROM worker_tasks WHERE worker_id = $1 AND status = $2 ORDER BY created_at, id",
            TASK_COLUMNS
        );

        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(query.worker_id)
            .bind(status.as_str())
            .fetch_all(&self.db)
            .await?;

        let mut conn = self.db.acquire().await?;
        assemble(&mut conn, rows).await
    }

    /// Get a task by id
    pub async fn get(&self, task_id: Uuid) -> AppResult<WorkerTask> {
        let mut conn = self.db.acquire().await?;
        fetch_task(&mut conn, task_id, false).await
    }

    /// Mark a task complete.
    ///
    /// Completing an unload task moves the delivered quantity into a new
    /// batch. Repeating the call returns the task unchanged and has no
    /// further effect.
    pub async fn complete_task(&self, task_id: Uuid) -> AppResult<WorkerTask> {
        let mut tx = self.db.begin().await?;

        let task = fetch_task(&mut tx, task_id, true).await?;
        let Some(effect) = task.completion_effect() else {
            tracing::debug!(%task_id, "Task already complete");
            return Ok(task);
        };

        if let CompletionEffect::StockDelivery { delivery_id } = effect {
            let delivery = DeliveryService::fetch(&mut tx, delivery_id, true).await?;
            let batch = LedgerService::create_batch(&mut tx, &stocked_batch(&delivery)).await?;

            DeliveryService::set_batch(&mut tx, delivery_id, batch.id).await?;

            sqlx::query("UPDATE task_items SET batch_id = $1 WHERE task_id = $2 AND batch_id IS NULL")
                .bind(batch.id)
                .bind(task_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE worker_tasks SET status = $1, completed_at = NOW() WHERE id = $2")
            .bind(TaskStatus::Complete.as_str())
            .bind(task_id)
            .execute(&mut *tx)
            .await?;

        let completed = fetch_task(&mut tx, task_id, false).await?;
        tx.commit().await?;

        tracing::info!(%task_id, task_type = completed.task_type.as_str(), "Task completed");
        Ok(completed)
    }
}

async fn insert_task(
    conn: &mut PgConnection,
    worker_id: Uuid,
    task_type: TaskType,
    delivery_id: Option<Uuid>,
    request_id: Option<Uuid>,
    items: Vec<TaskItem>,
) -> AppResult<WorkerTask> {
    let sql = format!(
        r#"
        INSERT INTO worker_tasks (worker_id, task_type, delivery_id, request_id, status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        TASK_COLUMNS
    );

    let row = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(worker_id)
        .bind(task_type.as_str())
        .bind(delivery_id)
        .bind(request_id)
        .bind(TaskStatus::Open.as_str())
        .fetch_one(&mut *conn)
        .await?;

    for (position, item) in items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO task_items (task_id, position, product_id, product_name, batch_id, quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(row.id)
        .bind(position as i32)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(item.batch_id)
        .bind(item.quantity)
        .execute(&mut *conn)
        .await?;
    }

    into_task(row, items)
}

async fn fetch_task(conn: &mut PgConnection, task_id: Uuid, for_update: bool) -> AppResult<WorkerTask> {
    let sql = format!(
        "SELECT {} FROM worker_tasks WHERE id = $1{}",
        TASK_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );

    let row = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(task_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Task".to_string()))?;

    assemble(conn, vec![row])
        .await?
        .pop()
        .ok_or_else(|| AppError::NotFound("Task".to_string()))
}

async fn assemble(conn: &mut PgConnection, rows: Vec<TaskRow>) -> AppResult<Vec<WorkerTask>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let item_rows = sqlx::query_as::<_, TaskItemRow>(
        r#"
        SELECT task_id, product_id, product_name, batch_id, quantity
        FROM task_items
        WHERE task_id = ANY($1)
        ORDER BY task_id, position
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut items: HashMap<Uuid, Vec<TaskItem>> = HashMap::new();
    for row in item_rows {
        items.entry(row.task_id).or_default().push(TaskItem {
            product_id: row.product_id,
            product_name: row.product_name,
            batch_id: row.batch_id,
            quantity: row.quantity,
        });
    }

    rows.into_iter()
        .map(|row| {
            let task_items = items.remove(&row.id).unwrap_or_default();
            into_task(row, task_items)
        })
        .collect()
}

fn into_task(row: TaskRow, items: Vec<TaskItem>) -> AppResult<WorkerTask> {
    Ok(WorkerTask {
        task_id: row.id,
        worker_id: row.worker_id,
        task_type: decode_status(&row.task_type, TaskType::from_str, "task type")?,
        delivery_id: row.delivery_id,
        request_id: row.request_id,
        status: decode_status(&row.status, TaskStatus::from_str, "task status")?,
        items,
        created_at: row.created_at,
        completed_at: row.completed_at,
    })
}
