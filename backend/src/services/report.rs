//! Worker reports (rapports) and their admin review
//!
//! Accepting a delivery report dispatches the unload task in the same
//! transaction; if dispatch fails the report stays pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{validation, DeliveryStatus, Report, ReportStatus, ReportType, WorkerTask};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{decode_status, DeliveryService, TaskDispatcher};
use crate::error::{AppError, AppResult};

/// Report service
#[derive(Clone)]
pub struct ReportService {
    db: PgPool,
}

/// Input for submitting a report
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportInput {
    #[serde(alias = "workerID")]
    pub worker_id: Uuid,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub content: Option<String>,
    #[serde(alias = "deliveryID")]
    pub delivery_id: Option<Uuid>,
}

/// Input for an admin decision on a report
#[derive(Debug, Deserialize)]
pub struct UpdateReportStatusInput {
    pub status: String,
}

/// Input for answering a text report
#[derive(Debug, Deserialize)]
pub struct RespondReportInput {
    pub response: String,
}

/// Report after a status change, with the task it dispatched if any
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatusUpdate {
    pub report: Report,
    pub task: Option<WorkerTask>,
}

#[derive(Debug, FromRow)]
struct ReportRow {
    id: Uuid,
    worker_id: Uuid,
    report_type: String,
    content: Option<String>,
    delivery_id: Option<Uuid>,
    status: String,
    response: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for Report {
    type Error = AppError;

    fn try_from(row: ReportRow) -> AppResult<Self> {
        Ok(Report {
            id: row.id,
            worker_id: row.worker_id,
            report_type: decode_status(&row.report_type, ReportType::from_str, "report type")?,
            content: row.content,
            delivery_id: row.delivery_id,
            status: decode_status(&row.status, ReportStatus::from_str, "report status")?,
            response: row.response,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const REPORT_COLUMNS: &str =
    "id, worker_id, report_type, content, delivery_id, status, response, created_at, updated_at";

impl ReportService {
    /// Create a new ReportService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Submit a report. Starts `pending`.
    pub async fn create(&self, input: CreateReportInput) -> AppResult<Report> {
        validation::validate_report_payload(
            input.report_type,
            input.content.as_deref(),
            input.delivery_id,
        )
        .map_err(|message| AppError::Validation {
            field: match input.report_type {
                ReportType::Text => "content".to_string(),
                ReportType::Delivery => "deliveryId".to_string(),
            },
            message: message.to_string(),
        })?;

        if let (ReportType::Delivery, Some(delivery_id)) = (input.report_type, input.delivery_id) {
            let mut conn = self.db.acquire().await?;
            let delivery = DeliveryService::fetch(&mut conn, delivery_id, false).await?;
            if delivery.status != DeliveryStatus::Pending {
                return Err(AppError::Validation {
                    field: "deliveryId".to_string(),
                    message: format!("Delivery {} is already {}", delivery_id, delivery.status.as_str()),
                });
            }
        }

        let content = match input.report_type {
            ReportType::Text => input.content,
            ReportType::Delivery => input.content.filter(|c| !c.trim().is_empty()),
        };

        let sql = format!(
            r#"
            INSERT INTO reports (worker_id, report_type, content, delivery_id, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );

        let row = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(input.worker_id)
            .bind(input.report_type.as_str())
            .bind(&content)
            .bind(input.delivery_id)
            .bind(ReportStatus::Pending.as_str())
            .fetch_one(&self.db)
            .await?;

        tracing::info!(report_id = %row.id, worker_id = %row.worker_id, report_type = %row.report_type, "Report submitted");
        row.try_into()
    }

    /// Every report, newest first
    pub async fn list_all(&self) -> AppResult<Vec<Report>> {
        let sql = format!(
            "SELECT {} FROM reports ORDER BY created_at DESC, id DESC",
            REPORT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(Report::try_from).collect()
    }

    /// Reports submitted by one worker, newest first
    pub async fn list_by_worker(&self, worker_id: Uuid) -> AppResult<Vec<Report>> {
        let sql = format!(
            "SELECT {} FROM reports WHERE worker_id = $1 ORDER BY created_at DESC, id DESC",
            REPORT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(worker_id)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(Report::try_from).collect()
    }

    /// Accept or deny a pending report
    pub async fn update_status(
        &self,
        report_id: Uuid,
        input: UpdateReportStatusInput,
    ) -> AppResult<ReportStatusUpdate> {
        let to = match ReportStatus::from_str(&input.status) {
            Some(status @ (ReportStatus::Accepted | ReportStatus::Denied)) => status,
            _ => {
                return Err(AppError::ValidationError(format!(
                    "Status must be 'accepted' or 'denied', got '{}'",
                    input.status
                )))
            }
        };

        let mut tx = self.db.begin().await?;

        let report = fetch_for_update(&mut tx, report_id).await?;
        let (to, cascade) = report.review(to)?;

        let task = match cascade {
            Some(cascade) => Some(TaskDispatcher::apply_cascade(&mut tx, cascade).await?),
            None => None,
        };

        let report = write_status(&mut tx, report_id, to, None).await?;
        tx.commit().await?;

        tracing::info!(%report_id, status = to.as_str(), dispatched = task.is_some(), "Report reviewed");
        Ok(ReportStatusUpdate { report, task })
    }

    /// Answer a pending text report
    pub async fn respond(&self, report_id: Uuid, input: RespondReportInput) -> AppResult<Report> {
        validation::validate_response_text(&input.response).map_err(|message| {
            AppError::Validation {
                field: "response".to_string(),
                message: message.to_string(),
            }
        })?;

        let mut tx = self.db.begin().await?;

        let report = fetch_for_update(&mut tx, report_id).await?;
        let to = report
            .status
            .transition(report.report_type, ReportStatus::Responded)?;

        let report = write_status(&mut tx, report_id, to, Some(&input.response)).await?;
        tx.commit().await?;

        tracing::info!(%report_id, "Report responded");
        Ok(report)
    }
}

async fn fetch_for_update(conn: &mut PgConnection, report_id: Uuid) -> AppResult<Report> {
    let sql = format!("SELECT {} FROM reports WHERE id = $1 FOR UPDATE", REPORT_COLUMNS);
    sqlx::query_as::<_, ReportRow>(&sql)
        .bind(report_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Report".to_string()))?
        .try_into()
}

async fn write_status(
    conn: &mut PgConnection,
    report_id: Uuid,
    status: ReportStatus,
    response: Option<&str>,
) -> AppResult<Report> {
    let sql = format!(
        r#"
        UPDATE reports
        SET status = $1, response = COALESCE($2, response), updated_at = NOW()
        WHERE id = $3
        RETURNING {}
        "#,
        REPORT_COLUMNS
    );

    sqlx::query_as::<_, ReportRow>(&sql)
        .bind(status.as_str())
        .bind(response)
        .bind(report_id)
        .fetch_one(&mut *conn)
        .await?
        .try_into()
}
