//! HTTP handlers for report (rapport) endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::Report;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::report::{
    CreateReportInput, ReportStatusUpdate, RespondReportInput, UpdateReportStatusInput,
};
use crate::services::ReportService;
use crate::AppState;

/// Query for a worker's reports
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReportQuery {
    #[serde(alias = "workerID")]
    pub worker_id: Uuid,
}

/// Submit a report
pub async fn create_report(
    State(state): State<AppState>,
    Json(input): Json<CreateReportInput>,
) -> AppResult<(StatusCode, Json<Report>)> {
    let service = ReportService::new(state.db);
    let report = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// List all reports
pub async fn list_reports(State(state): State<AppState>) -> AppResult<Json<Vec<Report>>> {
    let service = ReportService::new(state.db);
    let reports = service.list_all().await?;
    Ok(Json(reports))
}

/// List a worker's reports
pub async fn list_worker_reports(
    State(state): State<AppState>,
    Query(query): Query<WorkerReportQuery>,
) -> AppResult<Json<Vec<Report>>> {
    let service = ReportService::new(state.db);
    let reports = service.list_by_worker(query.worker_id).await?;
    Ok(Json(reports))
}

/// Accept or deny a report
pub async fn update_report_status(
    State(state): State<AppState>,
    Path(report_id): Path<Uuid>,
    Json(input): Json<UpdateReportStatusInput>,
) -> AppResult<Json<ReportStatusUpdate>> {
    let service = ReportService::new(state.db);
    let update = service.update_status(report_id, input).await?;
    Ok(Json(update))
}

/// Respond to a text report
pub async fn respond_report(
    State(state): State<AppState>,
    Path(report_id): Path<Uuid>,
    Json(input): Json<RespondReportInput>,
) -> AppResult<Json<Report>> {
    let service = ReportService::new(state.db);
    let report = service.respond(report_id, input).await?;
    Ok(Json(report))
}
