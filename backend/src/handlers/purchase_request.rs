//! HTTP handlers for purchase request endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{BatchAssignment, PaginatedResponse, Pagination, PurchaseRequest, RequestDetails};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::purchase_request::{AssignBatchesInput, CreatePurchaseRequestInput};
use crate::services::PurchaseRequestService;
use crate::AppState;

fn service(state: &AppState) -> PurchaseRequestService {
    PurchaseRequestService::new(state.db.clone(), state.config.engine.retry_config())
}

/// Submit a purchase request
pub async fn create_purchase_request(
    State(state): State<AppState>,
    Json(input): Json<CreatePurchaseRequestInput>,
) -> AppResult<(StatusCode, Json<PurchaseRequest>)> {
    let request = service(&state).create(input).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// List all purchase requests
pub async fn list_purchase_requests(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<PurchaseRequest>>> {
    let requests = service(&state).list(&pagination).await?;
    Ok(Json(requests))
}

/// List a user's purchase requests
pub async fn list_user_purchase_requests(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<PurchaseRequest>>> {
    let requests = service(&state).list_by_user(user_id).await?;
    Ok(Json(requests))
}

/// Get a purchase request by ID
pub async fn get_purchase_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<PurchaseRequest>> {
    let request = service(&state).get(request_id).await?;
    Ok(Json(request))
}

/// Review view with candidate batches, proposal and draft
pub async fn get_purchase_request_details(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RequestDetails>> {
    let details = service(&state).details(request_id).await?;
    Ok(Json(details))
}

/// Store a draft batch assignment
pub async fn assign_batches(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(input): Json<AssignBatchesInput>,
) -> AppResult<Json<Vec<BatchAssignment>>> {
    let draft = service(&state).assign_batches(request_id, input).await?;
    Ok(Json(draft))
}

/// Accept a purchase request and reserve its stock
pub async fn accept_purchase_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<PurchaseRequest>> {
    let request = service(&state).accept(request_id).await?;
    Ok(Json(request))
}

/// Deny a purchase request
pub async fn deny_purchase_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<PurchaseRequest>> {
    let request = service(&state).deny(request_id).await?;
    Ok(Json(request))
}
