//! HTTP handlers for supplier delivery ("ordered products") endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::SupplierDelivery;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::delivery::CreateDeliveryInput;
use crate::services::DeliveryService;
use crate::AppState;

/// Order a product from a supplier
pub async fn create_delivery(
    State(state): State<AppState>,
    Json(input): Json<CreateDeliveryInput>,
) -> AppResult<(StatusCode, Json<SupplierDelivery>)> {
    let service = DeliveryService::new(state.db);
    let delivery = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

/// List deliveries still expected
pub async fn list_pending_deliveries(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<SupplierDelivery>>> {
    let service = DeliveryService::new(state.db);
    let deliveries = service.list_pending().await?;
    Ok(Json(deliveries))
}

/// Get a delivery by ID
pub async fn get_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
) -> AppResult<Json<SupplierDelivery>> {
    let service = DeliveryService::new(state.db);
    let delivery = service.get(delivery_id).await?;
    Ok(Json(delivery))
}

/// Cancel a pending delivery
pub async fn cancel_delivery(
    State(state): State<AppState>,
    Path(delivery_id): Path<Uuid>,
) -> AppResult<Json<SupplierDelivery>> {
    let service = DeliveryService::new(state.db);
    let delivery = service.cancel(delivery_id).await?;
    Ok(Json(delivery))
}
