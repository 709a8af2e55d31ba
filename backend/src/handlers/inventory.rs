//! HTTP handlers for inventory ledger endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use shared::{Batch, StockLevel};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::LedgerService;
use crate::AppState;

/// List a product's batches in FEFO order
pub async fn list_product_batches(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Vec<Batch>>> {
    let service = LedgerService::new(state.db);
    let batches = service.list_batches(product_id).await?;
    Ok(Json(batches))
}

/// Available stock per product
pub async fn list_stock_levels(State(state): State<AppState>) -> AppResult<Json<Vec<StockLevel>>> {
    let service = LedgerService::new(state.db);
    let levels = service.stock_levels().await?;
    Ok(Json(levels))
}
