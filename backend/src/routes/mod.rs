//! Route definitions for the fulfillment API

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Inventory ledger
        .nest("/products", product_routes())
        // Purchase request lifecycle
        .nest("/purchase-requests", purchase_request_routes())
        // Supplier deliveries
        .nest("/ordered-products", delivery_routes())
        // Task dispatcher
        .nest("/tasks", task_routes())
        // Reports
        .nest("/rapports", report_routes())
        // Worker-facing views
        .nest("/worker", worker_routes())
}

/// Inventory routes
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/stock", get(handlers::list_stock_levels))
        .route("/:product_id/batches", get(handlers::list_product_batches))
}

/// Purchase request routes
fn purchase_request_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_purchase_requests).post(handlers::create_purchase_request),
        )
        .route("/user/:user_id", get(handlers::list_user_purchase_requests))
        .route("/:request_id", get(handlers::get_purchase_request))
        .route("/:request_id/details", get(handlers::get_purchase_request_details))
        .route("/:request_id/assign-batches", put(handlers::assign_batches).post(handlers::assign_batches))
        .route("/:request_id/accept", post(handlers::accept_purchase_request))
        .route("/:request_id/deny", post(handlers::deny_purchase_request))
}

/// Supplier delivery routes
fn delivery_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_pending_deliveries).post(handlers::create_delivery),
        )
        .route(
            "/:delivery_id",
            get(handlers::get_delivery).delete(handlers::cancel_delivery),
        )
}

/// Task routes
fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_task))
        .route("/:task_id", get(handlers::get_task))
        .route("/:task_id/complete", post(handlers::complete_task))
}

/// Report routes
fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_reports).post(handlers::create_report))
        .route(
            "/:report_id/status",
            post(handlers::update_report_status).put(handlers::update_report_status),
        )
        .route("/:report_id/respond", post(handlers::respond_report))
}

/// Worker-facing routes
fn worker_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(handlers::list_worker_tasks))
        .route("/tasks/:task_id/complete", post(handlers::complete_task))
        .route("/rapports", get(handlers::list_worker_reports))
}
