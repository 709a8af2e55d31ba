//! Business logic services for the fulfillment engine

pub mod delivery;
pub mod dispatcher;
pub mod ledger;
pub mod purchase_request;
pub mod report;

pub use delivery::DeliveryService;
pub use dispatcher::TaskDispatcher;
pub use ledger::LedgerService;
pub use purchase_request::PurchaseRequestService;
pub use report::ReportService;

use crate::error::{AppError, AppResult};

/// Decode a status column written by this service
pub(crate) fn decode_status<T>(value: &str, parse: fn(&str) -> Option<T>, what: &str) -> AppResult<T> {
    parse(value).ok_or_else(|| AppError::Internal(format!("Unknown {} '{}' in storage", what, value)))
}
