//! Validation utilities for request payloads
//!
//! Structural checks live on the backend input types; these are the domain
//! rules that both the backend and its tests rely on.

use uuid::Uuid;

use crate::models::ReportType;

/// Requested or delivered quantities must be strictly positive
pub fn validate_positive_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be a positive integer");
    }
    Ok(())
}

/// Assigned quantities may be zero but never negative
pub fn validate_assigned_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity < 0 {
        return Err("Assigned quantity cannot be negative");
    }
    Ok(())
}

/// Line items of a new purchase request
pub fn validate_line_items(items: &[(Uuid, i32)]) -> Result<(), &'static str> {
    if items.is_empty() {
        return Err("A purchase request needs at least one item");
    }
    for (_, quantity) in items {
        validate_positive_quantity(*quantity)?;
    }
    Ok(())
}

/// Content rules for a new report
pub fn validate_report_payload(
    report_type: ReportType,
    content: Option<&str>,
    delivery_id: Option<Uuid>,
) -> Result<(), &'static str> {
    match report_type {
        ReportType::Text => match content {
            Some(text) if !text.trim().is_empty() => Ok(()),
            _ => Err("Content required for a text report"),
        },
        ReportType::Delivery => match delivery_id {
            Some(_) => Ok(()),
            None => Err("Delivery ID required for a delivery report"),
        },
    }
}

/// Admin responses cannot be blank
pub fn validate_response_text(response: &str) -> Result<(), &'static str> {
    if response.trim().is_empty() {
        return Err("Response cannot be empty");
    }
    Ok(())
}
