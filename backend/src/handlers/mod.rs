//! HTTP handlers for the fulfillment API

pub mod delivery;
pub mod health;
pub mod inventory;
pub mod purchase_request;
pub mod report;
pub mod task;

pub use delivery::*;
pub use health::*;
pub use inventory::*;
pub use purchase_request::*;
pub use report::*;
pub use task::*;
