//! Domain models for the Storefront Fulfillment Engine

mod batch;
mod delivery;
mod purchase_request;
mod report;
mod task;
mod transition;

pub use batch::*;
pub use delivery::*;
pub use purchase_request::*;
pub use report::*;
pub use task::*;
pub use transition::*;
