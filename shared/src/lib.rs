//! Shared types and models for the Storefront Fulfillment Engine
//!
//! This crate holds the pure part of the engine: the data model, status
//! machines and the allocation planner. It performs no I/O so the backend
//! and the test suites drive exactly the same rules.

pub mod allocation;
pub mod models;
pub mod types;
pub mod validation;

pub use allocation::*;
pub use models::*;
pub use types::*;
pub use validation::*;
