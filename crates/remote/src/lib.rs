//! Budget service HTTP client.
//!
//! This crate is the single source of truth for the budget service wire
//! contract: option lookups, benefit calculation, batch save. It
//! implements the engine's collaborator traits over a blocking reqwest
//! client (no async runtime required).
//!
//! No engine concepts leak back out: the engine sees plain data through
//! its own traits.

mod client;
pub mod dto;

pub use client::{BudgetServiceClient, ServiceError};
