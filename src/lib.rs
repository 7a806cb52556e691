//! Personal movie and TV watchlist tracker.
//!
//! The interesting parts live in [`services::watch_status`] (status lifecycle
//! and the per-user aggregate) and [`services::statistics`] (on-demand
//! rollups). Everything else is the HTTP, storage and metadata plumbing
//! around them.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

#[cfg(test)]
mod test_support;
