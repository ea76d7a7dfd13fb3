//! # Infrastructure Layer
//!
//! PostgreSQL repository implementations, connection pooling, and metrics.

pub mod database;
pub mod metrics;
pub mod repositories;
