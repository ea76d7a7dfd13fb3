//! HTTP Presentation Layer

pub mod handlers;
pub mod routes;
