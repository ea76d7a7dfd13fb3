//! # Application Layer
//!
//! The chat service (business rules) and the DTOs exchanged with clients.

pub mod dto;
pub mod services;
