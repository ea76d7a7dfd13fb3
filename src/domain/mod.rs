//! # Domain Layer
//!
//! Core business entities for the chat subsystem and the repository traits
//! that define its data-access contracts. No dependencies on infrastructure
//! or presentation code.

pub mod entities;

pub use entities::*;
