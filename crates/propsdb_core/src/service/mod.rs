//! Core use-case services.
//!
//! # Responsibility
//! - Validate requests and orchestrate repository calls.
//! - Own the authorization client lifecycle.

pub mod auth_service;
pub mod props_service;
