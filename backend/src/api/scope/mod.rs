//! Module for tenant scope endpoints.
//!
//! Exposes the caller's effective scope and the row filter every
//! tenant-scoped query must apply.

pub mod handlers;
pub mod routes;
