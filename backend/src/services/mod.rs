//! Module for core business logic services.
//!
//! Services here are free of HTTP concerns: password verification and tenant
//! scope resolution. The login orchestration that ties them together lives in
//! `auth::service`.

pub mod credential_verifier;
pub mod tenant_scope;
