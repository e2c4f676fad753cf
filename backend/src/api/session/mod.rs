//! Module for administrative session management.
//!
//! Lets company and platform administrators close every session of a user
//! inside their scope.

pub mod handlers;
pub mod routes;
