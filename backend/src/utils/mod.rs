//! Collection of general utility functions.
//!
//! Small, reusable helpers that do not fit into a specific domain module:
//! token signing and client network metadata.

pub mod jwt;
pub mod network;
