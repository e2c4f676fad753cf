//! Authentication module for sessions, tokens and access control.
//!
//! This module provides the public interface for login, token refresh, logout,
//! password changes and the authorization middleware guarding every other
//! route.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
