//! CareLink event hub.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! session infrastructure) so integration tests and the binary entrypoint
//! can both access them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
