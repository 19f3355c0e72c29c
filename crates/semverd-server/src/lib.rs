//! `semverd` HTTP server.
//!
//! Wires the storage manager, the project versioning service, and the HTTP
//! routes into a running Axum server. Serves the API at `/v1/*`.

pub mod config;
pub mod error;
pub mod routes;
pub mod service;
pub mod state;
pub mod xml;
