//! In-memory stand-in for the clinic chat backend.
//!
//! Serves the REST endpoints and the push hub the synchronization core
//! talks to, for local development and end-to-end tests.

pub mod auth;
pub mod domain;
pub mod error;
pub mod handler;
pub mod hub;
pub mod server;
pub mod state;

pub use server::{RunningServer, StubServer};
