//! mygate API - the HTTP surface of the gateway
//!
//! Orchestrates the request pipeline: parse query parameters, plan the
//! select tree, look up row-level policies, compile SQL, execute under the
//! request's claim context, and shape the PostgREST-compatible response.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod executor;
pub mod handlers;
pub mod openapi;
pub mod respond;
pub mod server;

pub use executor::{ExecOutcome, Executor};
pub use handlers::AppState;
pub use server::GatewayServer;
