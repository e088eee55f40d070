//! mygate Auth - bearer-token verification
//!
//! Verifies HS256 bearer tokens against the configured symmetric secret and
//! turns the payload into the per-request claim map. The gateway never mints
//! tokens; it only checks them.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod verify;

pub use verify::JwtVerifier;
