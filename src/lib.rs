//! Post Policy
//!
//! Tracks which members of a policy's groups have accepted a policy attached
//! to a post. Domain rules live in `postpolicy-core`; this crate provides the
//! SQLite store, configuration and the HTTP server.

pub mod config;
pub mod db;
pub mod server;
