//! LADDERBOT: autonomous limit-order ladder agent
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod error;
pub mod types;
pub mod api;
pub mod chain;
pub mod engine;
