//! Integration test utilities for the gateway client
//!
//! This crate provides a mock gateway served over real WebSockets and the
//! configuration fixtures the end-to-end tests connect with.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
