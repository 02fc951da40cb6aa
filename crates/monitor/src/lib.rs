//! Device-side host for the budget core
//!
//! Exposes the HTTP surface so it can be exercised from integration tests.

pub mod api;
