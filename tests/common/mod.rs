//! Shared test utilities for axscope
//!
//! Tree and node-table fixtures used by the integration tests.

pub mod fixtures;
