//! Integration tests for axscope
//!
//! These tests verify that multiple components work together correctly.

#[path = "../common/mod.rs"]
pub mod common;

pub mod recording_flow;
pub mod sync_flow;
