//! HTTP request handlers for the sync API.

pub mod recording;
pub mod tree;
