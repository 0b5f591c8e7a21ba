//! HTTP and WebSocket surface of the sync hub.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;

pub use error::WebError;
pub use server::{build_router, ServerConfig, SyncServer};
pub use state::WebAppState;
