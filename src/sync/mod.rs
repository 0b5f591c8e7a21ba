//! Synchronization between the capture side and observers.
//!
//! [`SyncHub`] owns the live tree and the recorder; the web layer attaches
//! WebSocket observers to it, and [`spawn_observer`] is the matching client.

mod hub;
mod messages;
mod observer;

pub use hub::{recording_file_name, Attachment, HubConfig, RefreshOutcome, SyncHub};
pub use messages::SyncMessage;
pub use observer::{spawn_observer, ObserverConfig, ObserverEvent, ObserverHandle};
