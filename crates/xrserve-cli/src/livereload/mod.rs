//! Live-reload channel.
//!
//! Provides push notifications to served visualization pages over
//! Server-Sent Events:
//! - [`LiveReloadHub`]: the shared connection registry and broadcast functions
//! - [`inject_live_reload_script`]: wires an HTML page into the channel
//! - [`LiveReloadEvent`]: the event kinds and their wire frames

mod event;
mod hub;
mod inject;

pub use event::LiveReloadEvent;
pub use hub::{LiveReloadHub, SseConnection};
pub use inject::{has_live_reload_script, inject_dom_live_reload_script, inject_live_reload_script};
