//! Application layer use cases for the receiver.
//!
//! Code here orchestrates the domain types from `ocam_core` and talks to the
//! outside world only through traits: [`device_state::ClientLink`] for the
//! write side of a socket, and the decoder, sink and clock traits in
//! [`media`].  No sockets are opened and no threads are spawned here.
//!
//! # Sub-modules
//!
//! - **`device_state`** – The mutex-protected record shared by all three
//!   servers: client links, capabilities, settings cache, video size.
//!
//! - **`sync_settings`** – Replays the settings cache to a newly connected
//!   control client.
//!
//! - **`media`** – Decoder and media-pipeline boundaries plus the format
//!   translation between them.
//!
//! - **`ingest_session`** – The per-connection packet algorithm shared by the
//!   video and audio streams.

pub mod device_state;
pub mod ingest_session;
pub mod media;
pub mod sync_settings;
