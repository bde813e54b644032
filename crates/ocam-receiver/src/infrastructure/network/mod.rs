//! Network infrastructure for the receiver.
//!
//! # Sub-modules
//!
//! - **`transport`** – Bounded-wait accept/read/write primitives and the
//!   shared run signal.  Every blocking call returns within one poll
//!   interval so the servers can be stopped cooperatively.
//!
//! - **`control_server`** – Accepts the control connection, replays the
//!   settings and stores capability reports.
//!
//! - **`ingest_server`** – The accept/handshake/packet loop shared by the
//!   video and audio streams.

pub mod control_server;
pub mod ingest_server;
pub mod transport;
