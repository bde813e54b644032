//! Infrastructure layer for the receiver.
//!
//! Contains OS-facing adapters: TCP servers and their transport, the
//! monotonic clock, TOML configuration storage, the lifecycle object that
//! owns the server threads, and the headless collaborators used by the
//! binary.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `ocam_core`, but MUST NOT be imported by the `application` layer.

pub mod clock;
pub mod diagnostics;
pub mod network;
pub mod source;
pub mod storage;
