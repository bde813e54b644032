//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads and writes the receiver's TOML file and
//! turns it into the options the servers and the settings API consume.
//! A missing file is not an error; defaults are used.

pub mod config;
