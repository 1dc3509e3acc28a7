//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the daemon's TOML configuration from the
//! platform config directory, falls back to defaults on first run and can
//! write a configuration back (used to persist a generated local network id).

pub mod config;
