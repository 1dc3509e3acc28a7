//! Infrastructure layer of the cooperate service.
//!
//! Contains the adapters behind the collaborator traits: the TCP session
//! transport, tokio timers, the headless platform stand-ins, TOML storage,
//! and the recording doubles used by tests.
//!
//! **Dependency rule**: this layer may depend on `application` and `coop_core`,
//! but MUST NOT be imported by the `application` or domain layers.

pub mod dsoftbus;
pub mod headless;
pub mod mock;
pub mod storage;
pub mod timer;
