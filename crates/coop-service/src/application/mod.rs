//! Application layer of the cooperate service.
//!
//! # What lives here? (for beginners)
//!
//! Everything that decides *what happens* when a user asks to move the mouse
//! to another device, or a peer sends a protocol message.  Nothing here opens
//! sockets or touches the OS: those concerns are reached through the traits in
//! [`collaborators`] and implemented in `infrastructure`.
//!
//! # Sub-modules
//!
//! - **`event`** / **`channel`**: the `CooperateEvent` sum type and the FIFO
//!   channel every producer posts into.
//! - **`cooperate`**: the plugin worker.  It owns the single thread that
//!   drains the channel into the state machine.
//! - **`state_machine`**: `FREE`, `IN` and `OUT`, plus the relay sub-state.
//! - **`context`**: cooperation-scoped state and the helper sub-objects the
//!   states share.
//! - **`event_manager`**, **`hot_area`**, **`mouse_location`**: client-facing
//!   notifications.
//! - **`input_device_manager`**, **`remote_devices`**: local and peer input
//!   devices.
//! - **`input_transmission`**: forwarding local input while `OUT` and
//!   injecting remote input while `IN`.
//! - **`dsoftbus_handler`**: packet encoding and decoding at the session
//!   boundary.
//! - **`pending`**: requests waiting for a peer's answer.
//! - **`server`**: the IPC facade.

pub mod channel;
pub mod collaborators;
pub mod context;
pub mod cooperate;
pub mod dsoftbus_handler;
pub mod error;
pub mod event;
pub mod event_manager;
pub mod hot_area;
pub mod input_device_manager;
pub mod input_transmission;
pub mod mouse_location;
pub mod pending;
pub mod remote_devices;
pub mod server;
pub mod state_machine;
