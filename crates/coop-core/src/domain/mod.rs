//! Domain entities for the cooperate service.
//!
//! This module contains pure data types and rules with no infrastructure
//! dependencies, so every piece can be unit-tested in isolation.
//!
//! - [`identity`] – opaque identifier newtypes for peers and devices.
//! - [`coordinate`] – cursor positions and the percent normalisation used
//!   when the pointer crosses from one device to another.
//! - [`device`] – the input device record and dhid generation.

pub mod coordinate;
pub mod device;
pub mod identity;
