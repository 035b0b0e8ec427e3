//! Application core: the control orchestrator, operator commands and the
//! port traits through which they reach hardware and people.
//!
//! All interaction with hardware happens through **port traits** defined in
//! [`ports`], keeping this layer testable without a Raspberry Pi.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
