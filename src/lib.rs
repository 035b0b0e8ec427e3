//! Smokin'Pi controller library.
//!
//! Temperature control for a propane smoker cabinet on a Raspberry Pi:
//! TLC1543 acquisition, PID valve control through a hobby servo, flame
//! supervision and the operator command surface.  Hardware is reached
//! through `pigpiod`, so everything here also runs against the simulator.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod monitor;
pub mod pins;
pub mod sensors;
pub mod state;
