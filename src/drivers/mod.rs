//! Hardware drivers and task plumbing.

pub mod pigpio;
pub mod servo;
pub mod task;
