//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises the control tasks
//! together against mock hardware.  All tests run on the host with no
//! pigpiod required.

mod control_loop_tests;
mod flame_scenario_tests;
mod mock_hw;
