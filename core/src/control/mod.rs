//! Operator controls: graceful shutdown and the copy-trading pause switch.

pub mod kill_switch;

pub use kill_switch::{KillSwitch, KillSwitchState};
