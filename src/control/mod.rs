//! Control plane: switching, bus handling and the event loop.
//!
//! - [`SwitchController`]: flips the merge stage between its two inputs
//! - [`EventBusHandler`]: maps bus messages to graph lifecycle actions
//! - [`Controller`]: the single-task loop that drives both

mod bus;
mod controller;
mod switch;

pub use bus::{EventBusHandler, ExitReason, Watch};
pub use controller::Controller;
pub use switch::{DEFAULT_SWITCH_PERIOD, Schedule, SwitchController, SwitchPair};
