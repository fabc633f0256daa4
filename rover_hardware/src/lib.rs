//! Collaborator implementations for the rover motion core.
//!
//! - [`sim`]: a deterministic plant model behind every collaborator trait.
//! - [`replay`]: playback of a recorded sensor trace, one frame per tick.
//! - [`pins`]: the board pin map, checked by `rover self-check`.
//!
//! Register-level STM32 drivers are out of scope here; they implement the same
//! `rover_traits` surface in board support code.

pub mod error;
pub mod pins;
pub mod replay;
pub mod sim;

pub use error::HwError;
pub use replay::{Frame, RecordedCommand, ReplayDeck};
pub use sim::{SimParams, SimRobot, SimState};
