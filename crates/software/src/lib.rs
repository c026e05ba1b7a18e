//! This crate contains architecture-agnostic logic for Life Beacons, a Game of Life played out on a grid of lit buttons.
//! Selected cells can be turned into "beacons": each beacon owns a MIDI note which sounds when its cell is born and is
//! released when the cell dies, turning the simulation into a generative sequencer.
//!
//! Generations advance on a [tempo-synchronized scheduler](`scheduler::Scheduler`) which follows an external transport
//! (e.g., [MIDI beat clock](`transport::MidiClock`)) when one is running and keeps time on its own when it isn't.
//! [`app::LifeApp`] ties the scheduler and the [simulation](`simulation::Engine`) together; the firmware crate supplies
//! the timer, the transport, and the MIDI output. Boards are edited from a grid controller through [`pads::Pads`].

#![deny(missing_docs)]
#![no_std]

mod fmt;

pub mod app;
pub mod configuration;
pub mod midi;
pub mod pads;
pub mod scheduler;
pub mod simulation;
pub mod transport;

/// The time types in this crate's API come from this version of `embassy-time`, which may differ from the one the
/// firmware's HAL is built on.
pub use embassy_time;
