//! Sources of musical time.
//!
//! The scheduler doesn't care where musical time comes from, only that it can ask whether time is advancing, where the
//! playhead is, and how fast it's moving. [`MidiClock`] answers those questions from MIDI beat clock received over USB.

mod midi_clock;
pub use midi_clock::*;

/// A clock source the scheduler can synchronize to.
///
/// Positions are measured in beats (quarter notes) since the start of the song.
pub trait Transport {
    /// Returns true while the transport is advancing.
    fn is_playing(&self) -> bool;

    /// The playhead position in beats.
    fn position(&self) -> f64;

    /// The current tempo in beats per minute. May be zero or otherwise out of range; consumers are expected to clamp.
    fn tempo_bpm(&self) -> f64;
}
