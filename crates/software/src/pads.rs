//! Editing the board from a grid controller.
//!
//! The controller sends a note-on when a pad goes down and a note-off when it comes up, using one MIDI channel per row
//! and one note per column: channel 1 is row 0, and note 0 is the [control column](`crate::simulation::CONTROL_COLUMN`).
//! [`Pads`] pairs the two messages up, and how long the pad was held decides which [`Gesture`] the press becomes.

use embassy_time::{Duration, Instant};
use wmidi::{Channel, MidiMessage, Note};

/// Presses held at least this long count as long presses.
pub const LONG_PRESS: Duration = Duration::from_millis(500);

/// The pad in the control column which clears the board.
pub const CLEAR_ROW: usize = 1;

/// A finished pad press and where it landed on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gesture {
    /// The pad at `(x, y)` was released before [`LONG_PRESS`].
    Tap(usize, usize),
    /// The pad at `(x, y)` was held for at least [`LONG_PRESS`].
    Hold(usize, usize),
}

/// Tracks which pads are held down, and since when.
pub struct Pads<const W: usize = 26, const H: usize = 8> {
    pressed: [[Option<Instant>; H]; W],
}

impl<const W: usize, const H: usize> Default for Pads<W, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const W: usize, const H: usize> Pads<W, H> {
    /// Constructs a tracker with no pads held.
    pub fn new() -> Self {
        Self {
            pressed: [[None; H]; W],
        }
    }

    /// Finds the board position of the pad sending `note` on `channel`, if it lies on the board.
    pub fn locate(channel: Channel, note: Note) -> Option<(usize, usize)> {
        let x = usize::from(u8::from(note));
        let y = usize::from(channel.index());
        (x < W && y < H).then_some((x, y))
    }

    /// Follows a message from the controller received at `now`. Returns the [`Gesture`] completed by a release.
    ///
    /// A note-on with zero velocity counts as a release. Releases of pads never seen going down, and messages other than
    /// notes, are ignored.
    pub fn receive(&mut self, msg: &MidiMessage, now: Instant) -> Option<Gesture> {
        match msg {
            MidiMessage::NoteOn(channel, note, velocity) if u8::from(*velocity) > 0 => {
                let (x, y) = Self::locate(*channel, *note)?;
                self.pressed[x][y] = Some(now);
                None
            }
            MidiMessage::NoteOn(channel, note, _) | MidiMessage::NoteOff(channel, note, _) => {
                let (x, y) = Self::locate(*channel, *note)?;
                let pressed = self.pressed[x][y].take()?;
                let gesture = if now.saturating_duration_since(pressed) >= LONG_PRESS {
                    Gesture::Hold(x, y)
                } else {
                    Gesture::Tap(x, y)
                };
                trace!("Pad gesture {}", gesture);
                Some(gesture)
            }
            _ => None,
        }
    }

    /// Forgets every pad held, e.g., after the controller disconnects.
    pub fn release_all(&mut self) {
        self.pressed = [[None; H]; W];
    }
}
