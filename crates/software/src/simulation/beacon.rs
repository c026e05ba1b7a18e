use crate::midi::{MidiSink, velocity_for};
use wmidi::{Note, U7};

/// The note given to the first beacon placed on an empty board: middle C.
pub const NOTE_BASE: u8 = 60;

/// The highest note a beacon can be given.
const NOTE_MAX: u8 = 127;

/// How many beacons can exist at once, i.e., how many notes lie between [`NOTE_BASE`] and the top of the MIDI range.
pub const MAX_BEACONS: usize = (NOTE_MAX - NOTE_BASE) as usize + 1;

/// A cell marker which sounds a note while its cell is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Beacon {
    note: Note,
    sounding: bool,
}

impl Beacon {
    pub(crate) fn new(note: Note) -> Self {
        Self {
            note,
            sounding: false,
        }
    }

    /// Getter.
    pub fn note(&self) -> Note {
        self.note
    }

    /// Returns true between the beacon's note-on and its matching note-off.
    pub fn is_sounding(&self) -> bool {
        self.sounding
    }

    /// Brings the beacon's note in line with whether its cell will be alive, sending at most one message. Returns true
    /// if a message was sent.
    pub(crate) fn follow<M: MidiSink>(&mut self, alive: bool, neighbors: u8, midi: &mut M) -> bool {
        match (self.sounding, alive) {
            (false, true) => {
                midi.note_on(self.note, velocity_for(neighbors));
                self.sounding = true;
                true
            }
            (true, false) => {
                midi.note_off(self.note);
                self.sounding = false;
                true
            }
            _ => false,
        }
    }

    /// Releases the beacon's note if it is sounding.
    pub(crate) fn silence<M: MidiSink>(&mut self, midi: &mut M) {
        if self.sounding {
            midi.note_off(self.note);
            self.sounding = false;
        }
    }
}

/// Hands out beacon notes in ascending order from [`NOTE_BASE`].
///
/// Notes are never recycled: removing a beacon does not free its note for the next one. The sequence starts over only
/// when [`reset`](`Self::reset`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteAllocator {
    next: u8,
}

impl Default for NoteAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteAllocator {
    /// Constructs an allocator starting at [`NOTE_BASE`].
    pub fn new() -> Self {
        Self { next: NOTE_BASE }
    }

    /// Returns the next note, or `None` once every note up to 127 has been given out.
    pub fn allocate(&mut self) -> Option<Note> {
        if self.next > NOTE_MAX {
            return None;
        }
        let note = Note::from(U7::from_u8_lossy(self.next));
        self.next += 1;
        Some(note)
    }

    /// The note number the next call to [`allocate`](`Self::allocate`) would return.
    pub fn peek(&self) -> u8 {
        self.next
    }

    /// Starts the sequence over from [`NOTE_BASE`].
    pub fn reset(&mut self) {
        self.next = NOTE_BASE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::BeaconEvent;

    extern crate std;
    use std::vec::Vec;

    #[derive(Default)]
    struct Log(Vec<BeaconEvent>);

    impl MidiSink for Log {
        fn note_on(&mut self, note: Note, velocity: wmidi::Velocity) {
            self.0.push(BeaconEvent::NoteOn(note, velocity));
        }

        fn note_off(&mut self, note: Note) {
            self.0.push(BeaconEvent::NoteOff(note));
        }
    }

    #[test]
    fn allocates_ascending_from_middle_c() {
        let mut notes = NoteAllocator::new();
        assert_eq!(Some(Note::C4), notes.allocate(), "Expected left but got right");
        assert_eq!(
            Some(Note::from(U7::from_u8_lossy(61))),
            notes.allocate(),
            "Expected left but got right"
        );
        assert_eq!(62, notes.peek(), "Expected left but got right");
    }

    #[test]
    fn refuses_notes_above_127() {
        let mut notes = NoteAllocator::new();
        for _ in NOTE_BASE..=NOTE_MAX {
            assert!(notes.allocate().is_some());
        }
        assert_eq!(None, notes.allocate(), "Expected left but got right");
        assert_eq!(None, notes.allocate(), "Expected left but got right");
    }

    #[test]
    fn reset_starts_over() {
        let mut notes = NoteAllocator::new();
        notes.allocate();
        notes.allocate();
        notes.reset();
        assert_eq!(Some(Note::C4), notes.allocate(), "Expected left but got right");
    }

    #[test]
    fn follow_sends_once_per_change() {
        let mut log = Log::default();
        let mut beacon = Beacon::new(Note::C4);

        assert!(beacon.follow(true, 3, &mut log));
        assert!(!beacon.follow(true, 2, &mut log), "Staying alive should be silent");
        assert!(beacon.follow(false, 1, &mut log));
        assert!(!beacon.follow(false, 0, &mut log), "Staying dead should be silent");

        assert_eq!(
            [
                BeaconEvent::NoteOn(Note::C4, U7::from_u8_lossy(60)),
                BeaconEvent::NoteOff(Note::C4)
            ],
            log.0[..],
            "Expected left but got right"
        );
    }

    #[test]
    fn silence_only_releases_sounding_notes() {
        let mut log = Log::default();
        let mut beacon = Beacon::new(Note::G4);
        beacon.silence(&mut log);
        assert!(log.0.is_empty());

        beacon.follow(true, 3, &mut log);
        beacon.silence(&mut log);
        assert!(!beacon.is_sounding());
        assert_eq!(Some(&BeaconEvent::NoteOff(Note::G4)), log.0.last());
    }
}
