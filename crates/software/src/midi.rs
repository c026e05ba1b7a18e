//! MIDI plumbing: the [`MidiSink`] trait through which beacons sound, helpers for putting beacon notes on the wire, and
//! [`messages`] for reading whatever arrives over USB.

use wmidi::{Channel, MidiMessage, Note, U7, Velocity};

/// Beacon notes are sent on MIDI channel 2, leaving channel 1 free for the grid controller's own notes.
pub const BEACON_CHANNEL: Channel = Channel::Ch2;

/// Note-on velocity when a beacon is born with no live neighbors. Also the floor for all beacon velocities.
const VELOCITY_FLOOR: u8 = 20;

/// Velocity added per live neighbor.
const VELOCITY_PER_NEIGHBOR: f32 = 13.375;

/// Code Index Numbers for USB-MIDI Event Packets.
const CIN_NOTE_OFF: u8 = 0x8;
const CIN_NOTE_ON: u8 = 0x9;

/// Parses the MIDI messages out of data holding one or more USB-MIDI Event Packets.
///
/// Packets that are truncated or don't hold a valid message are skipped.
pub fn messages(data: &[u8]) -> impl Iterator<Item = MidiMessage<'_>> {
    data.chunks(4).filter_map(|potential_packet| {
        if potential_packet.len() != 4 {
            error!("USB-MIDI Event Packets must always be 32 bits long");
            None
        } else {
            // the Code Index Number in the low nibble of the header says how many of the remaining
            // three bytes belong to the MIDI message
            let len = message_len(potential_packet[0]);
            MidiMessage::from_bytes(&potential_packet[1..=len]).ok()
        }
    })
}

/// Returns the length of the MIDI message carried by a USB-MIDI Event Packet with the given header.
fn message_len(header: u8) -> usize {
    match header & 0x0F {
        // single-byte System Common, SysEx end with one byte, and single bytes (e.g., System Real-Time)
        0x5 | 0xF => 1,
        // two-byte System Common, SysEx end with two bytes, Program Change, Channel Pressure
        0x2 | 0x6 | 0xC | 0xD => 2,
        _ => 3,
    }
}

/// A destination for beacon notes.
pub trait MidiSink {
    /// Sounds `note`.
    fn note_on(&mut self, note: Note, velocity: Velocity);

    /// Releases `note`.
    fn note_off(&mut self, note: Note);
}

/// Returns the note-on velocity for a beacon born among `neighbors` live cells.
///
/// Velocity rises linearly with the crowd around the newborn cell, clamped to `20..=127`.
pub fn velocity_for(neighbors: u8) -> Velocity {
    let velocity = u32::from(VELOCITY_FLOOR) + (f32::from(neighbors) * VELOCITY_PER_NEIGHBOR) as u32;
    U7::from_u8_lossy(velocity.clamp(u32::from(VELOCITY_FLOOR), 127) as u8)
}

/// A note event produced by a beacon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BeaconEvent {
    /// The beacon's cell was born.
    NoteOn(Note, Velocity),
    /// The beacon's cell died, or the beacon was removed.
    NoteOff(Note),
}

impl BeaconEvent {
    /// The MIDI message for this event on [`BEACON_CHANNEL`].
    pub fn message(&self) -> MidiMessage<'static> {
        match *self {
            Self::NoteOn(note, velocity) => MidiMessage::NoteOn(BEACON_CHANNEL, note, velocity),
            Self::NoteOff(note) => {
                MidiMessage::NoteOff(BEACON_CHANNEL, note, U7::from_u8_lossy(0))
            }
        }
    }

    /// Encodes the event as a USB-MIDI Event Packet for the given virtual cable.
    pub fn to_usb_packet(&self, cable: u8) -> [u8; 4] {
        let (cin, status, note, velocity) = match *self {
            Self::NoteOn(note, velocity) => (CIN_NOTE_ON, 0x90, note, u8::from(velocity)),
            Self::NoteOff(note) => (CIN_NOTE_OFF, 0x80, note, 0),
        };
        [
            (cable & 0x0F) << 4 | cin,
            status | BEACON_CHANNEL.index(),
            u8::from(note),
            velocity,
        ]
    }
}
