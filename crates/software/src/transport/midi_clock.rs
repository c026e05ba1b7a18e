//! Provides [`MidiClock`], a [`Transport`] which follows the MIDI beat clock of an upstream sequencer or DAW.

use super::Transport;
use crate::midi::messages;
use bitmask_enum::bitmask;
use embassy_time::Instant;
use num_traits::float::FloatCore;
use wmidi::MidiMessage;

/// Timing Clock messages are sent 24 times per quarter note.
pub const CLOCKS_PER_BEAT: u32 = 24;

/// Song Position Pointer counts "MIDI beats", i.e., 16th notes, each of which lasts six clocks.
const CLOCKS_PER_MIDI_BEAT: u32 = 6;

/// Assumed until enough clocks have arrived to measure the tempo.
const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Weight given to each new clock interval in the tempo estimate.
const TEMPO_SMOOTHING: f64 = 1.0 / 8.0;

/// Tempo changes smaller than this are not reported.
const TEMPO_CHANGE_THRESHOLD_BPM: f64 = 0.5;

/// Changes to the transport resulting from an update.
#[bitmask(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockChange {
    /// The transport began (or resumed) playing.
    Started,
    /// The transport stopped.
    Stopped,
    /// The playhead jumped, e.g., to the beginning of the song.
    Relocated,
    /// The measured tempo changed noticeably.
    Tempo,
}

/// Tracks the state of an upstream sequencer from the MIDI System Real-Time and Song Position Pointer messages it sends.
///
/// Position advances by one clock per Timing Clock message, but only while playing; tempo is measured from the spacing
/// of Timing Clock messages whether or not the transport is running, as most sequencers send clock continuously.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MidiClock {
    playing: bool,
    clocks: u32,
    last_clock: Option<Instant>,
    /// Smoothed interval between Timing Clock messages, in microseconds.
    clock_interval: Option<f64>,
}

impl Default for MidiClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiClock {
    /// Construct a stopped `MidiClock` at the start of the song.
    pub fn new() -> Self {
        Self {
            playing: false,
            clocks: 0,
            last_clock: None,
            clock_interval: None,
        }
    }

    /// Updates the clock given a slice of data received at `now`. Returns the [`ClockChange`]s which resulted.
    ///
    /// Data may contain one or more USB-MIDI Event Packets.
    pub fn update(&mut self, data: &[u8], now: Instant) -> ClockChange {
        let mut change = ClockChange::none();
        for msg in messages(data) {
            change |= self.receive(&msg, now);
        }
        change
    }

    /// Updates the clock given a single MIDI message received at `now`.
    ///
    /// Messages unrelated to the transport are ignored.
    pub fn receive(&mut self, msg: &MidiMessage, now: Instant) -> ClockChange {
        match msg {
            MidiMessage::TimingClock => {
                let change = self.measure(now);
                if self.playing {
                    self.clocks = self.clocks.saturating_add(1);
                }
                change
            }
            MidiMessage::Start => {
                info!("Received Start");
                self.clocks = 0;
                self.playing = true;
                ClockChange::Started | ClockChange::Relocated
            }
            MidiMessage::Continue => {
                info!("Received Continue at clock {}", self.clocks);
                self.playing = true;
                ClockChange::Started
            }
            MidiMessage::Stop => {
                info!("Received Stop at clock {}", self.clocks);
                self.playing = false;
                ClockChange::Stopped
            }
            MidiMessage::SongPositionPointer(position) => {
                let midi_beats = u16::from(*position);
                if self.playing {
                    warn!(
                        "Ignoring Song Position Pointer {} received while playing",
                        midi_beats
                    );
                    ClockChange::none()
                } else {
                    info!("Received Song Position Pointer {}", midi_beats);
                    self.clocks = u32::from(midi_beats) * CLOCKS_PER_MIDI_BEAT;
                    ClockChange::Relocated
                }
            }
            _ => ClockChange::none(),
        }
    }

    /// Folds the interval since the previous Timing Clock into the tempo estimate.
    fn measure(&mut self, now: Instant) -> ClockChange {
        let previous_tempo = self.tempo_bpm();
        let elapsed = self
            .last_clock
            .and_then(|last| now.checked_duration_since(last))
            .map(|elapsed| elapsed.as_micros() as f64)
            .filter(|&micros| micros > 0.0);
        self.last_clock = Some(now);

        let Some(micros) = elapsed else {
            return ClockChange::none();
        };
        self.clock_interval = Some(match self.clock_interval {
            None => micros,
            Some(average) => average + (micros - average) * TEMPO_SMOOTHING,
        });

        let tempo = self.tempo_bpm();
        if FloatCore::abs(tempo - previous_tempo) >= TEMPO_CHANGE_THRESHOLD_BPM {
            debug!("Tempo is now {} BPM", tempo);
            ClockChange::Tempo
        } else {
            ClockChange::none()
        }
    }

    /// The number of Timing Clock messages counted since the start of the song.
    pub fn clocks(&self) -> u32 {
        self.clocks
    }
}

impl Transport for MidiClock {
    fn is_playing(&self) -> bool {
        self.playing
    }

    fn position(&self) -> f64 {
        f64::from(self.clocks) / f64::from(CLOCKS_PER_BEAT)
    }

    fn tempo_bpm(&self) -> f64 {
        self.clock_interval
            .map_or(DEFAULT_TEMPO_BPM, |micros| {
                60_000_000.0 / (micros * f64::from(CLOCKS_PER_BEAT))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Duration;

    const TIMING_CLOCK: [u8; 4] = [0x0F, 0xF8, 0x00, 0x00];
    const START: [u8; 4] = [0x0F, 0xFA, 0x00, 0x00];
    const CONTINUE: [u8; 4] = [0x0F, 0xFB, 0x00, 0x00];
    const STOP: [u8; 4] = [0x0F, 0xFC, 0x00, 0x00];

    /// Song Position Pointer to the given number of 16th notes.
    fn song_position(midi_beats: u16) -> [u8; 4] {
        [
            0x03,
            0xF2,
            (midi_beats & 0x7F) as u8,
            ((midi_beats >> 7) & 0x7F) as u8,
        ]
    }

    /// Sends `count` Timing Clocks spaced for the given tempo, starting at `start`. Returns the time of the last clock.
    fn send_clocks(clock: &mut MidiClock, start: Instant, count: u32, bpm: u64) -> Instant {
        let interval = Duration::from_micros(60_000_000 / (bpm * u64::from(CLOCKS_PER_BEAT)));
        let mut now = start;
        for _ in 0..count {
            now += interval;
            clock.update(&TIMING_CLOCK, now);
        }
        now
    }

    #[test]
    fn stopped_at_zero_by_default() {
        let clock = MidiClock::new();
        assert!(!clock.is_playing(), "Should not be playing");
        assert_eq!(0.0, clock.position(), "Expected left but got right");
        assert_eq!(
            DEFAULT_TEMPO_BPM,
            clock.tempo_bpm(),
            "Expected left but got right"
        );
    }

    #[test]
    fn start_rewinds_and_plays() {
        let mut clock = MidiClock::new();
        let now = Instant::from_millis(0);
        clock.update(&song_position(8), now);
        let change = clock.update(&START, now);

        assert!(clock.is_playing(), "Should be playing");
        assert_eq!(0, clock.clocks(), "Expected left but got right");
        assert_eq!(
            ClockChange::Started | ClockChange::Relocated,
            change,
            "Expected left but got right"
        );
    }

    #[test]
    fn clocks_advance_position_only_while_playing() {
        let mut clock = MidiClock::new();
        let now = send_clocks(&mut clock, Instant::from_millis(0), 12, 120);
        assert_eq!(0.0, clock.position(), "Expected left but got right");

        clock.update(&START, now);
        send_clocks(&mut clock, now, 36, 120);
        assert_eq!(1.5, clock.position(), "Expected left but got right");
    }

    #[test]
    fn stop_then_continue_keeps_position() {
        let mut clock = MidiClock::new();
        let now = Instant::from_millis(0);
        clock.update(&START, now);
        let now = send_clocks(&mut clock, now, 24, 120);

        assert_eq!(ClockChange::Stopped, clock.update(&STOP, now));
        let now = send_clocks(&mut clock, now, 24, 120);
        assert_eq!(1.0, clock.position(), "Expected left but got right");

        assert_eq!(ClockChange::Started, clock.update(&CONTINUE, now));
        send_clocks(&mut clock, now, 12, 120);
        assert_eq!(1.5, clock.position(), "Expected left but got right");
    }

    #[test]
    fn song_position_pointer_relocates_while_stopped() {
        let mut clock = MidiClock::new();
        let change = clock.update(&song_position(10), Instant::from_millis(0));
        assert_eq!(ClockChange::Relocated, change, "Expected left but got right");
        // ten 16th notes are two and a half beats
        assert_eq!(2.5, clock.position(), "Expected left but got right");
    }

    #[test]
    fn song_position_pointer_ignored_while_playing() {
        let mut clock = MidiClock::new();
        let now = Instant::from_millis(0);
        clock.update(&START, now);
        let change = clock.update(&song_position(10), now);
        assert_eq!(ClockChange::none(), change, "Expected left but got right");
        assert_eq!(0.0, clock.position(), "Expected left but got right");
    }

    #[test]
    fn measures_tempo_from_clock_spacing() {
        let mut clock = MidiClock::new();
        send_clocks(&mut clock, Instant::from_millis(0), 48, 100);
        assert!(
            FloatCore::abs(clock.tempo_bpm() - 100.0) < 0.1,
            "Expected roughly 100 BPM but got {}",
            clock.tempo_bpm()
        );
    }

    #[test]
    fn reports_tempo_change() {
        let mut clock = MidiClock::new();
        let now = send_clocks(&mut clock, Instant::from_millis(0), 48, 120);

        let interval = Duration::from_micros(60_000_000 / (60 * u64::from(CLOCKS_PER_BEAT)));
        let change = clock.update(&TIMING_CLOCK, now + interval);
        assert!(
            change.contains(ClockChange::Tempo),
            "Halving the clock rate should register as a tempo change"
        );
    }

    #[test]
    fn handles_several_packets_at_once() {
        let mut clock = MidiClock::new();
        let mut data = [0_u8; 12];
        data[..4].copy_from_slice(&START);
        data[4..8].copy_from_slice(&TIMING_CLOCK);
        data[8..].copy_from_slice(&TIMING_CLOCK);
        clock.update(&data, Instant::from_millis(0));
        assert_eq!(2, clock.clocks(), "Expected left but got right");
    }

    #[test]
    fn ignores_truncated_packet() {
        let mut clock = MidiClock::new();
        let change = clock.update(&START[..3], Instant::from_millis(0));
        assert_eq!(ClockChange::none(), change, "Expected left but got right");
        assert!(!clock.is_playing(), "Should not be playing");
    }
}
