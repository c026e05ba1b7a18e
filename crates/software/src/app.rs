//! Provides [`LifeApp`], which runs the [`Engine`] on the [`Scheduler`] and exposes the controls a user interface needs.

use crate::{
    configuration::{AutoSeed, CycleConfig, TempoSync},
    midi::MidiSink,
    pads::{CLEAR_ROW, Gesture},
    scheduler::{OneShotTimer, Scheduler, TaskHandle, TriggerRate},
    simulation::{BeaconEdit, CONTROL_COLUMN, CellState, Engine, Operation},
    transport::Transport,
};
use rand::RngCore;

/// Work the scheduler hands back to [`LifeApp`] when a task comes due.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Job {
    /// Advance the simulation one generation.
    #[default]
    Generation,
    /// Flash the beat indicator.
    Beat,
}

/// What a wake of [`LifeApp`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake {
    /// What the generation task, if it ran, did to the board.
    pub simulation: Operation,
    /// True if the beat indicator fired.
    pub beat: bool,
}

impl Default for Wake {
    fn default() -> Self {
        Self {
            simulation: Operation::none(),
            beat: false,
        }
    }
}

/// The instrument as a whole: a simulation, the scheduler that drives it, and the MIDI output its beacons play into.
///
/// While running, exactly one generation task is registered with the scheduler, at the rate chosen by
/// [`set_trigger_rate`](`Self::set_trigger_rate`) or [`set_tempo_sync`](`Self::set_tempo_sync`). The host calls
/// [`on_wake`](`Self::on_wake`) whenever the timer it was handed expires.
pub struct LifeApp<C, O, M, R, const W: usize = 26, const H: usize = 8> {
    engine: Engine<W, H>,
    scheduler: Scheduler<C, O, Job>,
    midi: M,
    rng: R,
    tempo_sync: TempoSync,
    trigger_rate: TriggerRate,
    auto_seed: AutoSeed,
    generation_task: Option<TaskHandle>,
    beat_task: Option<TaskHandle>,
}

impl<C, O, M, R, const W: usize, const H: usize> LifeApp<C, O, M, R, W, H>
where
    C: Transport,
    O: OneShotTimer,
    M: MidiSink,
    R: RngCore,
{
    /// Constructs a running app with an empty board, generations every 100ms, and reseeding off.
    pub fn new(transport: C, timer: O, midi: M, rng: R) -> Self {
        let tempo_sync = TempoSync::default();
        let mut app = Self {
            engine: Engine::new(),
            scheduler: Scheduler::new(transport, timer),
            midi,
            rng,
            tempo_sync,
            trigger_rate: tempo_sync.trigger_rate(),
            auto_seed: AutoSeed::default(),
            generation_task: None,
            beat_task: None,
        };
        app.start_generations();
        app
    }

    /// Getter.
    pub fn engine(&self) -> &Engine<W, H> {
        &self.engine
    }

    /// Getter.
    pub fn scheduler(&self) -> &Scheduler<C, O, Job> {
        &self.scheduler
    }

    /// Gives the host access to the scheduler's transport and timer.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler<C, O, Job> {
        &mut self.scheduler
    }

    /// Getter.
    pub fn midi(&self) -> &M {
        &self.midi
    }

    /// Getter.
    pub fn tempo_sync(&self) -> TempoSync {
        self.tempo_sync
    }

    /// Getter.
    pub fn trigger_rate(&self) -> TriggerRate {
        self.trigger_rate
    }

    /// Getter.
    pub fn auto_seed(&self) -> AutoSeed {
        self.auto_seed
    }

    /// Returns true if the simulation is running.
    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    /// Returns true if the beat indicator task is registered.
    pub fn beat_indicator(&self) -> bool {
        self.beat_task.is_some()
    }

    /// Handles a wake-up from the timer, running whatever is due. Returns what happened.
    pub fn on_wake(&mut self) -> Wake {
        let Self {
            engine,
            scheduler,
            midi,
            rng,
            ..
        } = self;
        let mut wake = Wake::default();
        scheduler.on_wake(|_, job| match job {
            Job::Generation => wake.simulation |= engine.tick(midi, rng),
            Job::Beat => wake.beat = true,
        });
        wake
    }

    /// Starts or pauses the simulation. Pausing takes the generation task off the scheduler; starting puts it back and
    /// restarts the reseed countdown.
    pub fn set_running(&mut self, running: bool) {
        self.engine.set_running(running);
        if running {
            self.start_generations();
        } else {
            self.stop_generations();
        }
    }

    /// Advances generations at `rate`, replacing the generation task if running.
    pub fn set_trigger_rate(&mut self, rate: TriggerRate) {
        self.trigger_rate = rate;
        if self.engine.is_running() {
            self.stop_generations();
            self.start_generations();
            self.engine.restart_reseed_countdown();
        }
    }

    /// Selects how generations follow the transport.
    pub fn set_tempo_sync(&mut self, tempo_sync: TempoSync) {
        info!("Tempo sync {}", tempo_sync);
        self.tempo_sync = tempo_sync;
        self.set_trigger_rate(tempo_sync.trigger_rate());
    }

    /// Moves to the next [`TempoSync`] setting, wrapping from the slowest back to [`TempoSync::Off`].
    pub fn cycle_tempo_sync(&mut self) -> TempoSync {
        let next = self.tempo_sync.cycle();
        self.set_tempo_sync(next);
        next
    }

    /// Reseeds every `ticks` generations; 0 disables reseeding.
    pub fn set_auto_reseed(&mut self, ticks: u16) {
        self.engine.set_auto_reseed(ticks);
    }

    /// Turns reseeding on, or moves to the next interval if it is already on.
    pub fn advance_auto_seed(&mut self) -> AutoSeed {
        self.auto_seed.advance();
        self.set_auto_reseed(self.auto_seed.ticks());
        self.auto_seed
    }

    /// Turns reseeding off, or back on at the interval last used.
    pub fn toggle_auto_seed(&mut self) -> AutoSeed {
        self.auto_seed.toggle();
        self.set_auto_reseed(self.auto_seed.ticks());
        self.auto_seed
    }

    /// Shows or hides the beat indicator, which fires every quarter note whether or not the simulation runs.
    pub fn set_beat_indicator(&mut self, enabled: bool) {
        match (enabled, self.beat_task) {
            (true, None) => {
                self.beat_task = self.scheduler.add_task(TriggerRate::Quarter, Job::Beat);
            }
            (false, Some(handle)) => {
                self.scheduler.remove_task(handle);
                self.beat_task = None;
            }
            _ => {}
        }
    }

    /// See [`Engine::toggle_cell`].
    pub fn toggle_cell(&mut self, x: usize, y: usize) -> bool {
        self.engine.toggle_cell(x, y)
    }

    /// See [`Engine::create_or_remove_beacon`].
    pub fn create_or_remove_beacon(&mut self, x: usize, y: usize) -> Option<BeaconEdit> {
        self.engine.create_or_remove_beacon(x, y, &mut self.midi)
    }

    /// See [`Engine::clear_cells`].
    pub fn clear_cells(&mut self) {
        self.engine.clear_cells();
    }

    /// See [`Engine::clear_beacons`].
    pub fn clear_beacons(&mut self) {
        self.engine.clear_beacons(&mut self.midi);
    }

    /// Acts on a pad [`Gesture`] from a grid controller.
    ///
    /// On the board, a tap toggles the cell and a hold creates or removes a beacon (both only while paused). In the
    /// control column, a tap on the [clear pad](`CLEAR_ROW`) clears cells and a hold clears beacons; the other control
    /// pads do nothing here.
    pub fn press(&mut self, gesture: Gesture) {
        match gesture {
            Gesture::Tap(CONTROL_COLUMN, CLEAR_ROW) => {
                info!("Clearing cells");
                self.clear_cells();
            }
            Gesture::Hold(CONTROL_COLUMN, CLEAR_ROW) => {
                info!("Clearing beacons");
                self.clear_beacons();
            }
            Gesture::Tap(CONTROL_COLUMN, _) | Gesture::Hold(CONTROL_COLUMN, _) => {}
            Gesture::Tap(x, y) => {
                if !self.toggle_cell(x, y) {
                    debug!("Ignored toggle at ({}, {})", x, y);
                }
            }
            Gesture::Hold(x, y) => match self.create_or_remove_beacon(x, y) {
                Some(BeaconEdit::Created(note)) => info!("Beacon created with note {}", u8::from(note)),
                Some(BeaconEdit::Removed(note)) => info!("Beacon with note {} removed", u8::from(note)),
                None => debug!("Ignored beacon edit at ({}, {})", x, y),
            },
        }
    }

    /// See [`Engine::cell_state`].
    pub fn cell_state(&self, x: usize, y: usize) -> Option<CellState> {
        self.engine.cell_state(x, y)
    }

    fn start_generations(&mut self) {
        if self.generation_task.is_none() {
            self.generation_task = self.scheduler.add_task(self.trigger_rate, Job::Generation);
        }
    }

    fn stop_generations(&mut self) {
        if let Some(handle) = self.generation_task.take() {
            self.scheduler.remove_task(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::BeaconEvent;
    use embassy_time::Duration;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use wmidi::{Note, Velocity};

    extern crate std;
    use std::vec::Vec;

    struct FakeTransport {
        playing: bool,
        position: f64,
    }

    impl Transport for FakeTransport {
        fn is_playing(&self) -> bool {
            self.playing
        }

        fn position(&self) -> f64 {
            self.position
        }

        fn tempo_bpm(&self) -> f64 {
            120.0
        }
    }

    #[derive(Default)]
    struct FakeTimer {
        last: Option<Duration>,
    }

    impl OneShotTimer for FakeTimer {
        fn schedule(&mut self, delay: Duration) {
            self.last = Some(delay);
        }
    }

    #[derive(Default)]
    struct Log(Vec<BeaconEvent>);

    impl MidiSink for Log {
        fn note_on(&mut self, note: Note, velocity: Velocity) {
            self.0.push(BeaconEvent::NoteOn(note, velocity));
        }

        fn note_off(&mut self, note: Note) {
            self.0.push(BeaconEvent::NoteOff(note));
        }
    }

    type TestApp = LifeApp<FakeTransport, FakeTimer, Log, ChaCha8Rng>;

    fn app() -> TestApp {
        LifeApp::new(
            FakeTransport {
                playing: true,
                position: 0.0,
            },
            FakeTimer::default(),
            Log::default(),
            ChaCha8Rng::seed_from_u64(2090),
        )
    }

    fn generation_rate(app: &TestApp) -> Option<TriggerRate> {
        app.generation_task
            .and_then(|handle| app.scheduler().rate(handle))
    }

    #[test]
    fn starts_running_on_fixed_interval() {
        let app = app();
        assert!(app.is_running());
        assert_eq!(
            Some(TriggerRate::Fixed100Ms),
            generation_rate(&app),
            "Expected left but got right"
        );
        assert_eq!(
            Some(Duration::from_millis(100)),
            app.scheduler().timer().last,
            "Expected left but got right"
        );
    }

    #[test]
    fn pausing_removes_generation_task() {
        let mut app = app();
        app.set_running(false);
        assert!(app.scheduler().is_empty());
        assert_eq!(Wake::default(), app.on_wake(), "Expected left but got right");

        app.set_running(true);
        assert_eq!(1, app.scheduler().len(), "Expected left but got right");
    }

    #[test]
    fn starting_twice_keeps_one_task() {
        let mut app = app();
        app.set_running(true);
        app.set_running(true);
        assert_eq!(1, app.scheduler().len(), "Expected left but got right");
    }

    #[test]
    fn changing_rate_replaces_generation_task() {
        let mut app = app();
        for _ in 0..10 {
            app.cycle_tempo_sync();
            assert_eq!(1, app.scheduler().len(), "Expected left but got right");
            assert_eq!(
                Some(app.tempo_sync().trigger_rate()),
                generation_rate(&app),
                "Expected left but got right"
            );
        }
    }

    #[test]
    fn changing_rate_while_paused_applies_on_start() {
        let mut app = app();
        app.set_running(false);
        app.set_tempo_sync(TempoSync::EighthNote);
        assert!(app.scheduler().is_empty());

        app.set_running(true);
        assert_eq!(
            Some(TriggerRate::Eighth),
            generation_rate(&app),
            "Expected left but got right"
        );
    }

    #[test]
    fn generations_follow_transport_grid() {
        let mut app = app();
        app.set_tempo_sync(TempoSync::QuarterNote);
        assert!(app.on_wake().simulation.contains(Operation::Generation));

        app.scheduler_mut().transport_mut().position = 0.5;
        assert_eq!(Wake::default(), app.on_wake(), "Expected left but got right");

        app.scheduler_mut().transport_mut().position = 1.0;
        assert!(app.on_wake().simulation.contains(Operation::Generation));
    }

    #[test]
    fn beat_indicator_runs_while_paused() {
        let mut app = app();
        app.set_running(false);
        app.set_beat_indicator(true);
        app.set_beat_indicator(true);
        assert_eq!(1, app.scheduler().len(), "Expected left but got right");
        assert_eq!(
            Wake {
                simulation: Operation::none(),
                beat: true,
            },
            app.on_wake(),
            "Expected left but got right"
        );

        app.set_beat_indicator(false);
        assert!(!app.beat_indicator());
        assert!(app.scheduler().is_empty());
    }

    #[test]
    fn auto_seed_controls() {
        let mut app = app();
        app.advance_auto_seed();
        assert_eq!(16, app.engine().auto_reseed(), "Expected left but got right");
        app.advance_auto_seed();
        assert_eq!(32, app.engine().auto_reseed(), "Expected left but got right");
        app.toggle_auto_seed();
        assert_eq!(0, app.engine().auto_reseed(), "Expected left but got right");
        app.toggle_auto_seed();
        assert_eq!(32, app.engine().auto_reseed(), "Expected left but got right");
    }

    #[test]
    fn reseeding_populates_board() {
        let mut app = app();
        app.set_auto_reseed(4);
        let reseeds = (0..8)
            .filter(|_| app.on_wake().simulation.contains(Operation::Reseed))
            .count();
        assert_eq!(2, reseeds, "Expected left but got right");
        assert!(app.engine().grid().population() > 0);
    }

    #[test]
    fn beacon_edits_reach_midi() {
        let mut app = app();
        app.set_running(false);
        assert_eq!(
            Some(BeaconEdit::Created(Note::C4)),
            app.create_or_remove_beacon(4, 4),
            "Expected left but got right"
        );
        for (x, y) in [(4, 4), (5, 4), (4, 5), (5, 5)] {
            app.toggle_cell(x, y);
        }
        app.set_running(true);
        app.on_wake();
        assert!(app.cell_state(4, 4).unwrap().sounding);

        app.clear_beacons();
        assert_eq!(
            Some(&BeaconEvent::NoteOff(Note::C4)),
            app.midi().0.last(),
            "Expected left but got right"
        );
        assert!(!app.cell_state(4, 4).unwrap().is_beacon());
    }

    #[test]
    fn beat_and_generation_reported_apart() {
        let mut app = app();
        app.set_tempo_sync(TempoSync::QuarterNote);
        app.set_beat_indicator(true);
        let wake = app.on_wake();
        assert!(wake.beat, "Beat indicator should have fired");
        assert_eq!(Operation::Generation, wake.simulation, "Expected left but got right");
    }

    #[test]
    fn pad_gestures_edit_board() {
        let mut app = app();
        app.set_running(false);
        app.press(Gesture::Tap(8, 2));
        assert!(app.cell_state(8, 2).unwrap().alive);

        app.press(Gesture::Hold(9, 3));
        assert!(app.cell_state(9, 3).unwrap().is_beacon());
        app.press(Gesture::Hold(9, 3));
        assert!(!app.cell_state(9, 3).unwrap().is_beacon());
    }

    #[test]
    fn pad_edits_ignored_while_running() {
        let mut app = app();
        app.press(Gesture::Tap(8, 2));
        app.press(Gesture::Hold(9, 3));
        assert_eq!(0, app.engine().grid().population(), "Expected left but got right");
        assert!(!app.cell_state(9, 3).unwrap().is_beacon());
    }

    #[test]
    fn clear_pad_tap_clears_cells_and_hold_clears_beacons() {
        let mut app = app();
        app.set_running(false);
        app.create_or_remove_beacon(4, 4);
        app.toggle_cell(8, 2);

        app.press(Gesture::Tap(CONTROL_COLUMN, CLEAR_ROW));
        assert_eq!(0, app.engine().grid().population(), "Expected left but got right");
        assert!(app.cell_state(4, 4).unwrap().is_beacon());

        app.press(Gesture::Hold(CONTROL_COLUMN, CLEAR_ROW));
        assert!(!app.cell_state(4, 4).unwrap().is_beacon());
        assert_eq!(
            Some(&BeaconEvent::NoteOff(Note::C4)),
            app.midi().0.last(),
            "Expected left but got right"
        );
    }

    #[test]
    fn other_control_pads_do_nothing() {
        let mut app = app();
        app.set_running(false);
        app.toggle_cell(8, 2);
        app.press(Gesture::Tap(CONTROL_COLUMN, 4));
        app.press(Gesture::Hold(CONTROL_COLUMN, 4));
        assert_eq!(1, app.engine().grid().population(), "Expected left but got right");
        assert!(!app.is_running());
    }

    #[test]
    fn clear_cells_empties_board() {
        let mut app = app();
        app.set_running(false);
        app.toggle_cell(8, 2);
        app.clear_cells();
        assert_eq!(0, app.engine().grid().population(), "Expected left but got right");
    }
}
