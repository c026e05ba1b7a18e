//! The cellular automaton at the heart of the instrument.
//!
//! An [`Engine`] advances a toroidal [`Grid`] one generation per [`tick`](`Engine::tick`) under Conway's rules. Cells
//! carrying a [`Beacon`] sound a note while alive: exactly one note-on when the cell is born and exactly one note-off
//! when it dies. Optionally, a random batch of cells is brought to life every so many ticks to keep the board from
//! settling.

mod beacon;
pub use beacon::*;

mod grid;
pub use grid::*;

use crate::midi::MidiSink;
use bitmask_enum::bitmask;
use rand::Rng;
use wmidi::Note;

/// Describes what a tick did.
#[bitmask(u8)]
pub enum Operation {
    /// The board moved on by one generation.
    Generation,
    /// A random batch of cells was brought to life before the generation was computed.
    Reseed,
    /// At least one beacon sent a note-on or note-off.
    NoteChange,
}

/// Whether the simulation is advancing or open for editing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Ticks advance the board; edits are refused.
    #[default]
    Running,
    /// Ticks do nothing; cells and beacons can be edited.
    Paused,
}

/// The outcome of [`Engine::create_or_remove_beacon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconEdit {
    /// A beacon was placed, sounding the given note.
    Created(Note),
    /// The beacon sounding the given note was removed.
    Removed(Note),
}

/// What a renderer needs to know to draw a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellState {
    /// Whether the cell is alive.
    pub alive: bool,
    /// Generations since the cell died; drives a fading display.
    pub age_since_death: u16,
    /// The note of the cell's beacon, if it has one.
    pub beacon: Option<Note>,
    /// True while the beacon's note is held.
    pub sounding: bool,
}

impl CellState {
    /// Returns true if the cell carries a beacon.
    pub fn is_beacon(&self) -> bool {
        self.beacon.is_some()
    }
}

impl From<&Cell> for CellState {
    fn from(cell: &Cell) -> Self {
        let beacon = cell.beacon();
        Self {
            alive: cell.is_alive(),
            age_since_death: cell.age_since_death(),
            beacon: beacon.map(|b| b.note()),
            sounding: beacon.is_some_and(|b| b.is_sounding()),
        }
    }
}

/// The Game of Life simulation with its beacons and auto-reseed countdown.
pub struct Engine<const W: usize = 26, const H: usize = 8> {
    grid: Grid<W, H>,
    state: State,
    notes: NoteAllocator,
    /// Ticks between reseeds; 0 disables reseeding.
    auto_seed_ticks: u16,
    ticks_until_reseed: u16,
}

impl<const W: usize, const H: usize> Default for Engine<W, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const W: usize, const H: usize> Engine<W, H> {
    /// Constructs a running engine with an empty board and reseeding disabled.
    pub fn new() -> Self {
        Self {
            grid: Grid::new(),
            state: State::Running,
            notes: NoteAllocator::new(),
            auto_seed_ticks: 0,
            ticks_until_reseed: 0,
        }
    }

    /// Getter.
    pub fn grid(&self) -> &Grid<W, H> {
        &self.grid
    }

    /// Getter.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns true if ticks advance the board.
    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// Ticks between reseeds; 0 when reseeding is disabled.
    pub fn auto_reseed(&self) -> u16 {
        self.auto_seed_ticks
    }

    /// The note the next beacon would be given.
    pub fn next_note(&self) -> u8 {
        self.notes.peek()
    }

    /// Describes the cell at `(x, y)`, or returns `None` if the coordinates aren't usable.
    pub fn cell_state(&self, x: usize, y: usize) -> Option<CellState> {
        self.grid.cell(x, y).map(CellState::from)
    }

    /// Starts or pauses the simulation. Starting also restarts the reseed countdown.
    pub fn set_running(&mut self, running: bool) {
        if running {
            self.state = State::Running;
            self.restart_reseed_countdown();
        } else {
            self.state = State::Paused;
        }
        debug!("Simulation running: {}", running);
    }

    /// Reseeds every `ticks` ticks, counting from now; 0 disables reseeding.
    pub fn set_auto_reseed(&mut self, ticks: u16) {
        self.auto_seed_ticks = ticks;
        self.restart_reseed_countdown();
        debug!("Auto-reseed every {} ticks", ticks);
    }

    /// Begins counting down to the next reseed from the full interval.
    pub fn restart_reseed_countdown(&mut self) {
        self.ticks_until_reseed = self.auto_seed_ticks;
    }

    /// Advances the board by one generation, sounding and releasing beacon notes as their cells are born and die.
    ///
    /// Does nothing while paused. The whole next generation is computed before any cell changes, and each beacon is
    /// compared against it: a beacon whose cell is about to live sends a note-on unless its note is already held, and
    /// one whose cell is about to die sends a note-off if its note is held. Notes therefore always pair up, even when
    /// cells were brought to life by hand or by a reseed since the previous tick.
    pub fn tick<M, R>(&mut self, midi: &mut M, rng: &mut R) -> Operation
    where
        M: MidiSink,
        R: Rng + ?Sized,
    {
        if !self.is_running() {
            return Operation::none();
        }

        let mut operation = Operation::Generation;
        if self.auto_seed_ticks > 0 {
            self.ticks_until_reseed = self.ticks_until_reseed.saturating_sub(1);
            if self.ticks_until_reseed == 0 {
                let seeded = self.grid.seed(rng);
                debug!("Reseeded {} cells", seeded);
                self.restart_reseed_countdown();
                operation |= Operation::Reseed;
            }
        }

        let next = self.grid.next_generation();
        for (x, y) in Grid::<W, H>::usable_positions() {
            let Some(beacon) = self.grid.cell_mut(x, y).and_then(Cell::beacon_mut) else {
                continue;
            };
            if beacon.follow(next.is_alive(x, y), next.neighbors(x, y), midi) {
                operation |= Operation::NoteChange;
            }
        }
        self.grid.commit(&next);

        trace!("Generation population {}", self.grid.population());
        operation
    }

    /// Switches a cell between alive and dead by hand. Returns `false`, changing nothing, while running or if the
    /// coordinates aren't usable.
    ///
    /// Switching the same cell twice before the next tick restores it exactly, age included.
    pub fn toggle_cell(&mut self, x: usize, y: usize) -> bool {
        if self.is_running() {
            debug!("Ignoring toggle while running");
            return false;
        }
        match self.grid.cell_mut(x, y) {
            Some(cell) => {
                cell.toggle();
                true
            }
            None => false,
        }
    }

    /// Places a beacon on a cell without one, or removes the one it has, leaving the cell dead either way.
    ///
    /// New beacons get the next note in ascending order. Removing a beacon whose note is held releases the note first.
    /// Returns `None`, changing nothing, while running, if the coordinates aren't usable, or once note 127 has been
    /// given out.
    pub fn create_or_remove_beacon<M: MidiSink>(
        &mut self,
        x: usize,
        y: usize,
        midi: &mut M,
    ) -> Option<BeaconEdit> {
        if self.is_running() {
            debug!("Ignoring beacon edit while running");
            return None;
        }
        let cell = self.grid.cell_mut(x, y)?;
        let edit = match cell.beacon_mut() {
            Some(beacon) => {
                beacon.silence(midi);
                let note = beacon.note();
                cell.set_beacon(None);
                BeaconEdit::Removed(note)
            }
            None => {
                let Some(note) = self.notes.allocate() else {
                    warn!("Out of notes; beacon not created");
                    return None;
                };
                cell.set_beacon(Some(Beacon::new(note)));
                BeaconEdit::Created(note)
            }
        };
        cell.kill();
        Some(edit)
    }

    /// Kills every cell, keeping beacons. Also restarts beacon notes from middle C, even if beacons remain, so a new
    /// beacon may share a note with an existing one.
    pub fn clear_cells(&mut self) {
        self.grid.kill_all();
        if self.grid.iter().any(|(_, cell)| cell.beacon().is_some()) {
            warn!("Note sequence restarted while beacons remain");
        }
        self.notes.reset();
    }

    /// Sends a note-off for every beacon, removes them all, kills every cell, and restarts beacon notes from middle C.
    pub fn clear_beacons<M: MidiSink>(&mut self, midi: &mut M) {
        for (x, y) in Grid::<W, H>::usable_positions() {
            let Some(cell) = self.grid.cell_mut(x, y) else {
                continue;
            };
            if let Some(beacon) = cell.beacon() {
                midi.note_off(beacon.note());
                cell.set_beacon(None);
            }
        }
        self.grid.kill_all();
        self.notes.reset();
    }
}
