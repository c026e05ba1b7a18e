//! The board: a toroidal grid of [`Cell`]s, minus one column reserved for controls.

use super::Beacon;
use rand::Rng;

/// `age_since_death` of a cell which died long ago (or was never alive). Ages stop counting here.
pub const LONG_DEAD: u16 = 999;

/// The leftmost column holds the control buttons and takes no part in the simulation.
pub const CONTROL_COLUMN: usize = 0;

/// Fewest live cells added by a reseed.
const SEED_MIN: usize = 30;
/// Number of different batch sizes a reseed may add, i.e., a reseed adds `SEED_MIN..SEED_MIN + SEED_SPREAD` cells.
const SEED_SPREAD: usize = 40;

/// A single square of the board.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell {
    alive: bool,
    age_since_death: u16,
    beacon: Option<Beacon>,
    /// The age the cell had before it was switched on by hand, restored if it is switched back off before the next
    /// generation.
    revived_from: Option<u16>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            alive: false,
            age_since_death: LONG_DEAD,
            beacon: None,
            revived_from: None,
        }
    }
}

impl Cell {
    /// Getter.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Generations since the cell last died; 0 while alive, [`LONG_DEAD`] at most.
    pub fn age_since_death(&self) -> u16 {
        self.age_since_death
    }

    /// The beacon attached to this cell, if any.
    pub fn beacon(&self) -> Option<Beacon> {
        self.beacon
    }

    pub(crate) fn beacon_mut(&mut self) -> Option<&mut Beacon> {
        self.beacon.as_mut()
    }

    pub(crate) fn set_beacon(&mut self, beacon: Option<Beacon>) {
        self.beacon = beacon;
    }

    /// Flips the cell by hand.
    pub(crate) fn toggle(&mut self) {
        if self.alive {
            self.alive = false;
            self.age_since_death = self.revived_from.take().unwrap_or(LONG_DEAD);
        } else {
            self.revived_from = Some(self.age_since_death);
            self.alive = true;
            self.age_since_death = 0;
        }
    }

    pub(crate) fn revive(&mut self) {
        self.alive = true;
        self.age_since_death = 0;
        self.revived_from = None;
    }

    pub(crate) fn kill(&mut self) {
        self.alive = false;
        self.age_since_death = LONG_DEAD;
        self.revived_from = None;
    }

    /// Moves the cell into the next generation.
    fn advance(&mut self, alive: bool) {
        self.alive = alive;
        self.age_since_death = if alive {
            0
        } else {
            (self.age_since_death + 1).min(LONG_DEAD)
        };
        self.revived_from = None;
    }
}

/// The liveness of every cell in the generation to come, along with the neighbor counts which produced it.
///
/// Computing this in full before touching the board means every cell's fate is decided from the same, complete
/// generation, and the old and new states can be compared before the board moves on.
pub struct Generation<const W: usize, const H: usize> {
    alive: [[bool; H]; W],
    neighbors: [[u8; H]; W],
}

impl<const W: usize, const H: usize> Generation<W, H> {
    /// Whether the cell will be alive. Always `false` outside the usable area.
    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        x < W && y < H && self.alive[x][y]
    }

    /// How many live neighbors the cell had in the current generation.
    pub fn neighbors(&self, x: usize, y: usize) -> u8 {
        if x < W && y < H { self.neighbors[x][y] } else { 0 }
    }
}

/// A `W` by `H` board whose usable area (all columns but [`CONTROL_COLUMN`]) wraps around at every edge.
///
/// The defaults match a 128-pad LinnStrument: 26 columns of 8 rows, the first of which is kept for controls.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<const W: usize = 26, const H: usize = 8> {
    cells: [[Cell; H]; W],
}

impl<const W: usize, const H: usize> Default for Grid<W, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const W: usize, const H: usize> Grid<W, H> {
    /// Constructs a board of dead cells.
    pub fn new() -> Self {
        const { assert!(W > 1 && H > 0, "the board needs at least one usable cell") };
        Self {
            cells: [[Cell::default(); H]; W],
        }
    }

    /// Returns true if the coordinates lie on the board and outside the control column.
    pub fn is_usable(x: usize, y: usize) -> bool {
        x != CONTROL_COLUMN && x < W && y < H
    }

    /// Every usable coordinate, column by column.
    pub fn usable_positions() -> impl Iterator<Item = (usize, usize)> {
        (CONTROL_COLUMN + 1..W).flat_map(|x| (0..H).map(move |y| (x, y)))
    }

    /// Returns the cell at the given coordinates, if usable.
    pub fn cell(&self, x: usize, y: usize) -> Option<&Cell> {
        Self::is_usable(x, y).then(|| &self.cells[x][y])
    }

    pub(crate) fn cell_mut(&mut self, x: usize, y: usize) -> Option<&mut Cell> {
        if Self::is_usable(x, y) {
            Some(&mut self.cells[x][y])
        } else {
            None
        }
    }

    /// Returns an [`Iterator`] over usable cells and their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &Cell)> {
        Self::usable_positions().map(|(x, y)| ((x, y), &self.cells[x][y]))
    }

    /// The number of live cells.
    pub fn population(&self) -> usize {
        self.iter().filter(|(_, cell)| cell.is_alive()).count()
    }

    /// Counts the live cells among the eight surrounding `(x, y)`.
    ///
    /// Horizontally the board wraps from the last column to the first usable one (skipping the control column) and
    /// back; vertically it wraps from the bottom row to the top.
    pub fn live_neighbors(&self, x: usize, y: usize) -> u8 {
        let mut count = 0;
        for dx in -1..=1 {
            for dy in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = Self::wrap_column(x, dx);
                let ny = (y as isize + dy).rem_euclid(H as isize) as usize;
                if self.cells[nx][ny].alive {
                    count += 1;
                }
            }
        }
        count
    }

    fn wrap_column(x: usize, dx: isize) -> usize {
        let usable = (W - 1) as isize;
        let first = (CONTROL_COLUMN + 1) as isize;
        ((x as isize - first + dx).rem_euclid(usable) + first) as usize
    }

    /// Applies the rules to every usable cell: a live cell survives with two or three live neighbors, and a dead cell
    /// is born with exactly three. Everything else is dead in the next generation.
    pub fn next_generation(&self) -> Generation<W, H> {
        let mut next = Generation {
            alive: [[false; H]; W],
            neighbors: [[0; H]; W],
        };
        for (x, y) in Self::usable_positions() {
            let neighbors = self.live_neighbors(x, y);
            next.neighbors[x][y] = neighbors;
            next.alive[x][y] = match (self.cells[x][y].alive, neighbors) {
                (true, 2) | (_, 3) => true,
                _ => false,
            };
        }
        next
    }

    /// Moves every usable cell into the given generation at once.
    pub(crate) fn commit(&mut self, next: &Generation<W, H>) {
        for (x, y) in Self::usable_positions() {
            self.cells[x][y].advance(next.alive[x][y]);
        }
    }

    /// Brings a random batch of cells to life. Returns the size of the batch; cells already alive count again.
    pub(crate) fn seed<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let count = SEED_MIN + rng.gen_range(0..SEED_SPREAD);
        for _ in 0..count {
            let x = rng.gen_range(CONTROL_COLUMN + 1..W);
            let y = rng.gen_range(0..H);
            self.cells[x][y].revive();
        }
        count
    }

    /// Kills every cell, leaving beacons in place.
    pub(crate) fn kill_all(&mut self) {
        for (x, y) in Self::usable_positions() {
            self.cells[x][y].kill();
        }
    }
}
