use super::CycleConfig;
use num_derive::{FromPrimitive, ToPrimitive};

/// The number of generations between automatic reseeds.
#[derive(Debug, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutoSeedInterval {
    /// Reseed every 4 generations.
    Ticks4,
    /// Reseed every 8 generations.
    Ticks8,
    /// Reseed every 16 generations.
    Ticks16,
    /// Reseed every 32 generations.
    Ticks32,
    /// Reseed every 64 generations.
    Ticks64,
    /// Reseed every 128 generations.
    Ticks128,
    /// Reseed every 256 generations.
    Ticks256,
    /// Reseed every 1024 generations.
    Ticks1024,
}

impl AutoSeedInterval {
    /// Returns the interval as a number of generations.
    pub fn ticks(&self) -> u16 {
        match self {
            Self::Ticks4 => 4,
            Self::Ticks8 => 8,
            Self::Ticks16 => 16,
            Self::Ticks32 => 32,
            Self::Ticks64 => 64,
            Self::Ticks128 => 128,
            Self::Ticks256 => 256,
            Self::Ticks1024 => 1024,
        }
    }
}

impl CycleConfig for AutoSeedInterval {}

/// Automatic reseeding keeps a sparse board from dying out by sprinkling in a random batch of live cells every so
/// many generations.
///
/// A single control button drives this setting: a short press turns reseeding on (or, when it is already on, advances to
/// the next interval); a long press switches it off. Switching it back on restores the interval last in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AutoSeed {
    interval: Option<AutoSeedInterval>,
    last_interval: AutoSeedInterval,
}

impl Default for AutoSeed {
    fn default() -> Self {
        Self {
            interval: None,
            last_interval: AutoSeedInterval::Ticks16,
        }
    }
}

impl AutoSeed {
    /// Returns the selected interval, if reseeding is enabled.
    pub fn interval(&self) -> Option<AutoSeedInterval> {
        self.interval
    }

    /// Returns true if reseeding is enabled.
    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// The interval in generations, where 0 means disabled.
    pub fn ticks(&self) -> u16 {
        self.interval.map_or(0, |interval| interval.ticks())
    }

    /// Enables reseeding at the last interval in use or, if already enabled, advances to the next interval.
    pub fn advance(&mut self) {
        let next = match self.interval {
            None => self.last_interval,
            Some(interval) => interval.cycle(),
        };
        self.interval = Some(next);
        self.last_interval = next;
    }

    /// Switches reseeding off, or back on at the last interval in use.
    pub fn toggle(&mut self) {
        self.interval = match self.interval {
            Some(interval) => {
                self.last_interval = interval;
                None
            }
            None => Some(self.last_interval),
        };
    }
}
