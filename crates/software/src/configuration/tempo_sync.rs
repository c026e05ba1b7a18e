use crate::scheduler::TriggerRate;
use num_derive::{FromPrimitive, ToPrimitive};

/// Determines how often the simulation advances one generation.
///
/// Every setting other than [`TempoSync::Off`] locks generations to the transport's musical grid, so the simulation
/// speeds up and slows down with the tempo of the host. When the transport isn't running, the scheduler keeps time on
/// its own.
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TempoSync {
    /// Generations advance every 100 milliseconds regardless of tempo.
    #[default]
    Off,
    /// One generation per 32nd note.
    ThirtySecondNote,
    /// One generation per 16th note.
    SixteenthNote,
    /// One generation per 8th note.
    EighthNote,
    /// One generation per quarter note.
    QuarterNote,
    /// One generation per half note.
    HalfNote,
}

impl TempoSync {
    /// Returns the [`TriggerRate`] the generation task should be scheduled at.
    pub fn trigger_rate(&self) -> TriggerRate {
        match self {
            Self::Off => TriggerRate::Fixed100Ms,
            Self::ThirtySecondNote => TriggerRate::ThirtySecond,
            Self::SixteenthNote => TriggerRate::Sixteenth,
            Self::EighthNote => TriggerRate::Eighth,
            Self::QuarterNote => TriggerRate::Quarter,
            Self::HalfNote => TriggerRate::Half,
        }
    }

    /// Returns true for any value other than [`TempoSync::Off`].
    pub fn is_synced(&self) -> bool {
        *self != Self::Off
    }
}

impl super::CycleConfig for TempoSync {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::CycleConfig;

    #[test]
    fn off_runs_on_fixed_interval() {
        assert_eq!(
            TriggerRate::Fixed100Ms,
            TempoSync::Off.trigger_rate(),
            "Expected left but got right"
        );
        assert!(!TempoSync::Off.is_synced(), "Should not be synced");
    }

    #[test]
    fn cycles_through_every_division_then_off() {
        let mut sync = TempoSync::Off;
        let mut rates = [TriggerRate::Fixed100Ms; 6];
        for rate in rates.iter_mut() {
            sync = sync.cycle();
            *rate = sync.trigger_rate();
        }
        assert_eq!(
            [
                TriggerRate::ThirtySecond,
                TriggerRate::Sixteenth,
                TriggerRate::Eighth,
                TriggerRate::Quarter,
                TriggerRate::Half,
                TriggerRate::Fixed100Ms,
            ],
            rates,
            "Expected left but got right"
        );
    }
}
