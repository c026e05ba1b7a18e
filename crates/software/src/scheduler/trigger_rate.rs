use embassy_time::Duration;
use num_traits::float::FloatCore;

/// How often a scheduled task fires: once per crossing of a musical grid line, or on a fixed wall-clock interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerRate {
    /// Every 32nd note.
    ThirtySecond,
    /// Every 16th note.
    Sixteenth,
    /// Every 8th note.
    Eighth,
    /// Every beat.
    #[default]
    Quarter,
    /// Every half note.
    Half,
    /// Every whole note.
    Whole,
    /// Every 100 milliseconds, ignoring musical time entirely.
    Fixed100Ms,
}

impl TriggerRate {
    /// The wall-clock interval of [`TriggerRate::Fixed100Ms`].
    pub const FIXED_INTERVAL: Duration = Duration::from_millis(100);

    /// Returns the spacing of this rate's grid lines in beats, or `None` for fixed-interval rates.
    pub fn grid(&self) -> Option<f64> {
        match self {
            Self::ThirtySecond => Some(0.125),
            Self::Sixteenth => Some(0.25),
            Self::Eighth => Some(0.5),
            Self::Quarter => Some(1.0),
            Self::Half => Some(2.0),
            Self::Whole => Some(4.0),
            Self::Fixed100Ms => None,
        }
    }

    /// Returns true if this rate ignores musical time.
    pub fn is_fixed(&self) -> bool {
        self.grid().is_none()
    }

    /// Determines whether a task last triggered at `last` is due at `position`.
    ///
    /// A task is due when at least one grid line lies in `(last, position]`, i.e., when the number of whole grid
    /// intervals elapsed since the start of the song has increased. Tasks which have never triggered, and tasks on a
    /// fixed interval, are always due. A position earlier than `last` means the transport was moved backwards or
    /// handed over to free-running time; that too counts as crossing a grid line.
    pub fn is_due(&self, last: Option<f64>, position: f64) -> bool {
        let (Some(grid), Some(last)) = (self.grid(), last) else {
            return true;
        };
        position < last || FloatCore::floor(position / grid) > FloatCore::floor(last / grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_divisors() {
        assert_eq!(Some(4.0), TriggerRate::Whole.grid(), "Expected left but got right");
        assert_eq!(Some(1.0), TriggerRate::Quarter.grid(), "Expected left but got right");
        assert_eq!(
            Some(0.125),
            TriggerRate::ThirtySecond.grid(),
            "Expected left but got right"
        );
        assert_eq!(None, TriggerRate::Fixed100Ms.grid(), "Expected left but got right");
    }

    #[test]
    fn not_due_within_same_grid_interval() {
        assert!(!TriggerRate::Eighth.is_due(Some(0.24), 0.49));
    }

    #[test]
    fn due_after_crossing_grid_line() {
        assert!(TriggerRate::Eighth.is_due(Some(0.24), 0.51));
    }

    #[test]
    fn due_exactly_on_grid_line() {
        assert!(TriggerRate::Quarter.is_due(Some(0.99), 1.0));
    }

    #[test]
    fn due_when_never_triggered() {
        assert!(TriggerRate::Whole.is_due(None, 0.0));
    }

    #[test]
    fn due_when_position_moves_backwards() {
        assert!(TriggerRate::Half.is_due(Some(3.5), 0.25));
    }

    #[test]
    fn fixed_always_due() {
        assert!(TriggerRate::Fixed100Ms.is_due(Some(0.5), 0.5));
    }
}
