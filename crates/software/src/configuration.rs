//! This module contains the performer-selectable settings of the simulation (implemented as enums) and a trait which makes
//! them convenient to drive from the buttons of the control column.

mod auto_seed;
pub use auto_seed::*;

mod tempo_sync;
pub use tempo_sync::*;

use num_traits::{FromPrimitive, ToPrimitive};

/// A trait which allows infinite cycling of an enum's variants.
///
/// Each press of a control button advances from the current to the next variant, cycling back to the beginning when all
/// variants have been exhausted.
pub trait CycleConfig {
    /// Return the next variant, cycling back to the beginning as needed.
    fn cycle(self) -> Self
    where
        Self: FromPrimitive + ToPrimitive + Sized,
    {
        let index = self
            .to_u8()
            .expect("enum variants should be castable to u8");
        match <Self as FromPrimitive>::from_u8(index + 1) {
            Some(new_selection) => new_selection,
            None => FromPrimitive::from_u8(0).expect("enum should not be empty"),
        }
    }
}
