//! Provides [`Scheduler`], which fires periodic tasks on musical grid lines (or fixed intervals) using nothing but a
//! one-shot timer supplied by the host.
//!
//! The scheduler never sleeps or spins. Each time it arms the host's timer, it asks for a wake-up at the next 1/64-beat
//! boundary (or in 100ms, when a fixed-interval task is registered). On waking, it reads the position of the
//! [`Transport`] once, fires every task whose grid line has been crossed since it last fired, and arms the timer again.
//! Because every wake re-reads the transport, pausing, relocating, or changing tempo upstream is picked up on the very
//! next wake without any bookkeeping.

mod trigger_rate;
pub use trigger_rate::*;

use crate::transport::Transport;
use embassy_time::Duration;
use num_traits::float::FloatCore;
use tinyvec::ArrayVec;

/// The scheduler's resolution in beats: 1/64 of a beat.
pub const BASE_STEP: f64 = 1.0 / 64.0;

/// Tempo is clamped to at least this many beats per minute when converting beats to milliseconds.
pub const MIN_TEMPO_BPM: f64 = 20.0;

/// A wake landing this close (in beats) before a boundary waits for the following boundary instead.
const BOUNDARY_EPSILON: f64 = 0.001;

/// The shortest delay ever requested from the timer.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Default number of tasks a [`Scheduler`] can hold.
const DEFAULT_CAPACITY: usize = 4;

/// The host's one-shot delay primitive.
///
/// After `schedule` is called, the host is expected to call [`Scheduler::on_wake`] once `delay` has elapsed. Each call
/// replaces any wake-up still pending, so at most one request is ever outstanding. There is no cancellation: a pending
/// wake-up which finds nothing to do simply doesn't ask for another.
pub trait OneShotTimer {
    /// Requests a single wake-up after `delay`.
    fn schedule(&mut self, delay: Duration);
}

/// Identifies a task registered with a [`Scheduler`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskHandle(u32);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ScheduledTask<J> {
    handle: TaskHandle,
    rate: TriggerRate,
    job: J,
    /// Position at which the task last fired; never updated for fixed-interval tasks.
    last_trigger: Option<f64>,
}

/// A tempo-synchronized task scheduler.
///
/// Tasks are identified by a `job` value which is handed back to the caller when the task fires; see
/// [`on_wake`](`Self::on_wake`). The scheduler owns the [`Transport`] it follows and the [`OneShotTimer`] it arms.
pub struct Scheduler<C, O, J, const N: usize = DEFAULT_CAPACITY> {
    transport: C,
    timer: O,
    tasks: ArrayVec<[ScheduledTask<J>; N]>,
    next_handle: u32,
    active: bool,
    /// Base steps counted while the transport isn't playing; advanced once per wake and never wrapped.
    free_running_steps: u64,
}

impl<C, O, J, const N: usize> Scheduler<C, O, J, N>
where
    C: Transport,
    O: OneShotTimer,
    J: Copy + Default + PartialEq,
{
    /// Constructs an active [`Scheduler`] with no tasks.
    pub fn new(transport: C, timer: O) -> Self {
        Self {
            transport,
            timer,
            tasks: ArrayVec::new(),
            next_handle: 0,
            active: true,
            free_running_steps: 0,
        }
    }

    /// Registers a task which will hand `job` back to the caller each time `rate` comes due, arming the timer if the
    /// scheduler is active.
    ///
    /// Registering the same `rate` and `job` twice returns the existing task's handle and changes nothing. Returns
    /// `None` if the scheduler is full.
    pub fn add_task(&mut self, rate: TriggerRate, job: J) -> Option<TaskHandle> {
        if let Some(existing) = self.tasks.iter().find(|t| t.rate == rate && t.job == job) {
            return Some(existing.handle);
        }

        let handle = TaskHandle(self.next_handle);
        let task = ScheduledTask {
            handle,
            rate,
            job,
            last_trigger: None,
        };
        if self.tasks.try_push(task).is_some() {
            warn!("Scheduler is full; cannot hold more than {} tasks", N);
            return None;
        }
        self.next_handle = self.next_handle.wrapping_add(1);
        debug!("Added task {}", handle.0);

        if self.active {
            self.arm();
        }
        Some(handle)
    }

    /// Deregisters a task. Returns `false` if no such task was registered.
    ///
    /// Safe to call from within [`on_wake`](`Self::on_wake`), including for the task currently firing.
    pub fn remove_task(&mut self, handle: TaskHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.handle != handle);
        let removed = self.tasks.len() != before;
        if removed {
            debug!("Removed task {}", handle.0);
        }
        removed
    }

    /// Returns true if the task is registered.
    pub fn contains(&self, handle: TaskHandle) -> bool {
        self.tasks.iter().any(|t| t.handle == handle)
    }

    /// Returns the rate of a registered task.
    pub fn rate(&self, handle: TaskHandle) -> Option<TriggerRate> {
        self.tasks
            .iter()
            .find(|t| t.handle == handle)
            .map(|t| t.rate)
    }

    /// The number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no tasks are registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Pausing stops the scheduler from arming the timer; resuming arms it against the current position.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if active && !self.is_empty() {
            self.arm();
        }
    }

    /// Returns true unless the scheduler has been paused.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Getter.
    pub fn transport(&self) -> &C {
        &self.transport
    }

    /// Gives the host access to the transport, e.g., to feed it incoming MIDI clock.
    pub fn transport_mut(&mut self) -> &mut C {
        &mut self.transport
    }

    /// Getter.
    pub fn timer(&self) -> &O {
        &self.timer
    }

    /// Samples the current position: the transport's, if it's playing, otherwise the free-running position, which is
    /// advanced by one [`BASE_STEP`] as a result of the call.
    ///
    /// The free-running position reported here wraps every beat, staying within `[0.0, 1.0)`. Tasks aren't judged
    /// against it, though: [`on_wake`](`Self::on_wake`) measures free-running time as an unwrapped count of base
    /// steps, so without a transport a [`TriggerRate::Half`] task still fires every two beats and a
    /// [`TriggerRate::Whole`] task every four.
    pub fn current_position(&mut self) -> f64 {
        let position = self.advance_timeline();
        if self.transport.is_playing() {
            position
        } else {
            position - FloatCore::floor(position)
        }
    }

    /// Samples the position tasks are judged against: the transport's, if it's playing, otherwise the unwrapped
    /// free-running count, which is advanced by one [`BASE_STEP`].
    fn advance_timeline(&mut self) -> f64 {
        if self.transport.is_playing() {
            self.transport.position()
        } else {
            self.free_running_steps += 1;
            self.free_running_steps as f64 * BASE_STEP
        }
    }

    /// The timeline position without advancing the free-running count.
    fn peek_position(&self) -> f64 {
        if self.transport.is_playing() {
            self.transport.position()
        } else {
            self.free_running_steps as f64 * BASE_STEP
        }
    }

    /// Computes how long to wait before the next wake.
    ///
    /// If any fixed-interval task is registered, this is always [`TriggerRate::FIXED_INTERVAL`], and grid-based tasks
    /// only get to fire on whichever 100ms wake follows their grid line. Otherwise it is the time remaining until the
    /// next 1/64-beat boundary at the transport's tempo (clamped to [`MIN_TEMPO_BPM`]), never less than 1ms.
    pub fn next_delay(&self) -> Duration {
        if self.tasks.iter().any(|t| t.rate.is_fixed()) {
            return TriggerRate::FIXED_INTERVAL;
        }

        let phase = self.peek_position() / BASE_STEP;
        let fraction = phase - FloatCore::floor(phase);
        let mut beats_until = BASE_STEP - fraction * BASE_STEP;
        if beats_until <= BOUNDARY_EPSILON {
            beats_until += BASE_STEP;
        }

        let bpm = FloatCore::max(self.transport.tempo_bpm(), MIN_TEMPO_BPM);
        // truncating to whole milliseconds errs toward waking early; an early wake just re-arms for the remainder
        let millis = (beats_until * 60_000.0 / bpm) as u64;
        Duration::from_millis(millis).max(MIN_DELAY)
    }

    /// Handles a wake-up from the host's timer.
    ///
    /// Samples the position once and calls `run` with the job of each task that is due, then re-arms the timer if the
    /// scheduler is still active and has tasks left. `run` receives the scheduler itself so that it may add or remove
    /// tasks (including the one firing); a task removed by an earlier `run` in the same wake is not run.
    pub fn on_wake<F>(&mut self, mut run: F)
    where
        F: FnMut(&mut Self, J),
    {
        let position = self.advance_timeline();
        trace!("Woke at position {}", position);

        // snapshot first, so that `run` is free to modify the task list
        let mut due: ArrayVec<[(TaskHandle, J); N]> = ArrayVec::new();
        for task in self.tasks.iter_mut() {
            if task.rate.is_due(task.last_trigger, position) {
                if !task.rate.is_fixed() {
                    task.last_trigger = Some(position);
                }
                due.push((task.handle, task.job));
            }
        }

        for (handle, job) in due {
            if self.contains(handle) {
                run(self, job);
            }
        }

        if self.active && !self.is_empty() {
            self.arm();
        }
    }

    fn arm(&mut self) {
        let delay = self.next_delay();
        trace!("Arming timer for {} ms", delay.as_millis());
        self.timer.schedule(delay);
    }
}
