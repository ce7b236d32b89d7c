//! One-off delayed events.
//!
//! A deferred event runs its action once, `delay` ticks after it was created. Events landing on the same tick are
//! kept in one bucket, and each bucket owns a single clock subscription (the dispatcher) which fires at that tick,
//! delivers every event of the bucket and then tears itself down. Thousands of one-off events due at the same tick
//! therefore cost a single entry in the clock queue.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::state::SimulationState;
use crate::timed::{Id, Timed};

/// Identifier of a deferred event.
pub type DeferredEventId = u64;

/// Delivery status of a deferred event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DeferredStatus {
    /// Waiting for its target tick.
    Pending,
    /// The action has been executed.
    Delivered,
    /// The event was cancelled before delivery, its action will never run.
    Cancelled,
}

pub(crate) struct ScheduledAction {
    pub action: Box<dyn FnOnce()>,
    pub status: Rc<Cell<DeferredStatus>>,
}

pub(crate) struct DeferredBucket {
    pub dispatcher_id: Id,
    // keeps the dispatcher alive, the clock only holds a weak reference
    #[allow(dead_code)]
    pub dispatcher: Rc<RefCell<DeferredDispatcher>>,
    pub events: BTreeMap<DeferredEventId, ScheduledAction>,
}

/// Clock subscriber delivering all deferred events of one target tick.
pub(crate) struct DeferredDispatcher {
    target_tick: u64,
    sim_state: Weak<RefCell<SimulationState>>,
}

impl DeferredDispatcher {
    pub fn new(target_tick: u64, sim_state: Weak<RefCell<SimulationState>>) -> Self {
        Self { target_tick, sim_state }
    }
}

impl Timed for DeferredDispatcher {
    fn tick(&mut self, _fires: u64) {
        let Some(sim_state) = self.sim_state.upgrade() else {
            return;
        };
        let actions = sim_state.borrow_mut().take_bucket(self.target_tick);
        for scheduled in actions {
            // an earlier action of the same bucket may have cancelled this one
            if scheduled.status.get() != DeferredStatus::Pending {
                continue;
            }
            scheduled.status.set(DeferredStatus::Delivered);
            (scheduled.action)();
        }
    }
}

/// Handle of a deferred event created by [`SimulationContext::defer()`](crate::SimulationContext::defer).
///
/// # Examples
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ticksim_core::Simulation;
///
/// let mut sim = Simulation::new(123);
/// let ctx = sim.create_context("comp");
/// let counter = Rc::new(Cell::new(0));
///
/// let c = counter.clone();
/// let first = ctx.defer(10, move || c.set(c.get() + 1));
/// let c = counter.clone();
/// let second = ctx.defer(10, move || c.set(c.get() + 1));
/// // both events share one subscription
/// assert_eq!(sim.subscription_count(), 1);
///
/// assert!(second.cancel());
/// sim.simulate_until_last_event();
/// assert!(first.is_delivered());
/// assert!(second.is_cancelled());
/// assert_eq!(counter.get(), 1);
/// ```
pub struct DeferredEvent {
    id: DeferredEventId,
    delay: u64,
    target_tick: u64,
    status: Rc<Cell<DeferredStatus>>,
    sim_state: Weak<RefCell<SimulationState>>,
}

impl DeferredEvent {
    pub(crate) fn delivered(delay: u64, target_tick: u64) -> Self {
        Self {
            id: DeferredEventId::MAX,
            delay,
            target_tick,
            status: Rc::new(Cell::new(DeferredStatus::Delivered)),
            sim_state: Weak::new(),
        }
    }

    pub(crate) fn scheduled(
        id: DeferredEventId,
        delay: u64,
        target_tick: u64,
        status: Rc<Cell<DeferredStatus>>,
        sim_state: Weak<RefCell<SimulationState>>,
    ) -> Self {
        Self {
            id,
            delay,
            target_tick,
            status,
            sim_state,
        }
    }

    /// Returns the event identifier (`u64::MAX` for events delivered immediately on creation).
    pub fn id(&self) -> DeferredEventId {
        self.id
    }

    /// Returns the requested delay in ticks.
    pub fn delay(&self) -> u64 {
        self.delay
    }

    /// Returns the tick at which the event is (or was) delivered.
    pub fn target_tick(&self) -> u64 {
        self.target_tick
    }

    /// Returns the current delivery status.
    pub fn status(&self) -> DeferredStatus {
        self.status.get()
    }

    /// Checks whether the event still waits for delivery.
    pub fn is_pending(&self) -> bool {
        self.status.get() == DeferredStatus::Pending
    }

    /// Checks whether the event was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.status.get() == DeferredStatus::Cancelled
    }

    /// Checks whether the event action was executed.
    pub fn is_delivered(&self) -> bool {
        self.status.get() == DeferredStatus::Delivered
    }

    /// Cancels the event.
    ///
    /// Returns `false` if the event was already delivered or cancelled, in which case nothing changes.
    /// Cancelling the last pending event of a tick removes the clock subscription of that tick.
    pub fn cancel(&self) -> bool {
        if self.status.get() != DeferredStatus::Pending {
            return false;
        }
        self.status.set(DeferredStatus::Cancelled);
        if let Some(sim_state) = self.sim_state.upgrade() {
            sim_state.borrow_mut().cancel_deferred(self.target_tick, self.id);
        }
        true
    }
}
