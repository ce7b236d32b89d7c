//! Accessing the simulation clock from components.

use std::cell::RefCell;
use std::rc::Rc;

use rand::distributions::uniform::{SampleRange, SampleUniform};

use crate::deferred::DeferredEvent;
use crate::state::SimulationState;
use crate::timed::Id;

/// A facade for accessing the simulation state from components: subscribing to the clock, creating deferred events
/// and using the simulation-wide random number generator.
///
/// Each context is bound to one subscriber identity, so a component holds at most one clock subscription.
pub struct SimulationContext {
    id: Id,
    name: String,
    sim_state: Rc<RefCell<SimulationState>>,
}

impl SimulationContext {
    pub(crate) fn new(id: Id, name: &str, sim_state: Rc<RefCell<SimulationState>>) -> Self {
        Self {
            id,
            name: name.to_owned(),
            sim_state,
        }
    }

    /// Returns the identifier of component associated with this context.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns the name of component associated with this context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulation tick.
    pub fn time(&self) -> u64 {
        self.sim_state.borrow().time()
    }

    /// Returns a random float in the range _[0, 1)_
    /// using the simulation-wide random number generator.
    pub fn rand(&mut self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random value in the specified range
    /// using the simulation-wide random number generator.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Creates a context for another component sharing the same simulation.
    ///
    /// The same name always maps to the same component identifier.
    pub fn create_context<S>(&self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        let id = self.sim_state.borrow_mut().register(name.as_ref());
        SimulationContext::new(id, name.as_ref(), self.sim_state.clone())
    }

    /// Subscribes the component to the clock, the first callback happens `frequency` ticks from now.
    ///
    /// Returns `false` and changes nothing if the component is already subscribed.
    /// A subscription with zero frequency fires once at the current tick; the component must then raise its frequency
    /// or unsubscribe inside the callback, otherwise the clock panics.
    pub fn subscribe(&mut self, frequency: u64) -> bool {
        self.sim_state.borrow_mut().subscribe(self.id, frequency)
    }

    /// Cancels the clock subscription of the component.
    ///
    /// Returns `false` if the component was not subscribed. Can be called inside the component's own
    /// [`tick()`](crate::Timed::tick), then the subscription is not re-armed.
    pub fn unsubscribe(&mut self) -> bool {
        self.sim_state.borrow_mut().unsubscribe(self.id)
    }

    /// Changes the subscription frequency (subscribes if not subscribed yet) and returns the new next fire tick.
    pub fn update_frequency(&mut self, frequency: u64) -> u64 {
        self.sim_state.borrow_mut().update_frequency(self.id, frequency)
    }

    /// Checks whether the component is currently subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.sim_state.borrow().is_subscribed(self.id)
    }

    /// Returns the current subscription frequency.
    pub fn frequency(&self) -> u64 {
        self.sim_state.borrow().frequency(self.id)
    }

    /// Returns the tick of the next callback ([`NEVER`](crate::NEVER) if not subscribed).
    pub fn next_fire(&self) -> u64 {
        self.sim_state.borrow().next_fire(self.id)
    }

    /// Creates a one-off event which runs `action` after `delay` ticks.
    ///
    /// With zero delay the action runs right away, before this method returns, and no subscription is created.
    /// A target tick which does not fit into `u64` saturates to [`NEVER`](crate::NEVER).
    pub fn defer<F>(&self, delay: u64, action: F) -> DeferredEvent
    where
        F: FnOnce() + 'static,
    {
        if delay == 0 {
            let now = self.time();
            action();
            return DeferredEvent::delivered(delay, now);
        }
        let weak_state = Rc::downgrade(&self.sim_state);
        let (id, target_tick, status) =
            self.sim_state
                .borrow_mut()
                .add_deferred(delay, Box::new(action), weak_state.clone());
        DeferredEvent::scheduled(id, delay, target_tick, status, weak_state)
    }
}
