//! Simulation configuration and execution.

use std::cell::RefCell;
use std::rc::Rc;

use log::Level::Trace;
use log::{debug, log_enabled, trace};
use serde_json::json;

use crate::context::SimulationContext;
use crate::log::log_undelivered_tick;
use crate::state::{SimulationState, NEVER};
use crate::timed::{Id, Timed};

/// Represents a simulation, owns the clock and drives it.
///
/// The simulation is single-threaded: every callback runs on the call stack of [`fire()`](Self::fire).
/// Independent simulations do not share any state, so several of them can exist at the same time.
pub struct Simulation {
    sim_state: Rc<RefCell<SimulationState>>,
}

impl Simulation {
    /// Creates a new simulation with specified random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            sim_state: Rc::new(RefCell::new(SimulationState::new(seed))),
        }
    }

    /// Creates a new simulation context with specified name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ticksim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let comp_ctx = sim.create_context("comp");
    /// assert_eq!(comp_ctx.id(), 0);
    /// assert_eq!(comp_ctx.name(), "comp");
    /// ```
    pub fn create_context<S>(&mut self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        let id = self.sim_state.borrow_mut().register(name.as_ref());
        let ctx = SimulationContext::new(id, name.as_ref(), self.sim_state.clone());
        debug!(
            target: "simulation",
            "[{} {} simulation] Created context: {}",
            self.time(),
            crate::log::get_colored("DEBUG", colored::Color::Blue),
            json!({"name": ctx.name(), "id": ctx.id()})
        );
        ctx
    }

    /// Registers the tick handler for component with specified name, returns the component Id.
    ///
    /// The simulation keeps only a weak reference, so the caller owns the component. If the component is dropped
    /// while subscribed, its next tick is logged as undelivered and the subscription is cancelled.
    pub fn add_handler<S>(&mut self, name: S, handler: Rc<RefCell<dyn Timed>>) -> Id
    where
        S: AsRef<str>,
    {
        let mut state = self.sim_state.borrow_mut();
        let id = state.register(name.as_ref());
        state.set_handler(id, Some(Rc::downgrade(&handler)));
        debug!(
            target: "simulation",
            "[{} {} simulation] Added handler: {}",
            state.time(),
            crate::log::get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
        id
    }

    /// Removes the tick handler for component with specified name and cancels its subscription.
    pub fn remove_handler<S>(&mut self, name: S)
    where
        S: AsRef<str>,
    {
        let mut state = self.sim_state.borrow_mut();
        let id = state.lookup_id(name.as_ref());
        state.unsubscribe(id);
        state.set_handler(id, None);
        debug!(
            target: "simulation",
            "[{} {} simulation] Removed handler: {}",
            state.time(),
            crate::log::get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
    }

    /// Returns the identifier of component by its name.
    ///
    /// Panics if component with such name does not exist.
    pub fn lookup_id(&self, name: &str) -> Id {
        self.sim_state.borrow().lookup_id(name)
    }

    /// Returns the name of component by its identifier.
    ///
    /// Panics if component with such Id does not exist.
    pub fn lookup_name(&self, id: Id) -> String {
        self.sim_state.borrow().lookup_name(id)
    }

    /// Returns the current simulation tick.
    pub fn time(&self) -> u64 {
        self.sim_state.borrow().time()
    }

    /// Returns the tick of the earliest pending callback, or `None` if nothing will ever fire.
    pub fn next_event(&self) -> Option<u64> {
        self.sim_state.borrow().next_event()
    }

    /// Returns the number of active subscriptions, including the dispatchers of deferred events.
    pub fn subscription_count(&self) -> usize {
        self.sim_state.borrow().subscription_count()
    }

    /// Returns the number of ticks with pending deferred events.
    pub fn deferred_bucket_count(&self) -> usize {
        self.sim_state.borrow().deferred_bucket_count()
    }

    fn fire_due(&mut self) {
        loop {
            let next = self.sim_state.borrow_mut().pop_ready();
            let Some((id, handler)) = next else {
                break;
            };
            let tick = self.time();
            match handler {
                Some(handler) => {
                    if log_enabled!(Trace) {
                        let name = self.lookup_name(id);
                        trace!(
                            target: &name,
                            "[{} {} {}] {}",
                            tick,
                            crate::log::get_colored("TICK", colored::Color::BrightBlack),
                            name,
                            json!({"id": id, "frequency": self.sim_state.borrow().frequency(id)})
                        );
                    }
                    handler.borrow_mut().tick(tick);
                }
                None => {
                    log_undelivered_tick(tick, &self.lookup_name(id), id);
                    self.sim_state.borrow_mut().unsubscribe(id);
                }
            }
            self.sim_state.borrow_mut().rearm(id);
        }
    }

    /// Calls every subscriber due at the current tick, re-arms the ones still subscribed and advances the clock by
    /// exactly one tick.
    ///
    /// Subscribers due at the same tick are called in the order of their identifiers. When nothing is due, only the
    /// clock advances.
    ///
    /// Panics if a subscriber stays subscribed with zero frequency after its callback.
    pub fn fire(&mut self) {
        self.fire_due();
        self.sim_state.borrow_mut().advance();
    }

    /// Advances the clock by `desired_jump` ticks without calling anyone, stopping early at the next pending
    /// callback.
    ///
    /// Returns the part of the requested jump which was not made (zero if the full jump happened).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ticksim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let ctx = sim.create_context("comp");
    /// ctx.defer(30, || {});
    /// assert_eq!(sim.jump_time(20), 0);
    /// assert_eq!(sim.time(), 20);
    /// assert_eq!(sim.jump_time(20), 10);
    /// assert_eq!(sim.time(), 30);
    /// ```
    pub fn jump_time(&mut self, desired_jump: u64) -> u64 {
        self.sim_state.borrow_mut().jump_time(desired_jump)
    }

    /// Moves the clock to `desired_tick` without calling anyone.
    ///
    /// Every subscription which would fire before `desired_tick` is moved forward by whole periods, so it keeps its
    /// phase (the fire tick modulo frequency) but does not fire before `desired_tick`.
    pub fn skip_events_till(&mut self, desired_tick: u64) {
        self.sim_state.borrow_mut().skip_events_till(desired_tick);
    }

    /// Runs the simulation until no subscription is left.
    ///
    /// Never returns if some component stays subscribed forever.
    pub fn simulate_until_last_event(&mut self) {
        while self.next_event().is_some() {
            self.jump_time(NEVER);
            self.fire();
        }
    }

    /// Runs the simulation up to `target_tick`.
    ///
    /// All callbacks due at or before `target_tick` are made and the clock is left at `target_tick`. If no
    /// subscription is left, the clock stops at the last processed tick.
    pub fn simulate_until(&mut self, target_tick: u64) {
        while self.time() <= target_tick && self.next_event().is_some() {
            self.jump_time(target_tick - self.time());
            if self.time() < target_tick {
                self.fire();
            } else {
                self.fire_due();
                break;
            }
        }
    }

    /// Clears all subscriptions and pending deferred events and moves the clock back to zero.
    ///
    /// Registered components and contexts stay valid. Used between independent runs, never during one.
    pub fn reset(&mut self) {
        self.sim_state.borrow_mut().reset();
        debug!(
            target: "simulation",
            "[{} {} simulation] Reset",
            self.time(),
            crate::log::get_colored("DEBUG", colored::Color::Blue),
        );
    }
}
