//! Periodic participation in the simulation.

/// Identifier of a clock subscriber.
pub type Id = u32;

/// Trait for components which receive periodic callbacks from the simulation clock.
///
/// A component subscribes through its [`SimulationContext`](crate::SimulationContext) with a frequency (the number of
/// ticks between two callbacks). The clock then calls [`tick()`](Timed::tick) every time the component's next fire tick
/// is reached. Inside the callback the component may change its frequency, unsubscribe or subscribe again, all
/// through the same context.
///
/// # Examples
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ticksim_core::{Simulation, SimulationContext, Timed};
///
/// struct Slowdown {
///     fired_at: Vec<u64>,
///     ctx: SimulationContext,
/// }
///
/// impl Timed for Slowdown {
///     fn tick(&mut self, fires: u64) {
///         self.fired_at.push(fires);
///         let frequency = self.ctx.frequency();
///         self.ctx.update_frequency(frequency * 2);
///     }
/// }
///
/// let mut sim = Simulation::new(123);
/// let comp = Rc::new(RefCell::new(Slowdown { fired_at: Vec::new(), ctx: sim.create_context("comp") }));
/// sim.add_handler("comp", comp.clone());
/// comp.borrow_mut().ctx.subscribe(1);
/// sim.simulate_until(10);
/// assert_eq!(comp.borrow().fired_at, vec![1, 3, 7]);
/// ```
pub trait Timed {
    /// Called by the clock when the subscription fires, `fires` is the current tick.
    fn tick(&mut self, fires: u64);
}
