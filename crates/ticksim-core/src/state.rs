use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::{Rc, Weak};

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::deferred::{DeferredBucket, DeferredDispatcher, DeferredEventId, DeferredStatus, ScheduledAction};
use crate::log::log_invalid_frequency;
use crate::timed::{Id, Timed};

/// Fire tick of subscriptions which will never fire (the next fire tick does not fit into `u64`).
pub const NEVER: u64 = u64::MAX;

struct SubscriptionRecord {
    name: String,
    handler: Option<Weak<RefCell<dyn Timed>>>,
    frequency: u64,
    next_fire: u64,
    subscribed: bool,
    internal: bool,
}

impl SubscriptionRecord {
    fn new(name: &str, internal: bool) -> Self {
        Self {
            name: name.to_owned(),
            handler: None,
            frequency: 0,
            next_fire: NEVER,
            subscribed: false,
            internal,
        }
    }
}

pub struct SimulationState {
    tick: u64,
    seed: u64,
    rand: Pcg64,
    // (next fire tick, subscriber), ties are resolved by subscriber id
    pending: BTreeSet<(u64, Id)>,
    active: Option<Id>,
    records: HashMap<Id, SubscriptionRecord>,
    component_name_to_id: HashMap<String, Id>,
    next_id: Id,

    buckets: HashMap<u64, DeferredBucket>,
    deferred_count: DeferredEventId,
}

impl SimulationState {
    pub fn new(seed: u64) -> Self {
        Self {
            tick: 0,
            seed,
            rand: Pcg64::seed_from_u64(seed),
            pending: BTreeSet::new(),
            active: None,
            records: HashMap::new(),
            component_name_to_id: HashMap::new(),
            next_id: 0,
            buckets: HashMap::new(),
            deferred_count: 0,
        }
    }

    // Components ------------------------------------------------------------------------------------------------------

    pub fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.component_name_to_id.get(name) {
            return id;
        }
        let id = self.allocate_id(name, false);
        self.component_name_to_id.insert(name.to_owned(), id);
        id
    }

    fn allocate_id(&mut self, name: &str, internal: bool) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        self.records.insert(id, SubscriptionRecord::new(name, internal));
        id
    }

    fn forget(&mut self, id: Id) {
        if let Some(record) = self.records.remove(&id) {
            if record.subscribed {
                self.pending.remove(&(record.next_fire, id));
            }
        }
    }

    pub fn lookup_id(&self, name: &str) -> Id {
        *self.component_name_to_id.get(name).unwrap()
    }

    pub fn lookup_name(&self, id: Id) -> String {
        self.records[&id].name.clone()
    }

    pub fn set_handler(&mut self, id: Id, handler: Option<Weak<RefCell<dyn Timed>>>) {
        if let Some(record) = self.records.get_mut(&id) {
            record.handler = handler;
        }
    }

    // Time and randomness ---------------------------------------------------------------------------------------------

    pub fn time(&self) -> u64 {
        self.tick
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rand.gen_range(range)
    }

    fn fire_tick_after(&self, frequency: u64) -> u64 {
        self.tick.saturating_add(frequency)
    }

    // Subscriptions ---------------------------------------------------------------------------------------------------

    pub fn subscribe(&mut self, id: Id, frequency: u64) -> bool {
        let next_fire = self.fire_tick_after(frequency);
        let is_active = self.active == Some(id);
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        if record.subscribed {
            return false;
        }
        record.subscribed = true;
        record.frequency = frequency;
        record.next_fire = next_fire;
        // the active subscriber is re-armed by the firing loop
        if !is_active {
            self.pending.insert((next_fire, id));
        }
        true
    }

    pub fn unsubscribe(&mut self, id: Id) -> bool {
        let is_active = self.active == Some(id);
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        if !record.subscribed {
            return false;
        }
        record.subscribed = false;
        if !is_active {
            self.pending.remove(&(record.next_fire, id));
        }
        true
    }

    pub fn update_frequency(&mut self, id: Id, frequency: u64) -> u64 {
        let subscribed = self.records.get(&id).map_or(false, |r| r.subscribed);
        if !subscribed {
            self.subscribe(id, frequency);
            return self.next_fire(id);
        }
        let next_fire = self.fire_tick_after(frequency);
        let is_active = self.active == Some(id);
        let record = self.records.get_mut(&id).unwrap();
        let old_next_fire = record.next_fire;
        record.frequency = frequency;
        record.next_fire = next_fire;
        if old_next_fire != next_fire && !is_active {
            self.pending.remove(&(old_next_fire, id));
            self.pending.insert((next_fire, id));
        }
        next_fire
    }

    pub fn is_subscribed(&self, id: Id) -> bool {
        self.records.get(&id).map_or(false, |r| r.subscribed)
    }

    pub fn frequency(&self, id: Id) -> u64 {
        self.records.get(&id).map_or(0, |r| r.frequency)
    }

    pub fn next_fire(&self, id: Id) -> u64 {
        self.records
            .get(&id)
            .filter(|r| r.subscribed)
            .map_or(NEVER, |r| r.next_fire)
    }

    pub fn subscription_count(&self) -> usize {
        self.records.values().filter(|r| r.subscribed).count()
    }

    pub fn next_event(&self) -> Option<u64> {
        self.pending.first().map(|(tick, _)| *tick).filter(|tick| *tick != NEVER)
    }

    // Firing ----------------------------------------------------------------------------------------------------------

    /// Takes the next subscriber due at the current tick and marks it as active.
    pub fn pop_ready(&mut self) -> Option<(Id, Option<Rc<RefCell<dyn Timed>>>)> {
        let &(next_fire, id) = self.pending.first()?;
        if next_fire != self.tick || next_fire == NEVER {
            return None;
        }
        self.pending.pop_first();
        self.active = Some(id);
        let handler = self.records[&id].handler.as_ref().and_then(|h| h.upgrade());
        Some((id, handler))
    }

    /// Clears the active subscriber and puts it back into the queue if it is still subscribed.
    pub fn rearm(&mut self, id: Id) {
        self.active = None;
        let tick = self.tick;
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        if !record.subscribed {
            return;
        }
        if record.frequency == 0 {
            log_invalid_frequency(tick, &record.name, record.frequency);
            panic!(
                "Subscription `{}` is re-armed with zero frequency, it would fire forever at tick {}",
                record.name, tick
            );
        }
        record.next_fire = tick.saturating_add(record.frequency);
        self.pending.insert((record.next_fire, id));
    }

    pub fn advance(&mut self) {
        self.tick = self.tick.saturating_add(1);
    }

    pub fn jump_time(&mut self, desired_jump: u64) -> u64 {
        let target = self.tick.saturating_add(desired_jump);
        let next_fire = self.pending.first().map_or(NEVER, |(tick, _)| *tick);
        if target <= next_fire {
            self.tick = target;
            0
        } else {
            self.tick = next_fire;
            target - next_fire
        }
    }

    pub fn skip_events_till(&mut self, desired_tick: u64) {
        if desired_tick <= self.tick {
            return;
        }
        let stale = self
            .pending
            .range(..(desired_tick, 0))
            .cloned()
            .collect::<Vec<(u64, Id)>>();
        for (next_fire, id) in stale {
            self.pending.remove(&(next_fire, id));
            let record = self.records.get_mut(&id).unwrap();
            record.next_fire = if record.frequency == 0 {
                desired_tick
            } else {
                // keep the phase: the new fire tick stays congruent to the old one modulo frequency
                let distance = desired_tick - next_fire;
                let mut periods = distance / record.frequency;
                if distance % record.frequency != 0 {
                    periods += 1;
                }
                next_fire.saturating_add(periods.saturating_mul(record.frequency))
            };
            self.pending.insert((record.next_fire, id));
        }
        self.tick = desired_tick;
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.active = None;
        self.tick = 0;
        self.rand = Pcg64::seed_from_u64(self.seed);
        // outstanding handles must not stay pending, their actions are dropped here
        for bucket in self.buckets.values() {
            for scheduled in bucket.events.values() {
                scheduled.status.set(DeferredStatus::Cancelled);
            }
        }
        self.buckets.clear();
        self.records.retain(|_, record| !record.internal);
        for record in self.records.values_mut() {
            record.subscribed = false;
            record.next_fire = NEVER;
        }
    }

    // Deferred events -------------------------------------------------------------------------------------------------

    pub fn add_deferred(
        &mut self,
        delay: u64,
        action: Box<dyn FnOnce()>,
        sim_state: Weak<RefCell<SimulationState>>,
    ) -> (DeferredEventId, u64, Rc<Cell<DeferredStatus>>) {
        let target_tick = self.fire_tick_after(delay);
        let event_id = self.deferred_count;
        self.deferred_count += 1;

        if !self.buckets.contains_key(&target_tick) {
            let dispatcher_id = self.allocate_id(&format!("deferred@{}", target_tick), true);
            let dispatcher = Rc::new(RefCell::new(DeferredDispatcher::new(target_tick, sim_state)));
            let handler: Rc<RefCell<dyn Timed>> = dispatcher.clone();
            self.set_handler(dispatcher_id, Some(Rc::downgrade(&handler)));
            self.subscribe(dispatcher_id, delay);
            self.buckets.insert(
                target_tick,
                DeferredBucket {
                    dispatcher_id,
                    dispatcher,
                    events: BTreeMap::new(),
                },
            );
        }

        let status = Rc::new(Cell::new(DeferredStatus::Pending));
        let bucket = self.buckets.get_mut(&target_tick).unwrap();
        bucket.events.insert(
            event_id,
            ScheduledAction {
                action,
                status: status.clone(),
            },
        );
        (event_id, target_tick, status)
    }

    /// Removes a pending deferred event, tears down its bucket if it was the last one.
    pub fn cancel_deferred(&mut self, target_tick: u64, event_id: DeferredEventId) {
        let Some(bucket) = self.buckets.get_mut(&target_tick) else {
            return;
        };
        bucket.events.remove(&event_id);
        if bucket.events.is_empty() {
            let bucket = self.buckets.remove(&target_tick).unwrap();
            self.forget(bucket.dispatcher_id);
        }
    }

    /// Removes the bucket of the given tick and returns its events in creation order.
    pub fn take_bucket(&mut self, target_tick: u64) -> Vec<ScheduledAction> {
        match self.buckets.remove(&target_tick) {
            Some(bucket) => {
                self.unsubscribe(bucket.dispatcher_id);
                self.forget(bucket.dispatcher_id);
                bucket.events.into_values().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn deferred_bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
