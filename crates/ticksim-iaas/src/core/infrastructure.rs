//! Registry of live machines and the operations performed on them.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

use serde_json::json;

use ticksim_core::{log_debug, log_error, log_trace, SimulationContext};

use crate::core::common::{AllocationVerdict, PmId, VmId};
use crate::core::config::SimulationConfig;
use crate::core::error::IaasError;
use crate::core::events::{StateChange, StateChangeListener};
use crate::core::pm::{PhysicalMachine, PmState};
use crate::core::resources::Resources;
use crate::core::vm::{VirtualMachine, VmState};

/// Holds physical and virtual machines, performs power toggles and migrations in simulated time.
///
/// Operations only change the registry and queue [`StateChange`] notifications. The queue is drained by
/// [`deliver_notifications()`](Infrastructure::deliver_notifications), which is called by the completions scheduled
/// here and must be called by whoever invokes an operation from outside a listener.
pub struct Infrastructure {
    pms: BTreeMap<PmId, PhysicalMachine>,
    vms: BTreeMap<VmId, VirtualMachine>,
    next_pm_id: PmId,
    next_vm_id: VmId,
    next_action_id: u64,
    notifications: VecDeque<StateChange>,
    listeners: Vec<Weak<RefCell<dyn StateChangeListener>>>,
    delivering: bool,
    this: Weak<RefCell<Infrastructure>>,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl Infrastructure {
    pub fn new(ctx: SimulationContext, sim_config: Rc<SimulationConfig>) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|this| {
            RefCell::new(Self {
                pms: BTreeMap::new(),
                vms: BTreeMap::new(),
                next_pm_id: 0,
                next_vm_id: 0,
                next_action_id: 0,
                notifications: VecDeque::new(),
                listeners: Vec::new(),
                delivering: false,
                this: this.clone(),
                ctx,
                sim_config,
            })
        })
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn sim_config(&self) -> Rc<SimulationConfig> {
        self.sim_config.clone()
    }

    /// Identifier the next consolidation action will get.
    ///
    /// Action ids are shared by every consolidator working on this infrastructure.
    pub fn next_action_id(&self) -> u64 {
        self.next_action_id
    }

    /// Marks `count` action ids starting from [`next_action_id()`](Infrastructure::next_action_id) as used.
    pub fn reserve_action_ids(&mut self, count: u64) {
        self.next_action_id += count;
    }

    /// Adds a physical machine in `Running` or `Off` state and returns its id.
    pub fn add_pm(&mut self, name: &str, capacity: Resources, switched_on: bool) -> PmId {
        let id = self.next_pm_id;
        self.next_pm_id += 1;
        let state = if switched_on { PmState::Running } else { PmState::Off };
        self.pms.insert(id, PhysicalMachine::new(id, name, capacity, state));
        log_debug!(
            self.ctx,
            "added host: {}",
            json!({"id": id, "name": name, "cpu": capacity.cpu, "memory": capacity.memory, "state": state})
        );
        id
    }

    pub fn pm(&self, id: PmId) -> Option<&PhysicalMachine> {
        self.pms.get(&id)
    }

    pub fn vm(&self, id: VmId) -> Option<&VirtualMachine> {
        self.vms.get(&id)
    }

    /// Physical machines in the order of their ids.
    pub fn pms(&self) -> impl Iterator<Item = &PhysicalMachine> {
        self.pms.values()
    }

    /// Virtual machines in the order of their ids, including destroyed ones.
    pub fn vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.vms.values()
    }

    pub fn pm_count(&self) -> usize {
        self.pms.len()
    }

    /// Number of machines which are running or being switched on or off.
    pub fn active_pm_count(&self) -> usize {
        self.pms.values().filter(|pm| pm.state() != PmState::Off).count()
    }

    /// Places a new VM on a running host.
    ///
    /// Resources are not checked, so the host may become overcommitted.
    pub fn place_vm(&mut self, demand: Resources, host: PmId) -> Result<VmId, IaasError> {
        let pm = self.pms.get_mut(&host).ok_or(IaasError::HostNotFound(host))?;
        if !pm.is_running() {
            return Err(IaasError::UnexpectedHostState {
                host,
                state: pm.state(),
                expected: PmState::Running,
            });
        }
        let id = self.next_vm_id;
        self.next_vm_id += 1;
        pm.add_vm(id, demand);
        self.vms.insert(id, VirtualMachine::new(id, demand, host));
        log_debug!(self.ctx, "vm #{} placed on host #{}", id, host);
        Ok(id)
    }

    /// Removes a running VM from its host.
    pub fn destroy_vm(&mut self, id: VmId) -> Result<(), IaasError> {
        let vm = self.vms.get_mut(&id).ok_or(IaasError::VmNotFound(id))?;
        if vm.state() != VmState::Running {
            return Err(IaasError::VmNotRunning { vm: id, state: vm.state() });
        }
        if let Some(host) = vm.host() {
            if let Some(pm) = self.pms.get_mut(&host) {
                pm.remove_vm(id, vm.demand());
            }
        }
        vm.destroy();
        log_debug!(self.ctx, "vm #{} destroyed", id);
        self.notify(StateChange::Vm {
            id,
            old: VmState::Running,
            new: VmState::Destroyed,
        });
        Ok(())
    }

    /// Starts powering on a switched off host, it becomes `Running` after the configured duration.
    pub fn switch_on(&mut self, id: PmId) -> Result<(), IaasError> {
        let pm = self.pms.get_mut(&id).ok_or(IaasError::HostNotFound(id))?;
        if pm.state() != PmState::Off {
            return Err(IaasError::UnexpectedHostState {
                host: id,
                state: pm.state(),
                expected: PmState::Off,
            });
        }
        self.set_pm_state(id, PmState::SwitchingOn);
        let duration = self.sim_config.pm_switch_on_duration;
        log_debug!(self.ctx, "host #{} is switching on for {} ticks", id, duration.max(1));
        self.schedule(duration, move |infra| infra.complete_power_change(id, PmState::Running));
        Ok(())
    }

    /// Starts powering off an empty running host, it becomes `Off` after the configured duration.
    pub fn switch_off(&mut self, id: PmId) -> Result<(), IaasError> {
        let pm = self.pms.get(&id).ok_or(IaasError::HostNotFound(id))?;
        if pm.state() != PmState::Running {
            return Err(IaasError::UnexpectedHostState {
                host: id,
                state: pm.state(),
                expected: PmState::Running,
            });
        }
        if pm.hosts_vms() || pm.has_reservations() {
            return Err(IaasError::HostNotEmpty(id));
        }
        self.set_pm_state(id, PmState::SwitchingOff);
        let duration = self.sim_config.pm_switch_off_duration;
        log_debug!(self.ctx, "host #{} is switching off for {} ticks", id, duration.max(1));
        self.schedule(duration, move |infra| infra.complete_power_change(id, PmState::Off));
        Ok(())
    }

    /// Checks whether `vm` currently hosted on `source` can be migrated to `target`.
    pub fn can_migrate(&self, vm: VmId, source: PmId, target: PmId) -> AllocationVerdict {
        let Some(vm) = self.vms.get(&vm) else {
            return AllocationVerdict::VmNotFound;
        };
        if vm.state() != VmState::Running {
            return AllocationVerdict::VmNotRunning;
        }
        if vm.host() != Some(source) {
            return AllocationVerdict::WrongSource;
        }
        if source == target {
            return AllocationVerdict::AlreadyHosted;
        }
        let Some(pm) = self.pms.get(&target) else {
            return AllocationVerdict::HostNotFound;
        };
        if !pm.is_running() {
            return AllocationVerdict::HostNotRunning;
        }
        let free = pm.free();
        if vm.demand().cpu > free.cpu + crate::core::resources::EPSILON {
            return AllocationVerdict::NotEnoughCPU;
        }
        if vm.demand().memory > free.memory + crate::core::resources::EPSILON {
            return AllocationVerdict::NotEnoughMemory;
        }
        AllocationVerdict::Success
    }

    /// Returns the duration of migrating `vm` in ticks, `None` if the network is down.
    pub fn migration_duration(&self, vm: &VirtualMachine) -> Option<u64> {
        let throughput = self.sim_config.network_throughput;
        if throughput == 0 {
            return None;
        }
        Some(((vm.demand().memory / throughput as f64).ceil() as u64).max(1))
    }

    /// Starts a live migration of a running VM to `target`.
    ///
    /// The target capacity is reserved until the transfer completes, then the VM moves and becomes `Running` again.
    pub fn migrate(&mut self, id: VmId, target: PmId) -> Result<(), IaasError> {
        let vm = self.vms.get(&id).ok_or(IaasError::VmNotFound(id))?;
        if vm.state() != VmState::Running {
            return Err(IaasError::VmNotRunning { vm: id, state: vm.state() });
        }
        let source = vm.host().ok_or(IaasError::VmNotFound(id))?;
        let verdict = self.can_migrate(id, source, target);
        if verdict != AllocationVerdict::Success {
            return Err(IaasError::MigrationRejected { vm: id, target, verdict });
        }
        let duration = self
            .migration_duration(vm)
            .ok_or(IaasError::NetworkUnavailable { from: source, to: target })?;
        let demand = vm.demand();

        if let Some(pm) = self.pms.get_mut(&target) {
            pm.reserve(demand);
        }
        if let Some(vm) = self.vms.get_mut(&id) {
            vm.start_migration(target);
        }
        log_debug!(
            self.ctx,
            "migration started: {}",
            json!({"vm": id, "from": source, "to": target, "duration": duration})
        );
        self.notify(StateChange::Vm {
            id,
            old: VmState::Running,
            new: VmState::Migrating,
        });
        self.schedule(duration, move |infra| infra.complete_migration(id));
        Ok(())
    }

    /// Registers a listener of state changes. Dropped listeners are forgotten.
    pub fn add_listener(&mut self, listener: Weak<RefCell<dyn StateChangeListener>>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.iter().filter(|l| l.strong_count() > 0).count()
    }

    /// Number of queued but not yet delivered notifications.
    pub fn pending_notifications(&self) -> usize {
        self.notifications.len()
    }

    /// Delivers queued state changes to listeners, one change at a time, in the order they happened.
    ///
    /// Nested calls (from inside a listener) return immediately, the outermost call drains the queue including the
    /// changes caused by listeners.
    pub fn deliver_notifications(infra: &Rc<RefCell<Infrastructure>>) {
        {
            let mut this = infra.borrow_mut();
            if this.delivering {
                return;
            }
            this.delivering = true;
        }
        loop {
            let next = {
                let mut this = infra.borrow_mut();
                this.listeners.retain(|l| l.strong_count() > 0);
                let change = this.notifications.pop_front();
                change.map(|change| (change, this.listeners.clone()))
            };
            let Some((change, listeners)) = next else {
                break;
            };
            for listener in listeners {
                if let Some(listener) = listener.upgrade() {
                    listener.borrow_mut().on_state_change(&change);
                }
            }
        }
        infra.borrow_mut().delivering = false;
    }

    fn notify(&mut self, change: StateChange) {
        log_trace!(self.ctx, "state change: {}", json!(change));
        self.notifications.push_back(change);
    }

    fn set_pm_state(&mut self, id: PmId, state: PmState) {
        if let Some(pm) = self.pms.get_mut(&id) {
            let old = pm.state();
            pm.set_state(state);
            self.notify(StateChange::Pm { id, old, new: state });
        }
    }

    fn schedule<F>(&self, delay: u64, completion: F)
    where
        F: FnOnce(&mut Infrastructure) + 'static,
    {
        let this = self.this.clone();
        self.ctx.defer(delay.max(1), move || {
            if let Some(infra) = this.upgrade() {
                completion(&mut *infra.borrow_mut());
                Infrastructure::deliver_notifications(&infra);
            }
        });
    }

    fn complete_power_change(&mut self, id: PmId, state: PmState) {
        log_debug!(self.ctx, "host #{} is {}", id, state);
        self.set_pm_state(id, state);
    }

    fn complete_migration(&mut self, id: VmId) {
        let Some(vm) = self.vms.get_mut(&id) else {
            return;
        };
        let source = vm.host();
        let demand = vm.demand();
        let Some(target) = vm.finish_migration() else {
            log_error!(self.ctx, "vm #{} completed a migration it never started", id);
            return;
        };
        if let Some(pm) = source.and_then(|source| self.pms.get_mut(&source)) {
            pm.remove_vm(id, demand);
        }
        if let Some(pm) = self.pms.get_mut(&target) {
            pm.release_reservation(demand);
            pm.add_vm(id, demand);
        }
        log_debug!(
            self.ctx,
            "migration completed: {}",
            json!({"vm": id, "from": source, "to": target})
        );
        self.notify(StateChange::Vm {
            id,
            old: VmState::Migrating,
            new: VmState::Running,
        });
    }
}
