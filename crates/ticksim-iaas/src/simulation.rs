use std::cell::RefCell;
use std::rc::Rc;

use sugars::{rc, refcell};

use ticksim_core::{Simulation, SimulationContext};

use crate::consolidation::consolidator::Consolidator;
use crate::consolidation::improver::{improver_resolver, Improver};
use crate::consolidation::model::ModelThresholds;
use crate::core::common::{PmId, VmId};
use crate::core::config::SimulationConfig;
use crate::core::error::IaasError;
use crate::core::infrastructure::Infrastructure;
use crate::core::pm::{PhysicalMachine, PmState};
use crate::core::resources::Resources;
use crate::core::vm::{VirtualMachine, VmState};

pub struct CloudSimulation {
    infrastructure: Rc<RefCell<Infrastructure>>,
    consolidators: Vec<Rc<RefCell<Consolidator>>>,
    sim: Simulation,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl CloudSimulation {
    pub fn new(mut sim: Simulation, sim_config: SimulationConfig) -> Self {
        let sim_config = rc!(sim_config);
        let infrastructure = Infrastructure::new(sim.create_context("infrastructure"), sim_config.clone());
        let ctx = sim.create_context("simulation");
        Self {
            infrastructure,
            consolidators: Vec::new(),
            sim,
            ctx,
            sim_config,
        }
    }

    pub fn add_host(&mut self, name: &str, cpu_total: f64, memory_total: f64) -> PmId {
        self.infrastructure
            .borrow_mut()
            .add_pm(name, Resources::new(cpu_total, memory_total), true)
    }

    pub fn add_switched_off_host(&mut self, name: &str, cpu_total: f64, memory_total: f64) -> PmId {
        self.infrastructure
            .borrow_mut()
            .add_pm(name, Resources::new(cpu_total, memory_total), false)
    }

    /// Adds the hosts listed in simulation config.
    pub fn add_hosts_from_config(&mut self) -> Vec<PmId> {
        let mut ids = Vec::new();
        for host in self.sim_config.hosts.clone() {
            let count = host.count.unwrap_or(1);
            let switched_on = host.switched_on.unwrap_or(true);
            for i in 0..count {
                let name = if count == 1 {
                    host.name.clone().unwrap_or_else(|| format!("host{}", ids.len()))
                } else {
                    format!(
                        "{}{}",
                        host.name_prefix.clone().unwrap_or_else(|| "host".to_string()),
                        i + 1
                    )
                };
                let capacity = Resources::new(host.cpus, host.memory);
                ids.push(self.infrastructure.borrow_mut().add_pm(&name, capacity, switched_on));
            }
        }
        ids
    }

    /// Places a VM on a running host bypassing any scheduling, overcommit is allowed.
    pub fn spawn_vm_directly(&mut self, cpu_usage: f64, memory_usage: f64, host: PmId) -> Result<VmId, IaasError> {
        let result = self
            .infrastructure
            .borrow_mut()
            .place_vm(Resources::new(cpu_usage, memory_usage), host);
        Infrastructure::deliver_notifications(&self.infrastructure);
        result
    }

    pub fn destroy_vm(&mut self, vm: VmId) -> Result<(), IaasError> {
        let result = self.infrastructure.borrow_mut().destroy_vm(vm);
        Infrastructure::deliver_notifications(&self.infrastructure);
        result
    }

    pub fn migrate_vm_to_host(&mut self, vm: VmId, target: PmId) -> Result<(), IaasError> {
        let result = self.infrastructure.borrow_mut().migrate(vm, target);
        Infrastructure::deliver_notifications(&self.infrastructure);
        result
    }

    pub fn switch_on_host(&mut self, host: PmId) -> Result<(), IaasError> {
        let result = self.infrastructure.borrow_mut().switch_on(host);
        Infrastructure::deliver_notifications(&self.infrastructure);
        result
    }

    pub fn switch_off_host(&mut self, host: PmId) -> Result<(), IaasError> {
        let result = self.infrastructure.borrow_mut().switch_off(host);
        Infrastructure::deliver_notifications(&self.infrastructure);
        result
    }

    /// Adds a consolidator running every `interval` ticks.
    pub fn add_consolidator(
        &mut self,
        name: &str,
        improver: Box<dyn Improver>,
        interval: u64,
    ) -> Rc<RefCell<Consolidator>> {
        let thresholds = ModelThresholds {
            mostly_empty: self.sim_config.mostly_empty_threshold,
            full: self.sim_config.full_threshold,
        };
        let consolidator = rc!(refcell!(Consolidator::new(
            improver,
            self.infrastructure.clone(),
            thresholds,
            self.sim.create_context(name),
        )));
        self.sim.add_handler(name, consolidator.clone());
        consolidator.borrow_mut().start(interval);
        self.consolidators.push(consolidator.clone());
        consolidator
    }

    /// Adds a consolidator with the improver and interval from simulation config.
    pub fn add_consolidator_from_config(&mut self, name: &str) -> Rc<RefCell<Consolidator>> {
        let improver = improver_resolver(&self.sim_config.improver, &self.ctx);
        self.add_consolidator(name, improver, self.sim_config.consolidation_interval)
    }

    pub fn infrastructure(&self) -> Rc<RefCell<Infrastructure>> {
        self.infrastructure.clone()
    }

    pub fn consolidators(&self) -> &[Rc<RefCell<Consolidator>>] {
        &self.consolidators
    }

    pub fn host(&self, id: PmId) -> Option<PhysicalMachine> {
        self.infrastructure.borrow().pm(id).cloned()
    }

    pub fn host_state(&self, id: PmId) -> Option<PmState> {
        self.infrastructure.borrow().pm(id).map(|pm| pm.state())
    }

    pub fn vm(&self, id: VmId) -> Option<VirtualMachine> {
        self.infrastructure.borrow().vm(id).cloned()
    }

    pub fn vm_state(&self, id: VmId) -> Option<VmState> {
        self.infrastructure.borrow().vm(id).map(|vm| vm.state())
    }

    pub fn vm_location(&self, id: VmId) -> Option<PmId> {
        self.infrastructure.borrow().vm(id).and_then(|vm| vm.host())
    }

    /// Number of hosts which are not switched off.
    pub fn active_host_count(&self) -> usize {
        self.infrastructure.borrow().active_pm_count()
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn create_context(&mut self, name: &str) -> SimulationContext {
        self.sim.create_context(name)
    }

    /// Makes a single clock step.
    pub fn step(&mut self) {
        self.sim.fire();
    }

    /// Runs the simulation for `duration` ticks.
    pub fn step_for_duration(&mut self, duration: u64) {
        let target = self.sim.time().saturating_add(duration);
        self.sim.simulate_until(target);
        if self.sim.time() < target {
            self.sim.jump_time(target - self.sim.time());
        }
    }

    /// Runs the simulation until no subscription is left.
    pub fn step_until_no_events(&mut self) {
        self.sim.simulate_until_last_event();
    }

    pub fn current_time(&self) -> u64 {
        self.sim.time()
    }

    pub fn sim_config(&self) -> Rc<SimulationConfig> {
        self.sim_config.clone()
    }
}
