//! Offline bin-packing model of the infrastructure.
//!
//! The model is a detached copy of the placement: moving an item between bins only updates the model bookkeeping,
//! the live infrastructure is changed later by an [`ActionGraph`](crate::consolidation::action_graph::ActionGraph)
//! built from the difference between the initial and the final placement.

use serde::{Deserialize, Serialize};

use crate::core::common::{PmId, VmId};
use crate::core::infrastructure::Infrastructure;
use crate::core::pm::PmState;
use crate::core::resources::Resources;

/// Thresholds on the free capacity ratio of a bin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelThresholds {
    /// A bin hosting items is under-allocated when its free ratio is above this value.
    pub mostly_empty: f64,
    /// A bin is full when its free ratio is below this value.
    pub full: f64,
}

impl Default for ModelThresholds {
    fn default() -> Self {
        Self {
            mostly_empty: 0.75,
            full: 0.1,
        }
    }
}

/// Bin of the model, a copy of a physical machine.
#[derive(Clone, Debug)]
pub struct ModelPm {
    pub index: usize,
    pub pm_id: PmId,
    /// Power state of the machine at snapshot time.
    pub state: PmState,
    capacity: Resources,
    // load not represented by items, e.g. incoming migrations
    base_load: Resources,
    consumed: Resources,
    vms: Vec<usize>,
    thresholds: ModelThresholds,
}

impl ModelPm {
    pub fn capacity(&self) -> Resources {
        self.capacity
    }

    pub fn consumed(&self) -> Resources {
        self.consumed
    }

    /// Free capacity, negative when the bin is over-allocated.
    pub fn free(&self) -> Resources {
        self.capacity - self.consumed
    }

    /// Indices of hosted items in placement order.
    pub fn vms(&self) -> &[usize] {
        &self.vms
    }

    pub fn hosts_vms(&self) -> bool {
        !self.vms.is_empty()
    }

    /// Smallest free to total capacity ratio over resource dimensions.
    pub fn free_ratio(&self) -> f64 {
        self.free().min_ratio_to(&self.capacity)
    }

    pub fn is_over_allocated(&self) -> bool {
        self.free().is_negative()
    }

    pub fn is_under_allocated(&self) -> bool {
        self.hosts_vms() && self.free_ratio() > self.thresholds.mostly_empty
    }

    pub fn is_full(&self) -> bool {
        self.free_ratio() < self.thresholds.full
    }

    /// Checks whether the bin can be chosen as a migration target.
    pub fn accepts_vms(&self) -> bool {
        self.state != PmState::SwitchingOff
    }
}

/// Item of the model, a copy of a virtual machine.
#[derive(Clone, Debug)]
pub struct ModelVm {
    pub index: usize,
    pub vm_id: VmId,
    demand: Resources,
    initial_pm: usize,
    current_pm: Option<usize>,
}

impl ModelVm {
    pub fn demand(&self) -> Resources {
        self.demand
    }

    /// Bin hosting the item at snapshot time.
    pub fn initial_pm(&self) -> usize {
        self.initial_pm
    }

    /// Bin hosting the item now, `None` while it is evicted.
    pub fn current_pm(&self) -> Option<usize> {
        self.current_pm
    }
}

/// A VM which changes its host between the initial and the final placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PlacementChange {
    pub vm_id: VmId,
    pub from: PmId,
    pub to: PmId,
}

/// Mutable copy of the placement of VMs on machines.
#[derive(Clone, Debug)]
pub struct InfrastructureModel {
    bins: Vec<ModelPm>,
    items: Vec<ModelVm>,
    thresholds: ModelThresholds,
}

impl InfrastructureModel {
    pub fn new(thresholds: ModelThresholds) -> Self {
        Self {
            bins: Vec::new(),
            items: Vec::new(),
            thresholds,
        }
    }

    /// Copies every machine and every hosted VM of the live infrastructure.
    pub fn snapshot(infrastructure: &Infrastructure, thresholds: ModelThresholds) -> Self {
        let mut model = Self::new(thresholds);
        for pm in infrastructure.pms() {
            let bin = model.add_bin(pm.id, pm.capacity(), pm.state());
            model.bins[bin].base_load = pm.reserved();
            model.bins[bin].consumed = pm.reserved();
            for vm_id in pm.vms() {
                if let Some(vm) = infrastructure.vm(*vm_id) {
                    model.add_item(vm.id, vm.demand(), bin);
                }
            }
        }
        model
    }

    /// Adds an empty bin and returns its index.
    pub fn add_bin(&mut self, pm_id: PmId, capacity: Resources, state: PmState) -> usize {
        let index = self.bins.len();
        self.bins.push(ModelPm {
            index,
            pm_id,
            state,
            capacity,
            base_load: Resources::zero(),
            consumed: Resources::zero(),
            vms: Vec::new(),
            thresholds: self.thresholds,
        });
        index
    }

    /// Adds an item initially placed in `bin` and returns its index.
    pub fn add_item(&mut self, vm_id: VmId, demand: Resources, bin: usize) -> usize {
        let index = self.items.len();
        self.items.push(ModelVm {
            index,
            vm_id,
            demand,
            initial_pm: bin,
            current_pm: None,
        });
        self.add_vm(index, bin);
        index
    }

    pub fn thresholds(&self) -> ModelThresholds {
        self.thresholds
    }

    pub fn bins(&self) -> &[ModelPm] {
        &self.bins
    }

    pub fn items(&self) -> &[ModelVm] {
        &self.items
    }

    pub fn bin(&self, index: usize) -> &ModelPm {
        &self.bins[index]
    }

    pub fn item(&self, index: usize) -> &ModelVm {
        &self.items[index]
    }

    /// Checks that the bin is a different one, accepts VMs and has enough free capacity in every dimension.
    pub fn is_migration_possible(&self, vm: usize, pm: usize) -> bool {
        let item = &self.items[vm];
        let bin = &self.bins[pm];
        item.current_pm != Some(pm) && bin.accepts_vms() && item.demand.fits_into(&bin.free())
    }

    /// Moves the item to another bin without any checks.
    pub fn migrate_vm(&mut self, vm: usize, pm: usize) {
        self.remove_vm(vm);
        self.add_vm(vm, pm);
    }

    /// Evicts the item from its bin and returns the bin it was in.
    pub fn remove_vm(&mut self, vm: usize) -> Option<usize> {
        let item = &mut self.items[vm];
        let pm = item.current_pm.take()?;
        let bin = &mut self.bins[pm];
        if let Some(pos) = bin.vms.iter().position(|v| *v == vm) {
            bin.vms.remove(pos);
        }
        bin.consumed -= item.demand;
        Some(pm)
    }

    /// Puts an evicted item into a bin. An item already placed is moved.
    pub fn add_vm(&mut self, vm: usize, pm: usize) {
        if self.items[vm].current_pm.is_some() {
            self.remove_vm(vm);
        }
        let item = &mut self.items[vm];
        item.current_pm = Some(pm);
        let bin = &mut self.bins[pm];
        bin.vms.push(vm);
        bin.consumed += item.demand;
    }

    /// Items whose bin differs from the initial one, in item order.
    pub fn placement_changes(&self) -> Vec<PlacementChange> {
        self.items
            .iter()
            .filter_map(|item| match item.current_pm {
                Some(pm) if pm != item.initial_pm => Some(PlacementChange {
                    vm_id: item.vm_id,
                    from: self.bins[item.initial_pm].pm_id,
                    to: self.bins[pm].pm_id,
                }),
                _ => None,
            })
            .collect()
    }

    /// Machines which host items in the model but are not running yet.
    ///
    /// A machine already switching on is included too, its START waits for the machine to come up and migrations
    /// towards it depend on that START.
    pub fn pms_to_start(&self) -> Vec<PmId> {
        self.bins
            .iter()
            .filter(|bin| bin.hosts_vms() && matches!(bin.state, PmState::Off | PmState::SwitchingOn))
            .map(|bin| bin.pm_id)
            .collect()
    }

    /// Running machines which host no items in the model.
    pub fn pms_to_shut_down(&self) -> Vec<PmId> {
        self.bins
            .iter()
            .filter(|bin| !bin.hosts_vms() && bin.state == PmState::Running)
            .map(|bin| bin.pm_id)
            .collect()
    }

    /// Number of bins hosting at least one item.
    pub fn active_bin_count(&self) -> usize {
        self.bins.iter().filter(|bin| bin.hosts_vms()).count()
    }

    /// Checks that every item is placed and the consumed capacity of every bin matches its items.
    pub fn is_consistent(&self) -> bool {
        self.items.iter().all(|item| item.current_pm.is_some())
            && self.bins.iter().all(|bin| {
                let expected = bin
                    .vms
                    .iter()
                    .fold(bin.base_load, |acc, vm| acc + self.items[*vm].demand);
                (expected - bin.consumed).is_zero()
            })
    }
}
