//! Physical machine.

use serde::Serialize;

use crate::core::common::{PmId, VmId};
use crate::core::resources::Resources;

/// Power state of a physical machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PmState {
    Off,
    SwitchingOn,
    Running,
    SwitchingOff,
}

impl std::fmt::Display for PmState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PmState::Off => write!(f, "off"),
            PmState::SwitchingOn => write!(f, "switching_on"),
            PmState::Running => write!(f, "running"),
            PmState::SwitchingOff => write!(f, "switching_off"),
        }
    }
}

/// Physical machine hosting virtual machines.
///
/// `allocated` is the sum of demands of hosted VMs and may exceed capacity (direct placement allows overcommit).
/// `reserved` holds the demands of VMs which are being migrated to this machine.
#[derive(Clone, Debug, Serialize)]
pub struct PhysicalMachine {
    pub id: PmId,
    pub name: String,
    capacity: Resources,
    allocated: Resources,
    reserved: Resources,
    vms: Vec<VmId>,
    state: PmState,
}

impl PhysicalMachine {
    pub fn new(id: PmId, name: &str, capacity: Resources, state: PmState) -> Self {
        Self {
            id,
            name: name.to_string(),
            capacity,
            allocated: Resources::zero(),
            reserved: Resources::zero(),
            vms: Vec::new(),
            state,
        }
    }

    pub fn capacity(&self) -> Resources {
        self.capacity
    }

    pub fn allocated(&self) -> Resources {
        self.allocated
    }

    pub fn reserved(&self) -> Resources {
        self.reserved
    }

    /// Capacity left after hosted VMs and incoming migrations, negative when overcommitted.
    pub fn free(&self) -> Resources {
        self.capacity - self.allocated - self.reserved
    }

    pub fn state(&self) -> PmState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PmState::Running
    }

    /// Hosted VMs in the order they were placed.
    pub fn vms(&self) -> &[VmId] {
        &self.vms
    }

    pub fn hosts_vms(&self) -> bool {
        !self.vms.is_empty()
    }

    pub fn has_reservations(&self) -> bool {
        !self.reserved.is_zero()
    }

    pub(crate) fn set_state(&mut self, state: PmState) {
        self.state = state;
    }

    pub(crate) fn add_vm(&mut self, vm: VmId, demand: Resources) {
        self.vms.push(vm);
        self.allocated += demand;
    }

    pub(crate) fn remove_vm(&mut self, vm: VmId, demand: Resources) {
        if let Some(pos) = self.vms.iter().position(|id| *id == vm) {
            self.vms.remove(pos);
            self.allocated -= demand;
        }
    }

    pub(crate) fn reserve(&mut self, demand: Resources) {
        self.reserved += demand;
    }

    pub(crate) fn release_reservation(&mut self, demand: Resources) {
        self.reserved -= demand;
    }
}
