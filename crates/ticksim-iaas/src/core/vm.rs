//! Virtual machine.

use serde::Serialize;

use crate::core::common::{PmId, VmId};
use crate::core::resources::Resources;

/// Status of a virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum VmState {
    Running,
    Migrating,
    Destroyed,
}

impl std::fmt::Display for VmState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            VmState::Running => write!(f, "running"),
            VmState::Migrating => write!(f, "migrating"),
            VmState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Virtual machine with a fixed resource demand.
///
/// A migrating VM stays on its source host until the transfer completes, the target host holds a reservation
/// meanwhile.
#[derive(Clone, Debug, Serialize)]
pub struct VirtualMachine {
    pub id: VmId,
    demand: Resources,
    host: Option<PmId>,
    migration_target: Option<PmId>,
    state: VmState,
}

impl VirtualMachine {
    pub fn new(id: VmId, demand: Resources, host: PmId) -> Self {
        Self {
            id,
            demand,
            host: Some(host),
            migration_target: None,
            state: VmState::Running,
        }
    }

    pub fn demand(&self) -> Resources {
        self.demand
    }

    /// Current host, `None` once the VM is destroyed.
    pub fn host(&self) -> Option<PmId> {
        self.host
    }

    pub fn migration_target(&self) -> Option<PmId> {
        self.migration_target
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub(crate) fn start_migration(&mut self, target: PmId) {
        self.migration_target = Some(target);
        self.state = VmState::Migrating;
    }

    pub(crate) fn finish_migration(&mut self) -> Option<PmId> {
        let target = self.migration_target.take()?;
        self.host = Some(target);
        self.state = VmState::Running;
        Some(target)
    }

    pub(crate) fn destroy(&mut self) {
        self.host = None;
        self.state = VmState::Destroyed;
    }
}
