//! State change notifications of the live infrastructure.

use serde::Serialize;

use crate::core::common::{PmId, VmId};
use crate::core::pm::PmState;
use crate::core::vm::VmState;

/// A single state transition of a machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StateChange {
    Pm { id: PmId, old: PmState, new: PmState },
    Vm { id: VmId, old: VmState, new: VmState },
}

/// Receives state transitions queued by the infrastructure.
///
/// Listeners are called with no borrow of the infrastructure held, so they may call infrastructure operations.
/// Transitions caused by such calls are queued and delivered after the current one.
pub trait StateChangeListener {
    fn on_state_change(&mut self, change: &StateChange);
}
