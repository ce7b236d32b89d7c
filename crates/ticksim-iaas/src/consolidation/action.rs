//! Units of infrastructure work ordered by an action graph.

use serde::Serialize;

use crate::core::common::{PmId, VmId};

/// Identifier of an action, increasing across consolidation cycles.
pub type ActionId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    /// Power on a switched off machine.
    Start { pm: PmId },
    /// Live-migrate a VM.
    Migration { vm: VmId, source: PmId, target: PmId },
    /// Power off an empty machine.
    Shutdown { pm: PmId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ActionState {
    /// Some predecessors are not finished.
    Waiting,
    /// All predecessors are finished.
    Ready,
    /// The infrastructure operation was requested, waiting for its completion.
    Executing,
    Finished,
}

/// Node of an action graph.
#[derive(Clone, Debug, Serialize)]
pub struct Action {
    pub id: ActionId,
    pub kind: ActionKind,
    pub(crate) state: ActionState,
    pub(crate) cancelled: bool,
    pub(crate) predecessors: Vec<usize>,
    pub(crate) successors: Vec<usize>,
    pub(crate) remaining_predecessors: usize,
}

impl Action {
    pub fn new(id: ActionId, kind: ActionKind) -> Self {
        Self {
            id,
            kind,
            state: ActionState::Waiting,
            cancelled: false,
            predecessors: Vec::new(),
            successors: Vec::new(),
            remaining_predecessors: 0,
        }
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    /// Whether the action was dropped because it forms a cycle with another migration.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Indices of actions which must finish before this one starts.
    pub fn predecessors(&self) -> &[usize] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[usize] {
        &self.successors
    }

    pub fn remaining_predecessors(&self) -> usize {
        self.remaining_predecessors
    }

    /// Checks whether two migrations move VMs in opposite directions between the same machines.
    pub fn is_reverse_of(&self, other: &Action) -> bool {
        match (self.kind, other.kind) {
            (
                ActionKind::Migration { source, target, .. },
                ActionKind::Migration {
                    source: other_source,
                    target: other_target,
                    ..
                },
            ) => target == other_source && other_target == source,
            _ => false,
        }
    }

    /// Returns the indices of actions this one (at `index` in `actions`) depends on.
    ///
    /// - a migration waits for the start of its target machine and for migrations leaving its target machine;
    /// - a shutdown waits for every migration leaving the machine;
    /// - a start waits for nothing.
    ///
    /// Cancelled migrations neither wait nor hold back migrations, so both sides of a cancelled pair finish at once.
    pub fn determine_predecessors(&self, index: usize, actions: &[Action]) -> Vec<usize> {
        let mut predecessors = Vec::new();
        match self.kind {
            ActionKind::Start { .. } => {}
            ActionKind::Migration { target, .. } => {
                if self.cancelled {
                    return predecessors;
                }
                for (i, other) in actions.iter().enumerate() {
                    if i == index {
                        continue;
                    }
                    match other.kind {
                        ActionKind::Start { pm } if pm == target => predecessors.push(i),
                        ActionKind::Migration { source, .. } if source == target && !other.cancelled => {
                            predecessors.push(i)
                        }
                        _ => {}
                    }
                }
            }
            ActionKind::Shutdown { pm } => {
                for (i, other) in actions.iter().enumerate() {
                    if let ActionKind::Migration { source, .. } = other.kind {
                        if source == pm {
                            predecessors.push(i);
                        }
                    }
                }
            }
        }
        predecessors
    }
}
