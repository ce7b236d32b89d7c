//! Dependency graph of the actions of one consolidation cycle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::json;

use ticksim_core::{log_debug, log_info, log_trace, log_warn, SimulationContext};

use crate::consolidation::action::{Action, ActionId, ActionKind, ActionState};
use crate::consolidation::model::InfrastructureModel;
use crate::core::common::{AllocationVerdict, PmId, VmId};
use crate::core::error::IaasError;
use crate::core::events::{StateChange, StateChangeListener};
use crate::core::infrastructure::Infrastructure;
use crate::core::pm::PmState;
use crate::core::vm::VmState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Awaited {
    Pm(PmId),
    Vm(VmId),
}

/// Executes START, MIGRATION and SHUTDOWN actions respecting their dependencies.
///
/// Actions with no pending predecessors are executed by [`start()`](ActionGraph::start). A finishing action executes
/// its successors which became ready, depth-first and within the same call. Starts and migrations finish when the
/// infrastructure reports the machine `Running` again, so the graph must be registered as a state change listener
/// (see [`launch()`](ActionGraph::launch)). Failed preconditions and infrastructure errors finish an action without
/// effect, so the graph always drains unless migrations form a cycle longer than two.
pub struct ActionGraph {
    actions: Vec<Action>,
    awaiting: HashMap<Awaited, usize>,
    finished_count: usize,
    execution_order: Vec<usize>,
    finish_order: Vec<usize>,
    started: bool,
    on_complete: Option<Box<dyn FnOnce()>>,
    infrastructure: Rc<RefCell<Infrastructure>>,
    ctx: SimulationContext,
}

impl ActionGraph {
    /// Builds the graph turning the initial placement of `model` into its current one.
    ///
    /// Action ids are assigned sequentially starting from `first_action_id`.
    pub fn build(
        model: &InfrastructureModel,
        infrastructure: Rc<RefCell<Infrastructure>>,
        ctx: SimulationContext,
        first_action_id: ActionId,
    ) -> Self {
        let mut kinds = Vec::new();
        for pm in model.pms_to_start() {
            kinds.push(ActionKind::Start { pm });
        }
        for change in model.placement_changes() {
            kinds.push(ActionKind::Migration {
                vm: change.vm_id,
                source: change.from,
                target: change.to,
            });
        }
        for pm in model.pms_to_shut_down() {
            kinds.push(ActionKind::Shutdown { pm });
        }
        Self::from_actions(kinds, infrastructure, ctx, first_action_id)
    }

    /// Builds the graph from a list of actions.
    pub fn from_actions(
        kinds: Vec<ActionKind>,
        infrastructure: Rc<RefCell<Infrastructure>>,
        ctx: SimulationContext,
        first_action_id: ActionId,
    ) -> Self {
        let mut actions = kinds
            .into_iter()
            .enumerate()
            .map(|(i, kind)| Action::new(first_action_id + i as ActionId, kind))
            .collect::<Vec<Action>>();

        // only direct two-node cycles are detected
        for i in 0..actions.len() {
            for j in i + 1..actions.len() {
                if actions[i].is_reverse_of(&actions[j]) {
                    actions[i].cancelled = true;
                    actions[j].cancelled = true;
                }
            }
        }

        for i in 0..actions.len() {
            let predecessors = actions[i].determine_predecessors(i, &actions);
            for p in predecessors.iter() {
                actions[*p].successors.push(i);
            }
            actions[i].remaining_predecessors = predecessors.len();
            actions[i].predecessors = predecessors;
        }

        let graph = Self {
            actions,
            awaiting: HashMap::new(),
            finished_count: 0,
            execution_order: Vec::new(),
            finish_order: Vec::new(),
            started: false,
            on_complete: None,
            infrastructure,
            ctx,
        };
        log_debug!(
            graph.ctx,
            "action graph built: {}",
            json!({
                "actions": graph.actions.len(),
                "migrations": graph.migration_count(),
                "skipped": graph.skipped_count(),
            })
        );
        graph
    }

    /// Registers the graph as a listener of `infrastructure`, starts it and delivers the resulting notifications.
    pub fn launch(graph: &Rc<RefCell<ActionGraph>>) {
        let infrastructure = graph.borrow().infrastructure.clone();
        let listener: Rc<RefCell<dyn StateChangeListener>> = graph.clone();
        infrastructure.borrow_mut().add_listener(Rc::downgrade(&listener));
        graph.borrow_mut().start();
        Infrastructure::deliver_notifications(&infrastructure);
    }

    /// Sets the callback called once, when every action is finished.
    ///
    /// The callback runs while the graph is borrowed, so it must not access the graph itself.
    pub fn set_on_complete<F>(&mut self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.on_complete = Some(Box::new(callback));
    }

    /// Executes every action without predecessors. Calling it again has no effect.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        if self.actions.is_empty() {
            self.complete();
            return;
        }
        let ready = (0..self.actions.len())
            .filter(|i| self.actions[*i].remaining_predecessors == 0)
            .collect::<Vec<usize>>();
        for i in ready.iter() {
            self.actions[*i].state = ActionState::Ready;
        }
        for i in ready {
            if self.actions[i].state == ActionState::Ready {
                self.execute(i);
            }
        }
        if !self.is_finished() && !self.actions.iter().any(|a| a.state == ActionState::Executing) {
            log_warn!(
                self.ctx,
                "action graph is stalled, {} actions wait for each other",
                self.actions.len() - self.finished_count
            );
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.finished_count == self.actions.len()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, index: usize) -> &Action {
        &self.actions[index]
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Number of migrations which are not cancelled.
    pub fn migration_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a.kind, ActionKind::Migration { .. }) && !a.cancelled)
            .count()
    }

    /// Number of actions cancelled because of migration cycles.
    pub fn skipped_count(&self) -> usize {
        self.actions.iter().filter(|a| a.cancelled).count()
    }

    /// Indices of actions in the order their execution began.
    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    /// Indices of actions in the order they finished.
    pub fn finish_order(&self) -> &[usize] {
        &self.finish_order
    }

    fn execute(&mut self, index: usize) {
        self.actions[index].state = ActionState::Executing;
        self.execution_order.push(index);
        let (id, kind, cancelled) = {
            let action = &self.actions[index];
            (action.id, action.kind, action.cancelled)
        };
        log_trace!(self.ctx, "executing action: {}", json!({"id": id, "kind": kind}));

        if cancelled {
            self.finished(index);
            return;
        }
        match kind {
            ActionKind::Start { pm } => self.execute_start(index, pm),
            ActionKind::Migration { vm, source, target } => self.execute_migration(index, vm, source, target),
            ActionKind::Shutdown { pm } => {
                let result = self.infrastructure.borrow_mut().switch_off(pm);
                if let Err(e) = result {
                    self.log_failure(index, &e);
                }
                self.finished(index);
            }
        }
    }

    fn execute_start(&mut self, index: usize, pm: PmId) {
        let result = self.infrastructure.borrow_mut().switch_on(pm);
        match result {
            Ok(()) => {
                self.awaiting.insert(Awaited::Pm(pm), index);
            }
            Err(IaasError::UnexpectedHostState {
                state: PmState::SwitchingOn,
                ..
            }) => {
                // someone else is already switching it on
                self.awaiting.insert(Awaited::Pm(pm), index);
            }
            Err(IaasError::UnexpectedHostState {
                state: PmState::Running,
                ..
            }) => self.finished(index),
            Err(e) => {
                self.log_failure(index, &e);
                self.finished(index);
            }
        }
    }

    fn execute_migration(&mut self, index: usize, vm: VmId, source: PmId, target: PmId) {
        let verdict = self.infrastructure.borrow().can_migrate(vm, source, target);
        if verdict != AllocationVerdict::Success {
            log_debug!(
                self.ctx,
                "migration skipped: {}",
                json!({"id": self.actions[index].id, "vm": vm, "from": source, "to": target, "verdict": verdict})
            );
            self.finished(index);
            return;
        }
        let result = self.infrastructure.borrow_mut().migrate(vm, target);
        match result {
            Ok(()) => {
                self.awaiting.insert(Awaited::Vm(vm), index);
            }
            Err(e) => {
                self.log_failure(index, &e);
                self.finished(index);
            }
        }
    }

    fn log_failure(&self, index: usize, error: &IaasError) {
        log_warn!(
            self.ctx,
            "action failed: {}",
            json!({"id": self.actions[index].id, "kind": self.actions[index].kind, "error": error.to_string()})
        );
    }

    fn finished(&mut self, index: usize) {
        if self.actions[index].state == ActionState::Finished {
            return;
        }
        self.actions[index].state = ActionState::Finished;
        self.finish_order.push(index);
        self.finished_count += 1;
        for successor in self.actions[index].successors.clone() {
            let action = &mut self.actions[successor];
            action.remaining_predecessors -= 1;
            if action.remaining_predecessors == 0 && action.state == ActionState::Waiting {
                action.state = ActionState::Ready;
                self.execute(successor);
            }
        }
        if self.is_finished() {
            self.complete();
        }
    }

    fn complete(&mut self) {
        log_info!(
            self.ctx,
            "action graph completed: {}",
            json!({"actions": self.actions.len(), "skipped": self.skipped_count()})
        );
        if let Some(callback) = self.on_complete.take() {
            callback();
        }
    }
}

impl StateChangeListener for ActionGraph {
    fn on_state_change(&mut self, change: &StateChange) {
        let awaited = match *change {
            StateChange::Pm {
                id,
                new: PmState::Running,
                ..
            } => Awaited::Pm(id),
            StateChange::Vm {
                id,
                old: VmState::Migrating,
                new: VmState::Running,
            } => Awaited::Vm(id),
            _ => return,
        };
        if let Some(index) = self.awaiting.remove(&awaited) {
            self.finished(index);
        }
    }
}
