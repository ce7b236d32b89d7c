//! Periodic consolidation of virtual machines.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::json;
use sugars::{rc, refcell};

use ticksim_core::{log_debug, log_info, SimulationContext, Timed};

use crate::consolidation::action::ActionId;
use crate::consolidation::action_graph::ActionGraph;
use crate::consolidation::improver::Improver;
use crate::consolidation::model::{InfrastructureModel, ModelThresholds};
use crate::core::infrastructure::Infrastructure;

/// Counters of a consolidator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationStats {
    /// Cycles which built and launched an action graph.
    pub runs: u64,
    /// Cycles skipped because the previous graph was still executing.
    pub skipped_runs: u64,
    pub migrations_ordered: u64,
    /// Actions dropped because of migration cycles.
    pub actions_cancelled: u64,
}

/// Consolidates VMs when its clock subscription fires.
///
/// Every cycle snapshots the infrastructure, lets the improver rearrange the model and launches an action graph which
/// applies the difference. A cycle is skipped while the graph of the previous one is still executing.
pub struct Consolidator {
    improver: Box<dyn Improver>,
    infrastructure: Rc<RefCell<Infrastructure>>,
    thresholds: ModelThresholds,
    current_graph: Option<Rc<RefCell<ActionGraph>>>,
    stats: ConsolidationStats,
    ctx: SimulationContext,
}

impl Consolidator {
    pub fn new(
        improver: Box<dyn Improver>,
        infrastructure: Rc<RefCell<Infrastructure>>,
        thresholds: ModelThresholds,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            improver,
            infrastructure,
            thresholds,
            current_graph: None,
            stats: ConsolidationStats::default(),
            ctx,
        }
    }

    /// Subscribes to the clock, the first cycle happens `interval` ticks from now.
    pub fn start(&mut self, interval: u64) -> bool {
        log_debug!(self.ctx, "consolidation every {} ticks", interval);
        self.ctx.subscribe(interval)
    }

    /// Cancels the clock subscription. A graph in progress keeps executing.
    pub fn stop(&mut self) -> bool {
        self.ctx.unsubscribe()
    }

    pub fn stats(&self) -> ConsolidationStats {
        self.stats
    }

    /// The graph of the last cycle.
    pub fn current_graph(&self) -> Option<Rc<RefCell<ActionGraph>>> {
        self.current_graph.clone()
    }

    pub fn is_idle(&self) -> bool {
        match &self.current_graph {
            Some(graph) => graph.borrow().is_finished(),
            None => true,
        }
    }

    /// Runs one consolidation cycle.
    pub fn consolidate(&mut self) {
        if !self.is_idle() {
            self.stats.skipped_runs += 1;
            log_debug!(self.ctx, "previous action graph is still executing, cycle skipped");
            return;
        }
        self.stats.runs += 1;

        let mut model = InfrastructureModel::snapshot(&self.infrastructure.borrow(), self.thresholds);
        let active_before = model.active_bin_count();
        self.improver.improve(&mut model);

        let first_action_id = self.infrastructure.borrow().next_action_id();
        let graph = ActionGraph::build(
            &model,
            self.infrastructure.clone(),
            self.ctx.create_context(format!("{}.actions", self.ctx.name())),
            first_action_id,
        );
        self.infrastructure
            .borrow_mut()
            .reserve_action_ids(graph.action_count() as ActionId);
        self.stats.migrations_ordered += graph.migration_count() as u64;
        self.stats.actions_cancelled += graph.skipped_count() as u64;
        log_info!(
            self.ctx,
            "consolidation cycle: {}",
            json!({
                "active_before": active_before,
                "active_after": model.active_bin_count(),
                "actions": graph.action_count(),
                "migrations": graph.migration_count(),
                "cancelled": graph.skipped_count(),
            })
        );

        let graph = rc!(refcell!(graph));
        self.current_graph = Some(graph.clone());
        ActionGraph::launch(&graph);
    }
}

impl Timed for Consolidator {
    fn tick(&mut self, _fires: u64) {
        self.consolidate();
    }
}
