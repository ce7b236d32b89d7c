use std::cell::{Cell, RefCell};
use std::rc::Rc;

use sugars::{rc, refcell};

use ticksim_core::Simulation;

use ticksim_iaas::consolidation::action::{Action, ActionKind, ActionState};
use ticksim_iaas::consolidation::action_graph::ActionGraph;
use ticksim_iaas::consolidation::model::{InfrastructureModel, ModelThresholds};
use ticksim_iaas::core::config::SimulationConfig;
use ticksim_iaas::core::pm::PmState;
use ticksim_iaas::simulation::CloudSimulation;

fn new_cloud_sim() -> CloudSimulation {
    CloudSimulation::new(Simulation::new(123), SimulationConfig::default())
}

fn assert_dependencies_respected(graph: &ActionGraph) {
    let position = |order: &[usize], index: usize| order.iter().position(|i| *i == index);
    for (index, action) in graph.actions().iter().enumerate() {
        assert_eq!(action.state(), ActionState::Finished);
        let executed_at = position(graph.execution_order(), index).unwrap();
        for predecessor in action.predecessors() {
            let finished_at = position(graph.finish_order(), *predecessor).unwrap();
            // the predecessor must have finished before this action was executed
            let predecessor_executed_at = position(graph.execution_order(), *predecessor).unwrap();
            assert!(predecessor_executed_at < executed_at);
            assert!(finished_at < position(graph.finish_order(), index).unwrap());
        }
    }
    assert_eq!(graph.finish_order().len(), graph.action_count());
}

#[test]
fn test_predecessors() {
    let actions = vec![
        Action::new(0, ActionKind::Start { pm: 2 }),
        Action::new(1, ActionKind::Migration { vm: 0, source: 0, target: 2 }),
        Action::new(2, ActionKind::Migration { vm: 1, source: 1, target: 0 }),
        Action::new(3, ActionKind::Shutdown { pm: 1 }),
        Action::new(4, ActionKind::Shutdown { pm: 0 }),
    ];
    let predecessors = (0..actions.len())
        .map(|i| actions[i].determine_predecessors(i, &actions))
        .collect::<Vec<Vec<usize>>>();

    assert!(predecessors[0].is_empty());
    assert_eq!(predecessors[1], vec![0]);
    // the VM leaving host 0 must be gone before another one lands there
    assert_eq!(predecessors[2], vec![1]);
    assert_eq!(predecessors[3], vec![2]);
    assert_eq!(predecessors[4], vec![1]);
}

#[test]
fn test_graph_of_noop_actions_completes() {
    let mut cloud_sim = new_cloud_sim();
    let ctx = cloud_sim.create_context("graph");
    let kinds = vec![
        ActionKind::Start { pm: 100 },
        ActionKind::Migration { vm: 100, source: 101, target: 100 },
        ActionKind::Migration { vm: 101, source: 102, target: 101 },
        ActionKind::Shutdown { pm: 101 },
        ActionKind::Shutdown { pm: 102 },
    ];
    let mut graph = ActionGraph::from_actions(kinds, cloud_sim.infrastructure(), ctx, 10);
    let completions = rc!(Cell::new(0));
    let c = completions.clone();
    graph.set_on_complete(move || c.set(c.get() + 1));

    assert_eq!(graph.action(1).remaining_predecessors(), 1);
    assert_eq!(graph.action(3).predecessors(), &[1]);
    assert_eq!(graph.action(4).id, 14);
    assert!(!graph.is_finished());

    graph.start();

    assert!(graph.is_finished());
    assert_eq!(completions.get(), 1);
    assert_dependencies_respected(&graph);

    graph.start();
    assert_eq!(completions.get(), 1);
}

#[test]
fn test_empty_graph_completes_on_start() {
    let mut cloud_sim = new_cloud_sim();
    let ctx = cloud_sim.create_context("graph");
    let mut graph = ActionGraph::from_actions(Vec::new(), cloud_sim.infrastructure(), ctx, 0);
    let completions = rc!(Cell::new(0));
    let c = completions.clone();
    graph.set_on_complete(move || c.set(c.get() + 1));

    assert!(graph.is_finished());
    graph.start();
    assert_eq!(completions.get(), 1);
}

#[test]
fn test_two_node_cycle_is_neutralized() {
    let mut cloud_sim = new_cloud_sim();
    let h0 = cloud_sim.add_host("h0", 16., 64.);
    let h1 = cloud_sim.add_host("h1", 16., 64.);
    let a = cloud_sim.spawn_vm_directly(2., 4., h0).unwrap();
    let b = cloud_sim.spawn_vm_directly(2., 4., h1).unwrap();
    let ctx = cloud_sim.create_context("graph");
    let kinds = vec![
        ActionKind::Migration { vm: a, source: h0, target: h1 },
        ActionKind::Migration { vm: b, source: h1, target: h0 },
        ActionKind::Shutdown { pm: h0 },
    ];
    let graph: Rc<RefCell<ActionGraph>> = rc!(refcell!(ActionGraph::from_actions(
        kinds,
        cloud_sim.infrastructure(),
        ctx,
        0
    )));

    assert_eq!(graph.borrow().skipped_count(), 2);
    assert_eq!(graph.borrow().migration_count(), 0);
    assert!(graph.borrow().action(0).is_cancelled());
    assert!(graph.borrow().action(0).predecessors().is_empty());
    assert!(graph.borrow().action(1).predecessors().is_empty());
    assert_eq!(graph.borrow().action(2).predecessors(), &[0]);

    ActionGraph::launch(&graph);

    assert!(graph.borrow().is_finished());
    assert_dependencies_respected(&graph.borrow());
    cloud_sim.step_for_duration(10);
    assert_eq!(cloud_sim.vm_location(a), Some(h0));
    assert_eq!(cloud_sim.vm_location(b), Some(h1));
    assert_eq!(cloud_sim.host_state(h0), Some(PmState::Running));
}

#[test]
fn test_start_migrate_shutdown() {
    let mut cloud_sim = new_cloud_sim();
    let h0 = cloud_sim.add_host("h0", 10., 10.);
    let h1 = cloud_sim.add_host("h1", 10., 10.);
    let h2 = cloud_sim.add_switched_off_host("h2", 10., 10.);
    let a = cloud_sim.spawn_vm_directly(2., 2., h0).unwrap();
    let b = cloud_sim.spawn_vm_directly(5., 5., h1).unwrap();

    let infrastructure = cloud_sim.infrastructure();
    let mut model = InfrastructureModel::snapshot(&infrastructure.borrow(), ModelThresholds::default());
    model.migrate_vm(0, 2);
    let graph = ActionGraph::build(&model, infrastructure.clone(), cloud_sim.create_context("graph"), 0);
    assert_eq!(
        graph.actions().iter().map(|a| a.kind).collect::<Vec<ActionKind>>(),
        vec![
            ActionKind::Start { pm: h2 },
            ActionKind::Migration { vm: a, source: h0, target: h2 },
            ActionKind::Shutdown { pm: h0 },
        ]
    );

    let graph = rc!(refcell!(graph));
    let probe = cloud_sim.create_context("probe");
    let completed_at = rc!(Cell::new(None));
    let c = completed_at.clone();
    graph
        .borrow_mut()
        .set_on_complete(move || c.set(Some(probe.time())));
    ActionGraph::launch(&graph);

    assert_eq!(graph.borrow().action(0).state(), ActionState::Executing);
    assert_eq!(graph.borrow().action(1).state(), ActionState::Waiting);
    assert_eq!(cloud_sim.host_state(h2), Some(PmState::SwitchingOn));

    // switch on takes 10 ticks, the migration of 2 memory units takes 1 tick
    cloud_sim.step_for_duration(10);
    assert_eq!(graph.borrow().action(0).state(), ActionState::Finished);
    assert_eq!(graph.borrow().action(1).state(), ActionState::Executing);
    assert_eq!(cloud_sim.host_state(h0), Some(PmState::Running));

    cloud_sim.step_for_duration(1);
    assert!(graph.borrow().is_finished());
    assert_eq!(completed_at.get(), Some(11));
    assert_eq!(cloud_sim.vm_location(a), Some(h2));
    assert_eq!(cloud_sim.vm_location(b), Some(h1));
    assert_eq!(cloud_sim.host_state(h0), Some(PmState::SwitchingOff));
    assert_dependencies_respected(&graph.borrow());

    cloud_sim.step_for_duration(5);
    assert_eq!(cloud_sim.host_state(h0), Some(PmState::Off));
}

#[test]
fn test_migration_waits_for_leaving_vm() {
    let mut cloud_sim = new_cloud_sim();
    let h0 = cloud_sim.add_host("h0", 10., 10.);
    let h1 = cloud_sim.add_host("h1", 10., 10.);
    let h2 = cloud_sim.add_host("h2", 10., 10.);
    let x = cloud_sim.spawn_vm_directly(4., 4., h0).unwrap();
    let y = cloud_sim.spawn_vm_directly(8., 8., h1).unwrap();
    let kinds = vec![
        ActionKind::Migration { vm: x, source: h0, target: h1 },
        ActionKind::Migration { vm: y, source: h1, target: h2 },
    ];
    let ctx = cloud_sim.create_context("graph");
    let graph = rc!(refcell!(ActionGraph::from_actions(
        kinds,
        cloud_sim.infrastructure(),
        ctx,
        0
    )));
    assert_eq!(graph.borrow().action(0).predecessors(), &[1]);

    ActionGraph::launch(&graph);
    cloud_sim.step_for_duration(5);

    assert!(graph.borrow().is_finished());
    assert_eq!(graph.borrow().finish_order(), &[1, 0]);
    assert_eq!(cloud_sim.vm_location(x), Some(h1));
    assert_eq!(cloud_sim.vm_location(y), Some(h2));
}

#[test]
fn test_failed_precondition_completes_without_effect() {
    let mut cloud_sim = new_cloud_sim();
    let h0 = cloud_sim.add_host("h0", 10., 10.);
    let h1 = cloud_sim.add_host("h1", 4., 4.);
    let a = cloud_sim.spawn_vm_directly(2., 2., h0).unwrap();
    cloud_sim.spawn_vm_directly(3., 3., h1).unwrap();
    let kinds = vec![
        ActionKind::Migration { vm: a, source: h0, target: h1 },
        ActionKind::Shutdown { pm: h0 },
    ];
    let ctx = cloud_sim.create_context("graph");
    let graph = rc!(refcell!(ActionGraph::from_actions(
        kinds,
        cloud_sim.infrastructure(),
        ctx,
        0
    )));

    ActionGraph::launch(&graph);

    assert!(graph.borrow().is_finished());
    assert_eq!(graph.borrow().skipped_count(), 0);
    assert_eq!(cloud_sim.vm_location(a), Some(h0));
    // the shutdown fails too, the host still has a VM
    assert_eq!(cloud_sim.host_state(h0), Some(PmState::Running));
}
