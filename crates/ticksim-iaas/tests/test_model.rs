use rstest::rstest;

use ticksim_core::Simulation;

use ticksim_iaas::consolidation::model::{InfrastructureModel, ModelThresholds, PlacementChange};
use ticksim_iaas::core::config::SimulationConfig;
use ticksim_iaas::core::pm::PmState;
use ticksim_iaas::core::resources::Resources;
use ticksim_iaas::simulation::CloudSimulation;

fn two_bin_model() -> InfrastructureModel {
    let mut model = InfrastructureModel::new(ModelThresholds::default());
    let b0 = model.add_bin(10, Resources::new(10., 10.), PmState::Running);
    let b1 = model.add_bin(11, Resources::new(10., 10.), PmState::Running);
    model.add_item(100, Resources::new(3., 4.), b0);
    model.add_item(101, Resources::new(6., 2.), b1);
    model
}

#[test]
fn test_capacity_bookkeeping() {
    let mut model = two_bin_model();
    assert_eq!(model.bin(0).consumed(), Resources::new(3., 4.));
    assert_eq!(model.bin(0).free(), Resources::new(7., 6.));

    model.migrate_vm(0, 1);

    assert_eq!(model.bin(0).consumed(), Resources::zero());
    assert_eq!(model.bin(1).consumed(), Resources::new(9., 6.));
    assert_eq!(model.bin(1).free(), Resources::new(1., 4.));
    assert_eq!(model.bin(1).vms(), &[1, 0]);
    assert_eq!(model.item(0).current_pm(), Some(1));
    assert_eq!(model.item(0).initial_pm(), 0);
    assert!(model.is_consistent());
}

#[test]
fn test_remove_and_add() {
    let mut model = two_bin_model();
    assert_eq!(model.remove_vm(1), Some(1));
    assert_eq!(model.remove_vm(1), None);
    assert_eq!(model.item(1).current_pm(), None);
    assert!(!model.is_consistent());

    model.add_vm(1, 1);
    assert!(model.is_consistent());
    assert!(model.placement_changes().is_empty());
}

#[rstest]
#[case(0, 1, false)] // cpu does not fit
#[case(1, 0, true)]
#[case(0, 0, false)] // already there
#[case(1, 1, false)]
fn test_is_migration_possible(#[case] vm: usize, #[case] pm: usize, #[case] expected: bool) {
    let mut model = two_bin_model();
    model.add_item(102, Resources::new(2., 2.), 1);
    // bin 1 now has 2 cpu free, item 0 needs 3
    assert_eq!(model.is_migration_possible(vm, pm), expected);
}

#[test]
fn test_memory_is_checked() {
    let mut model = InfrastructureModel::new(ModelThresholds::default());
    let b0 = model.add_bin(0, Resources::new(10., 10.), PmState::Running);
    let b1 = model.add_bin(1, Resources::new(10., 10.), PmState::Running);
    let vm = model.add_item(0, Resources::new(1., 8.), b0);
    model.add_item(1, Resources::new(1., 5.), b1);
    assert!(!model.is_migration_possible(vm, b1));
}

#[test]
fn test_switching_off_bin_does_not_accept_vms() {
    let mut model = InfrastructureModel::new(ModelThresholds::default());
    let b0 = model.add_bin(0, Resources::new(10., 10.), PmState::Running);
    let b1 = model.add_bin(1, Resources::new(10., 10.), PmState::SwitchingOff);
    let b2 = model.add_bin(2, Resources::new(10., 10.), PmState::Off);
    let vm = model.add_item(0, Resources::new(1., 1.), b0);
    assert!(!model.is_migration_possible(vm, b1));
    assert!(model.is_migration_possible(vm, b2));
}

#[test]
fn test_allocation_flags() {
    let mut model = InfrastructureModel::new(ModelThresholds {
        mostly_empty: 0.75,
        full: 0.1,
    });
    let under = model.add_bin(0, Resources::new(10., 10.), PmState::Running);
    let over = model.add_bin(1, Resources::new(10., 10.), PmState::Running);
    let full = model.add_bin(2, Resources::new(10., 10.), PmState::Running);
    let empty = model.add_bin(3, Resources::new(10., 10.), PmState::Running);
    model.add_item(0, Resources::new(1., 2.), under);
    model.add_item(1, Resources::new(6., 6.), over);
    model.add_item(2, Resources::new(6., 6.), over);
    model.add_item(3, Resources::new(5., 9.5), full);

    assert!(model.bin(under).is_under_allocated());
    assert!(!model.bin(under).is_over_allocated());
    assert!(model.bin(over).is_over_allocated());
    assert!(model.bin(over).is_full());
    assert!(model.bin(full).is_full());
    assert!(!model.bin(full).is_over_allocated());
    assert!(!model.bin(empty).is_under_allocated());
    assert_eq!(model.active_bin_count(), 3);
}

#[test]
fn test_placement_diff() {
    let mut model = InfrastructureModel::new(ModelThresholds::default());
    let b0 = model.add_bin(7, Resources::new(10., 10.), PmState::Running);
    let b1 = model.add_bin(8, Resources::new(10., 10.), PmState::Off);
    model.add_bin(9, Resources::new(10., 10.), PmState::Running);
    let vm = model.add_item(42, Resources::new(1., 1.), b0);

    model.migrate_vm(vm, b1);

    assert_eq!(
        model.placement_changes(),
        vec![PlacementChange {
            vm_id: 42,
            from: 7,
            to: 8
        }]
    );
    assert_eq!(model.pms_to_start(), vec![8]);
    assert_eq!(model.pms_to_shut_down(), vec![7, 9]);
}

#[test]
fn test_snapshot() {
    let sim = Simulation::new(123);
    let mut cloud_sim = CloudSimulation::new(sim, SimulationConfig::default());
    let h0 = cloud_sim.add_host("h0", 8., 16.);
    let h1 = cloud_sim.add_switched_off_host("h1", 4., 4.);
    let v0 = cloud_sim.spawn_vm_directly(2., 4., h0).unwrap();
    let v1 = cloud_sim.spawn_vm_directly(1., 2., h0).unwrap();

    let infrastructure = cloud_sim.infrastructure();
    let model = InfrastructureModel::snapshot(&infrastructure.borrow(), ModelThresholds::default());

    assert_eq!(model.bins().len(), 2);
    assert_eq!(model.bin(0).pm_id, h0);
    assert_eq!(model.bin(0).state, PmState::Running);
    assert_eq!(model.bin(1).pm_id, h1);
    assert_eq!(model.bin(1).state, PmState::Off);
    assert_eq!(model.bin(0).consumed(), Resources::new(3., 6.));
    assert_eq!(model.items().len(), 2);
    assert_eq!(model.item(0).vm_id, v0);
    assert_eq!(model.item(1).vm_id, v1);
    assert!(model.is_consistent());
}
