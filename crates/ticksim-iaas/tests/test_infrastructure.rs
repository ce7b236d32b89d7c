use std::cell::RefCell;
use std::rc::Rc;

use ticksim_core::Simulation;

use ticksim_iaas::core::common::AllocationVerdict;
use ticksim_iaas::core::config::SimulationConfig;
use ticksim_iaas::core::error::IaasError;
use ticksim_iaas::core::events::{StateChange, StateChangeListener};
use ticksim_iaas::core::pm::PmState;
use ticksim_iaas::core::resources::Resources;
use ticksim_iaas::core::vm::VmState;
use ticksim_iaas::simulation::CloudSimulation;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn cloud_sim_from_config(file_name: &str) -> CloudSimulation {
    let sim = Simulation::new(123);
    let sim_config = SimulationConfig::from_file(&name_wrapper(file_name));
    CloudSimulation::new(sim, sim_config)
}

#[derive(Default)]
struct Recorder {
    changes: Vec<StateChange>,
}

impl StateChangeListener for Recorder {
    fn on_state_change(&mut self, change: &StateChange) {
        self.changes.push(*change);
    }
}

#[test]
fn test_config() {
    let config = SimulationConfig::from_file(&name_wrapper("config.yaml"));
    assert_eq!(config.pm_switch_on_duration, 10);
    assert_eq!(config.network_throughput, 10);
    assert_eq!(config.consolidation_interval, 100);
    assert_eq!(config.hosts.len(), 2);
    assert_eq!(config.hosts[1].switched_on, Some(false));

    let partial = SimulationConfig::from_file(&name_wrapper("partial.yaml"));
    assert_eq!(partial.network_throughput, 0);
    assert_eq!(partial.pm_switch_on_duration, 10);
    assert_eq!(partial.pm_switch_off_duration, 5);
    assert_eq!(partial.mostly_empty_threshold, 0.75);
    assert!(partial.hosts.is_empty());
}

#[test]
fn test_hosts_from_config() {
    let mut cloud_sim = cloud_sim_from_config("config.yaml");
    let hosts = cloud_sim.add_hosts_from_config();

    assert_eq!(hosts.len(), 5);
    assert_eq!(cloud_sim.host(hosts[0]).unwrap().name, "h1");
    assert_eq!(cloud_sim.host(hosts[3]).unwrap().name, "h4");
    assert_eq!(cloud_sim.host(hosts[4]).unwrap().name, "spare");
    assert_eq!(cloud_sim.host_state(hosts[4]), Some(PmState::Off));
    assert_eq!(cloud_sim.host(hosts[4]).unwrap().capacity(), Resources::new(32., 128.));
    assert_eq!(cloud_sim.active_host_count(), 4);
}

#[test]
fn test_power_cycle() {
    let mut cloud_sim = cloud_sim_from_config("config.yaml");
    let host = cloud_sim.add_switched_off_host("h", 8., 8.);

    cloud_sim.switch_on_host(host).unwrap();
    assert_eq!(cloud_sim.host_state(host), Some(PmState::SwitchingOn));
    cloud_sim.step_for_duration(9);
    assert_eq!(cloud_sim.host_state(host), Some(PmState::SwitchingOn));
    cloud_sim.step_for_duration(1);
    assert_eq!(cloud_sim.current_time(), 10);
    assert_eq!(cloud_sim.host_state(host), Some(PmState::Running));

    cloud_sim.switch_off_host(host).unwrap();
    assert_eq!(cloud_sim.host_state(host), Some(PmState::SwitchingOff));
    cloud_sim.step_for_duration(5);
    assert_eq!(cloud_sim.host_state(host), Some(PmState::Off));
}

#[test]
fn test_power_errors() {
    let mut cloud_sim = cloud_sim_from_config("config.yaml");
    let host = cloud_sim.add_host("h", 8., 8.);
    cloud_sim.spawn_vm_directly(1., 1., host).unwrap();

    assert_eq!(cloud_sim.switch_off_host(host), Err(IaasError::HostNotEmpty(host)));
    assert_eq!(
        cloud_sim.switch_on_host(host),
        Err(IaasError::UnexpectedHostState {
            host,
            state: PmState::Running,
            expected: PmState::Off,
        })
    );
    assert_eq!(cloud_sim.switch_on_host(77), Err(IaasError::HostNotFound(77)));
}

#[test]
fn test_place_vm() {
    let mut cloud_sim = cloud_sim_from_config("config.yaml");
    let host = cloud_sim.add_host("h", 4., 4.);
    let off = cloud_sim.add_switched_off_host("off", 4., 4.);

    // overcommit is allowed for direct placement
    let v0 = cloud_sim.spawn_vm_directly(3., 3., host).unwrap();
    let v1 = cloud_sim.spawn_vm_directly(3., 3., host).unwrap();
    assert_eq!(cloud_sim.host(host).unwrap().vms(), &[v0, v1]);
    assert_eq!(cloud_sim.host(host).unwrap().free(), Resources::new(-2., -2.));

    assert!(matches!(
        cloud_sim.spawn_vm_directly(1., 1., off),
        Err(IaasError::UnexpectedHostState { .. })
    ));

    cloud_sim.destroy_vm(v0).unwrap();
    assert_eq!(cloud_sim.vm_state(v0), Some(VmState::Destroyed));
    assert_eq!(cloud_sim.vm_location(v0), None);
    assert_eq!(cloud_sim.host(host).unwrap().vms(), &[v1]);
    assert!(cloud_sim.destroy_vm(v0).is_err());
}

#[test]
fn test_migration() {
    let mut cloud_sim = cloud_sim_from_config("config.yaml");
    let h0 = cloud_sim.add_host("h0", 8., 64.);
    let h1 = cloud_sim.add_host("h1", 8., 64.);
    let vm = cloud_sim.spawn_vm_directly(2., 25., h0).unwrap();

    cloud_sim.migrate_vm_to_host(vm, h1).unwrap();

    // 25 memory units at 10 units per tick
    assert_eq!(cloud_sim.vm_state(vm), Some(VmState::Migrating));
    assert_eq!(cloud_sim.vm_location(vm), Some(h0));
    assert_eq!(cloud_sim.host(h1).unwrap().reserved(), Resources::new(2., 25.));
    assert_eq!(
        cloud_sim.switch_off_host(h1),
        Err(IaasError::HostNotEmpty(h1))
    );
    cloud_sim.step_for_duration(2);
    assert_eq!(cloud_sim.vm_state(vm), Some(VmState::Migrating));
    cloud_sim.step_for_duration(1);
    assert_eq!(cloud_sim.vm_state(vm), Some(VmState::Running));
    assert_eq!(cloud_sim.vm_location(vm), Some(h1));
    assert!(cloud_sim.host(h0).unwrap().vms().is_empty());
    assert_eq!(cloud_sim.host(h1).unwrap().reserved(), Resources::zero());
    assert_eq!(cloud_sim.host(h1).unwrap().allocated(), Resources::new(2., 25.));
}

#[test]
fn test_migration_verdicts() {
    let mut cloud_sim = cloud_sim_from_config("config.yaml");
    let h0 = cloud_sim.add_host("h0", 8., 8.);
    let h1 = cloud_sim.add_host("h1", 8., 4.);
    let off = cloud_sim.add_switched_off_host("off", 8., 8.);
    let vm = cloud_sim.spawn_vm_directly(2., 6., h0).unwrap();

    let infrastructure = cloud_sim.infrastructure();
    let infra = infrastructure.borrow();
    assert_eq!(infra.can_migrate(vm, h0, h1), AllocationVerdict::NotEnoughMemory);
    assert_eq!(infra.can_migrate(vm, h0, off), AllocationVerdict::HostNotRunning);
    assert_eq!(infra.can_migrate(vm, h1, h0), AllocationVerdict::WrongSource);
    assert_eq!(infra.can_migrate(vm, h0, h0), AllocationVerdict::AlreadyHosted);
    assert_eq!(infra.can_migrate(vm, h0, 99), AllocationVerdict::HostNotFound);
    assert_eq!(infra.can_migrate(99, h0, h1), AllocationVerdict::VmNotFound);
    drop(infra);

    assert_eq!(
        cloud_sim.migrate_vm_to_host(vm, h1),
        Err(IaasError::MigrationRejected {
            vm,
            target: h1,
            verdict: AllocationVerdict::NotEnoughMemory,
        })
    );
}

#[test]
fn test_network_unavailable() {
    let mut cloud_sim = cloud_sim_from_config("partial.yaml");
    let h0 = cloud_sim.add_host("h0", 8., 8.);
    let h1 = cloud_sim.add_host("h1", 8., 8.);
    let vm = cloud_sim.spawn_vm_directly(1., 1., h0).unwrap();

    assert_eq!(
        cloud_sim.migrate_vm_to_host(vm, h1),
        Err(IaasError::NetworkUnavailable { from: h0, to: h1 })
    );
    assert_eq!(cloud_sim.vm_state(vm), Some(VmState::Running));
    assert_eq!(cloud_sim.host(h1).unwrap().reserved(), Resources::zero());
}

#[test]
fn test_state_change_notifications() {
    let mut cloud_sim = cloud_sim_from_config("config.yaml");
    let h0 = cloud_sim.add_host("h0", 8., 64.);
    let h1 = cloud_sim.add_switched_off_host("h1", 8., 64.);
    let vm = cloud_sim.spawn_vm_directly(1., 5., h0).unwrap();

    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let listener: Rc<RefCell<dyn StateChangeListener>> = recorder.clone();
    cloud_sim.infrastructure().borrow_mut().add_listener(Rc::downgrade(&listener));

    cloud_sim.switch_on_host(h1).unwrap();
    cloud_sim.step_for_duration(10);
    cloud_sim.migrate_vm_to_host(vm, h1).unwrap();
    cloud_sim.step_for_duration(1);

    assert_eq!(
        recorder.borrow().changes,
        vec![
            StateChange::Pm {
                id: h1,
                old: PmState::Off,
                new: PmState::SwitchingOn
            },
            StateChange::Pm {
                id: h1,
                old: PmState::SwitchingOn,
                new: PmState::Running
            },
            StateChange::Vm {
                id: vm,
                old: VmState::Running,
                new: VmState::Migrating
            },
            StateChange::Vm {
                id: vm,
                old: VmState::Migrating,
                new: VmState::Running
            },
        ]
    );
    assert_eq!(cloud_sim.infrastructure().borrow().pending_notifications(), 0);

    drop(listener);
    drop(recorder);
    assert_eq!(cloud_sim.infrastructure().borrow().listener_count(), 0);
}
