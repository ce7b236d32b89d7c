use crate::consolidation::improver::Improver;
use crate::consolidation::improvers::simple_consolidator::SimpleConsolidator;
use crate::consolidation::model::InfrastructureModel;
use crate::core::pm::PmState;

/// Drains over-allocated bins before running [`SimpleConsolidator`].
///
/// Donors (bins with negative free capacity) are processed from the heaviest by consumed CPU. Their VMs, last placed
/// first, move to running non-full bins, fullest first, until the donor fits its capacity.
#[derive(Default)]
pub struct UnderprovisioningAwareConsolidator {
    simple: SimpleConsolidator,
}

impl UnderprovisioningAwareConsolidator {
    pub fn new() -> Self {
        Self {
            simple: SimpleConsolidator::new(),
        }
    }

    fn drain_overcommitted(&self, model: &mut InfrastructureModel) {
        let mut donors = model
            .bins()
            .iter()
            .filter(|bin| bin.is_over_allocated())
            .map(|bin| bin.index)
            .collect::<Vec<usize>>();
        donors.sort_by(|a, b| model.bin(*b).consumed().cpu.total_cmp(&model.bin(*a).consumed().cpu));

        for donor in donors {
            let mut receivers = model
                .bins()
                .iter()
                .filter(|bin| bin.index != donor && bin.state == PmState::Running && !bin.is_full())
                .map(|bin| bin.index)
                .collect::<Vec<usize>>();
            receivers.sort_by(|a, b| model.bin(*b).consumed().cpu.total_cmp(&model.bin(*a).consumed().cpu));

            for vm in model.bin(donor).vms().iter().rev().copied().collect::<Vec<usize>>() {
                if !model.bin(donor).is_over_allocated() {
                    break;
                }
                if let Some(target) = receivers.iter().copied().find(|bin| model.is_migration_possible(vm, *bin)) {
                    model.migrate_vm(vm, target);
                }
            }
        }
    }
}

impl Improver for UnderprovisioningAwareConsolidator {
    fn improve(&mut self, model: &mut InfrastructureModel) {
        self.drain_overcommitted(model);
        self.simple.improve(model);
    }
}
