use crate::consolidation::improver::Improver;
use crate::consolidation::model::InfrastructureModel;

/// First-fit best-decreasing repacking of VMs evicted from badly loaded bins.
///
/// VMs are evicted from the end of the hosted list of every over-allocated or under-allocated bin until the bin is
/// neither. Evicted VMs, heaviest (by CPU) first, go to the first bin able to host them, with bins ordered by
/// decreasing consumed CPU. A VM which fits nowhere returns to the bin it was evicted from.
#[derive(Default)]
pub struct FirstFitBestDecreasing;

impl FirstFitBestDecreasing {
    pub fn new() -> Self {
        Self {}
    }
}

impl Improver for FirstFitBestDecreasing {
    fn improve(&mut self, model: &mut InfrastructureModel) {
        let mut evicted = Vec::new();
        for bin in 0..model.bins().len() {
            while model.bin(bin).is_over_allocated() || model.bin(bin).is_under_allocated() {
                let Some(&vm) = model.bin(bin).vms().last() else {
                    break;
                };
                model.remove_vm(vm);
                evicted.push((vm, bin));
            }
        }
        if evicted.is_empty() {
            return;
        }

        evicted.sort_by(|(a, _), (b, _)| {
            model.item(*b).demand().cpu.total_cmp(&model.item(*a).demand().cpu)
        });
        let mut bins = (0..model.bins().len()).collect::<Vec<usize>>();
        bins.sort_by(|a, b| model.bin(*b).consumed().cpu.total_cmp(&model.bin(*a).consumed().cpu));

        for (vm, origin) in evicted {
            let target = bins.iter().copied().find(|bin| model.is_migration_possible(vm, *bin));
            model.add_vm(vm, target.unwrap_or(origin));
        }
    }
}
