use std::collections::HashSet;

use crate::consolidation::improver::Improver;
use crate::consolidation::model::InfrastructureModel;

/// Local search moving VMs from emptier bins to fuller ones.
///
/// Every round sorts the non-empty, non-full bins by decreasing free capacity and tries to move each VM of a bin to a
/// later bin of that order. A bin which became full after receiving a VM is not used further in the round, a bin which
/// received a VM is not drained in the same round. Rounds repeat until one moves nothing.
#[derive(Default)]
pub struct SimpleConsolidator;

impl SimpleConsolidator {
    pub fn new() -> Self {
        Self {}
    }

    /// Runs one round, returns the number of moved VMs.
    fn round(&self, model: &mut InfrastructureModel) -> usize {
        let mut candidates = model
            .bins()
            .iter()
            .filter(|bin| bin.hosts_vms() && !bin.is_full())
            .map(|bin| bin.index)
            .collect::<Vec<usize>>();
        candidates.sort_by(|a, b| model.bin(*b).free_ratio().total_cmp(&model.bin(*a).free_ratio()));

        let mut closed = vec![false; candidates.len()];
        let mut received = HashSet::new();
        let mut moved = 0;
        for i in 0..candidates.len() {
            let source = candidates[i];
            if closed[i] || received.contains(&source) {
                continue;
            }
            for vm in model.bin(source).vms().to_vec() {
                for j in i + 1..candidates.len() {
                    let target = candidates[j];
                    if closed[j] || !model.is_migration_possible(vm, target) {
                        continue;
                    }
                    model.migrate_vm(vm, target);
                    received.insert(target);
                    moved += 1;
                    if model.bin(target).is_full() {
                        closed[j] = true;
                    }
                    break;
                }
            }
        }
        moved
    }
}

impl Improver for SimpleConsolidator {
    fn improve(&mut self, model: &mut InfrastructureModel) {
        // VMs only move to bins with less free capacity, the bound guards against float ties
        let max_rounds = model.items().len() * model.bins().len() + 1;
        for _ in 0..max_rounds {
            if self.round(model) == 0 {
                break;
            }
        }
    }
}
