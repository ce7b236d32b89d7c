//! Pluggable algorithms improving the placement model.

use ticksim_core::SimulationContext;

use crate::consolidation::improvers::first_fit_best_decreasing::FirstFitBestDecreasing;
use crate::consolidation::improvers::null::NullImprover;
use crate::consolidation::improvers::probabilistic::ProbabilisticImprover;
use crate::consolidation::improvers::simple_consolidator::SimpleConsolidator;
use crate::consolidation::improvers::underprovisioning_aware::UnderprovisioningAwareConsolidator;
use crate::consolidation::model::InfrastructureModel;
use crate::core::config::{parse_config_value, parse_options};

/// Trait for implementation of placement improvement algorithms.
///
/// An improver moves items between bins of the model to reduce the number of active bins or to resolve over- and
/// under-allocation. It never touches the live infrastructure.
pub trait Improver {
    fn improve(&mut self, model: &mut InfrastructureModel);
}

/// Creates an improver from config string like `Probabilistic[probability=0.4,inner=SimpleConsolidator]`.
///
/// Panics on unknown improver name.
pub fn improver_resolver(config_str: &str, ctx: &SimulationContext) -> Box<dyn Improver> {
    let (improver_name, options) = parse_config_value(config_str);
    let options = parse_options(&options.unwrap_or_default());
    match improver_name.as_str() {
        "FirstFitBestDecreasing" => Box::new(FirstFitBestDecreasing::new()),
        "SimpleConsolidator" => Box::new(SimpleConsolidator::new()),
        "UnderprovisioningAwareConsolidator" => Box::new(UnderprovisioningAwareConsolidator::new()),
        "Null" => Box::new(NullImprover::new()),
        "Probabilistic" => Box::new(ProbabilisticImprover::from_options(&options, ctx)),
        _ => panic!("Can't resolve: {}", config_str),
    }
}
