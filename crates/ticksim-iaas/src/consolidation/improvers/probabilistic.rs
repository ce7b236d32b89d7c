use std::collections::HashMap;

use ticksim_core::SimulationContext;

use crate::consolidation::improver::{improver_resolver, Improver};
use crate::consolidation::model::InfrastructureModel;
use crate::core::config::options::parse_option_or;

/// Runs the inner improver only with the given probability per call.
///
/// Uses the simulation-wide random number generator, so runs with the same seed make the same choices.
pub struct ProbabilisticImprover {
    probability: f64,
    inner: Box<dyn Improver>,
    ctx: SimulationContext,
}

impl ProbabilisticImprover {
    pub fn new(probability: f64, inner: Box<dyn Improver>, ctx: SimulationContext) -> Self {
        assert!(
            (0. ..=1.).contains(&probability),
            "probability should be in [0, 1], got {}",
            probability
        );
        Self {
            probability,
            inner,
            ctx,
        }
    }

    /// Options: `probability` (default 0.4), `inner` improver name (default `SimpleConsolidator`).
    pub fn from_options(options: &HashMap<String, String>, ctx: &SimulationContext) -> Self {
        let probability = parse_option_or(options, "probability", 0.4);
        let inner_str = options
            .get("inner")
            .map(|s| s.as_str())
            .unwrap_or("SimpleConsolidator");
        let inner = improver_resolver(inner_str, ctx);
        Self::new(probability, inner, ctx.create_context("probabilistic_improver"))
    }
}

impl Improver for ProbabilisticImprover {
    fn improve(&mut self, model: &mut InfrastructureModel) {
        if self.ctx.rand() < self.probability {
            self.inner.improve(model);
        }
    }
}
