use crate::consolidation::improver::Improver;
use crate::consolidation::model::InfrastructureModel;

/// Leaves the placement unchanged.
#[derive(Default)]
pub struct NullImprover;

impl NullImprover {
    pub fn new() -> Self {
        Self {}
    }
}

impl Improver for NullImprover {
    fn improve(&mut self, _model: &mut InfrastructureModel) {}
}
