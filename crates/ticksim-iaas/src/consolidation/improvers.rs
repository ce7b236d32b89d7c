//! Standard improvers.

pub mod first_fit_best_decreasing;
pub mod null;
pub mod probabilistic;
pub mod simple_consolidator;
pub mod underprovisioning_aware;
