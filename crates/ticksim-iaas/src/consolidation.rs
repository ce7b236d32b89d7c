//! Consolidation of virtual machines: placement model, improvers and action graphs.

pub mod action;
pub mod action_graph;
pub mod consolidator;
pub mod improver;
pub mod improvers;
pub mod model;
