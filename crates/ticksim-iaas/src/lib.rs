#![doc = include_str!("../readme.md")]

pub mod consolidation;
pub mod core;
pub mod simulation;
