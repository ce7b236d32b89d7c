//! Live infrastructure: machines, their states and the operations performed on them.

pub mod common;
pub mod config;
pub mod error;
pub mod events;
pub mod infrastructure;
pub mod pm;
pub mod resources;
pub mod vm;
