pub mod model;
pub mod service;

pub use model::{CycleGroup, RollupError, RollupReport, TeamTotal};
pub use service::{compute_rollup, RollupService};
