pub mod evacuation;
pub mod utils;

pub use evacuation::EvacuationSolver;
