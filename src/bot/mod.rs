pub mod evaluator;
pub mod filters;
pub mod messages;
pub mod reconciler;
pub mod runner;
#[cfg(test)]
pub mod testing;

pub use evaluator::BetEvaluator;
pub use reconciler::{ReconcilerSettings, StaleBetReconciler};
pub use runner::{CycleRunner, RunnerSettings};
