mod aggregate;
mod context;
mod invoke;
mod parallel;
pub mod retry;
mod resolve;
pub mod skip_if;

pub use aggregate::aggregate_unit_outputs;
pub use context::PhaseContext;
pub use invoke::run_phase_instance;
pub use parallel::{parallel_map, ParallelMapOutcome};
pub use resolve::resolve_inputs;
pub use skip_if::{EvalContext, SkipIfExpr};
