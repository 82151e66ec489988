mod contract;
mod context;
mod error;
mod executor;
mod registry;

pub use contract::{FieldKind, InputField, OutputField, PhaseContract};
pub use context::{ExecutionContext, MessageLevel};
pub use error::{PhaseExecError, RegistryError};
pub use executor::{PhaseExecutor, ValidationResult};
pub use registry::PhaseRegistry;
