pub mod error;
pub mod registry;
pub mod settings;
pub mod step;

pub use error::BootstrapError;
pub use registry::{PlannedStep, RunReport, StepRegistry, StepReport};
pub use settings::Settings;
pub use step::{Change, Outcome, Step, StepCtx};
