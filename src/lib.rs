//! Provisioning for the elevatus MongoDB database.
//!
//! Selects the target database, provisions the application user with an
//! owner role scoped to it, and creates the empty collections (with their
//! indexes) the application expects.

pub mod steps;
pub mod verify;

use bootstrap_db::Catalog;
use bootstrap_kernel::{BootstrapError, PlannedStep, RunReport, Settings, StepCtx};

pub use steps::default_registry;
pub use verify::{verify, VerificationReport, VerifyOptions};

/// Validate the settings and apply every provisioning step in order.
pub async fn provision(
    settings: &Settings,
    catalog: &dyn Catalog,
) -> Result<RunReport, BootstrapError> {
    settings.validate()?;

    let registry = default_registry();
    let ctx = StepCtx::new(settings, catalog);
    registry.run(&ctx).await
}

/// Describe the steps [`provision`] would run, without a connection.
pub fn plan(settings: &Settings) -> Result<Vec<PlannedStep>, BootstrapError> {
    settings.validate()?;
    Ok(default_registry().plan(settings))
}
