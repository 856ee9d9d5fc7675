use std::sync::Arc;

use serde::Serialize;

use crate::error::BootstrapError;
use crate::settings::Settings;
use crate::step::{Change, Outcome, Step, StepCtx};

/// A step as it will run, for `plan` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub step: &'static str,
    pub description: String,
}

/// Result of a single applied step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    pub outcome: Outcome,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub database: String,
    pub steps: Vec<StepReport>,
    pub changes: Vec<Change>,
}

impl RunReport {
    pub fn outcome_of(&self, step: &str) -> Option<Outcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| s.outcome)
    }
}

/// Ordered set of provisioning steps.
pub struct StepRegistry {
    steps: Vec<Arc<dyn Step>>,
}

impl StepRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step; steps run in registration order.
    pub fn register(&mut self, step: Arc<dyn Step>) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Arc<dyn Step>] {
        &self.steps
    }

    /// Get a step by name
    pub fn get_step(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.steps.iter().find(|step| step.name() == name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Describe every step for the given settings without touching the server.
    pub fn plan(&self, settings: &Settings) -> Vec<PlannedStep> {
        self.steps
            .iter()
            .map(|step| PlannedStep {
                step: step.name(),
                description: step.describe(settings),
            })
            .collect()
    }

    /// Apply every step in order, stopping at the first failure.
    ///
    /// When `run.rollback_on_failure` is set, the failed step and every step
    /// before it are compensated in reverse order before the error is returned.
    /// The error carries the compensation failures and the changes still in
    /// effect afterwards.
    pub async fn run(&self, ctx: &StepCtx<'_>) -> Result<RunReport, BootstrapError> {
        let names: Vec<&str> = self.steps.iter().map(|s| s.name()).collect();
        tracing::info!(
            database = ctx.database(),
            mode = %ctx.settings.run.mode,
            "running steps in order: {:?}",
            names
        );

        let mut reports = Vec::with_capacity(self.steps.len());

        for (position, step) in self.steps.iter().enumerate() {
            tracing::info!(step = step.name(), "applying step");

            match step.apply(ctx).await {
                Ok(outcome) => {
                    tracing::info!(step = step.name(), outcome = %outcome, "step complete");
                    reports.push(StepReport {
                        step: step.name(),
                        outcome,
                    });
                }
                Err(err) => {
                    tracing::error!(
                        step = step.name(),
                        error = %err,
                        "step failed; remaining steps will not run"
                    );

                    let rollback = if ctx.settings.run.rollback_on_failure {
                        Some(self.rollback(ctx, position).await)
                    } else {
                        None
                    };

                    let left_in_place = ctx.changes();
                    if !left_in_place.is_empty() {
                        tracing::warn!(
                            changes = left_in_place.len(),
                            rollback = rollback.is_some(),
                            "changes made before the failure remain"
                        );
                    }

                    return Err(BootstrapError::Step {
                        step: step.name(),
                        source: Box::new(err),
                        left_in_place,
                        rollback,
                    });
                }
            }
        }

        Ok(RunReport {
            database: ctx.database().to_string(),
            steps: reports,
            changes: ctx.changes(),
        })
    }

    /// Compensate steps `0..=failed` in reverse order.
    ///
    /// Returns the compensation failures; they are logged and never replace
    /// the error that triggered the rollback.
    pub async fn rollback(&self, ctx: &StepCtx<'_>, failed: usize) -> Vec<BootstrapError> {
        tracing::warn!("rolling back changes in reverse order");

        let mut failures = Vec::new();
        for step in self.steps.iter().take(failed + 1).rev() {
            if let Err(err) = step.compensate(ctx).await {
                let err = BootstrapError::Rollback {
                    step: step.name(),
                    source: Box::new(err),
                };
                tracing::error!(step = step.name(), error = ?err, "compensation failed");
                failures.push(err);
            }
        }
        failures
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
