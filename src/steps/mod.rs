pub mod collections;
pub mod database;
pub mod indexes;
pub mod user;

use std::sync::Arc;

use bootstrap_kernel::StepRegistry;

pub use collections::EnsureCollectionsStep;
pub use database::SelectDatabaseStep;
pub use indexes::EnsureIndexesStep;
pub use user::EnsureUserStep;

/// Register the provisioning steps in the order they must run.
pub fn register_all(registry: &mut StepRegistry) {
    registry.register(Arc::new(SelectDatabaseStep));
    registry.register(Arc::new(EnsureUserStep));
    registry.register(Arc::new(EnsureCollectionsStep));
    registry.register(Arc::new(EnsureIndexesStep));
}

/// Registry holding every provisioning step.
pub fn default_registry() -> StepRegistry {
    let mut registry = StepRegistry::new();
    register_all(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootstrap_kernel::Settings;

    #[test]
    fn steps_run_in_fixed_order() {
        let plan = default_registry().plan(&Settings::default());
        let names: Vec<&str> = plan.iter().map(|p| p.step).collect();
        assert_eq!(
            names,
            vec![
                database::NAME,
                user::NAME,
                collections::NAME,
                indexes::NAME
            ]
        );
    }
}
