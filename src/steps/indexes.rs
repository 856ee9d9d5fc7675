use async_trait::async_trait;
use bootstrap_kernel::{BootstrapError, Change, Outcome, Settings, Step, StepCtx};

/// Creates the configured indexes that are missing, matched by name.
///
/// Index creation is idempotent in both modes; the collections themselves
/// stay empty.
pub struct EnsureIndexesStep;

pub const NAME: &str = "ensure-indexes";

#[async_trait]
impl Step for EnsureIndexesStep {
    fn name(&self) -> &'static str {
        NAME
    }

    fn describe(&self, settings: &Settings) -> String {
        if !settings.run.create_indexes {
            return "skip index creation (disabled)".to_string();
        }

        let indexes: Vec<String> = settings
            .collections
            .iter()
            .flat_map(|c| c.indexes.iter().map(move |i| format!("{}.{}", c.name, i.name)))
            .collect();
        if indexes.is_empty() {
            "no indexes configured".to_string()
        } else {
            format!("ensure indexes [{}]", indexes.join(", "))
        }
    }

    async fn apply(&self, ctx: &StepCtx<'_>) -> Result<Outcome, BootstrapError> {
        if !ctx.settings.run.create_indexes {
            tracing::info!("index creation disabled");
            return Ok(Outcome::Skipped);
        }

        let mut created = 0usize;
        for collection in &ctx.settings.collections {
            if collection.indexes.is_empty() {
                continue;
            }

            let existing = ctx
                .catalog
                .index_names(ctx.database(), &collection.name)
                .await?;

            for index in &collection.indexes {
                if existing.contains(&index.name) {
                    tracing::debug!(
                        collection = %collection.name,
                        index = %index.name,
                        "index already present"
                    );
                    continue;
                }

                ctx.catalog
                    .create_index(ctx.database(), &collection.name, index)
                    .await?;
                ctx.record(
                    NAME,
                    Change::IndexCreated {
                        database: ctx.database().to_string(),
                        collection: collection.name.clone(),
                        name: index.name.clone(),
                    },
                );
                tracing::info!(
                    collection = %collection.name,
                    index = %index.name,
                    unique = index.unique,
                    "index created"
                );
                created += 1;
            }
        }

        Ok(if created == 0 {
            Outcome::AlreadyPresent
        } else {
            Outcome::Created
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootstrap_db::{Catalog, MemoryCatalog};

    #[tokio::test]
    async fn creates_configured_indexes() {
        let settings = Settings::default();
        let catalog = MemoryCatalog::new();
        let ctx = StepCtx::new(&settings, &catalog);

        assert_eq!(EnsureIndexesStep.apply(&ctx).await.unwrap(), Outcome::Created);

        let users = catalog.index_names("elevatus", "users").await.unwrap();
        assert!(users.contains(&"email_unique".to_string()));
        let candidates = catalog.index_names("elevatus", "candidates").await.unwrap();
        assert!(candidates.contains(&"candidate_text".to_string()));
        assert_eq!(ctx.changes_for(NAME).len(), 5);
    }

    #[tokio::test]
    async fn second_pass_creates_nothing() {
        let settings = Settings::default();
        let catalog = MemoryCatalog::new();
        EnsureIndexesStep
            .apply(&StepCtx::new(&settings, &catalog))
            .await
            .unwrap();

        let ctx = StepCtx::new(&settings, &catalog);
        assert_eq!(
            EnsureIndexesStep.apply(&ctx).await.unwrap(),
            Outcome::AlreadyPresent
        );
        assert!(ctx.changes().is_empty());
    }

    #[tokio::test]
    async fn disabled_indexes_are_skipped() {
        let mut settings = Settings::default();
        settings.run.create_indexes = false;
        let catalog = MemoryCatalog::new();
        let ctx = StepCtx::new(&settings, &catalog);

        assert_eq!(EnsureIndexesStep.apply(&ctx).await.unwrap(), Outcome::Skipped);
        assert!(catalog.collection_names("elevatus").await.unwrap().is_empty());
        assert_eq!(
            EnsureIndexesStep.describe(&settings),
            "skip index creation (disabled)"
        );
    }
}
