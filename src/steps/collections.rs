use async_trait::async_trait;
use bootstrap_kernel::settings::Mode;
use bootstrap_kernel::{BootstrapError, Change, Outcome, Settings, Step, StepCtx};

/// Creates the configured collections, empty and without options.
pub struct EnsureCollectionsStep;

pub const NAME: &str = "ensure-collections";

impl EnsureCollectionsStep {
    async fn create(&self, ctx: &StepCtx<'_>, collection: &str) -> Result<(), BootstrapError> {
        ctx.catalog
            .create_collection(ctx.database(), collection)
            .await?;
        ctx.record(
            NAME,
            Change::CollectionCreated {
                database: ctx.database().to_string(),
                collection: collection.to_string(),
            },
        );
        tracing::info!(database = ctx.database(), collection, "collection created");
        Ok(())
    }
}

#[async_trait]
impl Step for EnsureCollectionsStep {
    fn name(&self) -> &'static str {
        NAME
    }

    fn describe(&self, settings: &Settings) -> String {
        let verb = match settings.run.mode {
            Mode::Strict => "create",
            Mode::Ensure => "ensure",
        };
        format!(
            "{verb} collections [{}] in database '{}'",
            settings.collection_names().join(", "),
            settings.database.name
        )
    }

    async fn apply(&self, ctx: &StepCtx<'_>) -> Result<Outcome, BootstrapError> {
        let wanted = ctx.settings.collection_names();

        if ctx.settings.run.mode == Mode::Strict {
            for collection in wanted {
                self.create(ctx, collection).await?;
            }
            return Ok(Outcome::Created);
        }

        let existing = ctx.catalog.collection_names(ctx.database()).await?;
        let mut created = 0usize;
        for collection in wanted {
            if existing.iter().any(|name| name == collection) {
                tracing::debug!(
                    database = ctx.database(),
                    collection,
                    "collection already present"
                );
                continue;
            }
            self.create(ctx, collection).await?;
            created += 1;
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
    use bootstrap_db::{Catalog, CatalogError, MemoryCatalog};

    #[tokio::test]
    async fn creates_both_collections_empty() {
        let settings = Settings::default();
        let catalog = MemoryCatalog::new();
        let ctx = StepCtx::new(&settings, &catalog);

        assert_eq!(
            EnsureCollectionsStep.apply(&ctx).await.unwrap(),
            Outcome::Created
        );

        let names = catalog.collection_names("elevatus").await.unwrap();
        assert_eq!(names, vec!["candidates".to_string(), "users".to_string()]);
        for name in &names {
            assert_eq!(catalog.count_documents("elevatus", name).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn strict_mode_fails_on_existing_collection() {
        let mut settings = Settings::default();
        settings.run.mode = Mode::Strict;
        let catalog = MemoryCatalog::new();
        catalog.create_collection("elevatus", "candidates").await.unwrap();
        let ctx = StepCtx::new(&settings, &catalog);

        let err = EnsureCollectionsStep.apply(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::Catalog(CatalogError::DuplicateCollection { ref collection, .. })
                if collection == "candidates"
        ));
        // `users` comes first and was created before the failure.
        assert_eq!(ctx.changes_for(NAME).len(), 1);
    }

    #[tokio::test]
    async fn ensure_mode_creates_only_missing() {
        let settings = Settings::default();
        let catalog = MemoryCatalog::new();
        catalog.create_collection("elevatus", "users").await.unwrap();
        let ctx = StepCtx::new(&settings, &catalog);

        assert_eq!(
            EnsureCollectionsStep.apply(&ctx).await.unwrap(),
            Outcome::Created
        );
        assert_eq!(
            ctx.changes(),
            vec![Change::CollectionCreated {
                database: "elevatus".to_string(),
                collection: "candidates".to_string(),
            }]
        );

        let ctx = StepCtx::new(&settings, &catalog);
        assert_eq!(
            EnsureCollectionsStep.apply(&ctx).await.unwrap(),
            Outcome::AlreadyPresent
        );
    }

    #[tokio::test]
    async fn compensation_drops_only_created_collections() {
        let settings = Settings::default();
        let catalog = MemoryCatalog::new();
        catalog.create_collection("elevatus", "users").await.unwrap();
        let ctx = StepCtx::new(&settings, &catalog);

        EnsureCollectionsStep.apply(&ctx).await.unwrap();
        EnsureCollectionsStep.compensate(&ctx).await.unwrap();

        let names = catalog.collection_names("elevatus").await.unwrap();
        assert_eq!(names, vec!["users".to_string()]);
    }
}
