use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use bootstrap_db::{Catalog, RoleGrant};
use serde::Serialize;

use crate::error::BootstrapError;
use crate::settings::Settings;

/// Context handed to every step of a run.
pub struct StepCtx<'a> {
    pub settings: &'a Settings,
    pub catalog: &'a dyn Catalog,
    journal: Mutex<Vec<(&'static str, Change)>>,
}

impl<'a> StepCtx<'a> {
    pub fn new(settings: &'a Settings, catalog: &'a dyn Catalog) -> Self {
        Self {
            settings,
            catalog,
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Target database every step operates on.
    pub fn database(&self) -> &str {
        &self.settings.database.name
    }

    /// Record a change made by `step` so it can be reverted on rollback.
    pub fn record(&self, step: &'static str, change: Change) {
        tracing::debug!(step, change = %change, "recorded change");
        self.lock().push((step, change));
    }

    /// Changes recorded by `step`, oldest first.
    pub fn changes_for(&self, step: &str) -> Vec<Change> {
        self.lock()
            .iter()
            .filter(|(name, _)| *name == step)
            .map(|(_, change)| change.clone())
            .collect()
    }

    /// Drop a change from the journal once it has been reverted.
    pub fn forget(&self, step: &str, change: &Change) {
        let mut journal = self.lock();
        if let Some(position) = journal
            .iter()
            .rposition(|(name, recorded)| *name == step && recorded == change)
        {
            journal.remove(position);
        }
    }

    /// Every change still in effect, oldest first.
    pub fn changes(&self) -> Vec<Change> {
        self.lock().iter().map(|(_, change)| change.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(&'static str, Change)>> {
        self.journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What a step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The target database handle was selected; nothing was written.
    Selected,
    /// At least one object was created.
    Created,
    /// An existing object was changed to match the settings.
    Updated,
    /// Everything the step manages was already in place.
    AlreadyPresent,
    /// The step is disabled by the settings.
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::Selected => "selected",
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::AlreadyPresent => "already present",
            Outcome::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// A catalog mutation made during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    UserCreated {
        database: String,
        username: String,
    },
    RolesGranted {
        database: String,
        username: String,
        roles: Vec<RoleGrant>,
    },
    CollectionCreated {
        database: String,
        collection: String,
    },
    IndexCreated {
        database: String,
        collection: String,
        name: String,
    },
}

impl Change {
    /// Undo this change against the catalog.
    pub async fn revert(&self, catalog: &dyn Catalog) -> Result<(), BootstrapError> {
        match self {
            Change::UserCreated { database, username } => {
                catalog.drop_user(database, username).await?
            }
            Change::RolesGranted {
                database,
                username,
                roles,
            } => catalog.revoke_roles(database, username, roles).await?,
            Change::CollectionCreated {
                database,
                collection,
            } => catalog.drop_collection(database, collection).await?,
            Change::IndexCreated {
                database,
                collection,
                name,
            } => catalog.drop_index(database, collection, name).await?,
        }
        Ok(())
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::UserCreated { database, username } => {
                write!(f, "created user {username}@{database}")
            }
            Change::RolesGranted {
                database,
                username,
                roles,
            } => {
                let roles: Vec<String> = roles
                    .iter()
                    .map(|r| format!("{}@{}", r.role, r.db))
                    .collect();
                write!(
                    f,
                    "granted [{}] to {username}@{database}",
                    roles.join(", ")
                )
            }
            Change::CollectionCreated {
                database,
                collection,
            } => write!(f, "created collection {database}.{collection}"),
            Change::IndexCreated {
                database,
                collection,
                name,
            } => write!(f, "created index {name} on {database}.{collection}"),
        }
    }
}

/// One provisioning step. Steps run strictly in registration order.
#[async_trait]
pub trait Step: Sync + Send {
    /// Unique name for this step
    fn name(&self) -> &'static str;

    /// Human-readable summary of what the step will do with these settings.
    fn describe(&self, settings: &Settings) -> String;

    /// Bring the catalog to the state this step is responsible for.
    ///
    /// Every mutation must be recorded with [`StepCtx::record`] so that
    /// [`Step::compensate`] can revert it.
    async fn apply(&self, ctx: &StepCtx<'_>) -> Result<Outcome, BootstrapError>;

    /// Revert the changes this step recorded during the run, newest first.
    async fn compensate(&self, ctx: &StepCtx<'_>) -> Result<(), BootstrapError> {
        for change in ctx.changes_for(self.name()).iter().rev() {
            tracing::info!(step = self.name(), change = %change, "reverting change");
            change.revert(ctx.catalog).await?;
            ctx.forget(self.name(), change);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootstrap_db::MemoryCatalog;

    #[test]
    fn journal_filters_by_step() {
        let settings = Settings::default();
        let catalog = MemoryCatalog::new();
        let ctx = StepCtx::new(&settings, &catalog);

        ctx.record(
            "ensure-user",
            Change::UserCreated {
                database: "elevatus".to_string(),
                username: "elevatus".to_string(),
            },
        );
        ctx.record(
            "ensure-collections",
            Change::CollectionCreated {
                database: "elevatus".to_string(),
                collection: "users".to_string(),
            },
        );

        assert_eq!(ctx.changes().len(), 2);
        assert_eq!(ctx.changes_for("ensure-collections").len(), 1);
        assert!(ctx.changes_for("select-database").is_empty());
    }

    #[test]
    fn forgotten_changes_leave_the_journal() {
        let settings = Settings::default();
        let catalog = MemoryCatalog::new();
        let ctx = StepCtx::new(&settings, &catalog);
        let users = Change::CollectionCreated {
            database: "elevatus".to_string(),
            collection: "users".to_string(),
        };
        let candidates = Change::CollectionCreated {
            database: "elevatus".to_string(),
            collection: "candidates".to_string(),
        };
        ctx.record("ensure-collections", users.clone());
        ctx.record("ensure-collections", candidates.clone());

        ctx.forget("ensure-collections", &candidates);
        ctx.forget("ensure-user", &users);

        assert_eq!(ctx.changes(), vec![users]);
    }

    #[tokio::test]
    async fn revert_drops_created_collection() {
        let catalog = MemoryCatalog::new();
        catalog.create_collection("elevatus", "users").await.unwrap();

        Change::CollectionCreated {
            database: "elevatus".to_string(),
            collection: "users".to_string(),
        }
        .revert(&catalog)
        .await
        .unwrap();

        assert!(catalog.collection_names("elevatus").await.unwrap().is_empty());
    }

    #[test]
    fn change_display_is_readable() {
        let change = Change::RolesGranted {
            database: "elevatus".to_string(),
            username: "svc".to_string(),
            roles: vec![RoleGrant::new("dbOwner", "elevatus")],
        };
        assert_eq!(change.to_string(), "granted [dbOwner@elevatus] to svc@elevatus");
    }
}
