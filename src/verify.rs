use bootstrap_db::Catalog;
use bootstrap_kernel::{BootstrapError, Settings};
use serde::Serialize;

/// One expectation about the provisioned state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub subject: String,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn pass(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions {
    /// Also require every configured collection to hold zero documents.
    pub expect_empty: bool,
}

/// Every check that ran, plus non-fatal observations.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub database: String,
    pub checks: Vec<Check>,
    pub warnings: Vec<String>,
}

impl VerificationReport {
    pub fn is_success(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.detail.clone())
            .collect()
    }

    /// Turn a report with failed checks into [`BootstrapError::Verification`].
    pub fn into_result(self) -> Result<Self, BootstrapError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BootstrapError::Verification(self.failures()))
        }
    }
}

/// Compare the server's catalog with the settings, collecting every mismatch.
///
/// Only an unreachable server or a failed catalog call is an `Err`; missing
/// objects are reported as failed checks.
pub async fn verify(
    settings: &Settings,
    catalog: &dyn Catalog,
    options: VerifyOptions,
) -> Result<VerificationReport, BootstrapError> {
    let database = settings.database.name.as_str();
    let mut checks = Vec::new();
    let mut warnings = Vec::new();

    catalog.ping().await?;

    let username = &settings.user.username;
    let grant = settings.role_grant();
    let subject = format!("user {username}");
    match catalog.find_user(database, username).await? {
        None => checks.push(Check::fail(
            subject,
            format!("user '{username}' is missing on database '{database}'"),
        )),
        Some(user) if !user.has_role(&grant) => checks.push(Check::fail(
            subject,
            format!(
                "user '{username}' lacks role '{}' on database '{}'",
                grant.role, grant.db
            ),
        )),
        Some(_) => checks.push(Check::pass(
            subject,
            format!("user '{username}' has role '{}@{}'", grant.role, grant.db),
        )),
    }

    let existing = catalog.collection_names(database).await?;
    for collection in &settings.collections {
        let name = collection.name.as_str();
        let subject = format!("collection {name}");

        if !existing.iter().any(|e| e == name) {
            checks.push(Check::fail(
                subject,
                format!("collection '{name}' is missing"),
            ));
            continue;
        }
        checks.push(Check::pass(subject, format!("collection '{name}' exists")));

        if settings.run.create_indexes && !collection.indexes.is_empty() {
            let indexes = catalog.index_names(database, name).await?;
            for index in &collection.indexes {
                let subject = format!("index {name}.{}", index.name);
                if indexes.contains(&index.name) {
                    checks.push(Check::pass(subject, format!("index '{}' exists", index.name)));
                } else {
                    checks.push(Check::fail(
                        subject,
                        format!("index '{}' is missing on '{name}'", index.name),
                    ));
                }
            }
        }

        if options.expect_empty {
            let count = catalog.count_documents(database, name).await?;
            let subject = format!("documents {name}");
            if count == 0 {
                checks.push(Check::pass(subject, format!("collection '{name}' is empty")));
            } else {
                checks.push(Check::fail(
                    subject,
                    format!("collection '{name}' holds {count} documents"),
                ));
            }
        }
    }

    let configured = settings.collection_names();
    for extra in existing
        .iter()
        .filter(|e| !e.starts_with("system.") && !configured.contains(&e.as_str()))
    {
        warnings.push(format!("unconfigured collection '{extra}' present"));
    }

    for warning in &warnings {
        tracing::warn!(database, "{}", warning);
    }

    Ok(VerificationReport {
        database: database.to_string(),
        checks,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootstrap_db::{MemoryCatalog, RoleGrant};

    #[tokio::test]
    async fn empty_server_fails_every_expectation() {
        let settings = Settings::default();
        let catalog = MemoryCatalog::new();

        let report = verify(&settings, &catalog, VerifyOptions::default())
            .await
            .unwrap();

        assert!(!report.is_success());
        let failures = report.failures();
        assert_eq!(failures.len(), 3);
        assert!(failures[0].contains("user 'elevatus' is missing"));
    }

    #[tokio::test]
    async fn wrong_role_scope_is_reported() {
        let settings = Settings::default();
        let catalog = MemoryCatalog::new();
        catalog
            .create_user("elevatus", "elevatus", "pw", &[RoleGrant::new("dbOwner", "admin")])
            .await
            .unwrap();

        let report = verify(&settings, &catalog, VerifyOptions::default())
            .await
            .unwrap();
        assert!(report.failures()[0].contains("lacks role 'dbOwner' on database 'elevatus'"));
    }

    #[tokio::test]
    async fn non_empty_collection_fails_when_emptiness_expected() {
        let mut settings = Settings::default();
        settings.run.create_indexes = false;
        let catalog = MemoryCatalog::new();
        catalog
            .create_user("elevatus", "elevatus", "pw", &[settings.role_grant()])
            .await
            .unwrap();
        catalog.create_collection("elevatus", "users").await.unwrap();
        catalog.seed_documents("elevatus", "candidates", 2);

        let lenient = verify(&settings, &catalog, VerifyOptions::default())
            .await
            .unwrap();
        assert!(lenient.is_success());

        let strict = verify(&settings, &catalog, VerifyOptions { expect_empty: true })
            .await
            .unwrap();
        let err = strict.into_result().unwrap_err();
        assert!(err.to_string().contains("'candidates' holds 2 documents"));
    }

    #[tokio::test]
    async fn extra_collections_are_warnings() {
        let mut settings = Settings::default();
        settings.run.create_indexes = false;
        let catalog = MemoryCatalog::new();
        catalog
            .create_user("elevatus", "elevatus", "pw", &[settings.role_grant()])
            .await
            .unwrap();
        for name in ["users", "candidates", "audit"] {
            catalog.create_collection("elevatus", name).await.unwrap();
        }

        let report = verify(&settings, &catalog, VerifyOptions::default())
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.warnings, vec!["unconfigured collection 'audit' present"]);
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let catalog = MemoryCatalog::new();
        catalog.set_unreachable(true);

        let err = verify(&Settings::default(), &catalog, VerifyOptions::default())
            .await
            .unwrap_err();
        assert!(err.catalog_error().is_some_and(|e| e.is_connection()));
    }
}
