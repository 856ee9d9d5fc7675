//! End-to-end provisioning scenarios against the in-memory catalog.

use bootstrap_app::{provision, verify, VerifyOptions};
use bootstrap_db::{Catalog, CatalogError, MemoryCatalog, RoleGrant};
use bootstrap_kernel::settings::Mode;
use bootstrap_kernel::{BootstrapError, Outcome, Settings};

fn strict() -> Settings {
    let mut settings = Settings::default();
    settings.run.mode = Mode::Strict;
    settings
}

#[tokio::test]
async fn fresh_server_gets_owner_user() {
    let catalog = MemoryCatalog::new();
    provision(&strict(), &catalog).await.unwrap();

    let users = catalog.users("elevatus");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "elevatus");
    assert_eq!(users[0].roles, vec![RoleGrant::new("dbOwner", "elevatus")]);
}

#[tokio::test]
async fn fresh_server_gets_exactly_two_empty_collections() {
    let catalog = MemoryCatalog::new();
    let report = provision(&strict(), &catalog).await.unwrap();

    let mut names = catalog.collection_names("elevatus").await.unwrap();
    names.sort();
    assert_eq!(names, vec!["candidates", "users"]);
    for name in &names {
        assert_eq!(catalog.count_documents("elevatus", name).await.unwrap(), 0);
    }

    assert_eq!(report.outcome_of("select-database"), Some(Outcome::Selected));
    assert_eq!(report.outcome_of("ensure-user"), Some(Outcome::Created));
    assert_eq!(report.outcome_of("ensure-collections"), Some(Outcome::Created));
}

#[tokio::test]
async fn strict_rerun_fails_on_duplicate_user_before_collections() {
    let catalog = MemoryCatalog::new();
    catalog
        .create_user("elevatus", "elevatus", "elevatus", &[RoleGrant::new("dbOwner", "elevatus")])
        .await
        .unwrap();

    let err = provision(&strict(), &catalog).await.unwrap_err();

    assert_eq!(err.failed_step(), Some("ensure-user"));
    assert!(matches!(
        err.catalog_error(),
        Some(CatalogError::DuplicateUser { .. })
    ));
    assert!(catalog.collection_names("elevatus").await.unwrap().is_empty());
}

#[tokio::test]
async fn strict_second_run_is_not_idempotent() {
    let catalog = MemoryCatalog::new();
    provision(&strict(), &catalog).await.unwrap();

    let err = provision(&strict(), &catalog).await.unwrap_err();
    assert!(matches!(
        err.catalog_error(),
        Some(CatalogError::DuplicateUser { .. })
    ));
}

#[tokio::test]
async fn ensure_mode_converges_on_rerun() {
    let settings = Settings::default();
    let catalog = MemoryCatalog::new();

    let first = provision(&settings, &catalog).await.unwrap();
    assert!(!first.changes.is_empty());

    let second = provision(&settings, &catalog).await.unwrap();
    assert!(second.changes.is_empty());
    assert_eq!(second.outcome_of("ensure-user"), Some(Outcome::AlreadyPresent));
    assert_eq!(
        second.outcome_of("ensure-collections"),
        Some(Outcome::AlreadyPresent)
    );
    assert_eq!(second.outcome_of("ensure-indexes"), Some(Outcome::AlreadyPresent));
}

#[tokio::test]
async fn provisioned_state_passes_verification() {
    let settings = Settings::default();
    let catalog = MemoryCatalog::new();
    provision(&settings, &catalog).await.unwrap();

    let report = verify(&settings, &catalog, VerifyOptions { expect_empty: true })
        .await
        .unwrap();
    assert!(report.is_success(), "failures: {:?}", report.failures());
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn partial_failure_without_rollback_keeps_user() {
    let catalog = MemoryCatalog::new();
    catalog.create_collection("elevatus", "candidates").await.unwrap();

    let err = provision(&strict(), &catalog).await.unwrap_err();

    assert_eq!(err.failed_step(), Some("ensure-collections"));
    assert_eq!(catalog.users("elevatus").len(), 1);
}

#[tokio::test]
async fn partial_failure_with_rollback_restores_prior_state() {
    let mut settings = strict();
    settings.run.rollback_on_failure = true;
    let catalog = MemoryCatalog::new();
    catalog.create_collection("elevatus", "candidates").await.unwrap();

    let err = provision(&settings, &catalog).await.unwrap_err();

    assert!(matches!(
        err.catalog_error(),
        Some(CatalogError::DuplicateCollection { .. })
    ));
    assert!(catalog.users("elevatus").is_empty());
    assert_eq!(
        catalog.collection_names("elevatus").await.unwrap(),
        vec!["candidates"]
    );
}

#[tokio::test]
async fn unreachable_server_aborts_before_any_write() {
    let catalog = MemoryCatalog::new();
    catalog.set_unreachable(true);

    let err = provision(&Settings::default(), &catalog).await.unwrap_err();
    assert_eq!(err.failed_step(), Some("select-database"));
    assert!(err.catalog_error().is_some_and(CatalogError::is_connection));
}

#[tokio::test]
async fn invalid_settings_never_reach_the_server() {
    let mut settings = Settings::default();
    settings.database.name = "bad/name".to_string();
    let catalog = MemoryCatalog::new();

    let err = provision(&settings, &catalog).await.unwrap_err();
    assert!(matches!(err, BootstrapError::Config(_)));
    assert!(!catalog.database_exists("bad/name").await.unwrap());
}
