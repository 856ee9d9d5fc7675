use bootstrap_db::CatalogError;
use thiserror::Error;

use crate::step::Change;

/// Errors surfaced by a bootstrap run.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("step '{step}' failed{}", rollback_summary(.left_in_place, .rollback))]
    Step {
        step: &'static str,
        #[source]
        source: Box<BootstrapError>,
        /// Changes still in effect on the server once the run stopped.
        left_in_place: Vec<Change>,
        /// `Some` when a rollback ran; holds the compensations that failed.
        rollback: Option<Vec<BootstrapError>>,
    },

    #[error("verification failed: {}", .0.join("; "))]
    Verification(Vec<String>),

    #[error("rollback of step '{step}' failed")]
    Rollback {
        step: &'static str,
        #[source]
        source: Box<BootstrapError>,
    },
}

impl BootstrapError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The catalog error at the root of this error, looking through step wrappers.
    pub fn catalog_error(&self) -> Option<&CatalogError> {
        match self {
            BootstrapError::Catalog(err) => Some(err),
            BootstrapError::Step { source, .. } | BootstrapError::Rollback { source, .. } => {
                source.catalog_error()
            }
            _ => None,
        }
    }

    /// Changes the failed run left on the server.
    pub fn left_in_place(&self) -> &[Change] {
        match self {
            BootstrapError::Step { left_in_place, .. } => left_in_place,
            _ => &[],
        }
    }

    /// Compensations that failed, if a rollback was attempted.
    pub fn rollback_failures(&self) -> Option<&[BootstrapError]> {
        match self {
            BootstrapError::Step {
                rollback: Some(failures),
                ..
            } => Some(failures),
            _ => None,
        }
    }

    /// Name of the step that failed, if the error came out of a step.
    pub fn failed_step(&self) -> Option<&'static str> {
        match self {
            BootstrapError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

fn rollback_summary(left_in_place: &[Change], rollback: &Option<Vec<BootstrapError>>) -> String {
    match (rollback, left_in_place.len()) {
        (None, 0) => String::new(),
        (None, left) => format!("; rollback disabled, {left} change(s) left in place"),
        (Some(_), 0) => "; changes rolled back".to_string(),
        (Some(failures), left) => format!(
            "; rollback incomplete ({} compensation(s) failed), {left} change(s) left in place",
            failures.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_error_is_found_through_step_wrapper() {
        let err = BootstrapError::Step {
            step: "ensure-user",
            source: Box::new(BootstrapError::Catalog(CatalogError::DuplicateUser {
                database: "elevatus".to_string(),
                username: "elevatus".to_string(),
            })),
            left_in_place: Vec::new(),
            rollback: None,
        };

        assert_eq!(err.to_string(), "step 'ensure-user' failed");
        assert_eq!(err.failed_step(), Some("ensure-user"));
        assert!(matches!(
            err.catalog_error(),
            Some(CatalogError::DuplicateUser { .. })
        ));
    }

    #[test]
    fn step_error_summarizes_rollback() {
        let left = vec![Change::CollectionCreated {
            database: "elevatus".to_string(),
            collection: "users".to_string(),
        }];
        let failed = |rollback| BootstrapError::Step {
            step: "ensure-indexes",
            source: Box::new(BootstrapError::config("boom")),
            left_in_place: left.clone(),
            rollback,
        };

        assert_eq!(
            failed(None).to_string(),
            "step 'ensure-indexes' failed; rollback disabled, 1 change(s) left in place"
        );
        let incomplete = failed(Some(vec![BootstrapError::config("unreachable")]));
        assert_eq!(
            incomplete.to_string(),
            "step 'ensure-indexes' failed; rollback incomplete (1 compensation(s) failed), \
             1 change(s) left in place"
        );
        assert_eq!(incomplete.rollback_failures().map(<[_]>::len), Some(1));
        assert_eq!(incomplete.left_in_place(), left.as_slice());

        let clean = BootstrapError::Step {
            step: "ensure-indexes",
            source: Box::new(BootstrapError::config("boom")),
            left_in_place: Vec::new(),
            rollback: Some(Vec::new()),
        };
        assert_eq!(clean.to_string(), "step 'ensure-indexes' failed; changes rolled back");
    }

    #[test]
    fn verification_lists_every_failure() {
        let err = BootstrapError::Verification(vec![
            "collection 'users' is missing".to_string(),
            "user 'elevatus' is missing".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "verification failed: collection 'users' is missing; user 'elevatus' is missing"
        );
    }
}
