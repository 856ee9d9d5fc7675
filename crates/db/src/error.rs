use thiserror::Error;

/// MongoDB server error code for `createUser` on an existing user.
pub const USER_ALREADY_EXISTS: i32 = 51003;
/// MongoDB server error code for `create` on an existing namespace.
pub const NAMESPACE_EXISTS: i32 = 48;
/// MongoDB server error code for operations on a missing namespace.
pub const NAMESPACE_NOT_FOUND: i32 = 26;

/// Errors raised by catalog operations against the database server.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database server unreachable: {0}")]
    Connection(String),

    #[error("user '{username}' already exists on database '{database}'")]
    DuplicateUser { database: String, username: String },

    #[error("collection '{collection}' already exists on database '{database}'")]
    DuplicateCollection {
        database: String,
        collection: String,
    },

    #[error("server rejected command (code {code}): {message}")]
    Command { code: i32, message: String },

    #[error("unexpected server reply: {0}")]
    Malformed(String),

    #[error("driver error: {0}")]
    Driver(String),
}

impl CatalogError {
    /// Server error code, when the server produced one.
    pub fn code(&self) -> Option<i32> {
        match self {
            CatalogError::Command { code, .. } => Some(*code),
            CatalogError::DuplicateUser { .. } => Some(USER_ALREADY_EXISTS),
            CatalogError::DuplicateCollection { .. } => Some(NAMESPACE_EXISTS),
            _ => None,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, CatalogError::Connection(_))
    }
}

impl From<mongodb::error::Error> for CatalogError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::DnsResolve { .. } => {
                CatalogError::Connection(err.to_string())
            }
            ErrorKind::Command(command) => CatalogError::Command {
                code: command.code,
                message: command.message.clone(),
            },
            _ => CatalogError::Driver(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_errors_carry_server_codes() {
        let user = CatalogError::DuplicateUser {
            database: "elevatus".to_string(),
            username: "elevatus".to_string(),
        };
        assert_eq!(user.code(), Some(USER_ALREADY_EXISTS));

        let collection = CatalogError::DuplicateCollection {
            database: "elevatus".to_string(),
            collection: "users".to_string(),
        };
        assert_eq!(collection.code(), Some(NAMESPACE_EXISTS));
        assert!(!collection.is_connection());
    }

    #[test]
    fn duplicate_user_message_names_scope() {
        let err = CatalogError::DuplicateUser {
            database: "elevatus".to_string(),
            username: "app".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "user 'app' already exists on database 'elevatus'"
        );
    }
}
