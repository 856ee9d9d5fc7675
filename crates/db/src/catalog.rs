use async_trait::async_trait;

use crate::error::CatalogError;
use crate::model::{IndexDefinition, RoleGrant, UserRecord};

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Administrative operations on the server catalog.
///
/// Every operation names its database explicitly; the catalog holds no
/// "current database" state. Implementations must report an existing user on
/// `create_user` as [`CatalogError::DuplicateUser`] and an existing collection
/// on `create_collection` as [`CatalogError::DuplicateCollection`].
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Round-trip to the server; fails with [`CatalogError::Connection`] when unreachable.
    async fn ping(&self) -> CatalogResult<()>;

    async fn database_exists(&self, database: &str) -> CatalogResult<bool>;

    async fn find_user(&self, database: &str, username: &str)
        -> CatalogResult<Option<UserRecord>>;

    async fn create_user(
        &self,
        database: &str,
        username: &str,
        password: &str,
        roles: &[RoleGrant],
    ) -> CatalogResult<()>;

    async fn grant_roles(
        &self,
        database: &str,
        username: &str,
        roles: &[RoleGrant],
    ) -> CatalogResult<()>;

    async fn revoke_roles(
        &self,
        database: &str,
        username: &str,
        roles: &[RoleGrant],
    ) -> CatalogResult<()>;

    async fn drop_user(&self, database: &str, username: &str) -> CatalogResult<()>;

    async fn collection_names(&self, database: &str) -> CatalogResult<Vec<String>>;

    async fn create_collection(&self, database: &str, collection: &str) -> CatalogResult<()>;

    async fn drop_collection(&self, database: &str, collection: &str) -> CatalogResult<()>;

    /// Index names on a collection; empty when the collection does not exist.
    async fn index_names(&self, database: &str, collection: &str) -> CatalogResult<Vec<String>>;

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        index: &IndexDefinition,
    ) -> CatalogResult<()>;

    async fn drop_index(&self, database: &str, collection: &str, name: &str)
        -> CatalogResult<()>;

    async fn count_documents(&self, database: &str, collection: &str) -> CatalogResult<u64>;
}
