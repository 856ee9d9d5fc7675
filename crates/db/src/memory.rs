use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::catalog::{Catalog, CatalogResult};
use crate::error::{CatalogError, NAMESPACE_NOT_FOUND};
use crate::model::{IndexDefinition, RoleGrant, UserRecord};

/// Name of the index every collection carries.
pub const ID_INDEX: &str = "_id_";

/// Error code the server uses for `dropUser`/role updates on a missing user.
const USER_NOT_FOUND: i32 = 11;
/// Error code for an index that does not exist.
const INDEX_NOT_FOUND: i32 = 27;
/// Error code for an operation the server refuses outright, such as dropping `_id_`.
const INVALID_OPTIONS: i32 = 72;
/// Error code for an index name reused with a different key pattern.
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

#[derive(Debug, Default, Clone)]
struct MemoryCollection {
    indexes: Vec<IndexDefinition>,
    documents: u64,
}

#[derive(Debug, Default, Clone)]
struct MemoryDatabase {
    users: BTreeMap<String, Vec<RoleGrant>>,
    collections: BTreeMap<String, MemoryCollection>,
}

impl MemoryDatabase {
    /// A database exists once it holds a collection. Users are stored in
    /// `admin.system.users` on the server and never materialize it.
    fn is_materialized(&self) -> bool {
        !self.collections.is_empty()
    }
}

/// In-process [`Catalog`] with the same duplicate semantics as the server.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    databases: Mutex<BTreeMap<String, MemoryDatabase>>,
    unreachable: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with [`CatalogError::Connection`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Insert placeholder documents into a collection, creating it if needed.
    pub fn seed_documents(&self, database: &str, collection: &str, count: u64) {
        let mut databases = self.lock();
        let entry = databases
            .entry(database.to_string())
            .or_default()
            .collections
            .entry(collection.to_string())
            .or_insert_with(Self::new_collection);
        entry.documents += count;
    }

    /// Every user on a database, sorted by name.
    pub fn users(&self, database: &str) -> Vec<UserRecord> {
        self.lock()
            .get(database)
            .map(|db| {
                db.users
                    .iter()
                    .map(|(username, roles)| UserRecord {
                        username: username.clone(),
                        db: database.to_string(),
                        roles: roles.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn new_collection() -> MemoryCollection {
        MemoryCollection {
            indexes: vec![IndexDefinition::ascending(ID_INDEX, "_id").unique()],
            documents: 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, MemoryDatabase>> {
        // A poisoned lock only means a test panicked mid-operation.
        self.databases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_reachable(&self) -> CatalogResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CatalogError::Connection(
                "server selection timed out".to_string(),
            ));
        }
        Ok(())
    }

    fn user_not_found(database: &str, username: &str) -> CatalogError {
        CatalogError::Command {
            code: USER_NOT_FOUND,
            message: format!("User '{username}@{database}' not found"),
        }
    }

    fn namespace_not_found(database: &str, collection: &str) -> CatalogError {
        CatalogError::Command {
            code: NAMESPACE_NOT_FOUND,
            message: format!("ns not found: {database}.{collection}"),
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn ping(&self) -> CatalogResult<()> {
        self.check_reachable()
    }

    async fn database_exists(&self, database: &str) -> CatalogResult<bool> {
        self.check_reachable()?;
        Ok(self
            .lock()
            .get(database)
            .is_some_and(MemoryDatabase::is_materialized))
    }

    async fn find_user(
        &self,
        database: &str,
        username: &str,
    ) -> CatalogResult<Option<UserRecord>> {
        self.check_reachable()?;
        Ok(self.lock().get(database).and_then(|db| {
            db.users.get(username).map(|roles| UserRecord {
                username: username.to_string(),
                db: database.to_string(),
                roles: roles.clone(),
            })
        }))
    }

    async fn create_user(
        &self,
        database: &str,
        username: &str,
        _password: &str,
        roles: &[RoleGrant],
    ) -> CatalogResult<()> {
        self.check_reachable()?;
        let mut databases = self.lock();
        let db = databases.entry(database.to_string()).or_default();
        if db.users.contains_key(username) {
            return Err(CatalogError::DuplicateUser {
                database: database.to_string(),
                username: username.to_string(),
            });
        }
        db.users.insert(username.to_string(), roles.to_vec());
        Ok(())
    }

    async fn grant_roles(
        &self,
        database: &str,
        username: &str,
        roles: &[RoleGrant],
    ) -> CatalogResult<()> {
        self.check_reachable()?;
        let mut databases = self.lock();
        let granted = databases
            .get_mut(database)
            .and_then(|db| db.users.get_mut(username))
            .ok_or_else(|| Self::user_not_found(database, username))?;
        for role in roles {
            if !granted.contains(role) {
                granted.push(role.clone());
            }
        }
        Ok(())
    }

    async fn revoke_roles(
        &self,
        database: &str,
        username: &str,
        roles: &[RoleGrant],
    ) -> CatalogResult<()> {
        self.check_reachable()?;
        let mut databases = self.lock();
        let granted = databases
            .get_mut(database)
            .and_then(|db| db.users.get_mut(username))
            .ok_or_else(|| Self::user_not_found(database, username))?;
        granted.retain(|role| !roles.contains(role));
        Ok(())
    }

    async fn drop_user(&self, database: &str, username: &str) -> CatalogResult<()> {
        self.check_reachable()?;
        self.lock()
            .get_mut(database)
            .and_then(|db| db.users.remove(username))
            .map(|_| ())
            .ok_or_else(|| Self::user_not_found(database, username))
    }

    async fn collection_names(&self, database: &str) -> CatalogResult<Vec<String>> {
        self.check_reachable()?;
        Ok(self
            .lock()
            .get(database)
            .map(|db| db.collections.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_collection(&self, database: &str, collection: &str) -> CatalogResult<()> {
        self.check_reachable()?;
        let mut databases = self.lock();
        let db = databases.entry(database.to_string()).or_default();
        if db.collections.contains_key(collection) {
            return Err(CatalogError::DuplicateCollection {
                database: database.to_string(),
                collection: collection.to_string(),
            });
        }
        db.collections
            .insert(collection.to_string(), Self::new_collection());
        Ok(())
    }

    async fn drop_collection(&self, database: &str, collection: &str) -> CatalogResult<()> {
        self.check_reachable()?;
        // Dropping a missing collection is a no-op on the server as well.
        if let Some(db) = self.lock().get_mut(database) {
            db.collections.remove(collection);
        }
        Ok(())
    }

    async fn index_names(&self, database: &str, collection: &str) -> CatalogResult<Vec<String>> {
        self.check_reachable()?;
        Ok(self
            .lock()
            .get(database)
            .and_then(|db| db.collections.get(collection))
            .map(|c| c.indexes.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default())
    }

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        index: &IndexDefinition,
    ) -> CatalogResult<()> {
        self.check_reachable()?;
        let mut databases = self.lock();
        // Like the server, indexing a missing collection creates it.
        let entry = databases
            .entry(database.to_string())
            .or_default()
            .collections
            .entry(collection.to_string())
            .or_insert_with(Self::new_collection);

        match entry.indexes.iter().find(|i| i.name == index.name) {
            Some(existing) if existing == index => Ok(()),
            Some(_) => Err(CatalogError::Command {
                code: INDEX_KEY_SPECS_CONFLICT,
                message: format!(
                    "index '{}' already exists with different options",
                    index.name
                ),
            }),
            None => {
                entry.indexes.push(index.clone());
                Ok(())
            }
        }
    }

    async fn drop_index(
        &self,
        database: &str,
        collection: &str,
        name: &str,
    ) -> CatalogResult<()> {
        self.check_reachable()?;
        let mut databases = self.lock();
        let entry = databases
            .get_mut(database)
            .and_then(|db| db.collections.get_mut(collection))
            .ok_or_else(|| Self::namespace_not_found(database, collection))?;

        if name == ID_INDEX {
            return Err(CatalogError::Command {
                code: INVALID_OPTIONS,
                message: "cannot drop _id index".to_string(),
            });
        }

        let before = entry.indexes.len();
        entry.indexes.retain(|i| i.name != name);
        if entry.indexes.len() == before {
            return Err(CatalogError::Command {
                code: INDEX_NOT_FOUND,
                message: format!("index not found with name [{name}]"),
            });
        }
        Ok(())
    }

    async fn count_documents(&self, database: &str, collection: &str) -> CatalogResult<u64> {
        self.check_reachable()?;
        Ok(self
            .lock()
            .get(database)
            .and_then(|db| db.collections.get(collection))
            .map(|c| c.documents)
            .unwrap_or(0))
    }
}
