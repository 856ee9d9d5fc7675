use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};

use crate::catalog::{Catalog, CatalogResult};
use crate::error::{CatalogError, NAMESPACE_EXISTS, NAMESPACE_NOT_FOUND, USER_ALREADY_EXISTS};
use crate::model::{IndexDefinition, IndexDirection, RoleGrant, UserRecord};

/// Client-side options applied on top of the connection string.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub app_name: String,
    pub server_selection_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            app_name: "bootstrap".to_string(),
            server_selection_timeout: Duration::from_millis(5000),
        }
    }
}

/// [`Catalog`] backed by a live MongoDB deployment.
pub struct MongoCatalog {
    client: Client,
}

impl MongoCatalog {
    /// Build a client from an administrative connection string.
    ///
    /// The driver connects lazily; call [`Catalog::ping`] to surface an
    /// unreachable server.
    pub async fn connect(uri: &str, options: ConnectOptions) -> CatalogResult<Self> {
        let mut client_options = ClientOptions::parse(uri).await?;
        client_options.app_name = Some(options.app_name);
        client_options.server_selection_timeout = Some(options.server_selection_timeout);

        let client = Client::with_options(client_options)?;
        tracing::debug!(target: "bootstrap-db", "mongodb client constructed");
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn db(&self, database: &str) -> Database {
        self.client.database(database)
    }

    fn collection(&self, database: &str, collection: &str) -> Collection<Document> {
        self.db(database).collection::<Document>(collection)
    }
}

fn malformed(err: impl std::fmt::Display) -> CatalogError {
    CatalogError::Malformed(err.to_string())
}

fn roles_document(roles: &[RoleGrant]) -> Vec<Document> {
    roles
        .iter()
        .map(|grant| doc! { "role": grant.role.as_str(), "db": grant.db.as_str() })
        .collect()
}

fn parse_user(user: &Document) -> CatalogResult<UserRecord> {
    let roles = user
        .get_array("roles")
        .map_err(malformed)?
        .iter()
        .filter_map(Bson::as_document)
        .map(|role| {
            Ok(RoleGrant::new(
                role.get_str("role").map_err(malformed)?,
                role.get_str("db").map_err(malformed)?,
            ))
        })
        .collect::<CatalogResult<Vec<_>>>()?;

    Ok(UserRecord {
        username: user.get_str("user").map_err(malformed)?.to_string(),
        db: user.get_str("db").map_err(malformed)?.to_string(),
        roles,
    })
}

fn index_keys(index: &IndexDefinition) -> Document {
    let mut keys = Document::new();
    for key in &index.keys {
        let value = match key.direction {
            IndexDirection::Asc => Bson::Int32(1),
            IndexDirection::Desc => Bson::Int32(-1),
            IndexDirection::Text => Bson::String("text".to_string()),
        };
        keys.insert(key.field.clone(), value);
    }
    keys
}

#[async_trait]
impl Catalog for MongoCatalog {
    async fn ping(&self) -> CatalogResult<()> {
        self.db("admin").run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn database_exists(&self, database: &str) -> CatalogResult<bool> {
        let names = self.client.list_database_names().await?;
        Ok(names.iter().any(|name| name == database))
    }

    async fn find_user(
        &self,
        database: &str,
        username: &str,
    ) -> CatalogResult<Option<UserRecord>> {
        let reply = self
            .db(database)
            .run_command(doc! { "usersInfo": { "user": username, "db": database } })
            .await?;

        match reply.get_array("users").map_err(malformed)?.first() {
            Some(Bson::Document(user)) => parse_user(user).map(Some),
            Some(other) => Err(malformed(format!("user entry is not a document: {other}"))),
            None => Ok(None),
        }
    }

    async fn create_user(
        &self,
        database: &str,
        username: &str,
        password: &str,
        roles: &[RoleGrant],
    ) -> CatalogResult<()> {
        let command = doc! {
            "createUser": username,
            "pwd": password,
            "roles": roles_document(roles),
        };

        match self.db(database).run_command(command).await {
            Ok(_) => Ok(()),
            Err(err) => match CatalogError::from(err) {
                CatalogError::Command {
                    code: USER_ALREADY_EXISTS,
                    ..
                } => Err(CatalogError::DuplicateUser {
                    database: database.to_string(),
                    username: username.to_string(),
                }),
                other => Err(other),
            },
        }
    }

    async fn grant_roles(
        &self,
        database: &str,
        username: &str,
        roles: &[RoleGrant],
    ) -> CatalogResult<()> {
        self.db(database)
            .run_command(doc! { "grantRolesToUser": username, "roles": roles_document(roles) })
            .await?;
        Ok(())
    }

    async fn revoke_roles(
        &self,
        database: &str,
        username: &str,
        roles: &[RoleGrant],
    ) -> CatalogResult<()> {
        self.db(database)
            .run_command(doc! { "revokeRolesFromUser": username, "roles": roles_document(roles) })
            .await?;
        Ok(())
    }

    async fn drop_user(&self, database: &str, username: &str) -> CatalogResult<()> {
        self.db(database)
            .run_command(doc! { "dropUser": username })
            .await?;
        Ok(())
    }

    async fn collection_names(&self, database: &str) -> CatalogResult<Vec<String>> {
        Ok(self.db(database).list_collection_names().await?)
    }

    async fn create_collection(&self, database: &str, collection: &str) -> CatalogResult<()> {
        let duplicate = || CatalogError::DuplicateCollection {
            database: database.to_string(),
            collection: collection.to_string(),
        };

        // Recent servers accept `create` on an existing collection with
        // identical options, so existence is checked up front.
        let existing = self
            .db(database)
            .list_collection_names()
            .filter(doc! { "name": collection })
            .await?;
        if !existing.is_empty() {
            return Err(duplicate());
        }

        match self.db(database).create_collection(collection).await {
            Ok(()) => Ok(()),
            Err(err) => match CatalogError::from(err) {
                CatalogError::Command {
                    code: NAMESPACE_EXISTS,
                    ..
                } => Err(duplicate()),
                other => Err(other),
            },
        }
    }

    async fn drop_collection(&self, database: &str, collection: &str) -> CatalogResult<()> {
        self.collection(database, collection).drop().await?;
        Ok(())
    }

    async fn index_names(&self, database: &str, collection: &str) -> CatalogResult<Vec<String>> {
        match self.collection(database, collection).list_index_names().await {
            Ok(names) => Ok(names),
            Err(err) => match CatalogError::from(err) {
                CatalogError::Command {
                    code: NAMESPACE_NOT_FOUND,
                    ..
                } => Ok(Vec::new()),
                other => Err(other),
            },
        }
    }

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        index: &IndexDefinition,
    ) -> CatalogResult<()> {
        let options = IndexOptions::builder()
            .name(index.name.clone())
            .unique(index.unique)
            .build();
        let model = IndexModel::builder()
            .keys(index_keys(index))
            .options(options)
            .build();

        self.collection(database, collection)
            .create_index(model)
            .await?;
        Ok(())
    }

    async fn drop_index(
        &self,
        database: &str,
        collection: &str,
        name: &str,
    ) -> CatalogResult<()> {
        self.collection(database, collection).drop_index(name).await?;
        Ok(())
    }

    async fn count_documents(&self, database: &str, collection: &str) -> CatalogResult<u64> {
        Ok(self
            .collection(database, collection)
            .count_documents(doc! {})
            .await?)
    }
}
