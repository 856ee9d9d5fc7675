use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use bootstrap_db::{ConnectOptions, IndexDefinition, IndexDirection, IndexKey, RoleGrant};
use serde::Deserialize;

use crate::error::BootstrapError;

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "BOOTSTRAP_ENV";
const CONFIG_DIR_ENV: &str = "BOOTSTRAP_CONFIG_DIR";
const ENV_PREFIX: &str = "BOOTSTRAP";
const URI_ENV: &str = "BOOTSTRAP_DATABASE__URI";
/// Connection variable used by the application that consumes this database.
/// When it stands in for `BOOTSTRAP_DATABASE__URI` it must carry administrative
/// credentials; the application's own user does not exist until this tool runs.
const LEGACY_URI_ENV: &str = "MONGO_URL";

/// Credentials the database was historically provisioned with.
pub const HISTORICAL_NAME: &str = "elevatus";

const MAX_DATABASE_NAME_BYTES: usize = 64;
const FORBIDDEN_DATABASE_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '\0'];

/// Deployment environment the bootstrapper is running in.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(anyhow!(
                "unsupported environment '{}'; expected local/staging/production",
                other
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Local => "local",
            Environment::Staging => "staging",
            Environment::Production => "production",
        };
        f.write_str(name)
    }
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub user: UserSettings,
    #[serde(default = "default_collections")]
    pub collections: Vec<CollectionSettings>,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            database: DatabaseSettings::default(),
            user: UserSettings::default(),
            collections: default_collections(),
            run: RunSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

impl Settings {
    /// Load configuration by layering `.env`, base file, environment overlay
    /// and `BOOTSTRAP_*` variables.
    ///
    /// `MONGO_URL` is used as the connection string only when
    /// `BOOTSTRAP_DATABASE__URI` is unset, and it must authenticate as an
    /// administrator able to run `createUser`.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment: Environment = std::env::var(ENV_VAR_NAME)
            .unwrap_or_else(|_| DEFAULT_ENV.to_string())
            .parse()?;
        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()
                .with_context(|| "unable to resolve current directory")?
                .join("config"),
        };

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment));

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        settings.environment = environment;

        if std::env::var_os(URI_ENV).is_none() {
            if let Ok(uri) = std::env::var(LEGACY_URI_ENV) {
                settings.database.uri = uri;
            }
        }

        Ok(settings)
    }

    /// Parse settings from a TOML document without consulting the environment.
    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .with_context(|| "failed to build configuration")?
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")
    }

    /// Role the provisioned user receives; always scoped to the target database.
    pub fn role_grant(&self) -> RoleGrant {
        RoleGrant::new(self.user.role.clone(), self.database.name.clone())
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.collections.iter().map(|c| c.name.as_str()).collect()
    }

    /// Check the settings before anything touches the server.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        let uri = &self.database.uri;
        if !(uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://")) {
            return Err(BootstrapError::config(
                "database.uri must start with mongodb:// or mongodb+srv://",
            ));
        }

        validate_database_name(&self.database.name)?;

        if self.user.username.trim().is_empty() {
            return Err(BootstrapError::config("user.username must not be empty"));
        }
        if self.user.password.is_empty() {
            return Err(BootstrapError::config("user.password must not be empty"));
        }
        if self.user.role.trim().is_empty() {
            return Err(BootstrapError::config("user.role must not be empty"));
        }

        if self.collections.is_empty() {
            return Err(BootstrapError::config(
                "at least one collection must be configured",
            ));
        }

        let mut seen = HashSet::new();
        for collection in &self.collections {
            validate_collection_name(&collection.name)?;
            if !seen.insert(collection.name.as_str()) {
                return Err(BootstrapError::config(format!(
                    "collection '{}' is configured more than once",
                    collection.name
                )));
            }
            validate_indexes(collection)?;
        }

        if self.environment == Environment::Production
            && self.user.password.expose() == HISTORICAL_NAME
        {
            return Err(BootstrapError::config(
                "refusing the built-in default password in production; set BOOTSTRAP_USER__PASSWORD",
            ));
        }

        Ok(())
    }
}

fn validate_database_name(name: &str) -> Result<(), BootstrapError> {
    if name.is_empty() {
        return Err(BootstrapError::config("database.name must not be empty"));
    }
    if name.len() >= MAX_DATABASE_NAME_BYTES {
        return Err(BootstrapError::config(format!(
            "database.name must be shorter than {} bytes",
            MAX_DATABASE_NAME_BYTES
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_DATABASE_CHARS.contains(c)) {
        return Err(BootstrapError::config(format!(
            "database.name '{}' contains forbidden character {:?}",
            name, c
        )));
    }
    Ok(())
}

fn validate_collection_name(name: &str) -> Result<(), BootstrapError> {
    if name.is_empty() {
        return Err(BootstrapError::config("collection name must not be empty"));
    }
    if name.contains('$') || name.contains('\0') {
        return Err(BootstrapError::config(format!(
            "collection name '{}' contains '$' or NUL",
            name
        )));
    }
    if name.starts_with("system.") {
        return Err(BootstrapError::config(format!(
            "collection name '{}' uses the reserved system. prefix",
            name
        )));
    }
    Ok(())
}

fn validate_indexes(collection: &CollectionSettings) -> Result<(), BootstrapError> {
    let mut names = HashSet::new();
    for index in &collection.indexes {
        let context = format!("index '{}' on '{}'", index.name, collection.name);
        if index.name.is_empty() {
            return Err(BootstrapError::config(format!(
                "an index on '{}' has an empty name",
                collection.name
            )));
        }
        if index.name == "_id_" {
            return Err(BootstrapError::config(format!(
                "{context}: _id_ is managed by the server"
            )));
        }
        if !names.insert(index.name.as_str()) {
            return Err(BootstrapError::config(format!(
                "{context} is configured more than once"
            )));
        }
        if index.keys.is_empty() {
            return Err(BootstrapError::config(format!("{context} has no keys")));
        }
        if index.keys.iter().any(|k| k.field.is_empty()) {
            return Err(BootstrapError::config(format!(
                "{context} has a key with an empty field"
            )));
        }
        if index.unique
            && index
                .keys
                .iter()
                .any(|k| k.direction == IndexDirection::Text)
        {
            return Err(BootstrapError::config(format!(
                "{context}: text indexes cannot be unique"
            )));
        }
    }
    Ok(())
}

/// Collections and indexes the application expects to find.
pub fn default_collections() -> Vec<CollectionSettings> {
    vec![
        CollectionSettings {
            name: "users".to_string(),
            indexes: vec![
                IndexDefinition::ascending("email_unique", "email").unique(),
                IndexDefinition::ascending("uuid_unique", "uuid").unique(),
            ],
        },
        CollectionSettings {
            name: "candidates".to_string(),
            indexes: vec![
                IndexDefinition::ascending("uuid_unique", "uuid").unique(),
                IndexDefinition::ascending("email_idx", "email"),
                IndexDefinition {
                    name: "candidate_text".to_string(),
                    keys: vec![IndexKey::new("$**", IndexDirection::Text)],
                    unique: false,
                },
            ],
        },
    ]
}

/// A string that never appears in `Debug` output or logs.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Mask the password portion of a connection string's userinfo.
pub fn redact_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);

    match authority.rsplit_once('@') {
        Some((userinfo, hosts)) => match userinfo.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:***@{hosts}{tail}"),
            None => uri.to_string(),
        },
        None => uri.to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "DatabaseSettings::default_uri")]
    pub uri: String,
    #[serde(default = "DatabaseSettings::default_name")]
    pub name: String,
    #[serde(default = "DatabaseSettings::default_app_name")]
    pub app_name: String,
    #[serde(default = "DatabaseSettings::default_server_selection_timeout_ms")]
    pub server_selection_timeout_ms: u64,
}

impl DatabaseSettings {
    fn default_uri() -> String {
        "mongodb://127.0.0.1:27017".to_string()
    }

    fn default_name() -> String {
        HISTORICAL_NAME.to_string()
    }

    fn default_app_name() -> String {
        "bootstrap".to_string()
    }

    fn default_server_selection_timeout_ms() -> u64 {
        5000
    }

    pub fn redacted_uri(&self) -> String {
        redact_uri(&self.uri)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            app_name: self.app_name.clone(),
            server_selection_timeout: Duration::from_millis(self.server_selection_timeout_ms),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            uri: Self::default_uri(),
            name: Self::default_name(),
            app_name: Self::default_app_name(),
            server_selection_timeout_ms: Self::default_server_selection_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSettings {
    #[serde(default = "UserSettings::default_username")]
    pub username: String,
    #[serde(default = "UserSettings::default_password")]
    pub password: Secret,
    #[serde(default = "UserSettings::default_role")]
    pub role: String,
}

impl UserSettings {
    fn default_username() -> String {
        HISTORICAL_NAME.to_string()
    }

    fn default_password() -> Secret {
        Secret::new(HISTORICAL_NAME)
    }

    fn default_role() -> String {
        "dbOwner".to_string()
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            username: Self::default_username(),
            password: Self::default_password(),
            role: Self::default_role(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CollectionSettings {
    pub name: String,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

/// How steps react to objects that already exist.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Converge on the desired state; existing objects are left in place.
    #[default]
    Ensure,
    /// Create every object and fail on the first one that already exists.
    Strict,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Ensure => f.write_str("ensure"),
            Mode::Strict => f.write_str("strict"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunSettings {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub rollback_on_failure: bool,
    #[serde(default = "RunSettings::default_create_indexes")]
    pub create_indexes: bool,
}

impl RunSettings {
    fn default_create_indexes() -> bool {
        true
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            rollback_on_failure: false,
            create_indexes: Self::default_create_indexes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "TelemetrySettings::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl TelemetrySettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
