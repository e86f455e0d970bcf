//! Connection to the Docket SurrealDB instance.
//!
//! The server opens one [`DbManager`] at startup and hands its client to
//! every repository. Tests skip this module and use the in-memory engine.

use std::env;

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

/// Where the Docket database lives and how to sign in to it.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Host and port of the WebSocket endpoint, without a scheme.
    pub url: String,
    /// Namespace holding the Docket database. Defaults to `docket`.
    pub namespace: String,
    pub database: String,
    /// Root credentials. Docket signs in as root because migrations
    /// define tables.
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "docket".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl DbConfig {
    /// Load configuration from environment variables, falling back to
    /// [`DbConfig::default`] for anything unset.
    ///
    /// Environment variables:
    /// - DOCKET_DB_URL
    /// - DOCKET_DB_NAMESPACE
    /// - DOCKET_DB_DATABASE
    /// - DOCKET_DB_USERNAME
    /// - DOCKET_DB_PASSWORD
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env::var("DOCKET_DB_URL").unwrap_or(defaults.url),
            namespace: env::var("DOCKET_DB_NAMESPACE").unwrap_or(defaults.namespace),
            database: env::var("DOCKET_DB_DATABASE").unwrap_or(defaults.database),
            username: env::var("DOCKET_DB_USERNAME").unwrap_or(defaults.username),
            password: env::var("DOCKET_DB_PASSWORD").unwrap_or(defaults.password),
        }
    }
}

/// An authenticated client bound to the Docket namespace and database.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Open the WebSocket, sign in, and select the namespace and database.
    /// Any failure along the way is returned as-is so the server can report
    /// which step broke.
    pub async fn connect(config: &DbConfig) -> Result<Self, surrealdb::Error> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to Docket database"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;

        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        info!(namespace = %config.namespace, "Docket database ready");

        Ok(Self { db })
    }

    /// The shared client the repositories are built on.
    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }
}
