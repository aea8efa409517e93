use std::env::{self, VarError};

use rearch::{CData, CapsuleHandle, Container};
use sea_orm::{ConnectOptions, Database, DbConn};
use sea_orm_migration::MigratorTrait;
use thiserror::Error;
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

use crate::migration::Migrator;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// `RUST_LOG` if it holds valid directives, otherwise [`DEFAULT_LOG_FILTER`].
#[must_use]
pub fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global `fmt` subscriber shared by every binary.
pub fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(log_filter()).init();
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub env_name: String,
    pub db_url: String,
    /// Prefix of every short URL; joined to the key with a `/`.
    pub base_url: String,
    pub addr: String,
    pub db_max_connections: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} environment variable is invalid unicode: {actual}")]
    InvalidUnicode { var: &'static str, actual: String },
    #[error("{var} environment variable is not a valid number: {source}")]
    InvalidNumber {
        var: &'static str,
        source: std::num::ParseIntError,
    },
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env_name: "Local".to_owned(),
            db_url: "sqlite://./shortener.db?mode=rwc".to_owned(),
            base_url: "http://localhost/".to_owned(),
            addr: "127.0.0.1:8000".to_owned(),
            db_max_connections: 10,
        }
    }
}

impl Settings {
    /// Reads the settings from the process environment.
    ///
    /// # Errors
    /// Will return [`Err`] if a variable is set but cannot be used.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name))
    }

    /// Reads the settings through `lookup`, falling back to [`Settings::default`]
    /// for every variable that is not present.
    ///
    /// # Errors
    /// Will return [`Err`] if a variable is set but cannot be used.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Result<String, VarError>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let settings = Self {
            env_name: read_var(&lookup, "ENV_NAME", defaults.env_name)?,
            db_url: read_var(&lookup, "DB_URL", defaults.db_url)?,
            base_url: read_var(&lookup, "BASE_URL", defaults.base_url)?,
            addr: read_var(&lookup, "ADDR", defaults.addr)?,
            db_max_connections: read_var(
                &lookup,
                "DB_MAX_CONNECTIONS",
                defaults.db_max_connections.to_string(),
            )?
            .parse()
            .map_err(|source| ConfigError::InvalidNumber {
                var: "DB_MAX_CONNECTIONS",
                source,
            })?,
        };
        info!("Loading settings for: {}", settings.env_name);
        Ok(settings)
    }

    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(self.db_url.clone());
        options.max_connections(self.db_max_connections);
        options
    }
}

fn read_var(
    lookup: impl Fn(&str) -> Result<String, VarError>,
    var: &'static str,
    default: String,
) -> Result<String, ConfigError> {
    match lookup(var) {
        Ok(value) => {
            info!(var, "Environment variable set");
            Ok(value)
        }
        Err(VarError::NotPresent) => {
            warn!(var, default, "Environment variable not set; using default");
            Ok(default)
        }
        Err(VarError::NotUnicode(actual)) => Err(ConfigError::InvalidUnicode {
            var,
            actual: actual.display().to_string(),
        }),
    }
}

/// Connects to the database described by `settings`, brings its schema up to date
/// and returns a [`Container`] that serves both.
///
/// # Errors
/// Will return [`Err`] if the connection to the database or a migration fails.
#[instrument(skip(settings), fields(env_name = %settings.env_name))]
pub async fn init_container(settings: Settings) -> anyhow::Result<Container> {
    info!("Initializing container");
    let container = Container::new();

    let (set_settings, set_db_conn) = container.read((settings_init_action, db_conn_init_action));

    let db_connection_options = settings.connect_options();
    info!(?db_connection_options, "Connecting to database");
    let db = Database::connect(db_connection_options).await?;

    info!("Running pending migrations");
    Migrator::up(&db, None).await?;

    set_settings(settings);
    set_db_conn(db);

    info!("Container initialized");
    Ok(container)
}

fn settings_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (Option<Settings>, impl use<> + CData + Fn(Option<Settings>)) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

pub fn settings_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(Settings) {
    let set_settings = get.as_ref(settings_manager).1.clone();
    move |settings| set_settings(Some(settings))
}

/// # Panics
/// Panics when the [`Settings`] were not set via [`settings_init_action`].
pub fn settings_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> Settings {
    let settings = get.as_ref(settings_manager).0.clone();
    settings.expect("Settings should've been set via settings_init_action!")
}

fn db_conn_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (Option<DbConn>, impl use<> + CData + Fn(Option<DbConn>)) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

pub fn db_conn_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(DbConn) {
    let set_db_conn = get.as_ref(db_conn_manager).1.clone();
    move |db| set_db_conn(Some(db))
}

/// # Panics
/// Panics when the [`DbConn`] was not set via [`db_conn_init_action`].
pub fn db_conn_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> DbConn {
    let db_conn = get.as_ref(db_conn_manager).0.clone();
    db_conn.expect("DbConn should've been set via db_conn_init_action!")
}
