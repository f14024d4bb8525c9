//! # Bazaar Mobile Core
//!
//! Shared Rust core of the Bazaar iOS and Android apps. The native shells
//! call [`MobileCore::initialize`] once at launch and then invoke the
//! functions in [`commands`] through their bridge.
//!
//! ## Module Organization
//! ```text
//! bazaar_mobile_core/
//! ├── lib.rs            ◄─── You are here (startup & lifecycle)
//! ├── commands/
//! │   ├── mod.rs        ◄─── Command exports
//! │   ├── mutations.rs  ◄─── Listing writes and the upload queue
//! │   └── sync.rs       ◄─── Offline status, refresh, cached reads
//! └── error.rs          ◄─── API error type for commands
//! ```

pub mod commands;
pub mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bazaar_store::{KeyValueStore, SqliteStore, StoreConfig};
use bazaar_sync::{
    OfflineConfig, OfflineRuntime, OfflineRuntimeBuilder, RemoteApi, SharedConnectivity,
    Subscription,
};

pub use error::{ApiError, ErrorCode, InitError};

const DATABASE_FILE: &str = "bazaar.db";

/// Startup options supplied by the native shell.
#[derive(Debug, Clone)]
pub struct MobileOptions {
    /// App data directory. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,

    /// Path of `offline.toml`. Defaults to the platform config dir.
    pub config_path: Option<PathBuf>,

    /// Install the global tracing subscriber.
    pub init_tracing: bool,
}

impl Default for MobileOptions {
    fn default() -> Self {
        MobileOptions {
            data_dir: None,
            config_path: None,
            init_tracing: true,
        }
    }
}

/// The running core: storage, offline runtime and connectivity flag.
pub struct MobileCore {
    runtime: OfflineRuntime,
    store: Arc<SqliteStore>,
    connectivity: Arc<SharedConnectivity>,
    data_dir: PathBuf,
}

impl MobileCore {
    /// Brings the core up.
    ///
    /// ## Startup Sequence
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────────┐
    /// │                       Core Startup                                      │
    /// │                                                                         │
    /// │  1. Initialize Logging ───────────────────────────────────────────────► │
    /// │     • tracing-subscriber with env filter                                │
    /// │     • Default: info,bazaar=debug,sqlx=warn; RUST_LOG overrides          │
    /// │                                                                         │
    /// │  2. Determine Data Directory ─────────────────────────────────────────► │
    /// │     • iOS: <app container>/Library/Application Support                  │
    /// │     • Android: <app files dir> (passed in by the shell)                 │
    /// │     • BAZAAR_DATA_DIR overrides                                         │
    /// │                                                                         │
    /// │  3. Open Storage ─────────────────────────────────────────────────────► │
    /// │     • SQLite with WAL mode, pending migrations applied                  │
    /// │                                                                         │
    /// │  4. Load offline.toml, build and start the OfflineRuntime ───────────►  │
    /// └─────────────────────────────────────────────────────────────────────────┘
    /// ```
    pub async fn initialize(
        options: MobileOptions,
        remote: Arc<dyn RemoteApi>,
        connectivity: Arc<SharedConnectivity>,
    ) -> Result<MobileCore, InitError> {
        if options.init_tracing {
            init_tracing();
        }

        info!("Starting Bazaar mobile core");

        let data_dir = resolve_data_dir(options.data_dir)?;
        let db_path = data_dir.join(DATABASE_FILE);
        info!(?db_path, "Database path determined");

        let store = Arc::new(SqliteStore::new(StoreConfig::new(&db_path)).await?);
        info!("Database connected and migrations applied");

        let config = OfflineConfig::load(options.config_path)?;

        let runtime = OfflineRuntimeBuilder::new(config)
            .with_storage(store.clone() as Arc<dyn KeyValueStore>)
            .with_remote(remote)
            .with_connectivity(connectivity.clone())
            .build()
            .await?;
        runtime.start().await?;

        info!("Mobile core ready");
        Ok(MobileCore {
            runtime,
            store,
            connectivity,
            data_dir,
        })
    }

    /// Stops background work and closes the database. Idempotent.
    pub async fn shutdown(&self) {
        self.runtime.shutdown().await;
        self.store.close().await;
        info!("Mobile core shut down");
    }

    pub fn runtime(&self) -> &OfflineRuntime {
        &self.runtime
    }

    pub fn connectivity(&self) -> &Arc<SharedConnectivity> {
        &self.connectivity
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Subscribes the UI to offline events.
    pub fn events(&self) -> Subscription {
        self.runtime.events()
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=bazaar_sync=trace` - Show trace for the sync crate only
/// - Default: `info,bazaar=debug,sqlx=warn`
///
/// A second call (or a subscriber installed by the shell) is left alone.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bazaar=debug,sqlx=warn"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Determines the app data directory and creates it if needed.
///
/// ## Development Override
/// Set `BAZAAR_DATA_DIR` to use a custom directory.
fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf, InitError> {
    let data_dir = match explicit {
        Some(dir) => dir,
        None => match std::env::var("BAZAAR_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => ProjectDirs::from("com", "bazaar", "mobile")
                .ok_or(InitError::NoDataDir)?
                .data_dir()
                .to_path_buf(),
        },
    };

    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}
