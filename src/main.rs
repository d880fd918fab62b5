// ABOUTME: Entry point for the datastash binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and drives the sync layer.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};

use datastash_adapters::{DataSourceManager, RepoFileClient, RepoSyncConfig, http_client};
use datastash_core::{FileStore, LocalStore, SourceConfig, SourceId, StorageKeys, registry};
use datastash_db::{
    BootstrapOutcome, NewUser, RepoSnapshotFetcher, SnapshotManager, bootstrap, default_remote,
};

#[derive(Parser)]
#[command(name = "datastash")]
#[command(about = "Uniform read/write over swappable storage backends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and switch storage sources
    Sources {
        #[command(subcommand)]
        command: SourceCommands,
    },

    /// Read a key through the active source
    Read {
        key: String,
    },

    /// Write a JSON value to a key through the active source
    Write {
        key: String,

        /// JSON value to store
        value: String,
    },

    /// Work with the embedded database snapshot
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    /// List all known sources and their configuration fields
    List,

    /// Validate a config, store it, and make the source active
    Activate {
        /// Source id, e.g. local-store or repo-file
        id: String,

        /// Config fields as key=value pairs
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Probe a source config without changing any state
    Test {
        id: String,

        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Execute one SQL statement against the loaded database
    Exec {
        sql: String,
    },

    /// Show whether a database is loaded, its tables, and user counts
    Status,

    /// Show recent query history
    History {
        /// Show the full retained list instead of the display slice
        #[arg(long)]
        all: bool,

        /// Wipe the stored history instead of showing it
        #[arg(long, conflicts_with = "all")]
        clear: bool,
    },

    /// Push the database snapshot to the configured remote
    Push {
        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        path: Option<String>,

        #[arg(long)]
        branch: Option<String>,
    },

    /// Replace the database with the remote snapshot
    Pull {
        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        path: Option<String>,

        #[arg(long)]
        branch: Option<String>,
    },

    /// Write the serialized database to a file
    Export {
        file: std::path::PathBuf,
    },

    /// Load the database from a serialized file and autosave it
    Import {
        file: std::path::PathBuf,
    },

    /// Register a user in the app-scoped users table
    Register {
        username: String,

        #[arg(long, default_value = "")]
        email: String,

        #[arg(long)]
        password: String,
    },
}

/// Runtime settings, all from the environment.
struct Settings {
    home: std::path::PathBuf,
    app: String,
    origin: String,
    quota_bytes: Option<u64>,
    token: Option<String>,
}

impl Settings {
    fn from_env() -> anyhow::Result<Self> {
        let home = std::env::var("DATASTASH_HOME")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| std::path::PathBuf::from(".datastash"));
        let quota_bytes = match std::env::var("DATASTASH_QUOTA_BYTES") {
            Ok(raw) => Some(raw.parse().context("DATASTASH_QUOTA_BYTES must be a number")?),
            Err(_) => None,
        };

        Ok(Self {
            home,
            app: std::env::var("DATASTASH_APP").unwrap_or_else(|_| "datastash".to_string()),
            origin: std::env::var("DATASTASH_ORIGIN")
                .unwrap_or_else(|_| "http://localhost".to_string()),
            quota_bytes,
            token: std::env::var("GITHUB_TOKEN").ok(),
        })
    }

    fn open_store(&self) -> anyhow::Result<Arc<dyn LocalStore>> {
        let store = FileStore::open(&self.home)
            .with_context(|| format!("opening store at {}", self.home.display()))?;
        Ok(match self.quota_bytes {
            Some(quota) => Arc::new(store.with_quota(quota)),
            None => Arc::new(store),
        })
    }

    fn keys(&self) -> StorageKeys {
        StorageKeys::new(self.app.clone())
    }

    /// The remote to push/pull against: CLI overrides, then the persisted
    /// location, then the shared default. The token comes from the
    /// environment, never from storage.
    fn remote(
        &self,
        snapshots: &SnapshotManager,
        owner: Option<String>,
        repo: Option<String>,
        path: Option<String>,
        branch: Option<String>,
    ) -> RepoSyncConfig {
        let base = snapshots.remote_location().unwrap_or_else(default_remote);
        RepoSyncConfig {
            owner: owner.unwrap_or(base.owner),
            repo: repo.unwrap_or(base.repo),
            path: path.unwrap_or(base.path),
            branch: branch.unwrap_or(base.branch),
            token: self.token.clone(),
        }
    }
}

fn parse_config(pairs: &[String]) -> anyhow::Result<SourceConfig> {
    let mut config = SourceConfig::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{}'", pair))?;
        config.insert(key.to_string(), value.to_string());
    }
    Ok(config)
}

fn parse_source(id: &str) -> anyhow::Result<SourceId> {
    id.parse().map_err(|e: String| anyhow!(e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datastash=info".parse().expect("valid default filter")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let store = settings.open_store()?;
    let keys = settings.keys();
    tracing::debug!(home = %settings.home.display(), app = %settings.app, "store opened");

    match cli.command {
        Commands::Sources { command } => match command {
            SourceCommands::List => {
                let manager = DataSourceManager::load(Arc::clone(&store), keys);
                for desc in registry() {
                    let marker = if desc.id == manager.active_source() {
                        "*"
                    } else {
                        " "
                    };
                    println!("{} {} ({})", marker, desc.id, desc.label);
                    for field in desc.fields {
                        let kind = if field.required { "required" } else { "optional" };
                        println!("      {} ({})", field.name, kind);
                    }
                }
            }
            SourceCommands::Activate { id, set } => {
                let mut manager = DataSourceManager::load(Arc::clone(&store), keys);
                let id = parse_source(&id)?;
                manager.activate(id, parse_config(&set)?)?;
                println!("active source: {}", id);
            }
            SourceCommands::Test { id, set } => {
                let manager = DataSourceManager::load(Arc::clone(&store), keys);
                let outcome = manager
                    .test_connection(parse_source(&id)?, &parse_config(&set)?)
                    .await?;
                println!(
                    "{}: {}",
                    if outcome.success { "ok" } else { "failed" },
                    outcome.message
                );
                if !outcome.success {
                    std::process::exit(1);
                }
            }
        },

        Commands::Read { key } => {
            let manager = DataSourceManager::load(Arc::clone(&store), keys);
            match manager.read(&key).await {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => {
                    println!("no data for '{}'", key);
                    std::process::exit(1);
                }
            }
        }

        Commands::Write { key, value } => {
            let manager = DataSourceManager::load(Arc::clone(&store), keys);
            let value: serde_json::Value =
                serde_json::from_str(&value).context("value must be valid JSON")?;
            if manager.write(&key, &value).await {
                println!("wrote '{}'", key);
            } else {
                println!("write failed, '{}' must not be assumed persisted", key);
                std::process::exit(1);
            }
        }

        Commands::Db { command } => {
            let mut snapshots = SnapshotManager::new(Arc::clone(&store), keys);
            run_db_command(&mut snapshots, &settings, command).await?;
        }
    }

    Ok(())
}

async fn run_db_command(
    snapshots: &mut SnapshotManager,
    settings: &Settings,
    command: DbCommands,
) -> anyhow::Result<()> {
    match command {
        DbCommands::Exec { sql } => {
            discover(snapshots, settings).await?;
            let output = snapshots.execute(&sql)?;
            if output.columns.is_empty() {
                println!("{} row(s) affected", output.rows_affected);
            } else {
                println!("{}", output.columns.join(" | "));
                for row in &output.rows {
                    let cells: Vec<String> = row.iter().map(render_cell).collect();
                    println!("{}", cells.join(" | "));
                }
            }
        }

        DbCommands::Status => {
            let outcome = discover(snapshots, settings).await?;
            match outcome {
                BootstrapOutcome::LoadedLocal => println!("database: loaded from local snapshot"),
                BootstrapOutcome::LoadedRemote => println!("database: loaded from shared remote"),
                BootstrapOutcome::Unloaded => {
                    println!("database: not loaded");
                    return Ok(());
                }
            }
            for table in snapshots.tables()? {
                println!("  {} ({} rows)", table.name, table.row_count);
            }
            let status = snapshots.app_status()?;
            println!(
                "users: {} in app '{}', {} total",
                status.user_count, status.app, status.total_users
            );
        }

        DbCommands::History { all, clear } => {
            if clear {
                snapshots.clear_history();
                println!("history cleared");
                return Ok(());
            }
            let entries = if all {
                snapshots.history()
            } else {
                snapshots.recent_history()
            };
            for entry in entries {
                let status = if entry.success { "ok" } else { "failed" };
                println!("[{}] {} {}", entry.timestamp.to_rfc3339(), status, entry.query);
                if let Some(error) = &entry.error {
                    println!("    {}", error);
                }
            }
        }

        DbCommands::Push {
            owner,
            repo,
            path,
            branch,
        } => {
            if !snapshots.load_local()? {
                return Err(anyhow!("no local database to push"));
            }
            let cfg = settings.remote(snapshots, owner, repo, path, branch);
            if cfg.token.is_none() {
                return Err(anyhow!("pushing requires GITHUB_TOKEN"));
            }
            let client = RepoFileClient::new(http_client());
            snapshots.push_remote(&client, &cfg).await?;
            println!("pushed to {}/{} {}", cfg.owner, cfg.repo, cfg.path);
        }

        DbCommands::Pull {
            owner,
            repo,
            path,
            branch,
        } => {
            let cfg = settings.remote(snapshots, owner, repo, path, branch);
            let client = RepoFileClient::new(http_client());
            snapshots.pull_remote(&client, Some(&cfg)).await?;
            println!("pulled from {}/{} {}", cfg.owner, cfg.repo, cfg.path);
        }

        DbCommands::Export { file } => {
            if !snapshots.load_local()? {
                return Err(anyhow!("no local database to export"));
            }
            std::fs::write(&file, snapshots.export_bytes()?)
                .with_context(|| format!("writing {}", file.display()))?;
            println!("exported to {}", file.display());
        }

        DbCommands::Import { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            snapshots.load_bytes(&bytes)?;
            println!("imported {} bytes", bytes.len());
        }

        DbCommands::Register {
            username,
            email,
            password,
        } => {
            discover(snapshots, settings).await?;
            let record = snapshots.register_user(&NewUser {
                username,
                email,
                password,
                first_name: String::new(),
                last_name: String::new(),
            })?;
            println!("registered '{}' in app '{}'", record.username, record.app);
        }
    }
    Ok(())
}

/// Run startup auto-discovery: local snapshot first, then the shared
/// remote unless the origin is a local development context.
async fn discover(
    snapshots: &mut SnapshotManager,
    settings: &Settings,
) -> anyhow::Result<BootstrapOutcome> {
    let fetcher = RepoSnapshotFetcher::new(
        RepoFileClient::new(http_client()),
        snapshots.remote_location().unwrap_or_else(default_remote),
    );
    Ok(bootstrap(snapshots, &settings.origin, &fetcher).await?)
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}
