// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Command line interface.
//!
//! This is the only layer that reads the environment: every flag is bound
//! to its variable through clap and folded into the typed configuration
//! structs before any component is built.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::api;
use crate::auth::Issuer;
use crate::client::{AdminClient, ClientError};
use crate::config::{self, *};
use crate::keys::{HousekeepingReport, Housekeeper, KeyError, KeyInfo, KeyManager, DEFAULT_KEY_PREFIX};
use crate::state::AppState;
use crate::storage::{self, KeyPaths, LocalKeyStore, RemoteError, DEFAULT_KEYS_DIR, DEFAULT_KEY_SET_PATH};

/// Upper bound for one request to the admin listener. Generation of a
/// 4096-bit key plus a remote round trip fits comfortably.
const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(
    name = "tailbone",
    about = "Short-lived JWT issuer with a signing key lifecycle",
    long_about = "Tailbone - JWT issuer for network-authenticated clients

OVERVIEW:
  Issues RS256 tokens signed with the newest local key and keeps the local
  key directory consistent with a JWKS document published in an object store.

QUICK START:
  tailbone server start                 # Issuer on :8080, admin on 127.0.0.1:50051
  tailbone keys generate                # Generate and publish a key (via admin)
  tailbone keys list                    # Keys in the published set
  tailbone keys list --local            # Keys in the local directory
  tailbone keys remove <KID>            # Unpublish and delete a key
  tailbone keys housekeeping            # Delete local keys missing remotely",
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Options shared by every sub-command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Result format on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub output: OutputFormat,

    #[arg(long, value_enum, env = LOG_FORMAT_ENV, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Local key directory
    #[arg(long, env = KEYS_DIR_ENV, default_value = DEFAULT_KEYS_DIR, global = true)]
    pub keys_dir: PathBuf,

    /// Prefix of generated key identifiers
    #[arg(long, env = KEY_PREFIX_ENV, default_value = DEFAULT_KEY_PREFIX, global = true)]
    pub key_prefix: String,

    /// RSA modulus size used when a request does not name one
    #[arg(long, env = KEY_SIZE_ENV, default_value_t = DEFAULT_KEY_SIZE, global = true)]
    pub key_size: usize,

    /// `iss` claim of issued tokens
    #[arg(long, env = ISSUER_ENV, default_value = DEFAULT_ISSUER, global = true)]
    pub issuer: String,

    /// Token lifetime in seconds
    #[arg(long, env = EXPIRY_SECS_ENV, default_value_t = DEFAULT_EXPIRY_SECS, global = true)]
    pub expiry_secs: u64,

    /// Container holding the published key set
    #[arg(long, env = BUCKET_ENV, global = true)]
    pub bucket: Option<String>,

    /// Path of the key set inside the container
    #[arg(long, env = KEY_PATH_ENV, default_value = DEFAULT_KEY_SET_PATH, global = true)]
    pub key_path: String,

    #[arg(long, value_enum, env = REMOTE_BACKEND_ENV, default_value_t = RemoteBackend::Fs, global = true)]
    pub remote_backend: RemoteBackend,

    /// Root directory of the `fs` backend
    #[arg(long, env = REMOTE_ROOT_ENV, default_value = DEFAULT_REMOTE_ROOT, global = true)]
    pub remote_root: PathBuf,

    /// Base URL of the `http` backend
    #[arg(long, env = REMOTE_URL_ENV, global = true)]
    pub remote_url: Option<Url>,

    /// Timeout of every remote call, in seconds
    #[arg(long, env = REMOTE_TIMEOUT_SECS_ENV, default_value_t = DEFAULT_REMOTE_TIMEOUT_SECS, global = true)]
    pub remote_timeout_secs: u64,

    /// Admin endpoint used by `keys generate|list|remove|upload`
    #[arg(long, env = ADMIN_URL_ENV, default_value = DEFAULT_ADMIN_URL, global = true)]
    pub admin_url: Url,

    #[arg(long, env = HOST_ENV, default_value = DEFAULT_HOST, global = true)]
    pub host: String,

    #[arg(long, env = PORT_ENV, default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,

    #[arg(long, env = ADMIN_HOST_ENV, default_value = DEFAULT_ADMIN_HOST, global = true)]
    pub admin_host: String,

    #[arg(long, env = ADMIN_PORT_ENV, default_value_t = DEFAULT_ADMIN_PORT, global = true)]
    pub admin_port: u16,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run or maintain the server
    Server(ServerArgs),

    /// Manage signing keys
    Keys(KeysArgs),

    /// Print version and commit
    Version,
}

#[derive(Args)]
pub struct ServerArgs {
    #[command(subcommand)]
    pub command: ServerCommand,
}

#[derive(Subcommand)]
pub enum ServerCommand {
    /// Serve the issuer and/or admin listeners
    Start {
        #[arg(long, value_enum, value_delimiter = ',', num_args = 1.., default_values = ["issuer", "admin"])]
        components: Vec<Component>,
    },

    /// Reconcile the local key directory with the published set
    Housekeeping {
        /// Repeat every N seconds until interrupted
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(Args)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[derive(Subcommand)]
pub enum KeysCommand {
    /// Generate a key pair and publish it
    #[command(aliases = &["gen"])]
    Generate {
        /// RSA modulus size (2048, 3072 or 4096)
        #[arg(long)]
        bits: Option<usize>,
    },

    /// List published keys
    #[command(aliases = &["ls"])]
    List {
        /// List the local key directory instead
        #[arg(short, long)]
        local: bool,
    },

    /// Unpublish a key and delete its local files
    #[command(aliases = &["rm"])]
    Remove {
        kid: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Publish a key that exists in the server's key directory
    Upload { kid: String },

    /// Delete local keys missing from the published set
    Housekeeping,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("{0} listener failed: {1}")]
    Listener(&'static str, String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("aborted")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, CliError>;

impl GlobalArgs {
    pub fn keys_config(&self) -> KeysConfig {
        KeysConfig {
            dir: self.keys_dir.clone(),
            prefix: self.key_prefix.clone(),
            key_size: self.key_size,
            operation_timeout: Duration::from_secs(self.remote_timeout_secs),
        }
    }

    pub fn issuer_config(&self) -> IssuerConfig {
        IssuerConfig {
            issuer: self.issuer.clone(),
            expiry: Duration::from_secs(self.expiry_secs),
            leeway: config::DEFAULT_LEEWAY_SECS,
        }
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            backend: self.remote_backend,
            bucket: self.bucket.clone(),
            key_path: self.key_path.clone(),
            root: self.remote_root.clone(),
            url: self.remote_url.clone(),
            timeout: Duration::from_secs(self.remote_timeout_secs),
        }
    }

    pub fn server_config(&self, components: Vec<Component>) -> Result<ServerConfig> {
        Ok(ServerConfig {
            issuer_addr: SocketAddr::new(parse_host(HOST_ENV, &self.host)?, self.port),
            admin_addr: SocketAddr::new(parse_host(ADMIN_HOST_ENV, &self.admin_host)?, self.admin_port),
            components,
        })
    }
}

fn parse_host(name: &str, host: &str) -> Result<IpAddr> {
    host.parse()
        .map_err(|_| CliError::Config(format!("{name} must be an IP address, got {host:?}")))
}

/// CLI handler for processing commands
pub struct CliHandler {
    global: GlobalArgs,
}

impl CliHandler {
    pub fn new(global: GlobalArgs) -> Self {
        Self { global }
    }

    /// Execute a CLI command
    pub async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Server(args) => match args.command {
                ServerCommand::Start { components } => self.handle_server_start(components).await,
                ServerCommand::Housekeeping { interval_secs } => {
                    self.handle_server_housekeeping(interval_secs).await
                }
            },
            Commands::Keys(args) => match args.command {
                KeysCommand::Generate { bits } => self.handle_generate(bits).await,
                KeysCommand::List { local } => self.handle_list(local).await,
                KeysCommand::Remove { kid, yes } => self.handle_remove(&kid, yes).await,
                KeysCommand::Upload { kid } => self.handle_upload(&kid).await,
                KeysCommand::Housekeeping => self.handle_housekeeping().await,
            },
            Commands::Version => self.handle_version(),
        }
    }

    fn build_manager(&self) -> Result<Arc<KeyManager>> {
        let local = LocalKeyStore::new(KeyPaths::new(&self.global.keys_dir));
        let remote = storage::connect(&self.global.remote_config())?;
        Ok(Arc::new(KeyManager::new(self.global.keys_config(), local, remote)))
    }

    fn admin_client(&self) -> Result<AdminClient> {
        Ok(AdminClient::new(self.global.admin_url.clone(), ADMIN_REQUEST_TIMEOUT)?)
    }

    /// Handle `server start`
    async fn handle_server_start(&self, components: Vec<Component>) -> Result<()> {
        let config = self.global.server_config(components)?;
        let manager = self.build_manager()?;
        manager.local().ensure_dir()?;
        let issuer = Issuer::new(self.global.issuer_config(), manager.local().clone());

        let shutdown = CancellationToken::new();
        let state = AppState::new(manager, issuer).with_shutdown(shutdown.clone());

        let mut listeners = JoinSet::new();
        if config.runs(Component::Issuer) {
            let listener = TcpListener::bind(config.issuer_addr).await?;
            info!(addr = %config.issuer_addr, "Issuer listening");
            listeners.spawn(serve("issuer", listener, api::issuer_router(state.clone()), shutdown.clone()));
        }
        if config.runs(Component::Admin) {
            let listener = TcpListener::bind(config.admin_addr).await?;
            info!(addr = %config.admin_addr, "Admin listening (docs at /docs)");
            listeners.spawn(serve("admin", listener, api::admin_router(state), shutdown.clone()));
        }

        cancel_on_signal(shutdown.clone());

        let mut outcome = Ok(());
        while let Some(joined) = listeners.join_next().await {
            let result = joined.map_err(|e| CliError::Listener("server", e.to_string())).and_then(|r| r);
            if let Err(e) = result {
                error!(error = %e, "Listener stopped, shutting down");
                shutdown.cancel();
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }

        info!("Server stopped");
        outcome
    }

    /// Handle `server housekeeping`
    async fn handle_server_housekeeping(&self, interval_secs: Option<u64>) -> Result<()> {
        let housekeeper = Housekeeper::new(self.build_manager()?);
        let shutdown = CancellationToken::new();
        cancel_on_signal(shutdown.clone());

        match interval_secs {
            Some(secs) => {
                housekeeper
                    .run_every(Duration::from_secs(secs.max(1)), shutdown)
                    .await;
                Ok(())
            }
            None => {
                let report = housekeeper.run(&shutdown).await?;
                self.print_report(&report)
            }
        }
    }

    /// Handle `keys generate`
    async fn handle_generate(&self, bits: Option<usize>) -> Result<()> {
        let info = self.admin_client()?.generate_key(bits).await?;
        self.print_keys(std::slice::from_ref(&info))
    }

    /// Handle `keys list`
    async fn handle_list(&self, local: bool) -> Result<()> {
        let keys = if local {
            self.build_manager()?.list_local_keys()?
        } else {
            self.admin_client()?.list_keys().await?
        };
        self.print_keys(&keys)
    }

    /// Handle `keys remove`
    async fn handle_remove(&self, kid: &str, yes: bool) -> Result<()> {
        if !yes && !confirm(&format!("Remove key {kid} from the published set and delete it locally?")).await? {
            return Err(CliError::Aborted);
        }
        let remaining = self.admin_client()?.remove_key(kid).await?;
        self.print_keys(&remaining)
    }

    /// Handle `keys upload`
    async fn handle_upload(&self, kid: &str) -> Result<()> {
        let info = self.admin_client()?.publish_key(kid).await?;
        self.print_keys(std::slice::from_ref(&info))
    }

    /// Handle `keys housekeeping`
    async fn handle_housekeeping(&self) -> Result<()> {
        self.handle_server_housekeeping(None).await
    }

    /// Handle `version`
    fn handle_version(&self) -> Result<()> {
        let health = api::health::build_info();
        match self.global.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&health)?),
            OutputFormat::Text => {
                println!("Version {}", health.version);
                println!("Commit {}", health.commit);
            }
        }
        Ok(())
    }

    fn print_keys(&self, keys: &[KeyInfo]) -> Result<()> {
        match self.global.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(keys)?),
            OutputFormat::Text => print!("{}", render_key_table(keys)),
        }
        Ok(())
    }

    fn print_report(&self, report: &HousekeepingReport) -> Result<()> {
        match self.global.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
            OutputFormat::Text => {
                println!("Local keys:   {}", report.local_keys);
                println!("Remote keys:  {}", report.remote_keys);
                println!("Deleted keys: {}", report.deleted_keys);
            }
        }
        Ok(())
    }
}

async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: axum::Router,
    shutdown: CancellationToken,
) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| CliError::Listener(name, e.to_string()))
}

/// Cancel `token` on Ctrl-C or SIGTERM.
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => token.cancel(),
            _ = token.cancelled() => {}
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

async fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N] ");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Aligned `KeyId  Algorithm  Created` table, one key per line.
pub fn render_key_table(keys: &[KeyInfo]) -> String {
    const HEADERS: [&str; 3] = ["KeyId", "Algorithm", "Created"];

    let rows: Vec<[String; 3]> = keys
        .iter()
        .map(|k| [k.key_id.clone(), k.algorithm.clone(), k.created_at_rfc3339()])
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut push_line = |cells: [&str; 3]| {
        let line = format!(
            "{:<w0$}  {:<w1$}  {}",
            cells[0],
            cells[1],
            cells[2],
            w0 = widths[0],
            w1 = widths[1]
        );
        out.push_str(line.trim_end());
        out.push('\n');
    };

    push_line(HEADERS);
    for row in &rows {
        push_line([row[0].as_str(), row[1].as_str(), row[2].as_str()]);
    }
    out
}
