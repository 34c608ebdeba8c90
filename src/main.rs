//! ECP Daemon — Editor Command Protocol transport/dispatch core.
//!
//! A standalone server that exposes workspace adapters over JSON-RPC 2.0
//! via WebSocket.
//!
//! Usage:
//!   ecpd                                 # default port 7070, cwd as workspace
//!   ecpd --port 8080                     # custom port
//!   ecpd --workspace /path/to/project    # custom workspace
//!   ecpd --token mysecret                # custom auth token
//!   ecpd -vv                             # trace logging

use std::path::PathBuf;

use clap::Parser;
use ecp_protocol::auth::AuthConfig;
use ecp_server::ECPServer;
use ecp_services::{document::DocumentService, file::FileService, secret::SecretService, session::SessionService, terminal::TerminalService};
use ecp_transport::server::{TransportConfig, TransportServer};
use tokio::sync::broadcast;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ecpd", about = "ECP daemon — Editor Command Protocol transport/dispatch core")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7070")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Workspace root directory
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Authentication token (random if not provided)
    #[arg(long)]
    token: Option<String>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "100")]
    max_connections: usize,

    /// Heartbeat interval, in seconds (0 disables the heartbeat)
    #[arg(long, default_value = "30")]
    heartbeat_interval: u64,

    /// Handshake timeout, in milliseconds
    #[arg(long, default_value = "10000")]
    handshake_timeout: u64,

    /// Disable the legacy `?token=` query-string auth path
    #[arg(long)]
    no_legacy_auth: bool,

    /// Serve a static directory read-only (path-traversal protected, `/`
    /// falls back to `index.html`). Omitted entirely by default.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Additional allowed WebSocket Origins (repeatable). `*` disables the
    /// Origin check entirely.
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,

    /// Enable permissive CORS on the HTTP surface
    #[arg(long)]
    cors: bool,

    /// Increase log verbosity (repeatable: -v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.host == "0.0.0.0" && cli.allow_origins.is_empty() {
        warn!("binding to 0.0.0.0 with no --allow-origin entries; any host on the network can reach this server");
    }

    let workspace_root = cli.workspace.unwrap_or_else(|| std::env::current_dir().expect("failed to get cwd"));
    let workspace_root = workspace_root.canonicalize().unwrap_or(workspace_root);

    let auth_token = cli.token.unwrap_or_else(|| {
        use rand::Rng;
        let mut rng = rand::rng();
        let bytes: [u8; 32] = rng.random();
        hex::encode(bytes)
    });

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                          ECP Daemon                           ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Workspace:  {}", workspace_root.display());
    println!("  Port:       {}", cli.port);
    println!("  Binding:    {}", cli.host);
    println!();

    let (notification_tx, _) = broadcast::channel::<String>(1024);

    let mut ecp_server = ECPServer::new(workspace_root.clone());
    ecp_server.set_notification_sender(notification_tx.clone());

    ecp_server.register_adapter(FileService::new(workspace_root.clone()));
    ecp_server.register_adapter(TerminalService::new(workspace_root.clone()));
    ecp_server.register_adapter(DocumentService::new(workspace_root.clone()));
    ecp_server.register_adapter(SessionService::new());
    ecp_server.register_adapter(SecretService::new());

    if let Err(e) = ecp_server.initialize().await {
        error!("failed to initialize ECP server: {e}");
        std::process::exit(1);
    }

    let transport_config = TransportConfig {
        port: cli.port,
        hostname: cli.host.clone(),
        auth: AuthConfig {
            token: auth_token.clone(),
            handshake_timeout_ms: cli.handshake_timeout,
            allow_legacy_auth: !cli.no_legacy_auth,
            heartbeat_interval_ms: cli.heartbeat_interval * 1000,
        },
        allow_origins: cli.allow_origins,
        enable_cors: cli.cors,
        max_connections: Some(cli.max_connections),
        workspace_root: Some(workspace_root.to_string_lossy().to_string()),
        static_dir: cli.static_dir,
        server_version: env!("CARGO_PKG_VERSION").to_string(),
        verbose_logging: cli.verbose > 0,
    };

    let mut transport = match TransportServer::start_with_sender(transport_config, std::sync::Arc::new(ecp_server), notification_tx).await {
        Ok(t) => t,
        Err(e) => {
            error!("failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    let actual_port = transport.port();
    let ws_url = format!("ws://{}:{}/ws", cli.host, actual_port);

    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  Server running!");
    println!();
    println!("  WebSocket endpoint:");
    println!("    {ws_url}");
    println!();
    println!("  Auth token:");
    println!("    {}...{}", &auth_token[..8], &auth_token[auth_token.len() - 8..]);
    println!();
    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");

    println!();
    println!("  Shutting down...");
    transport.stop().await;
    println!("  Server stopped.");
}
