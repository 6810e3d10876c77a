//! authgate client management CLI
//!
//! Registers, lists and removes OAuth clients directly in the SQLite
//! database used by the authgate server.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Register with a generated client ID and secret
//! authgate-clients register --redirect-domain "https://app.example.com/callback"
//!
//! # Register with explicit credentials
//! authgate-clients --database-url sqlite:/var/lib/authgate/authgate.db register \
//!   --client-id c1 --secret s1 --redirect-domain "https://app.example.com" --name "Example App"
//!
//! authgate-clients list --limit 20
//! authgate-clients remove --client-id c1
//! ```
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error (database, serialization)
//! - 2: Client management error (invalid input, duplicate or unknown client)

use authgate::errors::OAuthError;
use authgate::oauth::{
    ClientRegistry,
    types::{generate_client_id, generate_token},
};
use authgate::storage::{OAuthStorage, sqlite};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::process;
use std::sync::Arc;

/// Main CLI application structure
#[derive(Parser)]
#[command(
    name = "authgate-clients",
    about = "authgate OAuth client management",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// SQLite database URL
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:authgate.db",
        help = "SQLite database URL (can be set via DATABASE_URL environment variable)"
    )]
    database_url: String,

    /// Pretty-print JSON output
    #[arg(long, help = "Pretty-print JSON output")]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new OAuth client
    Register(RegisterArgs),
    /// List registered clients
    List(ListArgs),
    /// Remove a registered client
    Remove(RemoveArgs),
}

#[derive(Args)]
struct RegisterArgs {
    #[arg(long, help = "Client ID (generated when omitted)")]
    client_id: Option<String>,

    #[arg(long, help = "Client secret (generated when omitted)")]
    secret: Option<String>,

    #[arg(
        long,
        help = "Base URI every redirect_uri must fall under, e.g. https://app.example.com/callback"
    )]
    redirect_domain: String,

    #[arg(long, help = "Human-readable name for the client")]
    name: Option<String>,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, help = "Maximum number of clients to list")]
    limit: Option<usize>,
}

#[derive(Args)]
struct RemoveArgs {
    #[arg(long, help = "Client ID to remove")]
    client_id: String,
}

/// Application errors
#[derive(Debug)]
enum AppError {
    /// Storage or serialization failures
    General(String),
    /// Rejected client operations
    ClientManagement(String),
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::ServerError(e) => AppError::General(e.to_string()),
            other => AppError::ClientManagement(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::General(format!("JSON error: {}", err))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::General(msg) => write!(f, "Error: {}", msg),
            AppError::ClientManagement(msg) => write!(f, "Client management error: {}", msg),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = run(&cli).await;

    match result {
        Ok(()) => process::exit(0),
        Err(err @ AppError::General(_)) => {
            eprintln!("{}", err);
            process::exit(1);
        }
        Err(err @ AppError::ClientManagement(_)) => {
            eprintln!("{}", err);
            process::exit(2);
        }
    }
}

async fn run(cli: &Cli) -> Result<(), AppError> {
    let pool = sqlite::connect(&cli.database_url)
        .await
        .map_err(|e| AppError::General(e.to_string()))?;
    let storage = sqlite::SqliteOAuthStorage::new(pool);
    storage
        .migrate()
        .await
        .map_err(|e| AppError::General(e.to_string()))?;
    let storage: Arc<dyn OAuthStorage> = Arc::new(storage);
    let registry = ClientRegistry::new(storage);

    match &cli.command {
        Commands::Register(args) => register_client(cli, &registry, args).await,
        Commands::List(args) => list_clients(cli, &registry, args).await,
        Commands::Remove(args) => remove_client(&registry, args).await,
    }
}

async fn register_client(
    cli: &Cli,
    registry: &ClientRegistry,
    args: &RegisterArgs,
) -> Result<(), AppError> {
    let client_id = args.client_id.clone().unwrap_or_else(generate_client_id);
    let secret = args.secret.clone().unwrap_or_else(generate_token);

    let client = registry
        .register(
            &client_id,
            &secret,
            &args.redirect_domain,
            args.name.as_deref(),
        )
        .await?;

    // The secret is only ever shown here
    output(
        cli,
        &json!({
            "client_id": client.client_id,
            "client_secret": secret,
            "redirect_domain": client.redirect_domain,
            "client_name": client.client_name,
            "created_at": client.created_at,
        }),
    )
}

async fn list_clients(
    cli: &Cli,
    registry: &ClientRegistry,
    args: &ListArgs,
) -> Result<(), AppError> {
    let clients = registry.list(args.limit).await?;
    output(cli, &serde_json::to_value(&clients)?)
}

async fn remove_client(registry: &ClientRegistry, args: &RemoveArgs) -> Result<(), AppError> {
    if registry.remove(&args.client_id).await? {
        println!("Client '{}' removed.", args.client_id);
        Ok(())
    } else {
        Err(AppError::ClientManagement(format!(
            "Client '{}' not found",
            args.client_id
        )))
    }
}

fn output(cli: &Cli, value: &serde_json::Value) -> Result<(), AppError> {
    if cli.pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}
