//! Command-line client for calsnap.

use anyhow::{Context, Result};
use calsnap_cli::{
    ApiClient, ClientConfig, CommandPayload, FilePayload, LastRunTracker, OwnerCredentials,
    PassphraseInput, PayloadSource, SnapshotTransport, SyncMode, SyncOrchestrator, SyncReport,
    client_config_path, load_client_config, owner_credentials,
};
use calsnap_core::{HashParams, PassphraseHasher, SnapshotId, SnapshotKind};
use clap::{Args, Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "calsnap")]
#[command(about = "Push encrypted calendar snapshots to a calsnap server")]
#[command(version)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ClientConfigArgs {
    /// Client config file path
    #[arg(long, env = "CALSNAP_CLIENT_CONFIG")]
    client_config: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct OwnerArgs {
    /// Server base URL (e.g., https://cal.example.com)
    #[arg(long, env = "CALSNAP_SERVER")]
    server: Option<String>,

    /// Owner name identifying the snapshots on the server
    #[arg(long, env = "CALSNAP_OWNER")]
    owner: Option<String>,

    /// Server passphrase (prefer --passphrase-file)
    #[arg(long, env = "CALSNAP_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Read the server passphrase from the first line of this file
    #[arg(long)]
    passphrase_file: Option<PathBuf>,

    /// Passphrase hash produced by `calsnap hash-passphrase`
    #[arg(long, env = "CALSNAP_PASSPHRASE_HASH", hide_env_values = true)]
    passphrase_hash: Option<String>,

    /// Hash the owner name instead of sending it in plaintext
    #[arg(long, default_value_t = false)]
    hash_name: bool,

    /// PEM certificate to trust for a self-signed server
    #[arg(long, env = "CALSNAP_CA_CERT")]
    ca_cert: Option<PathBuf>,

    #[command(flatten)]
    client: ClientConfigArgs,
}

#[derive(Args)]
struct PushArgs {
    /// Capture a full snapshot
    #[arg(long, default_value_t = false, conflicts_with_all = ["partial", "try_partial_continue"])]
    full: bool,

    /// Capture a partial snapshot of events modified in a window
    #[arg(long, default_value_t = false)]
    partial: bool,

    /// Start the partial window at the last successful run, falling back to
    /// --partial-start when there is none
    #[arg(long, default_value_t = false)]
    try_partial_continue: bool,

    /// Partial window start; accepts `now-x[wdhm]` or an ISO-8601 date-time
    #[arg(long, default_value = "now-1d")]
    partial_start: String,

    /// Partial window end; accepts `now-x[wdhm]` or an ISO-8601 date-time
    #[arg(long, default_value = "now")]
    partial_end: String,

    /// Also write the snapshot into this directory
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Last-run marker file (default: lastrun.txt next to the executable)
    #[arg(long)]
    last_run_file: Option<PathBuf>,

    /// Upload an already packaged archive
    #[arg(long, conflicts_with = "exporter")]
    payload_file: Option<PathBuf>,

    /// Exporter command writing the archive to stdout (after --)
    #[arg(last = true)]
    exporter: Vec<String>,

    #[command(flatten)]
    owner: OwnerArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a snapshot and push it to the server and/or a directory
    Push(PushArgs),
    /// List the owner's snapshots
    List {
        #[command(flatten)]
        owner: OwnerArgs,
    },
    /// Download one snapshot
    Fetch {
        /// Snapshot id from `calsnap list`
        id: i64,
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        owner: OwnerArgs,
    },
    /// Check the owner credentials without creating the owner
    Auth {
        #[command(flatten)]
        owner: OwnerArgs,
    },
    /// Hash a passphrase read from stdin for use with --passphrase-hash
    HashPassphrase,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { verbose, command } = Cli::parse();
    init_tracing(verbose);

    match command {
        Commands::Push(args) => handle_push_command(args).await,
        Commands::List { owner } => handle_list_command(&owner).await,
        Commands::Fetch { id, output, owner } => {
            handle_fetch_command(id, output.as_deref(), &owner).await
        }
        Commands::Auth { owner } => handle_auth_command(&owner).await,
        Commands::HashPassphrase => handle_hash_passphrase_command(),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(args: &ClientConfigArgs) -> Result<ClientConfig> {
    match client_config_path(args.client_config.as_deref()) {
        Some(path) => load_client_config(&path),
        None => Ok(ClientConfig::default()),
    }
}

async fn resolve_credentials(owner: &OwnerArgs, config: &ClientConfig) -> Result<OwnerCredentials> {
    let name = owner
        .owner
        .clone()
        .or_else(|| config.owner.clone())
        .filter(|name| !name.is_empty())
        .context("--owner is required")?;

    let passphrase = if let Some(hash) = &owner.passphrase_hash {
        PassphraseInput::Hashed(hash.clone())
    } else if let Some(plain) = &owner.passphrase {
        PassphraseInput::Plain(plain.clone())
    } else if let Some(path) = owner
        .passphrase_file
        .as_ref()
        .or(config.passphrase_file.as_ref())
    {
        PassphraseInput::from_file(path)
            .await
            .with_context(|| format!("failed to read passphrase file {}", path.display()))?
    } else {
        anyhow::bail!("one of --passphrase, --passphrase-file or --passphrase-hash is required");
    };

    let hasher = PassphraseHasher::new(HashParams::default());
    let hash_name = owner.hash_name || config.hash_name;
    // Argon2 with the production parameters takes a noticeable moment.
    let credentials =
        tokio::task::spawn_blocking(move || owner_credentials(&name, passphrase, hash_name, &hasher))
            .await
            .context("passphrase hashing task failed")??;
    Ok(credentials)
}

async fn build_client(owner: &OwnerArgs, config: &ClientConfig) -> Result<ApiClient> {
    let server = owner
        .server
        .clone()
        .or_else(|| config.server.clone())
        .context("--server is required")?;
    let credentials = resolve_credentials(owner, config).await?;
    let client = match owner.ca_cert.as_ref().or(config.ca_cert.as_ref()) {
        Some(cert) => ApiClient::with_ca_cert(&server, credentials, cert)?,
        None => ApiClient::new(&server, credentials)?,
    };
    Ok(client)
}

async fn handle_push_command(args: PushArgs) -> Result<()> {
    let config = load_config(&args.owner.client)?;

    let mode = if args.full {
        SyncMode::Full
    } else if args.partial || args.try_partial_continue {
        SyncMode::Partial {
            continue_from_last_run: args.try_partial_continue,
            start: Some(args.partial_start.clone()),
            end: Some(args.partial_end.clone()),
        }
    } else {
        anyhow::bail!("either --full or --partial must be specified");
    };

    let source: Box<dyn PayloadSource> = if let Some(path) = &args.payload_file {
        Box::new(FilePayload::new(path))
    } else {
        let command = if args.exporter.is_empty() {
            &config.exporter_command
        } else {
            &args.exporter
        };
        let (program, rest) = command
            .split_first()
            .context("an exporter command (after --) or --payload-file is required")?;
        Box::new(CommandPayload::new(program, rest.to_vec()))
    };

    let storage_dir = args.storage_dir.clone().or_else(|| config.storage_dir.clone());
    let has_server = args.owner.server.is_some() || config.server.is_some();
    if !has_server && storage_dir.is_none() {
        anyhow::bail!("at least one of --server or --storage-dir is required");
    }

    let tracker = match args.last_run_file.as_ref().or(config.last_run_file.as_ref()) {
        Some(path) => LastRunTracker::new(path),
        None => LastRunTracker::beside_executable()
            .context("failed to locate the last-run file next to the executable")?,
    };

    let client = if has_server {
        Some(build_client(&args.owner, &config).await?)
    } else {
        None
    };

    let mut orchestrator = SyncOrchestrator::new(source.as_ref(), &tracker);
    if let Some(client) = &client {
        orchestrator = orchestrator.with_transport(client as &dyn SnapshotTransport);
    }
    if let Some(dir) = storage_dir {
        orchestrator = orchestrator.with_storage_dir(dir);
    }

    let report = orchestrator.run(&mode, OffsetDateTime::now_utc()).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    match report.kind {
        SnapshotKind::Full => println!("Captured full snapshot ({} bytes)", report.payload_bytes),
        SnapshotKind::Partial => println!(
            "Captured partial snapshot {} .. {} ({} bytes)",
            format_time(report.window.start()),
            format_time(report.window.end()),
            report.payload_bytes
        ),
    }
    if let Some(path) = &report.local_copy {
        println!("Stored: {}", path.display());
    }
    if report.uploaded {
        println!("Uploaded to server");
    }
    if report.marker_updated {
        println!("Last-run marker updated");
    }
}

async fn handle_list_command(owner: &OwnerArgs) -> Result<()> {
    let config = load_config(&owner.client)?;
    let client = build_client(owner, &config).await?;
    let snapshots = client.list_snapshots().await?;

    if snapshots.is_empty() {
        println!("No snapshots stored");
        return Ok(());
    }

    println!("{:<8} {:<32} {:<8} WINDOW", "ID", "CREATED", "TYPE");
    for info in snapshots {
        let window = match (info.window_start, info.window_end) {
            (Some(start), Some(end)) => format!("{} .. {}", format_time(start), format_time(end)),
            _ => "-".to_string(),
        };
        println!(
            "{:<8} {:<32} {:<8} {}",
            info.id.get(),
            format_time(info.timestamp),
            info.kind.as_str(),
            window
        );
    }
    Ok(())
}

async fn handle_fetch_command(id: i64, output: Option<&Path>, owner: &OwnerArgs) -> Result<()> {
    let config = load_config(&owner.client)?;
    let client = build_client(owner, &config).await?;
    let data = client.fetch_snapshot(SnapshotId::new(id)).await?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &data)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote {} bytes to {}", data.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn handle_auth_command(owner: &OwnerArgs) -> Result<()> {
    let config = load_config(&owner.client)?;
    let client = build_client(owner, &config).await?;
    client.authenticate().await?;
    println!("Credentials accepted");
    Ok(())
}

fn handle_hash_passphrase_command() -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read passphrase from stdin")?;
    let passphrase = input.lines().next().unwrap_or_default();
    let hash = PassphraseHasher::new(HashParams::default()).hash_passphrase(passphrase)?;
    println!("{}", hash.expose());
    Ok(())
}

fn format_time(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}
