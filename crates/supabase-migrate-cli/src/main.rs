//! supabase-migrate CLI - one-shot legacy Postgres to Supabase migration.

mod logging;

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use supabase_migrate::config::DEFAULT_BATCH_SIZE;
use supabase_migrate::{
    ColumnManifest, Config, CredentialMap, MigrateError, MigrationConfig, MigrationResult,
    Orchestrator,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "supabase-migrate")]
#[command(about = "Migrate a legacy Postgres database into Supabase")]
#[command(version)]
struct Cli {
    /// Read and log only: no identity creation, upserts or sequence resets
    #[arg(long)]
    dry_run: bool,

    /// Only copy these tables (comma-separated); users is always processed
    #[arg(long, value_delimiter = ',')]
    tables: Option<Vec<String>>,

    /// Copy at most N rows per table
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Rows per paginated read
    #[arg(long, value_name = "N", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Append timestamped log lines to this file as well
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// YAML file pinning column lists per table
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Write temporary credentials as JSON to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    credentials_file: Option<PathBuf>,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // A missing .env is fine; the variables may come from the shell.
    let _ = dotenv::dotenv();

    let migration = MigrationConfig {
        dry_run: cli.dry_run,
        batch_size: cli.batch_size,
        limit: cli.limit,
        tables: cli.tables.clone(),
        log_file: cli.log_file.clone(),
        ..Default::default()
    };

    // Configuration errors are reported before any connection attempt.
    let mut config = Config::from_env(migration)?;
    if let Some(path) = &cli.manifest {
        config = config.with_manifest(ColumnManifest::load(path)?)?;
    }

    logging::setup_logging(
        &cli.verbosity,
        &cli.log_format,
        config.migration.log_file.as_deref(),
        cli.output_json,
    )?;
    if let Some(path) = &cli.manifest {
        info!("Loaded column manifest from {:?}", path);
    }

    // From here on the log file is live, so it records why a run stopped.
    migrate(&cli, config).await.map_err(|e| {
        error!("Migration failed: {}", e);
        e
    })
}

async fn migrate(cli: &Cli, config: Config) -> Result<(), MigrateError> {
    let orchestrator = Orchestrator::connect(config).await?;
    let mut result = orchestrator.run().await?;

    if let Some(path) = &cli.credentials_file {
        let credentials = std::mem::take(&mut result.temporary_credentials);
        write_credentials(path, &credentials)?;
        info!(
            "Wrote {} temporary credentials to {:?}",
            credentials.len(),
            path
        );
    }

    if cli.output_json {
        println!("{}", result.to_json()?);
    } else {
        print_summary(&result);
    }

    Ok(())
}

fn print_summary(result: &MigrationResult) {
    let status_msg = if result.dry_run {
        "Dry run completed!"
    } else {
        "Migration completed!"
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    let copied = result.tables.iter().filter(|t| !t.skipped).count();
    println!("  Tables: {}/{}", copied, result.tables.len());
    println!("  Rows: {}", result.rows_transferred);
    println!("  Identities created: {}", result.identities_created);
    println!("  Sequences reset: {}", result.sequences.len());

    if !result.temporary_credentials.is_empty() {
        println!("\nTemporary credentials (share securely, then discard):");
        for (email, password) in result.temporary_credentials.iter() {
            println!("  {}  {}", email, password);
        }
    }
}

/// Write the credential map as JSON, readable by the owner only.
fn write_credentials(path: &Path, credentials: &CredentialMap) -> Result<(), MigrateError> {
    use std::io::Write;

    let json = serde_json::to_string_pretty(credentials)?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}
