use std::path::Path;
use std::sync::Arc;

use dlpgate::cli::{Cli, Commands, ExportFormat, CONFIG_TEMPLATE};
use dlpgate::config::{AppConfig, LogFormat, LoggingConfig, StorageConfig};
use dlpgate::metrics;
use dlpgate::scan::{NightfallClient, Scanner};
use dlpgate::store;
use dlpgate::watcher::FileWatcher;
use dlpgate::web::{self, AppState};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen } => {
            cmd_serve(&cli.config, listen).await?;
        }
        Commands::Watch { path } => {
            cmd_watch(&cli.config, path.as_deref()).await?;
        }
        Commands::Scan { file } => {
            cmd_scan(&cli.config, &file).await?;
        }
        Commands::Metrics { export, format } => {
            cmd_metrics(&cli.config, export, format)?;
        }
        Commands::Init { force } => {
            cmd_init(&cli.config, force)?;
        }
    }

    Ok(())
}

fn load_config(config_path: &Path) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load(config_path)?;
    init_tracing(&config.logging);
    Ok(config)
}

async fn cmd_serve(config_path: &Path, listen: Option<String>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let listen = listen.unwrap_or_else(|| config.server.listen.clone());
    let state = Arc::new(AppState::from_config(&config)?);

    println!("dlpgate starting...");
    println!("Listen:   {}", listen);
    println!("Objects:  {}", config.storage.root.display());
    println!("Database: {}", config.storage.database.display());

    tokio::select! {
        res = web::start(&listen, state) => res?,
        _ = tokio::signal::ctrl_c() => println!("\nShutting down..."),
    }
    Ok(())
}

async fn cmd_watch(config_path: &Path, path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let root = path.unwrap_or(config.watcher.path.as_path()).to_path_buf();
    let scanner: Arc<dyn Scanner> = Arc::new(NightfallClient::from_config(&config.nightfall));
    let watcher = FileWatcher::from_config(&config, scanner)?;

    println!("Watching {} (Ctrl-C to stop)", root.display());
    tokio::select! {
        res = watcher.run(&root) => res?,
        _ = tokio::signal::ctrl_c() => println!("\nShutting down..."),
    }
    Ok(())
}

async fn cmd_scan(config_path: &Path, file: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let Some(policy_uuid) = config.nightfall.policy_uuid.as_deref() else {
        anyhow::bail!("nightfall.policy_uuid must be set to scan files");
    };
    let data = tokio::fs::read(file).await?;
    let client = NightfallClient::from_config(&config.nightfall);
    let scan = client.scan_file(&data, policy_uuid).await?;

    println!("Submitted {} ({} bytes)", file.display(), data.len());
    println!("Upload id: {}", scan.id);
    if let Some(message) = scan.message {
        println!("Message:   {}", message);
    }
    Ok(())
}

fn cmd_metrics(config_path: &Path, export: bool, format: ExportFormat) -> anyhow::Result<()> {
    let storage = match AppConfig::load(config_path) {
        Ok(config) => config.storage,
        Err(e) => {
            eprintln!("Config unavailable ({}), using default database path", e);
            StorageConfig::default()
        }
    };
    if !storage.database.exists() {
        println!("No metrics database found. Run 'dlpgate serve' first.");
        return Ok(());
    }

    let pool = store::open_pool(&storage.database)?;
    let conn = pool.get()?;

    if export {
        match format {
            ExportFormat::Csv => print!("{}", metrics::export::export_csv(&conn)?),
            ExportFormat::Json => println!("{}", metrics::export::export_json(&conn)?),
        }
        return Ok(());
    }

    let totals = metrics::query_totals(&conn)?;
    if totals.is_empty() {
        println!("No metrics recorded.");
    } else {
        println!("{:<26} {:<26} {:<26} {}", "METRIC", "DIMENSION", "VALUE", "TOTAL");
        println!("{}", "─".repeat(90));
        for t in &totals {
            println!(
                "{:<26} {:<26} {:<26} {}",
                t.name, t.dimension_name, t.dimension_value, t.total
            );
        }
    }
    Ok(())
}

fn cmd_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        println!("Config already exists: {}", config_path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }
    std::fs::write(config_path, CONFIG_TEMPLATE)?;
    println!("Created config: {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Export NIGHTFALL_API_KEY, NIGHTFALL_SIGNING_SECRET and NIGHTFALL_POLICY_UUID");
    println!("  2. Start the server:  dlpgate serve");
    println!("  3. Watch host files:  dlpgate watch /home");
    Ok(())
}
