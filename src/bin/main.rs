//! reportkit CLI - Serve and inspect report sites
//!
//! Usage:
//!   reportkit serve [--config <file>] [--port <port>]
//!   reportkit check [--config <file>]
//!   reportkit reports --site <label> --user <id> [--config <file>]
//!
//! Examples:
//!   reportkit serve --config reportkit.toml --port 8080
//!   reportkit check
//!   reportkit reports --site orders --user alice

use clap::{Parser, Subcommand};
use reportkit::config::Settings;
use reportkit::site::SiteRegistry;
use reportkit::store::Store;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reportkit")]
#[command(about = "reportkit - Build, save and recall ad-hoc reports over record collections")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to the standard search locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on (overrides [server] port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate every configured report site
    Check,

    /// List a user's saved reports for a site
    Reports {
        /// Site label
        #[arg(short, long)]
        site: String,

        /// Owning user
        #[arg(short, long)]
        user: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reportkit=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match Settings::load_from(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Serve { port } => cmd_serve(settings, port),
        Commands::Check => cmd_check(&settings),
        Commands::Reports { site, user } => cmd_reports(&settings, &site, &user),
    }
}

fn open_store(settings: &Settings) -> Result<Store, String> {
    let path = settings
        .storage
        .resolved_path()
        .map_err(|e| format!("Error resolving storage path: {}", e))?;
    Store::open(&path).map_err(|e| format!("Error opening store '{}': {}", path.display(), e))
}

#[cfg(feature = "web")]
fn cmd_serve(mut settings: Settings, port: Option<u16>) -> ExitCode {
    use reportkit::web::{serve, AppState};
    use std::sync::Arc;

    if let Some(port) = port {
        settings.server.port = port;
    }

    let registry = match SiteRegistry::from_settings(&settings) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if registry.is_empty() {
        tracing::warn!("no report sites configured");
    }

    let store = match open_store(&settings) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let state = Arc::new(AppState::new(registry, store));
    let addr = settings.server.address();

    println!("reportkit");
    println!("   URL: http://{}", addr);
    for label in state.registry.labels() {
        println!("   Site: http://{}/{}", addr, label);
    }
    println!();
    println!("   Press Ctrl+C to stop");

    match runtime.block_on(serve(state, &addr)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(feature = "web"))]
fn cmd_serve(_settings: Settings, _port: Option<u16>) -> ExitCode {
    eprintln!("This build of reportkit was compiled without the `web` feature");
    ExitCode::FAILURE
}

fn cmd_check(settings: &Settings) -> ExitCode {
    if settings.sites.is_empty() {
        println!("No report sites configured.");
        return ExitCode::SUCCESS;
    }

    match SiteRegistry::from_settings(settings) {
        Ok(registry) => {
            for label in registry.labels() {
                if let Some(site) = registry.get(label) {
                    println!(
                        "OK: {} ({} filters, {} records)",
                        label,
                        site.filters().fields().len(),
                        site.base_collection().len()
                    );
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_reports(settings: &Settings, site: &str, user: &str) -> ExitCode {
    let store = match open_store(settings) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let reports = match store.list_reports(site, user) {
        Ok(reports) => reports,
        Err(e) => {
            eprintln!("Error listing reports: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if reports.is_empty() {
        println!("No saved reports for {} on {}.", user, site);
        return ExitCode::SUCCESS;
    }

    println!("Reports ({}):", site);
    for report in &reports {
        let columns = report.data.columns.as_ref().map_or(0, Vec::len);
        println!("  - {} [{}] ({} columns)", report.display_name(), report.id, columns);
    }
    ExitCode::SUCCESS
}
