//! scopus-trends - bibliometric trend charts from Scopus exports
//!
//! Reads a configuration directory (one CSV per sheet), works out which
//! query/variant exports are needed, and prepares chart figures from the
//! downloaded files.
//!
//! ## Usage
//!
//! ### Requirement manifest
//! ```bash
//! scopus-trends collect --config config
//! ```
//!
//! ### Download plan for the exporter
//! ```bash
//! scopus-trends plan --config config --files-dir files
//! ```
//!
//! ### Charts
//! ```bash
//! scopus-trends plot --config config --files-dir files --output outputs
//! ```
//!
//! ### HTTP lookup service
//! ```bash
//! scopus-trends serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use clap::{Args, Parser, Subcommand};
use scopus_trends::{
    collector::{Manifest, MANIFEST_FILE},
    config::{Overrides, Project},
    fetch::{self, TaskStatus, PLAN_FILE},
    file_map::FileMap,
    render::{self, JsonFigureWriter, REPORT_FILE},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Bibliometric trend charts from Scopus filter-count exports
#[derive(Parser)]
#[command(name = "scopus-trends")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand
#[derive(Args, Clone)]
struct ProjectArgs {
    /// Configuration directory (one CSV file per sheet)
    #[arg(short, long, default_value = "config")]
    config: PathBuf,

    /// Directory holding the downloaded exports
    #[arg(long, default_value = "files")]
    files_dir: PathBuf,

    /// Expand unknown variant names without a filter instead of failing
    #[arg(long)]
    lenient_variants: bool,
}

impl ProjectArgs {
    fn load(&self, theme: Option<String>) -> Result<Project> {
        let overrides = Overrides {
            theme,
            lenient_variants: self.lenient_variants,
        };
        Project::load(&self.config, &overrides)
            .with_context(|| format!("Failed to load configuration from {}", self.config.display()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write the deduplicated requirement manifest
    Collect {
        #[command(flatten)]
        project: ProjectArgs,

        /// Manifest output path
        #[arg(short, long, default_value = MANIFEST_FILE)]
        manifest: PathBuf,
    },

    /// Write the download plan and list exports still to fetch
    Plan {
        #[command(flatten)]
        project: ProjectArgs,

        /// Plan output path
        #[arg(long, default_value = PLAN_FILE)]
        out: PathBuf,
    },

    /// Prepare every configured chart from the downloaded exports
    Plot {
        #[command(flatten)]
        project: ProjectArgs,

        /// Output directory for figures and the run report
        #[arg(short, long, default_value = "outputs")]
        output: PathBuf,

        /// Plot template, overrides the `template` setting
        #[arg(long)]
        theme: Option<String>,
    },

    /// Serve the manifest and file map over HTTP
    Serve {
        #[command(flatten)]
        project: ProjectArgs,

        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Collect { project, manifest } => run_collect(&project, &manifest),
        Commands::Plan { project, out } => run_plan(&project, &out),
        Commands::Plot {
            project,
            output,
            theme,
        } => run_plot(&project, &output, theme),
        Commands::Serve {
            project,
            port,
            host,
        } => run_server(&project, host, port).await,
    }
}

// ============================================================================
// Collect & Plan
// ============================================================================

fn run_collect(args: &ProjectArgs, manifest_path: &Path) -> Result<()> {
    let project = args.load(None)?;
    project
        .manifest
        .write_csv(manifest_path)
        .context("Failed to write manifest")?;

    println!(
        "Saved {} unique requirements to {}",
        project.manifest.len(),
        manifest_path.display()
    );
    Ok(())
}

fn run_plan(args: &ProjectArgs, out: &Path) -> Result<()> {
    let project = args.load(None)?;
    let tasks = fetch::plan(&project.manifest, &args.files_dir)?;
    fetch::write_plan(&tasks, out).context("Failed to write download plan")?;

    let pending: Vec<_> = tasks.iter().filter(|t| t.status == TaskStatus::Pending).collect();
    println!(
        "{} requirements, {} already downloaded, {} pending",
        tasks.len(),
        tasks.len() - pending.len(),
        pending.len()
    );
    for task in pending {
        println!("  {} -> {}", task.requirement(), task.target.display());
        println!("      {}", task.search_url);
    }
    println!("Plan saved to {}", out.display());
    Ok(())
}

// ============================================================================
// Charts
// ============================================================================

fn run_plot(args: &ProjectArgs, output: &Path, theme: Option<String>) -> Result<()> {
    let project = args.load(theme)?;
    let files = project.file_map(&args.files_dir)?;

    let missing = fetch::plan(&project.manifest, &args.files_dir)?
        .into_iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .count();
    if missing > 0 {
        warn!(missing, "Some exports are not downloaded yet; charts using them will fail");
    }

    std::fs::create_dir_all(output).context("Failed to create output directory")?;
    let mut writer = JsonFigureWriter::new(output)?;
    let report = render::render_all(&project.tables, &files, &project.render_options(), &mut writer);

    let report_path = output.join(REPORT_FILE);
    report
        .write_json(&report_path)
        .context("Failed to write run report")?;

    println!("Rendered {} charts. Report: {}", report.rendered(), report_path.display());

    let failed: Vec<_> = report.failed().collect();
    if !failed.is_empty() {
        for outcome in &failed {
            if let render::UnitStatus::Failed { error } = &outcome.status {
                eprintln!("  [{}] {}: {}", outcome.kind.sheet_name(), outcome.title, error);
            }
        }
        anyhow::bail!("{} charts failed", failed.len());
    }
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(args: &ProjectArgs, host: String, port: u16) -> Result<()> {
    let project = args.load(None)?;
    let files = project.file_map(&args.files_dir)?;

    info!(
        host = %host,
        port = port,
        files_dir = %files.files_dir().display(),
        requirements = files.len(),
        "Starting HTTP server"
    );
    println!("Starting server at http://{}:{}", host, port);

    let app_state = Arc::new(AppState {
        manifest: project.manifest,
        files,
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/manifest", get(manifest_handler))
        .route("/resolve", get(resolve_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

/// Read-only snapshot shared by all handlers
struct AppState {
    manifest: Manifest,
    files: FileMap,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Manifest endpoint
async fn manifest_handler(State(state): State<Arc<AppState>>) -> Json<Manifest> {
    Json(state.manifest.clone())
}

#[derive(Debug, Deserialize)]
struct ResolveParams {
    query: String,
    vars: String,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    query_name: String,
    vars: String,
    path: PathBuf,
    exists: bool,
}

/// Resolve endpoint: query/variant → export path
async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResolveParams>,
) -> Result<Json<ResolveResponse>, (StatusCode, String)> {
    match state.files.resolve(&params.query, &params.vars) {
        Ok(path) => Ok(Json(ResolveResponse {
            exists: path.is_file(),
            path: path.to_path_buf(),
            query_name: params.query,
            vars: params.vars,
        })),
        Err(e) => {
            warn!(query = %params.query, vars = %params.vars, error = %e, "Resolve failed");
            Err((StatusCode::NOT_FOUND, e.to_string()))
        }
    }
}
