//! Polyrun CLI
//!
//! Serves the build/run HTTP API and offers a few helpers for working with
//! the configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polyrun::{
    Config, DockerRuntime, EXAMPLE_CONFIG, HttpServer, Runner, SandboxOrchestrator,
    SubmissionKey, WorkspaceStore,
};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polyrun")]
#[command(about = "Build and run submitted code in ephemeral containers")]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to bind (overrides the configuration)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides the configuration)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not pull language images before serving
        #[arg(long)]
        skip_pull: bool,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path (default: polyrun.toml)
        #[arg(short, long, default_value = "polyrun.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// List available languages
    Languages,

    /// Show effective configuration
    ShowConfig,

    /// Print the submission key of a source file
    Key {
        /// Source file
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., c, python)
        #[arg(short, long)]
        language: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Commands::Init { output, force } = &cli.command {
        return init_config(output, *force).await;
    }

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            skip_pull,
        } => serve(config, host, port, skip_pull).await,
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
        Commands::Key { source, language } => print_key(&config, &source, &language).await,
        Commands::Init { .. } => Ok(()),
    }
}

async fn serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    skip_pull: bool,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let runtime = DockerRuntime::connect(&config.docker).context("failed to connect to docker")?;
    runtime
        .ping()
        .await
        .context("docker daemon is not reachable")?;
    let orchestrator = SandboxOrchestrator::new(Arc::new(runtime));

    if config.docker.pull_on_startup && !skip_pull {
        orchestrator
            .pull_images(&config)
            .await
            .context("failed to pull language images")?;
    } else {
        debug!("skipping image pull");
    }

    let store = WorkspaceStore::open(&config.workspace_root)
        .await
        .context("failed to open workspace root")?;
    info!(root = %store.root().display(), languages = config.languages.len(), "ready");

    let runner = Runner::new(Arc::new(config), store, orchestrator);
    HttpServer::new(runner)
        .run(shutdown_signal())
        .await
        .context("server stopped with an error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);

    for (id, lang) in languages {
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {:<12} {} ({})", id, lang.name, lang.image, lang_type);
    }
}

fn show_config(config: &Config) {
    let server = &config.server;
    println!("Server:");
    println!("  Address: {}:{}", server.host, server.port);
    println!("  Expose error details: {}", server.expose_error_details);
    match server.job_timeout() {
        Some(timeout) => println!("  Job timeout: {timeout:?}"),
        None => println!("  Job timeout: none"),
    }
    println!("  Max line bytes: {}", server.max_line_bytes);
    println!("  Stream buffer: {} lines", server.stream_buffer);
    println!();
    println!("Docker:");
    println!(
        "  Socket: {}",
        config.docker.socket.as_deref().unwrap_or("local defaults")
    );
    println!("  Pull on startup: {}", config.docker.pull_on_startup);
    println!();
    println!("Workspace root: {}", config.workspace_root.display());
    println!("Languages configured: {}", config.languages.len());
    println!("Images: {}", config.images().join(", "));
}

async fn print_key(config: &Config, source: &Path, language_id: &str) -> Result<()> {
    let language = config
        .get_language(language_id)
        .context("unknown language")?;

    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let key = SubmissionKey::compute(language_id, &code);
    println!("{key}");
    debug!(
        workspace = %config.workspace_root.join(key.as_str()).display(),
        source = %language.source_name,
        "workspace location"
    );
    Ok(())
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
