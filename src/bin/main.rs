use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use koebashi::bridge::{Bridge, EventLoop};
use koebashi::config::{self, BackendKind, Settings, defaults};
use koebashi::error::StartError;
use koebashi::normalize::NumberWords;
use koebashi::payload::{Base64Encoder, PayloadEncoder};
use koebashi::server;
use koebashi::{LoopbackBackend, LoopbackScript, ProcessBackend};
use log::{error, info};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// HTTP bridge to an asynchronous speech synthesis bot
#[derive(Parser)]
#[command(name = "koebashi")]
#[command(version)]
#[command(about = "HTTP bridge to an asynchronous speech synthesis bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Args)]
struct ServeArgs {
    /// Configuration file (default: $XDG_CONFIG_HOME/koebashi/koebashi.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Seconds to wait for a reply before giving up
    #[arg(long, value_name = "SECS")]
    response_timeout: Option<u64>,

    /// Backend to connect to
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default configuration
    Init {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config {
            command: ConfigCommands::Init { output, force },
        }) => match init_config(output.as_deref(), force) {
            Ok(()) => ExitCode::SUCCESS,
            Err(message) => {
                eprintln!("Error: {}", message);
                ExitCode::FAILURE
            }
        },
        None => match run(cli.serve).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(message) => {
                eprintln!("Error: {}", message);
                ExitCode::FAILURE
            }
        },
    }
}

fn init_config(output: Option<&Path>, force: bool) -> Result<(), String> {
    let template = defaults::render_template().map_err(|e| format!("failed to render template: {}", e))?;
    let Some(path) = output else {
        print!("{}", template);
        return Ok(());
    };
    if path.exists() && !force {
        return Err(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        ));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
    }
    std::fs::write(path, template).map_err(|e| format!("failed to write {}: {}", path.display(), e))?;
    eprintln!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn apply_overrides(settings: &mut Settings, args: &ServeArgs) {
    if let Some(host) = &args.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(secs) = args.response_timeout {
        settings.bridge.response_timeout_secs = secs;
    }
    if let Some(kind) = args.backend {
        settings.backend.kind = kind;
    }
}

fn launch(settings: &Settings) -> Result<(Bridge, EventLoop), StartError> {
    let encoder: Arc<dyn PayloadEncoder> = Arc::new(Base64Encoder);
    match settings.backend.kind {
        BackendKind::Loopback => {
            let script = LoopbackScript::new().reply_delay(settings.backend.reply_delay());
            Bridge::launch(
                move || LoopbackBackend::connect(script),
                encoder,
                &settings.bridge,
            )
        }
        BackendKind::Process => {
            let cmd = settings.backend.cmd.clone();
            Bridge::launch(
                move || async move { ProcessBackend::spawn(&cmd).await },
                encoder,
                &settings.bridge,
            )
        }
    }
}

async fn run(args: ServeArgs) -> Result<(), String> {
    let mut settings = config::load_settings(args.config.as_deref()).map_err(|e| e.to_string())?;
    apply_overrides(&mut settings, &args);
    settings.validate().map_err(|e| e.to_string())?;

    let launch_settings = settings.clone();
    let (bridge, event_loop) = tokio::task::spawn_blocking(move || launch(&launch_settings))
        .await
        .map_err(|e| format!("startup task failed: {}", e))?
        .map_err(|e| format!("failed to start bridge: {}", e))?;
    info!("Bridge ready ({:?} backend)", settings.backend.kind);

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            // Joining the loop thread blocks, keep it off the async workers
            let _ = tokio::task::spawn_blocking(move || event_loop.shutdown()).await;
            return Err(format!("failed to bind {}: {}", address, e));
        }
    };

    let cancel_token = CancellationToken::new();
    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let router = server::router(bridge, Arc::new(NumberWords));
    let served = server::serve(listener, router, cancel_token).await;

    let _ = tokio::task::spawn_blocking(move || event_loop.shutdown()).await;
    served.map_err(|e| format!("server error: {}", e))
}
