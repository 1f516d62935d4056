mod session_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Result, bail},
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    wabridge_config::BridgeConfig,
    wabridge_gateway::{AppState, start_gateway},
    wabridge_whatsapp::{Bridge, SidecarProvider},
};

#[derive(Parser)]
#[command(name = "wabridge", about = "wabridge: WhatsApp session to HTTP and webhook bridge")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (toml, yaml or json). Discovered automatically when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default).
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Delete stored session credentials. Run while the bridge is stopped.
    ResetSession,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    match &cli.config {
        Some(path) => {
            let mut config = wabridge_config::load_config(path)?;
            wabridge_config::env::apply_process_env(&mut config);
            Ok(config)
        },
        None => Ok(wabridge_config::discover_and_load()),
    }
}

async fn serve(mut config: BridgeConfig, bind: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let Some(provider) = SidecarProvider::from_config(&config.transport) else {
        bail!("no transport configured: set transport.command or WABRIDGE_TRANSPORT_CMD");
    };
    let bridge = Bridge::new(&config, Arc::new(provider))?;
    let supervisor = bridge.spawn();

    let state = AppState::new(bridge.clone(), config.send.token.clone());
    let served = start_gateway(&config.server, state, shutdown_signal()).await;

    bridge.lifecycle.shutdown().await;
    if let Err(e) = supervisor.await {
        warn!(error = %e, "lifecycle supervisor ended abnormally");
    }
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "wabridge starting");
    let config = load_config(&cli)?;

    match cli.command {
        None => serve(config, None, None).await,
        Some(Commands::Serve { bind, port }) => serve(config, bind, port).await,
        Some(Commands::ResetSession) => session_commands::reset_session(&config).await,
    }
}
