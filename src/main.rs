use std::{
    env,
    io::ErrorKind,
    net::{IpAddr, SocketAddr, ToSocketAddrs},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use unfurl::{
    app,
    config::{Config, ListenerConfig},
    state::AppState,
};

#[derive(Parser, Debug)]
#[command(
    name = "unfurl",
    about = "Share-link resolver and media proxy",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a configuration file without starting the server.
    Validate {
        /// Path to the configuration file.
        #[arg(
            short = 'c',
            long = "config",
            value_name = "FILE",
            default_value = "config/unfurl.yaml"
        )]
        config_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_env_file()?;
    unfurl::init()?;

    match cli.command {
        Some(Command::Validate { config_path }) => {
            validate_config(&config_path)?;
            Ok(())
        }
        None => run_server().await,
    }
}

async fn run_server() -> Result<()> {
    let config = match env::var("UNFURL_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            Config::load(Some(&path)).with_context(|| {
                format!("failed to load configuration from `{}`", path.display())
            })?
        }
        Err(_) => Config::load(None).context("failed to load configuration")?,
    };

    let addr = resolve_listener_addr(&config.listen)
        .context("failed to resolve listener address from configuration")?;

    let state = AppState::new(config);
    let router = app::build_router(state);

    tracing::info!(%addr, "starting unfurl server");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| "failed to bind listener socket")?;
    let local_addr = listener
        .local_addr()
        .with_context(|| "failed to determine listener address")?;
    tracing::info!(%local_addr, "unfurl listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("unfurl shutdown complete");

    Ok(())
}

fn validate_config(path: &Path) -> Result<()> {
    Config::load(Some(path))
        .with_context(|| format!("configuration `{}` failed validation", path.display()))?;

    println!("configuration at `{}` is valid", path.display());

    Ok(())
}

fn resolve_listener_addr(listener: &ListenerConfig) -> Result<SocketAddr> {
    if let Ok(ip) = listener.host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, listener.port));
    }

    let mut addrs = (listener.host.as_str(), listener.port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve listener host `{}`", listener.host))?;
    addrs
        .next()
        .context("listener host resolved to no addresses")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to listen for ctrl+c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => tracing::warn!(%error, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}

fn load_env_file() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(err)) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod integration_tests;
