use clap::Parser;
use nginx_testing::cli::{Cli, RunOptions};
use nginx_testing::config::{self, Settings};
use nginx_testing::{
    AccessLog, ConfigSource, ErrorLog, ExitHooks, NginxOptions, NginxServer, TracingLogger,
    start_nginx, watch,
};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const LIVENESS_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.settings {
        Some(path) => config::load_settings(path)?,
        None => Settings::default(),
    };
    run(cli.merge(settings)).await
}

async fn run(opts: RunOptions) -> color_eyre::Result<()> {
    let hooks = ExitHooks::new();

    let mut options = NginxOptions {
        config_path: Some(opts.conf_file.clone()),
        bin_path: opts.bin_path.clone(),
        ports: opts.ports.clone(),
        preferred_ports: opts.preferred_ports.clone(),
        work_dir: opts.work_dir.clone(),
        error_log: ErrorLog::Inherit,
        access_log: AccessLog::writer(tokio::io::stdout()),
        logger: Arc::new(TracingLogger),
        exit_hooks: Some(hooks.clone()),
        ..NginxOptions::default()
    };
    if let Some(address) = &opts.bind_address {
        options.bind_address = address.clone();
    }
    if let Some(timeout) = opts.start_timeout {
        options.start_timeout = timeout;
    }
    let bind_address = options.bind_address.clone();

    let mut server = start_nginx(options).await?;
    eprintln!(
        "{} nginx {} listening on {}, press Ctrl+C to terminate it",
        "started".green().bold(),
        server.version_info().version,
        server
            .ports()
            .iter()
            .map(|port| format!("http://{bind_address}:{port}").bold().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );

    let mut watch_paths = opts.watch.clone();
    watch_paths.push(opts.conf_file.clone());
    let (changes_tx, mut changes_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let watcher = watch::spawn_watcher(
        &watch_paths,
        &[server.config_path().to_path_buf()],
        opts.watch_delay,
        changes_tx,
        shutdown_rx,
    );
    let watcher = match watcher {
        Ok(handle) => handle,
        Err(e) => {
            server.stop().await;
            return Err(e.into());
        }
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut terminate = terminate_signal()?;
    let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("terminating...");
                hooks.run().await;
                break;
            }
            _ = terminate.recv() => {
                tracing::info!("terminating...");
                hooks.run().await;
                break;
            }
            Some(()) = changes_rx.recv() => reload(&mut server, &opts).await,
            _ = liveness.tick() => {
                if !server.is_running().await {
                    tracing::error!("nginx process has died");
                    break;
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = watcher.await;
    server.stop().await;
    Ok(())
}

/// Renders the changed config and tells nginx to pick it up.
async fn reload(server: &mut NginxServer, opts: &RunOptions) {
    tracing::info!("change detected, reloading nginx");
    if let Err(e) = server
        .rewrite_config(ConfigSource::Path(opts.conf_file.clone()))
        .await
    {
        tracing::error!("{e}");
        return;
    }
    if let Err(e) = server.send_reload_signal().await {
        tracing::error!("{e}");
    }
}

#[cfg(unix)]
fn terminate_signal() -> std::io::Result<Terminate> {
    let signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    Ok(Terminate(signal))
}

#[cfg(not(unix))]
fn terminate_signal() -> std::io::Result<Terminate> {
    Ok(Terminate)
}

#[cfg(unix)]
struct Terminate(tokio::signal::unix::Signal);

#[cfg(not(unix))]
struct Terminate;

impl Terminate {
    #[cfg(unix)]
    async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}
