// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use zonegate::{
    backends::build_backends,
    config::Config,
    constants::TOKIO_WORKER_THREADS,
    context::{Context, Queues},
    http,
    store::Store,
    upstream::UpstreamClient,
    workers::{join_workers, spawn_workers},
};

/// DNS control-plane daemon between a hosting control panel and
/// authoritative DNS backends.
#[derive(Debug, Parser)]
#[command(name = "zonegate", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("zonegate")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging with custom format
///
/// Respects `RUST_LOG` environment variable if set, otherwise defaults to INFO level.
/// Respects `RUST_LOG_FORMAT` environment variable for output format (json or text).
fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting zonegate DNS control-plane daemon");
    debug!("Logging initialized with file and line number tracking");
}

/// Best-effort registration of this node as an extra DNS server on every
/// configured upstream.
///
/// Registration failures are logged and retried implicitly on the next
/// daemon start; they never block startup.
async fn register_with_upstreams(ctx: &Arc<Context>) {
    let self_url = &ctx.config.node.advertise_url;
    if self_url.is_empty() {
        debug!("No advertise URL configured, skipping upstream registration");
        return;
    }

    for upstream_config in &ctx.config.upstreams {
        let client = UpstreamClient::new(ctx.http_client.clone(), upstream_config);
        match client
            .ensure_extra_dns_server(
                self_url,
                &ctx.config.auth.app_username,
                &ctx.config.auth.app_password,
            )
            .await
        {
            Ok(()) => debug!(upstream = %upstream_config.hostname, "Upstream registration ensured"),
            Err(e) => warn!(
                upstream = %upstream_config.hostname,
                error = %e,
                "Upstream registration failed, continuing"
            ),
        }
    }
}

async fn async_main() -> Result<()> {
    initialize_logging();
    let cli = Cli::parse();

    // Startup order: config, datastore, queues, backends, context. A
    // failure here is unrecoverable and exits non-zero.
    let config = Config::load(cli.config.as_deref())?;
    info!(
        hostname = %config.node.hostname,
        backends = config.backends.len(),
        upstreams = config.upstreams.len(),
        peers = config.peers.urls.len(),
        "Configuration resolved"
    );

    let store = Store::open(&config.store.database_url).await?;
    let queues = Queues::open(&config.queues.dir)?;
    let backends = build_backends(&config.backends).await?;
    if backends.is_empty() {
        warn!("No enabled backends configured; pushes will queue but reach nothing");
    }

    let ctx = Arc::new(Context::new(config, store, queues, backends)?);

    register_with_upstreams(&ctx).await;

    let worker_handles = spawn_workers(&ctx);
    let mut server_handle = tokio::spawn(http::serve(ctx.clone()));
    let mut server_done = false;

    // Run until a signal arrives or the server fails to start.
    let shutdown_result: Result<()> = tokio::select! {
        // Monitor for SIGINT (Ctrl+C)
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            result.map_err(anyhow::Error::from)
        }

        // Monitor for SIGTERM (init systems send this on stop)
        result = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                sigterm.recv().await;
                Ok::<(), anyhow::Error>(())
            }
            #[cfg(not(unix))]
            {
                // On non-Unix platforms, just wait forever
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            }
        } => {
            info!("Received SIGTERM, initiating graceful shutdown...");
            result
        }

        // The server only returns early on a startup failure (port bind)
        // or a fatal serve error.
        result = &mut server_handle => {
            server_done = true;
            match result {
                Ok(Ok(())) => {
                    error!("Ingress server exited unexpectedly");
                    anyhow::bail!("ingress server exited unexpectedly")
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Ingress server failed");
                    Err(e)
                }
                Err(e) => {
                    error!(error = %e, "Ingress server task panicked");
                    Err(anyhow::Error::from(e))
                }
            }
        }
    };

    // Shutdown order: stop accepting ingress, drain in-flight handlers up
    // to the grace deadline, signal workers, join all tasks, then drop
    // (close) the datastore and queues with the context.
    ctx.trigger_shutdown();
    if !server_done {
        match tokio::time::timeout(zonegate::constants::SHUTDOWN_GRACE, &mut server_handle).await {
            Ok(_) => debug!("Ingress server drained"),
            Err(_) => warn!("Ingress server did not drain within the grace period"),
        }
    }
    join_workers(worker_handles).await;

    shutdown_result?;
    info!("Graceful shutdown completed successfully");
    Ok(())
}
