mod ai;
mod app_state;
mod cli;
mod error;
mod github;
mod hooks;
mod pipeline;
mod rate_limit;
mod repo_config;
mod routes;
mod utils;

#[cfg(test)]
mod test_support;

use clap::Parser;
use dotenvy::dotenv;
use std::error::Error;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::app_state::build_app_state;
use crate::cli::{Cli, Command, ServeArgs, WebhookArgs};
use crate::github::GitHubClient;
use crate::hooks::{GitHookManager, HookManager};
use crate::routes::build_router;

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Check { url } => check(&url).await,
        Command::InstallHooks { repo, server } => {
            let paths = GitHookManager::local().install_hooks(&repo, &server).await?;
            for path in paths {
                println!("installed {}", path.display());
            }
            Ok(())
        }
        Command::RemoveHooks { repo } => {
            let removed = GitHookManager::local().remove_hooks(&repo).await?;
            println!("removed {removed} hook(s)");
            Ok(())
        }
        Command::RegisterWebhook(args) => {
            let (manager, args) = webhook_manager(args)?;
            let id = manager
                .register_webhook(&args.owner, &args.repo, &args.server)
                .await?;
            println!("webhook {id} active for {}/{}", args.owner, args.repo);
            Ok(())
        }
        Command::DeregisterWebhook(args) => {
            let (manager, args) = webhook_manager(args)?;
            let deleted = manager
                .deregister_webhook(&args.owner, &args.repo, &args.server)
                .await?;
            println!("deleted {deleted} webhook(s) from {}/{}", args.owner, args.repo);
            Ok(())
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "prwright=debug" } else { "prwright=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn webhook_manager(args: WebhookArgs) -> Result<(GitHookManager, WebhookArgs), BoxError> {
    let client = GitHubClient::new(&args.github.github_api_url, &args.github.github_token)?;
    let manager = GitHookManager::with_github(client, args.webhook_secret.clone());
    Ok((manager, args))
}

async fn serve(args: ServeArgs) -> Result<(), BoxError> {
    let app_state = Arc::new(build_app_state(&args)?);
    let limits = app_state.limiter().settings();
    info!(
        per_second = limits.per_second,
        burst = limits.burst,
        purge_secs = limits.purge_interval.as_secs(),
        "rate limiter configured"
    );
    let purge_task = app_state.limiter().spawn_purge_task();

    let app = build_router(app_state);

    let addr = args.bind_addr();
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    tokio::spawn(self_check(addr));

    // Fires once the shutdown signal arrives so the grace timer can start.
    let stopping = Arc::new(Notify::new());
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(Arc::clone(&stopping)))
    .into_future();

    let grace = args.shutdown_grace();
    let result = tokio::select! {
        result = server => result,
        _ = async {
            stopping.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_secs = grace.as_secs(), "in-flight requests did not finish, forcing shutdown");
            Ok(())
        }
    };

    purge_task.abort();
    result?;
    info!("server stopped");
    Ok(())
}

/// Logs whether the server answers on its own `/health` shortly after bind.
async fn self_check(addr: SocketAddr) {
    tokio::time::sleep(Duration::from_millis(200)).await;
    let host = if addr.ip().is_unspecified() {
        SocketAddr::from(([127, 0, 0, 1], addr.port()))
    } else {
        addr
    };

    match probe_health(&format!("http://{host}")).await {
        Ok(()) => info!("health self-check passed"),
        Err(e) => error!(error = %e, "health self-check failed"),
    }
}

async fn probe_health(base_url: &str) -> Result<(), BoxError> {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let response = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?
        .get(&url)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!("{url} returned {}", response.status()).into());
    }
    Ok(())
}

async fn check(url: &str) -> Result<(), BoxError> {
    probe_health(url).await?;
    println!("{url} is healthy");
    Ok(())
}

async fn shutdown_signal(stopping: Arc<Notify>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
    stopping.notify_one();
}
