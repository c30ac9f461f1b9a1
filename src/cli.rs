use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::ai::openai;
use crate::github::client::DEFAULT_API_URL;
use crate::rate_limit::{RateLimitSettings, DEFAULT_BURST, DEFAULT_PURGE_INTERVAL, DEFAULT_RATE_PER_SECOND};

#[derive(Debug, Parser)]
#[command(name = "prwright", version, about = "Opens AI-drafted pull requests on push")]
pub struct Cli {
    /// Verbose logging (overridden by RUST_LOG).
    #[arg(long, global = true, env = "DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the webhook server in the foreground.
    Serve(ServeArgs),
    /// Probe a running server's /health endpoint.
    Check {
        #[arg(long, env = "PRWRIGHT_URL", default_value = "http://localhost:8080")]
        url: String,
    },
    /// Install the push hooks into a local repository.
    InstallHooks {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long, env = "PRWRIGHT_URL", default_value = "http://localhost:8080")]
        server: String,
    },
    /// Remove previously installed hooks.
    RemoveHooks {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },
    /// Create a GitHub push webhook pointing at this server.
    RegisterWebhook(WebhookArgs),
    /// Delete the push webhook created by `register-webhook`.
    DeregisterWebhook(WebhookArgs),
}

#[derive(Debug, Args)]
pub struct WebhookArgs {
    #[arg(long)]
    pub owner: String,
    #[arg(long)]
    pub repo: String,
    /// Public base URL of the server; `/push` is appended.
    #[arg(long, env = "PRWRIGHT_URL")]
    pub server: String,
    #[command(flatten)]
    pub github: GitHubArgs,
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct GitHubArgs {
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub github_api_url: String,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Port to listen on; ignored when --bind is given.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
    #[arg(long = "bind", env = "BIND_ADDR")]
    pub bind_addr: Option<SocketAddr>,

    #[command(flatten)]
    pub github: GitHubArgs,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,
    #[arg(long, env = "OPENAI_BASE_URL", default_value = openai::DEFAULT_BASE_URL)]
    pub openai_base_url: String,
    #[arg(long, env = "OPENAI_MODEL", default_value = openai::DEFAULT_MODEL)]
    pub openai_model: String,

    /// When set, requests carrying `X-Hub-Signature-256` must verify.
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    #[arg(
        long,
        env = "RATE_LIMIT_PER_SECOND",
        default_value_t = DEFAULT_RATE_PER_SECOND,
        value_parser = positive_rate
    )]
    pub rate_limit_per_second: f64,
    #[arg(
        long,
        env = "RATE_LIMIT_BURST",
        default_value_t = DEFAULT_BURST,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub rate_limit_burst: u32,
    #[arg(
        long,
        env = "RATE_LIMIT_PURGE_SECS",
        default_value_t = DEFAULT_PURGE_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub rate_limit_purge_secs: u64,

    /// Comma-separated labels applied to every created PR.
    #[arg(long, env = "PR_LABELS", value_delimiter = ',', default_value = "automated-pr")]
    pub pr_labels: Vec<String>,

    #[arg(long, env = "PIPELINE_TIMEOUT_SECS", default_value_t = 120)]
    pub pipeline_timeout_secs: u64,
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 30)]
    pub shutdown_grace_secs: u64,
}

/// Finite and strictly positive; anything else cannot drive a refill clock.
fn positive_rate(raw: &str) -> Result<f64, String> {
    let rate: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(format!("expected a positive, finite rate, got {raw}"))
    }
}

impl ServeArgs {
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], self.port)))
    }

    pub fn rate_limit(&self) -> RateLimitSettings {
        RateLimitSettings {
            per_second: self.rate_limit_per_second,
            burst: self.rate_limit_burst,
            purge_interval: Duration::from_secs(self.rate_limit_purge_secs),
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.pr_labels
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
