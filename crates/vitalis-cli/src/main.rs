//! Vitalis CLI.
//!
//! Reads a clinical request as JSON and prints the result as JSON on stdout.
//! Logs go to stderr; set `RUST_LOG` to change the level.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vitalis_core::{ClinicalRequest, DeterministicRiskScorer};
use vitalis_runtime::{DecisionEngine, ProviderRegistry, RuntimeConfig};

#[derive(Debug, Parser)]
#[command(name = "vitalis", version, about = "Hybrid clinical decision support")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the local evidence for a request without contacting any backend
    Score {
        /// Request JSON file, or `-` for stdin
        request: PathBuf,
    },

    /// Run the full engine and print the decision
    Decide {
        /// Runtime configuration (YAML); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Overall deadline, e.g. `20s`; overrides the configured one
        #[arg(long, value_parser = humantime_duration)]
        deadline: Option<Duration>,

        /// Also print the attempt log
        #[arg(long)]
        trace: bool,

        /// Request JSON file, or `-` for stdin
        request: PathBuf,
    },

    /// Validate the configuration and print the fallback chain with each
    /// backend's readiness
    Chain {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn humantime_duration(raw: &str) -> Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|e| format!("invalid duration '{}': {}", raw, e))
}

fn read_request(path: &Path) -> Result<ClinicalRequest> {
    let json = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("failed to read request from stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request {}", path.display()))?
    };
    let request = ClinicalRequest::from_json(&json).context("invalid request")?;
    tracing::debug!(operation = %request.operation(), path = %path.display(), "Request loaded");
    Ok(request)
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Score { request } => {
            let request = read_request(&request)?;
            let evidence = DeterministicRiskScorer::new().assess(&request);
            print_json(&evidence)
        }
        Command::Decide {
            config,
            deadline,
            trace,
            request,
        } => {
            let config = load_config(config.as_deref())?;
            let request = read_request(&request)?;
            let engine = DecisionEngine::from_config(&config, &ProviderRegistry::with_defaults())
                .context("failed to build decision engine")?;

            let decision = engine.decide_with_trace(&request, deadline).await;
            if trace {
                print_json(&serde_json::json!({
                    "result": decision.result,
                    "attempts": decision.attempts,
                }))
            } else {
                print_json(&decision.result)
            }
        }
        Command::Chain { config } => {
            let config = load_config(config.as_deref())?;
            let registry = ProviderRegistry::with_defaults();
            config
                .validate_with(&registry)
                .context("invalid provider configuration")?;
            let chain = config.build_chain(&registry)?;

            let mut backends = Vec::with_capacity(chain.len());
            for slot in chain.slots() {
                let ready = slot.provider().health_check().await;
                if !ready {
                    tracing::warn!(provider = slot.provider().name(), model = slot.model(), "Backend not ready");
                }
                backends.push(serde_json::json!({
                    "provider": slot.provider().name(),
                    "model": slot.model(),
                    "ready": ready,
                }));
            }

            print_json(&serde_json::json!({
                "provider": config.provider.kind,
                "backends": backends,
                "max_attempts_per_model": config.retry.max_attempts(),
                "backoff": config.retry.backoff().map(|d| format!("{:?}", d)).collect::<Vec<_>>(),
                "call_timeout": format!("{:?}", config.completion.call_timeout),
            }))
        }
    }
}
