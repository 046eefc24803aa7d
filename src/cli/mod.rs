//! Command-line interface for synapse.
//!
//! `build` runs a pipeline in-process (or against a running server),
//! `serve` starts the HTTP control plane, and `logs`/`status` query a
//! running server. Each in-process invocation starts with fresh stores.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{self, ResolvedConfig};
use crate::core::orchestrator::summarize;
use crate::core::{simulate_activity, LogStore, Orchestrator, ToolRegistry};
use crate::domain::{LogEntry, LogLevel, PipelineResult};
use crate::server::{self, AppState};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

/// synapse - hierarchical build-request pipeline orchestrator
#[derive(Parser, Debug)]
#[command(name = "synapse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline for a build request
    Build {
        /// Natural-language build request
        prompt: Option<String>,

        /// Read the prompt from a file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Read the prompt from stdin
        #[arg(long)]
        stdin: bool,

        /// Send the request to a running server instead of running in-process
        #[arg(long)]
        server: Option<String>,

        /// Print a one-line summary instead of the full result
        #[arg(long)]
        summary: bool,
    },

    /// Start the HTTP control plane
    Serve {
        /// Address to bind to (defaults to the configured bind address)
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Query the log store of a running server
    Logs {
        /// Only entries from this agent
        #[arg(short, long)]
        agent: Option<String>,

        /// Only entries at this level (info, warning, error, debug)
        #[arg(short, long)]
        level: Option<LogLevel>,

        /// Maximum number of entries
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,

        /// Server base URL
        #[arg(long, env = "SYNAPSE_SERVER", default_value = DEFAULT_SERVER)]
        server: String,
    },

    /// Show the tool registry of a running server
    Status {
        /// Server base URL
        #[arg(long, env = "SYNAPSE_SERVER", default_value = DEFAULT_SERVER)]
        server: String,
    },

    /// Print the demo activity strings
    Simulate,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Build {
                prompt,
                input,
                stdin,
                server,
                summary,
            } => {
                let prompt = read_prompt(prompt, input, stdin)?;
                match server {
                    Some(url) => build_remote(&url, &prompt, summary).await,
                    None => {
                        let result = build_local(&prompt).await?;
                        print_result(&result, summary)
                    }
                }
            }
            Commands::Serve { address } => serve(address).await,
            Commands::Logs {
                agent,
                level,
                limit,
                server,
            } => show_logs(&server, agent, level, limit).await,
            Commands::Status { server } => show_status(&server).await,
            Commands::Simulate => {
                for line in simulate_activity() {
                    println!("{}", line);
                }
                Ok(())
            }
            Commands::Config => show_config(),
        }
    }
}

/// Resolve the prompt from argument, file or stdin
fn read_prompt(prompt: Option<String>, input: Option<PathBuf>, use_stdin: bool) -> Result<String> {
    let prompt = if let Some(prompt) = prompt {
        prompt
    } else if let Some(path) = input {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else if use_stdin {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    } else {
        anyhow::bail!("No prompt provided. Pass it as an argument, use --input <file> or --stdin");
    };

    Ok(prompt.trim().to_string())
}

fn orchestrator(cfg: &ResolvedConfig) -> Orchestrator {
    Orchestrator::from_config(cfg, Arc::new(LogStore::new()), Arc::new(ToolRegistry::new()))
}

/// Run in-process; ctrl-c cancels at the next stage boundary
async fn build_local(prompt: &str) -> Result<PipelineResult> {
    let cfg = config::config()?;
    let orchestrator = orchestrator(cfg);
    orchestrator.validate_prompt(prompt)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    Ok(orchestrator.run(prompt, cancel).await)
}

/// Run on a server; the result JSON is printed as received
async fn build_remote(base_url: &str, prompt: &str, summary: bool) -> Result<()> {
    let url = format!("{}/build", base_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "prompt": prompt }))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or_default();
        anyhow::bail!(
            "Server rejected build ({}): {}",
            status,
            body["reason"].as_str().unwrap_or("no reason given")
        );
    }

    let result: Value = response.json().await.context("Failed to decode build result")?;
    if summary {
        let metadata = &result["metadata"];
        println!(
            "{}",
            serde_json::json!({
                "run_id": metadata["run_id"],
                "duration_seconds": result["duration_seconds"],
                "final_state": metadata["final_state"],
                "aborted": metadata["aborted"],
                "activity": result["mcp_activity"].as_array().map_or(0, Vec::len),
            })
        );
    } else {
        print_json(&result)?;
    }

    Ok(())
}

fn print_result(result: &PipelineResult, summary: bool) -> Result<()> {
    if summary {
        println!("{}", summarize(result));
    } else {
        print_json(result)?;
    }

    if let Some(reason) = &result.metadata.aborted {
        eprintln!("\n[Run {} aborted: {}]", result.metadata.run_id, reason);
        std::process::exit(1);
    }

    eprintln!(
        "\n[Run {} completed in {:.3}s]",
        result.metadata.run_id, result.duration_seconds
    );
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// Start the HTTP server
async fn serve(address: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let bind = address.unwrap_or_else(|| cfg.bind.clone());

    if cfg.decomposition.enabled() {
        info!("Gemini decomposition enabled");
    }

    let state = AppState::new(orchestrator(cfg), cfg.default_log_limit);
    server::serve(state, &bind).await
}

async fn show_logs(
    base_url: &str,
    agent: Option<String>,
    level: Option<LogLevel>,
    limit: usize,
) -> Result<()> {
    let mut params = vec![("limit", limit.to_string())];
    if let Some(agent) = agent {
        params.push(("agent", agent));
    }
    if let Some(level) = level {
        params.push(("level", level.to_string()));
    }

    let url = format!("{}/logs", base_url.trim_end_matches('/'));
    let entries: Vec<LogEntry> = reqwest::Client::new()
        .get(&url)
        .query(&params)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?
        .error_for_status()?
        .json()
        .await
        .context("Failed to decode log entries")?;

    if entries.is_empty() {
        println!("No log entries");
        return Ok(());
    }

    println!("{:<32} {:<8} {:<16} {}", "TIMESTAMP", "LEVEL", "AGENT", "EVENT");
    println!("{}", "-".repeat(80));
    for entry in entries {
        println!(
            "{:<32} {:<8} {:<16} {}",
            entry.timestamp.to_rfc3339(),
            entry.level,
            entry.agent,
            entry.event
        );
    }

    Ok(())
}

async fn show_status(base_url: &str) -> Result<()> {
    let url = format!("{}/mcp/status", base_url.trim_end_matches('/'));
    let snapshot: crate::core::RegistrySnapshot = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach {}", url))?
        .error_for_status()?
        .json()
        .await
        .context("Failed to decode registry snapshot")?;

    println!(
        "{:<16} {:<16} {:<10} {:>11}  {}",
        "SERVER", "NAME", "STATUS", "INVOCATIONS", "LAST USED"
    );
    println!("{}", "-".repeat(80));
    for entry in snapshot.values() {
        println!(
            "{:<16} {:<16} {:<10} {:>11}  {}",
            entry.server_id,
            entry.name,
            entry.status,
            entry.invocations,
            entry
                .last_used
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("SYNAPSE-X Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Server:");
    println!("  Bind:              {}", cfg.bind);
    println!();
    println!("Pipeline:");
    println!("  Min prompt chars:  {}", cfg.limits.min_prompt_chars);
    println!("  Max prompt size:   {} bytes", cfg.limits.max_prompt_bytes);
    println!("  Run timeout:       {}s", cfg.limits.run_timeout_seconds);
    println!("  Log tail:          {}", cfg.log_tail);
    println!("  Default log limit: {}", cfg.default_log_limit);
    println!();
    println!("Publisher:");
    println!("  Org:               {}", cfg.publisher.org);
    println!("  Placeholder repo:  {}", cfg.publisher.placeholder_repo);
    println!();
    println!("Decomposition:");
    println!(
        "  Enabled:           {}",
        if cfg.decomposition.enabled() { "yes" } else { "no (rule-based only)" }
    );
    println!("  Model:             {}", cfg.decomposition.model);
    println!("  Timeout:           {}s", cfg.decomposition.timeout_seconds);

    Ok(())
}
