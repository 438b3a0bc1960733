#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand};
use eyre::Context as _;
use std::{io::Write as _, sync::Arc};
use tracing::info;
use tracing_subscriber::prelude::*;

mod amount;
mod chains;
mod config;
mod doctor;
mod errors;
mod financial_math;
mod lending;
mod paths;
mod price;
mod registry;
mod retry;
mod rpc;
mod wallet;

#[derive(Parser, Debug)]
#[command(name = "cmarket", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server over stdio.
    ///
    /// Runs in transaction mode when `CMARKET_PRIVATE_KEY` holds a valid key,
    /// read-only otherwise.
    Mcp {
        /// Chain id of the deployment to serve (overrides config and `CMARKET_CHAIN_ID`).
        #[arg(long)]
        chain_id: Option<u64>,
    },

    /// List the built-in networks and their default endpoints.
    Networks,

    /// Print resolved paths (useful for debugging).
    Paths,

    /// Print a quick self-diagnostic report (safe to paste; contains no secrets).
    Doctor {
        /// Emit JSON to stdout (machine-readable).
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn init_logging(paths: &paths::CmarketPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("cmarket.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // stdout carries MCP frames; logs go to stderr and the data-dir file only.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

async fn run_mcp(chain_id: Option<u64>, paths: &paths::CmarketPaths) -> eyre::Result<()> {
    let cfg = config::AgentConfig::load(paths).context("load config")?;
    let chain_id = match chain_id {
        Some(id) => id,
        None => cfg.require_chain_id()?,
    };
    let network = cfg.resolve_network(chain_id)?;
    let chain = chains::evm::EvmChain::for_network(&network, &cfg.chain);
    let prices = price::BinancePriceFeed::new(&cfg.http)?;
    let wallet = wallet::WalletIdentity::from_env()?;
    if let Some(w) = &wallet {
        info!(address = %w.address(), "signing key loaded");
    }

    let ctx = lending::AgentContext::new(network, Arc::new(chain), Arc::new(prices), wallet)?;
    rpc::mcp_server::run(lending::WalletAgent::new(ctx)).await
}

fn print_networks() -> eyre::Result<()> {
    let nets: Vec<serde_json::Value> = registry::BUILTIN_NETWORKS
        .iter()
        .map(|n| {
            serde_json::json!({
              "name": n.name,
              "chain_id": n.chain_id,
              "native_symbol": n.native_symbol,
              "rpc_url": n.rpc_url,
              "fallback_rpc_urls": n.fallbacks,
              "explorer_url": n.explorer_url,
              "blocks_per_year": n.blocks_per_year,
              "tokens": n.tokens.iter().map(|t| t.symbol).collect::<Vec<_>>(),
            })
        })
        .collect();
    let s = serde_json::to_string_pretty(&nets).context("serialize networks")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write networks")?;
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = paths::CmarketPaths::discover()?;
    paths.ensure_private_dirs()?;
    let _log_guard = init_logging(&paths);

    match cli.cmd {
        Command::Mcp { chain_id } => run_mcp(chain_id, &paths)
            .await
            .context("mcp server failed"),
        Command::Networks => print_networks(),
        Command::Paths => {
            let s = serde_json::to_string(&serde_json::json!({
              "config_dir": paths.config_dir,
              "data_dir": paths.data_dir,
              "log_file": paths.log_file,
            }))
            .context("serialize paths")?;
            writeln!(std::io::stdout().lock(), "{s}").context("write paths")?;
            Ok(())
        }
        Command::Doctor { json } => doctor::run(json).await.context("doctor failed"),
    }
}
