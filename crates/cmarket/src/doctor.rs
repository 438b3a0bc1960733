use crate::{
    chains::evm::EvmChain,
    config::{config_toml_path, AgentConfig},
    paths::CmarketPaths,
    registry::NetworkProfile,
    wallet::{WalletIdentity, PRIVATE_KEY_ENV},
};
use eyre::Context as _;
use serde_json::json;
use std::{path::PathBuf, time::Duration};

const RPC_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

struct PathsReport {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_file: PathBuf,
}

struct ConfigReport {
    path: PathBuf,
    exists: bool,
    parse_ok: bool,
    error: Option<String>,
    chain_id: Option<u64>,
    configured_networks: Vec<String>,
    unknown_networks: Vec<String>,
}

struct NetworkReport {
    name: Option<String>,
    ok: bool,
    error: Option<String>,
    market_count: usize,
    token_count: usize,
    rpc_endpoints: usize,
    contracts: serde_json::Value,
    latest_block: Option<u64>,
    rpc_note: Option<String>,
}

struct WalletReport {
    key_set: bool,
    valid: bool,
    address: Option<String>,
    error: Option<String>,
}

struct DoctorReport {
    version: &'static str,
    paths: PathsReport,
    config: ConfigReport,
    network: NetworkReport,
    wallet: WalletReport,
    env: serde_json::Value,
}

impl WalletReport {
    const fn mode(&self) -> &'static str {
        if self.valid {
            "transaction"
        } else {
            "read_only"
        }
    }
}

async fn probe_rpc(profile: &NetworkProfile, cfg: &AgentConfig) -> (Option<u64>, Option<String>) {
    let chain = EvmChain::for_network(profile, &cfg.chain);
    match tokio::time::timeout(RPC_PROBE_TIMEOUT, chain.block_number()).await {
        Ok(Ok(n)) => (Some(n), None),
        Ok(Err(e)) => (None, Some(format!("{e:#}"))),
        Err(_elapsed) => (None, Some("rpc probe timed out".to_owned())),
    }
}

async fn collect_network(cfg: Option<&AgentConfig>) -> NetworkReport {
    let mut report = NetworkReport {
        name: None,
        ok: false,
        error: None,
        market_count: 0,
        token_count: 0,
        rpc_endpoints: 0,
        contracts: serde_json::Value::Null,
        latest_block: None,
        rpc_note: None,
    };
    let Some(cfg) = cfg else {
        report.error = Some("config unavailable".to_owned());
        return report;
    };
    let profile = match cfg.require_chain_id().and_then(|id| cfg.resolve_network(id)) {
        Ok(p) => p,
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };
    report.name = Some(profile.name.clone());
    report.ok = true;
    report.market_count = profile.contracts.market_count();
    report.token_count = profile.tokens.len();
    report.rpc_endpoints = profile.rpc_urls().len();
    report.contracts = json!(profile.contracts.logical_keys());
    let (block, note) = probe_rpc(&profile, cfg).await;
    report.latest_block = block;
    report.rpc_note = note;
    report
}

fn collect_wallet() -> WalletReport {
    match WalletIdentity::from_env() {
        Ok(Some(w)) => WalletReport {
            key_set: true,
            valid: true,
            address: Some(format!("{:#x}", w.address())),
            error: None,
        },
        Ok(None) => WalletReport {
            key_set: false,
            valid: false,
            address: None,
            error: None,
        },
        Err(e) => WalletReport {
            key_set: true,
            valid: false,
            address: None,
            error: Some(e.to_string()),
        },
    }
}

async fn collect(paths: &CmarketPaths) -> DoctorReport {
    let config_path = config_toml_path(paths);
    let config_exists = config_path.exists();
    let (parse_ok, config_err, cfg) = match AgentConfig::load(paths) {
        Ok(cfg) => (true, None, Some(cfg)),
        Err(e) => (false, Some(format!("{e:#}")), None),
    };

    let network = collect_network(cfg.as_ref()).await;
    let wallet = collect_wallet();

    let env = json!({
      "CMARKET_CONFIG_DIR": env_opt("CMARKET_CONFIG_DIR"),
      "CMARKET_DATA_DIR": env_opt("CMARKET_DATA_DIR"),
      "CMARKET_CHAIN_ID": env_opt("CMARKET_CHAIN_ID"),
      "CMARKET_PRIVATE_KEY_set": env_opt(PRIVATE_KEY_ENV).is_some(),
      "RUST_LOG": env_opt("RUST_LOG"),
    });

    DoctorReport {
        version: env!("CARGO_PKG_VERSION"),
        paths: PathsReport {
            config_dir: paths.config_dir.clone(),
            data_dir: paths.data_dir.clone(),
            log_file: paths.log_file.clone(),
        },
        config: ConfigReport {
            path: config_path,
            exists: config_exists,
            parse_ok,
            error: config_err,
            chain_id: cfg.as_ref().and_then(|c| c.chain_id),
            configured_networks: cfg
                .as_ref()
                .map(|c| c.networks.keys().cloned().collect())
                .unwrap_or_default(),
            unknown_networks: cfg
                .as_ref()
                .map(|c| c.unknown_networks().into_iter().map(str::to_owned).collect())
                .unwrap_or_default(),
        },
        network,
        wallet,
        env,
    }
}

fn print_json(out: &mut impl std::io::Write, r: &DoctorReport) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(&json!({
      "ok": true,
      "version": r.version,
      "paths": {
        "config_dir": r.paths.config_dir,
        "data_dir": r.paths.data_dir,
        "log_file": r.paths.log_file,
      },
      "config": {
        "path": r.config.path,
        "exists": r.config.exists,
        "parse_ok": r.config.parse_ok,
        "error": r.config.error,
        "chain_id": r.config.chain_id,
        "configured_networks": r.config.configured_networks,
        "unknown_networks": r.config.unknown_networks,
      },
      "network": {
        "name": r.network.name,
        "ok": r.network.ok,
        "error": r.network.error,
        "market_count": r.network.market_count,
        "token_count": r.network.token_count,
        "rpc_endpoints": r.network.rpc_endpoints,
        "contracts": r.network.contracts,
        "latest_block": r.network.latest_block,
        "rpc_note": r.network.rpc_note,
      },
      "wallet": {
        "mode": r.wallet.mode(),
        "key_set": r.wallet.key_set,
        "valid": r.wallet.valid,
        "address": r.wallet.address,
        "error": r.wallet.error,
      },
      "env": r.env,
      "hints": [
        "Select a network with chain_id in config.toml, CMARKET_CHAIN_ID, or `cmarket mcp --chain-id`.",
        "Lending contracts are never built in: add [networks.<name>.contracts] with Comptroller and one c<Symbol> key per market.",
        "Without CMARKET_PRIVATE_KEY the server runs read-only and rejects every write tool.",
      ]
    }))
    .context("serialize doctor json")?;
    writeln!(out, "{s}").context("write doctor json")?;
    Ok(())
}

fn print_human(out: &mut impl std::io::Write, r: &DoctorReport) -> eyre::Result<()> {
    writeln!(out, "cmarket doctor (v{})", r.version).context("write header")?;
    writeln!(out).context("write newline")?;

    writeln!(out, "Paths:").context("write paths header")?;
    writeln!(out, "  config_dir: {}", r.paths.config_dir.display()).context("write paths")?;
    writeln!(out, "  data_dir:   {}", r.paths.data_dir.display()).context("write paths")?;
    writeln!(out, "  log_file:   {}", r.paths.log_file.display()).context("write paths")?;
    writeln!(out).context("write newline")?;

    writeln!(out, "Config:").context("write config header")?;
    writeln!(out, "  config.toml: {}", r.config.path.display()).context("write config")?;
    if r.config.parse_ok {
        let status = if r.config.exists { "ok" } else { "missing (defaults)" };
        writeln!(out, "  status: {status}").context("write config")?;
        writeln!(out, "  chain_id: {:?}", r.config.chain_id).context("write config")?;
        writeln!(
            out,
            "  networks: [{}]",
            r.config.configured_networks.join(", ")
        )
        .context("write config")?;
        if !r.config.unknown_networks.is_empty() {
            writeln!(
                out,
                "  warning: unknown network sections ignored: [{}]",
                r.config.unknown_networks.join(", ")
            )
            .context("write config")?;
        }
    } else {
        writeln!(out, "  status: load failed").context("write config")?;
        if let Some(e) = &r.config.error {
            let first = e.lines().next().unwrap_or("load error");
            writeln!(out, "  error: {first}").context("write config")?;
        }
    }
    writeln!(out).context("write newline")?;

    writeln!(out, "Network:").context("write network header")?;
    if r.network.ok {
        writeln!(
            out,
            "  {} ({} markets, {} tokens, {} rpc endpoints)",
            r.network.name.as_deref().unwrap_or("?"),
            r.network.market_count,
            r.network.token_count,
            r.network.rpc_endpoints
        )
        .context("write network")?;
        match (r.network.latest_block, &r.network.rpc_note) {
            (Some(b), _) => writeln!(out, "  rpc: reachable (block {b})"),
            (None, Some(note)) => writeln!(out, "  rpc: unreachable ({note})"),
            (None, None) => writeln!(out, "  rpc: unknown"),
        }
        .context("write network")?;
    } else {
        writeln!(
            out,
            "  status: unresolved ({})",
            r.network.error.as_deref().unwrap_or("unknown")
        )
        .context("write network")?;
    }
    writeln!(out).context("write newline")?;

    writeln!(out, "Wallet:").context("write wallet header")?;
    writeln!(out, "  mode: {}", r.wallet.mode()).context("write wallet")?;
    if let Some(a) = &r.wallet.address {
        writeln!(out, "  address: {a}").context("write wallet")?;
    }
    if let Some(e) = &r.wallet.error {
        writeln!(out, "  error: {e}").context("write wallet")?;
    }
    writeln!(out).context("write newline")?;

    writeln!(out, "Env (redacted):").context("write env header")?;
    for key in ["CMARKET_CONFIG_DIR", "CMARKET_DATA_DIR", "CMARKET_CHAIN_ID"] {
        writeln!(
            out,
            "  {key}: {:?}",
            r.env.get(key).and_then(serde_json::Value::as_str)
        )
        .context("write env")?;
    }
    writeln!(out, "  CMARKET_PRIVATE_KEY_set: {}", r.wallet.key_set).context("write env")?;
    Ok(())
}

pub async fn run(as_json: bool) -> eyre::Result<()> {
    let paths = CmarketPaths::discover()?;
    let report = collect(&paths).await;
    let mut out = std::io::stdout().lock();
    if as_json {
        print_json(&mut out, &report)?;
    } else {
        print_human(&mut out, &report)?;
    }
    Ok(())
}
