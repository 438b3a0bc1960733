use crate::{
    errors::AgentError,
    paths::CmarketPaths,
    registry::{self, ContractTable, NetworkProfile, TokenEntry, Underlying},
};
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Binance public API base URL (keyless). Used for USD prices.
    pub binance_base_url: String,
    /// Request timeout for price lookups (seconds).
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            binance_base_url: "https://api.binance.com".into(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// How long to wait for a prerequisite transaction (enter-markets, approve)
    /// to be mined before failing the operation.
    pub receipt_timeout_seconds: u64,
    /// Full rounds across the RPC endpoint list before a call is reported failed.
    pub backoff_rounds: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_seconds: 120,
            backoff_rounds: 3,
        }
    }
}

/// An extra (or replacement) token for a network's token table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub decimals: u8,
    /// ERC20 address, or `"native"` for the chain's native asset.
    pub address: String,
}

/// Per-network overrides keyed by network name (`avalanche`, `base`, `moonbeam`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_rpc_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks_per_year: Option<u64>,
    pub tokens: Vec<TokenConfig>,
    /// Logical-key contract table: `Comptroller` plus one `c<Symbol>` per market.
    pub contracts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Active chain. Overridden by `CMARKET_CHAIN_ID` and `mcp --chain-id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    pub networks: BTreeMap<String, NetworkConfig>,
    pub http: HttpConfig,
    pub chain: ChainConfig,
}

pub fn config_toml_path(paths: &CmarketPaths) -> std::path::PathBuf {
    paths.config_dir.join("config.toml")
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

impl AgentConfig {
    /// Load `config.toml` if present (defaults otherwise), then apply env overrides.
    pub fn load(paths: &CmarketPaths) -> eyre::Result<Self> {
        let path = config_toml_path(paths);
        let mut cfg = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> eyre::Result<Self> {
        let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str(&s).context("parse config.toml")
    }

    fn apply_env_overrides(&mut self) -> eyre::Result<()> {
        if let Some(v) = env_opt("CMARKET_CHAIN_ID") {
            let id = v
                .parse::<u64>()
                .with_context(|| format!("CMARKET_CHAIN_ID must be an integer, got {v:?}"))?;
            self.chain_id = Some(id);
        }
        Ok(())
    }

    /// Build the immutable profile of `chain_id`: built-in chain definition
    /// merged with this config's overrides, then validated.
    pub fn resolve_network(&self, chain_id: u64) -> Result<NetworkProfile, AgentError> {
        let def = registry::builtin_by_chain_id(chain_id).ok_or_else(|| {
            let supported: Vec<String> = registry::BUILTIN_NETWORKS
                .iter()
                .map(|n| format!("{} ({})", n.name, n.chain_id))
                .collect();
            AgentError::Configuration(format!(
                "unsupported chain id {chain_id}; supported: {}",
                supported.join(", ")
            ))
        })?;
        let ov = self.networks.get(def.name).cloned().unwrap_or_default();

        let mut tokens = def.token_entries()?;
        for t in &ov.tokens {
            let entry = TokenEntry {
                symbol: t.symbol.trim().to_owned(),
                display_name: t
                    .display_name
                    .clone()
                    .unwrap_or_else(|| t.symbol.trim().to_owned()),
                decimals: t.decimals,
                underlying: Underlying::parse(&t.address)?,
            };
            if let Some(existing) = tokens
                .iter_mut()
                .find(|e| e.symbol.eq_ignore_ascii_case(&entry.symbol))
            {
                *existing = entry;
            } else {
                tokens.push(entry);
            }
        }

        if ov.contracts.is_empty() {
            return Err(AgentError::Configuration(format!(
                "no lending contracts configured for {}; set [networks.{}.contracts] in config.toml",
                def.name, def.name
            )));
        }
        let contracts = ContractTable::from_logical_keys(&ov.contracts)?;

        let profile = NetworkProfile {
            name: def.name.to_owned(),
            chain_id: def.chain_id,
            native_symbol: def.native_symbol.to_owned(),
            rpc_url: ov.rpc_url.unwrap_or_else(|| def.rpc_url.to_owned()),
            fallback_rpc_urls: ov
                .fallback_rpc_urls
                .unwrap_or_else(|| def.fallbacks.iter().map(|&s| s.to_owned()).collect()),
            explorer_url: ov
                .explorer_url
                .unwrap_or_else(|| def.explorer_url.to_owned()),
            blocks_per_year: ov.blocks_per_year.unwrap_or(def.blocks_per_year),
            tokens,
            contracts,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Override sections whose name matches no built-in network; they are
    /// never applied.
    pub fn unknown_networks(&self) -> Vec<&str> {
        self.networks
            .keys()
            .map(String::as_str)
            .filter(|name| registry::builtin_by_name(name).is_none())
            .collect()
    }

    /// The configured chain id, or a configuration error naming the knobs.
    pub fn require_chain_id(&self) -> Result<u64, AgentError> {
        self.chain_id.ok_or_else(|| {
            AgentError::Configuration(
                "no network selected; set chain_id in config.toml, CMARKET_CHAIN_ID, or pass --chain-id"
                    .into(),
            )
        })
    }
}
