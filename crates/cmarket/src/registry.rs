//! Static per-chain configuration: chain identity, block-time constant, native
//! currency, token table and the Compound-fork contract table.

use crate::errors::AgentError;
use alloy::primitives::Address;
use std::collections::BTreeMap;

/// Decimals of every market (cToken) balance, independent of the underlying.
pub const CTOKEN_DECIMALS: u8 = 8;

/// Decimals of the chain's native asset.
pub const NATIVE_DECIMALS: u8 = 18;

/// Logical key of the risk-management contract in a contract table.
pub const COMPTROLLER_KEY: &str = "Comptroller";

/// Prefix of market keys: `c<Symbol>` names the market for `<Symbol>`.
pub const MARKET_PREFIX: &str = "c";

/// Sentinel accepted in config files for the native asset's token address.
pub const NATIVE_SENTINEL: &str = "native";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Underlying {
    Native,
    Erc20(Address),
}

impl Underlying {
    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case(NATIVE_SENTINEL) {
            return Ok(Self::Native);
        }
        raw.parse::<Address>()
            .map(Self::Erc20)
            .map_err(|e| AgentError::Configuration(format!("invalid token address {raw:?}: {e}")))
    }

    pub const fn erc20(&self) -> Option<Address> {
        match self {
            Self::Native => None,
            Self::Erc20(a) => Some(*a),
        }
    }

    pub const fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEntry {
    pub symbol: String,
    pub display_name: String,
    pub decimals: u8,
    pub underlying: Underlying,
}

/// Contract addresses of one network's lending deployment.
///
/// Market keys are stored by their root (`"USDC"` for `"cUSDC"`), exactly as
/// configured; lookups by key are case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTable {
    pub comptroller: Address,
    markets: BTreeMap<String, Address>,
}

impl ContractTable {
    pub fn new(comptroller: Address, markets: BTreeMap<String, Address>) -> Self {
        Self {
            comptroller,
            markets,
        }
    }

    /// Build from the logical-key form (`"Comptroller"`, `"c<Symbol>"`).
    pub fn from_logical_keys(raw: &BTreeMap<String, String>) -> Result<Self, AgentError> {
        let mut comptroller = None;
        let mut markets = BTreeMap::new();
        for (key, value) in raw {
            let addr = value.trim().parse::<Address>().map_err(|e| {
                AgentError::Configuration(format!("invalid address for contract {key}: {e}"))
            })?;
            if key == COMPTROLLER_KEY {
                comptroller = Some(addr);
                continue;
            }
            match key.strip_prefix(MARKET_PREFIX) {
                Some(root) if !root.is_empty() => {
                    markets.insert(root.to_owned(), addr);
                }
                _ => {
                    return Err(AgentError::Configuration(format!(
                        "unknown contract key {key:?} (expected {COMPTROLLER_KEY} or {MARKET_PREFIX}<Symbol>)"
                    )));
                }
            }
        }
        let comptroller = comptroller.ok_or_else(|| {
            AgentError::Configuration(format!("contract table is missing {COMPTROLLER_KEY}"))
        })?;
        Ok(Self::new(comptroller, markets))
    }

    /// Market address for an exact key such as `"cUSDC"`.
    pub fn market_by_key(&self, key: &str) -> Option<Address> {
        key.strip_prefix(MARKET_PREFIX)
            .and_then(|root| self.markets.get(root))
            .copied()
    }

    pub fn market_for_root(&self, root: &str) -> Option<Address> {
        self.markets.get(root).copied()
    }

    /// `(root, market address)` pairs in key order.
    pub fn markets(&self) -> impl Iterator<Item = (&str, Address)> + '_ {
        self.markets.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn root_for_market(&self, market: Address) -> Option<&str> {
        self.markets
            .iter()
            .find(|(_, a)| **a == market)
            .map(|(k, _)| k.as_str())
    }

    pub fn market_count(&self) -> usize {
        self.markets.len()
    }

    /// Logical-key form, e.g. for diagnostics.
    pub fn logical_keys(&self) -> BTreeMap<String, Address> {
        let mut out: BTreeMap<String, Address> = self
            .markets
            .iter()
            .map(|(root, a)| (format!("{MARKET_PREFIX}{root}"), *a))
            .collect();
        out.insert(COMPTROLLER_KEY.to_owned(), self.comptroller);
        out
    }
}

/// Fully-resolved configuration of the active chain. Immutable after startup.
#[derive(Debug, Clone)]
pub struct NetworkProfile {
    pub name: String,
    pub chain_id: u64,
    pub native_symbol: String,
    pub rpc_url: String,
    pub fallback_rpc_urls: Vec<String>,
    pub explorer_url: String,
    pub blocks_per_year: u64,
    pub tokens: Vec<TokenEntry>,
    pub contracts: ContractTable,
}

impl NetworkProfile {
    /// Case-insensitive token lookup.
    pub fn token(&self, symbol: &str) -> Option<&TokenEntry> {
        let symbol = symbol.trim();
        self.tokens
            .iter()
            .find(|t| t.symbol == symbol)
            .or_else(|| self.tokens.iter().find(|t| t.symbol.eq_ignore_ascii_case(symbol)))
    }

    pub fn native_token(&self) -> Option<&TokenEntry> {
        self.tokens.iter().find(|t| t.underlying.is_native())
    }

    pub fn rpc_urls(&self) -> Vec<String> {
        let mut out = vec![self.rpc_url.clone()];
        for u in &self.fallback_rpc_urls {
            if !out.contains(u) {
                out.push(u.clone());
            }
        }
        out
    }

    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{tx_hash}", self.explorer_url.trim_end_matches('/'))
    }

    /// Every market must wrap a token of this network, otherwise its decimals
    /// would be unknown. Tokens without a market are allowed.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.blocks_per_year == 0 {
            return Err(AgentError::Configuration(format!(
                "{}: blocks_per_year must be positive",
                self.name
            )));
        }
        for (root, _) in self.contracts.markets() {
            if self.token(root).is_none() {
                return Err(AgentError::Configuration(format!(
                    "{}: market {MARKET_PREFIX}{root} has no entry in the token table",
                    self.name
                )));
            }
        }
        let natives = self.tokens.iter().filter(|t| t.underlying.is_native()).count();
        if natives > 1 {
            return Err(AgentError::Configuration(format!(
                "{}: more than one token is marked as the native asset",
                self.name
            )));
        }
        if let Some(t) = self
            .tokens
            .iter()
            .find(|t| t.underlying.is_native() && t.decimals != NATIVE_DECIMALS)
        {
            return Err(AgentError::Configuration(format!(
                "{}: native asset {} must use {NATIVE_DECIMALS} decimals",
                self.name, t.symbol
            )));
        }
        Ok(())
    }
}

pub struct BuiltinToken {
    pub symbol: &'static str,
    pub display_name: &'static str,
    pub decimals: u8,
    /// ERC20 address, or [`NATIVE_SENTINEL`].
    pub address: &'static str,
}

/// A supported chain definition used by the table-driven config defaults.
pub struct BuiltinNetwork {
    pub name: &'static str,
    pub chain_id: u64,
    pub native_symbol: &'static str,
    pub rpc_url: &'static str,
    pub fallbacks: &'static [&'static str],
    pub explorer_url: &'static str,
    pub blocks_per_year: u64,
    pub tokens: &'static [BuiltinToken],
}

impl BuiltinNetwork {
    pub fn token_entries(&self) -> Result<Vec<TokenEntry>, AgentError> {
        self.tokens
            .iter()
            .map(|t| {
                Ok(TokenEntry {
                    symbol: t.symbol.to_owned(),
                    display_name: t.display_name.to_owned(),
                    decimals: t.decimals,
                    underlying: Underlying::parse(t.address)?,
                })
            })
            .collect()
    }
}

pub const BUILTIN_NETWORKS: &[BuiltinNetwork] = &[
    BuiltinNetwork {
        name: "avalanche",
        chain_id: 43114,
        native_symbol: "AVAX",
        rpc_url: "https://api.avax.network/ext/bc/C/rpc",
        fallbacks: &[
            "https://avalanche-c-chain-rpc.publicnode.com",
            "https://rpc.ankr.com/avalanche",
        ],
        explorer_url: "https://snowtrace.io",
        // 2s blocks.
        blocks_per_year: 15_768_000,
        tokens: &[
            BuiltinToken {
                symbol: "AVAX",
                display_name: "Avalanche",
                decimals: 18,
                address: NATIVE_SENTINEL,
            },
            BuiltinToken {
                symbol: "USDC",
                display_name: "USD Coin",
                decimals: 6,
                address: "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
            },
            BuiltinToken {
                symbol: "USDT",
                display_name: "Tether USD",
                decimals: 6,
                address: "0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7",
            },
            BuiltinToken {
                symbol: "WAVAX",
                display_name: "Wrapped AVAX",
                decimals: 18,
                address: "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7",
            },
            BuiltinToken {
                symbol: "sAVAX",
                display_name: "Staked AVAX",
                decimals: 18,
                address: "0x2b2C81e08f1Af8835a78Bb2A90AE924ACE0eA4bE",
            },
            BuiltinToken {
                symbol: "BTC.b",
                display_name: "Bitcoin (bridged)",
                decimals: 8,
                address: "0x152b9d0FdC40C096757F570A51E494bd4b943E50",
            },
        ],
    },
    BuiltinNetwork {
        name: "base",
        chain_id: 8453,
        native_symbol: "ETH",
        rpc_url: "https://mainnet.base.org",
        fallbacks: &[
            "https://base-rpc.publicnode.com",
            "https://rpc.ankr.com/base",
        ],
        explorer_url: "https://basescan.org",
        // 2s blocks.
        blocks_per_year: 15_768_000,
        tokens: &[
            BuiltinToken {
                symbol: "ETH",
                display_name: "Ether",
                decimals: 18,
                address: NATIVE_SENTINEL,
            },
            BuiltinToken {
                symbol: "USDC",
                display_name: "USD Coin",
                decimals: 6,
                address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            },
            BuiltinToken {
                symbol: "WETH",
                display_name: "Wrapped Ether",
                decimals: 18,
                address: "0x4200000000000000000000000000000000000006",
            },
            BuiltinToken {
                symbol: "DAI",
                display_name: "Dai Stablecoin",
                decimals: 18,
                address: "0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb",
            },
            BuiltinToken {
                symbol: "cbETH",
                display_name: "Coinbase Wrapped Staked ETH",
                decimals: 18,
                address: "0x2Ae3F1Ec7F1F5012CFEab0185bfc7aa3cf0DEc22",
            },
            BuiltinToken {
                symbol: "wstETH",
                display_name: "Wrapped liquid staked Ether",
                decimals: 18,
                address: "0xc1CBa3fCea344f92D9239c08C0568f6F2F0ee452",
            },
        ],
    },
    BuiltinNetwork {
        name: "moonbeam",
        chain_id: 1284,
        native_symbol: "GLMR",
        rpc_url: "https://rpc.api.moonbeam.network",
        fallbacks: &["https://moonbeam-rpc.publicnode.com"],
        explorer_url: "https://moonscan.io",
        // 6s blocks.
        blocks_per_year: 5_256_000,
        tokens: &[
            BuiltinToken {
                symbol: "GLMR",
                display_name: "Glimmer",
                decimals: 18,
                address: NATIVE_SENTINEL,
            },
            BuiltinToken {
                symbol: "USDC",
                display_name: "USD Coin (Wormhole)",
                decimals: 6,
                address: "0x931715FEE2d06333043d11F658C8CE934aC61D0c",
            },
            BuiltinToken {
                symbol: "WGLMR",
                display_name: "Wrapped GLMR",
                decimals: 18,
                address: "0xAcc15dC74880C9944775448304B263D191c6077F",
            },
            BuiltinToken {
                symbol: "xcDOT",
                display_name: "Polkadot (XCM)",
                decimals: 10,
                address: "0xFfFFfFff1FcaCBd218EDc0EbA20Fc2308C778080",
            },
        ],
    },
];

pub fn builtin_by_chain_id(chain_id: u64) -> Option<&'static BuiltinNetwork> {
    BUILTIN_NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

pub fn builtin_by_name(name: &str) -> Option<&'static BuiltinNetwork> {
    let name = name.trim();
    BUILTIN_NETWORKS
        .iter()
        .find(|n| n.name.eq_ignore_ascii_case(name))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn builtin_tables_parse_and_validate() -> eyre::Result<()> {
        for n in BUILTIN_NETWORKS {
            let tokens = n.token_entries()?;
            assert_eq!(
                tokens.iter().filter(|t| t.underlying.is_native()).count(),
                1,
                "{} should have exactly one native token",
                n.name
            );
            assert!(
                tokens.iter().any(|t| t.symbol == n.native_symbol),
                "{} native symbol missing from token table",
                n.name
            );

            // One placeholder market per token so every market root is checked.
            let markets = tokens
                .iter()
                .zip(1_u8..)
                .map(|(t, i)| (t.symbol.clone(), addr(i)))
                .collect::<BTreeMap<_, _>>();
            let profile = NetworkProfile {
                name: n.name.into(),
                chain_id: n.chain_id,
                native_symbol: n.native_symbol.into(),
                rpc_url: n.rpc_url.into(),
                fallback_rpc_urls: n.fallbacks.iter().map(|&s| s.to_owned()).collect(),
                explorer_url: n.explorer_url.into(),
                blocks_per_year: n.blocks_per_year,
                tokens,
                contracts: ContractTable::new(addr(0xc0), markets),
            };
            assert!(profile.validate().is_ok(), "{} failed validation", n.name);
        }
        Ok(())
    }

    #[test]
    fn contract_table_parses_logical_keys() -> eyre::Result<()> {
        let mut raw = BTreeMap::new();
        raw.insert("Comptroller".to_owned(), format!("{}", addr(1)));
        raw.insert("cUSDC".to_owned(), format!("{}", addr(2)));
        raw.insert("ccbETH".to_owned(), format!("{}", addr(3)));
        let t = ContractTable::from_logical_keys(&raw)?;
        assert_eq!(t.comptroller, addr(1));
        assert_eq!(t.market_by_key("cUSDC"), Some(addr(2)));
        assert_eq!(t.market_for_root("cbETH"), Some(addr(3)));
        assert_eq!(t.market_by_key("cusdc"), None);
        assert_eq!(t.root_for_market(addr(3)), Some("cbETH"));
        assert_eq!(t.logical_keys().len(), 3);
        Ok(())
    }

    #[test]
    fn contract_table_rejects_unknown_keys_and_missing_comptroller() {
        let mut raw = BTreeMap::new();
        raw.insert("cUSDC".to_owned(), format!("{}", addr(2)));
        let e = ContractTable::from_logical_keys(&raw);
        assert!(matches!(e, Err(AgentError::Configuration(_))), "got {e:?}");

        raw.insert("Comptroller".to_owned(), format!("{}", addr(1)));
        raw.insert("Oracle".to_owned(), format!("{}", addr(4)));
        let e = ContractTable::from_logical_keys(&raw);
        assert!(matches!(e, Err(AgentError::Configuration(_))), "got {e:?}");
    }

    #[test]
    fn validation_rejects_market_without_token() {
        let mut p = avalanche_profile();
        assert!(p.validate().is_ok());
        let mut markets = BTreeMap::new();
        markets.insert("QI".to_owned(), addr(9));
        p.contracts = ContractTable::new(addr(0xc0), markets);
        let e = p.validate();
        assert!(matches!(e, Err(AgentError::Configuration(ref m)) if m.contains("cQI")), "got {e:?}");
    }

    #[test]
    fn token_lookup_is_case_insensitive_and_prefers_exact() {
        let p = avalanche_profile();
        assert_eq!(p.token("savax").map(|t| t.symbol.as_str()), Some("sAVAX"));
        assert_eq!(p.token(" usdc ").map(|t| t.decimals), Some(6));
        assert_eq!(p.native_token().map(|t| t.symbol.as_str()), Some("AVAX"));
    }

    #[test]
    fn explorer_url_joins_cleanly() {
        let mut p = avalanche_profile();
        p.explorer_url = "https://snowtrace.io/".into();
        assert_eq!(p.explorer_tx_url("0xabc"), "https://snowtrace.io/tx/0xabc");
    }
}
