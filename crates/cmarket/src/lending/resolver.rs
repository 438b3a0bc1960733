//! Maps free-form, possibly miscased or aliased symbols to the active network's
//! canonical token symbol and market contract.
//!
//! Precedence, first match wins:
//! 1. case-insensitive token-table match;
//! 2. the fixed alias table, re-verified against the token table;
//! 3. a market key root (`c<Root>`), preferring the token sharing that root;
//! 4. the input itself, unchanged (callers treat it as unresolved).

use crate::registry::{NetworkProfile, TokenEntry, Underlying, MARKET_PREFIX};
use alloy::primitives::Address;
use serde::Serialize;

/// Known variant spellings, keyed by the uppercased input.
const SYMBOL_ALIASES: &[(&str, &str)] = &[
    ("SAVAX", "sAVAX"),
    ("WSTETH", "wstETH"),
    ("XCDOT", "xcDOT"),
    ("DOT", "xcDOT"),
    ("BTCB", "BTC.b"),
    ("CBETH", "cbETH"),
];

/// Market-key spellings tried, in order, for symbols whose casing differs
/// between deployments.
const CAPITALIZATION_VARIANTS: &[(&str, &[&str])] = &[
    ("sAVAX", &["sAVAX", "SAVAX", "savax", "sAvax"]),
    ("wstETH", &["wstETH", "WSTETH", "wsteth", "WstETH"]),
    ("xcDOT", &["xcDOT", "XCDOT", "xcdot", "XcDOT"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMarket {
    /// Canonical token symbol of the underlying.
    pub symbol: String,
    /// Root of the contract-table key the market was found under.
    pub key_root: String,
    pub market: Address,
    pub decimals: u8,
    #[serde(skip)]
    pub underlying: Underlying,
}

impl ResolvedMarket {
    pub fn market_key(&self) -> String {
        format!("{MARKET_PREFIX}{}", self.key_root)
    }
}

/// Diagnostic view of a resolution, for the `resolve_symbol` tool.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolResolution {
    pub input: String,
    pub canonical: String,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<ResolvedMarket>,
}

pub struct SymbolResolver<'a> {
    network: &'a NetworkProfile,
}

impl<'a> SymbolResolver<'a> {
    pub const fn new(network: &'a NetworkProfile) -> Self {
        Self { network }
    }

    pub fn resolve(&self, raw: &str) -> String {
        let s = raw.trim();

        if let Some(t) = self.network.token(s) {
            return t.symbol.clone();
        }

        let upper = s.to_uppercase();
        if let Some((_, aliased)) = SYMBOL_ALIASES.iter().find(|(k, _)| *k == upper) {
            if let Some(t) = self.network.token(aliased) {
                return t.symbol.clone();
            }
        }

        if let Some((root, _)) = self
            .network
            .contracts
            .markets()
            .find(|(root, _)| root.eq_ignore_ascii_case(s))
        {
            return self
                .network
                .token(root)
                .map_or_else(|| root.to_owned(), |t| t.symbol.clone());
        }

        s.to_owned()
    }

    pub fn resolve_token(&self, raw: &str) -> Option<&'a TokenEntry> {
        self.network.token(&self.resolve(raw))
    }

    /// Locate the market contract for a symbol.
    ///
    /// Tries the canonical symbol, then the raw input, then the capitalization
    /// variants of a known problematic alias, then a case-insensitive key scan.
    pub fn resolve_for_market(&self, raw: &str) -> Option<ResolvedMarket> {
        let input = raw.trim();
        let canonical = self.resolve(input);

        let mut candidates: Vec<&str> = vec![canonical.as_str(), input];
        if let Some((_, variants)) = CAPITALIZATION_VARIANTS.iter().find(|(k, _)| {
            k.eq_ignore_ascii_case(&canonical) || k.eq_ignore_ascii_case(input)
        }) {
            candidates.extend(variants.iter().copied());
        }

        for cand in candidates {
            if let Some(market) = self.network.contracts.market_for_root(cand) {
                if let Some(r) = self.build(cand, market) {
                    return Some(r);
                }
            }
        }

        self.network
            .contracts
            .markets()
            .find(|(root, _)| root.eq_ignore_ascii_case(&canonical))
            .and_then(|(root, market)| self.build(root, market))
    }

    /// Accepts a market contract address, a symbol, or a contract-table key
    /// such as `cUSDC`.
    pub fn resolve_market_ref(&self, raw: &str) -> Option<ResolvedMarket> {
        let s = raw.trim();
        if s.starts_with("0x") {
            let addr = s.parse::<Address>().ok()?;
            let root = self.network.contracts.root_for_market(addr)?;
            return self.build(root, addr);
        }
        self.resolve_for_market(s).or_else(|| {
            let market = self.network.contracts.market_by_key(s)?;
            let root = self.network.contracts.root_for_market(market)?;
            self.build(root, market)
        })
    }

    fn build(&self, root: &str, market: Address) -> Option<ResolvedMarket> {
        let token = self.network.token(root)?;
        Some(ResolvedMarket {
            symbol: token.symbol.clone(),
            key_root: root.to_owned(),
            market,
            decimals: token.decimals,
            underlying: token.underlying,
        })
    }

    pub fn describe(&self, raw: &str) -> SymbolResolution {
        let canonical = self.resolve(raw);
        let token = self.network.token(&canonical);
        SymbolResolution {
            input: raw.to_owned(),
            resolved: token.is_some(),
            display_name: token.map(|t| t.display_name.clone()),
            decimals: token.map(|t| t.decimals),
            token_address: token.map(|t| match t.underlying {
                Underlying::Native => crate::registry::NATIVE_SENTINEL.to_owned(),
                Underlying::Erc20(a) => a.to_string(),
            }),
            market: self.resolve_for_market(raw),
            canonical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::registry::{
        fixtures::{addr, avalanche_profile},
        ContractTable, BUILTIN_NETWORKS,
    };
    use std::collections::BTreeMap;

    fn all_builtin_profiles() -> eyre::Result<Vec<NetworkProfile>> {
        let mut out = Vec::new();
        for n in BUILTIN_NETWORKS {
            let mut p = avalanche_profile();
            p.name = n.name.to_owned();
            p.tokens = n.token_entries()?;
            p.contracts = ContractTable::new(addr(0xc0), BTreeMap::new());
            out.push(p);
        }
        Ok(out)
    }

    #[test]
    fn resolution_is_idempotent_for_every_supported_symbol() -> eyre::Result<()> {
        for p in all_builtin_profiles()? {
            let r = SymbolResolver::new(&p);
            for t in &p.tokens {
                for input in [t.symbol.clone(), t.symbol.to_lowercase(), t.symbol.to_uppercase()] {
                    let once = r.resolve(&input);
                    assert_eq!(once, t.symbol, "{}: {input}", p.name);
                    assert_eq!(r.resolve(&once), once, "{}: {input}", p.name);
                }
            }
            for junk in ["", "NOPE", "  zzz  ", "cUSDC"] {
                let once = r.resolve(junk);
                assert_eq!(r.resolve(&once), once, "{}: {junk:?}", p.name);
            }
        }
        Ok(())
    }

    #[test]
    fn resolution_is_case_insensitive() {
        let p = avalanche_profile();
        let r = SymbolResolver::new(&p);
        assert_eq!(r.resolve("usdt"), "USDT");
        assert_eq!(r.resolve("USDT"), "USDT");
        assert_eq!(r.resolve(" Usdt "), "USDT");
        assert_eq!(r.resolve("SAVAX"), "sAVAX");
    }

    #[test]
    fn alias_is_reverified_against_token_table() {
        let p = avalanche_profile();
        let r = SymbolResolver::new(&p);
        assert_eq!(r.resolve("btcb"), "BTC.b");
        // DOT aliases to xcDOT, which Avalanche does not list.
        assert_eq!(r.resolve("DOT"), "DOT");
    }

    #[test]
    fn unresolved_input_is_returned_unchanged() {
        let p = avalanche_profile();
        let r = SymbolResolver::new(&p);
        assert_eq!(r.resolve("Shib"), "Shib");
        assert!(r.resolve_token("Shib").is_none());
        assert!(r.resolve_for_market("Shib").is_none());
    }

    #[test]
    fn market_root_without_token_resolves_to_root() {
        let mut p = avalanche_profile();
        let mut markets = BTreeMap::new();
        markets.insert("QI".to_owned(), addr(0x51));
        p.contracts = ContractTable::new(addr(0xc0), markets);
        let r = SymbolResolver::new(&p);
        assert_eq!(r.resolve("qi"), "QI");
        // No token entry means no decimals, so no usable market either.
        assert!(r.resolve_for_market("qi").is_none());
    }

    #[test]
    fn market_resolution_finds_contract_and_decimals() {
        let p = avalanche_profile();
        let r = SymbolResolver::new(&p);
        let m = r.resolve_for_market("usdc");
        assert_eq!(m.as_ref().map(|m| m.market), Some(addr(0xa2)));
        assert_eq!(m.as_ref().map(|m| m.decimals), Some(6));
        assert_eq!(m.as_ref().map(ResolvedMarket::market_key).as_deref(), Some("cUSDC"));

        let native = r.resolve_for_market("avax");
        assert_eq!(native.map(|m| m.underlying), Some(Underlying::Native));

        // WAVAX is a token but has no market in this table.
        assert!(r.resolve_for_market("wavax").is_none());
    }

    #[test]
    fn market_resolution_tries_capitalization_variants() -> eyre::Result<()> {
        let mut p = avalanche_profile();
        let mut markets = BTreeMap::new();
        markets.insert("SAVAX".to_owned(), addr(0xb3));
        p.contracts = ContractTable::new(addr(0xc0), markets);
        p.validate()?;
        let r = SymbolResolver::new(&p);
        for input in ["sAVAX", "savax", "SAVAX", "sAvax"] {
            let m = r.resolve_for_market(input);
            assert_eq!(m.as_ref().map(|m| m.market), Some(addr(0xb3)), "input {input}");
            assert_eq!(m.as_ref().map(|m| m.symbol.as_str()), Some("sAVAX"), "input {input}");
            assert_eq!(m.as_ref().map(|m| m.key_root.as_str()), Some("SAVAX"), "input {input}");
        }
        Ok(())
    }

    #[test]
    fn market_ref_accepts_addresses() {
        let p = avalanche_profile();
        let r = SymbolResolver::new(&p);
        let by_addr = r.resolve_market_ref(&addr(0xa3).to_string());
        assert_eq!(by_addr.map(|m| m.symbol), Some("sAVAX".to_owned()));
        assert!(r.resolve_market_ref(&addr(0x99).to_string()).is_none());
        assert!(r.resolve_market_ref("0xnothex").is_none());
    }

    #[test]
    fn market_ref_accepts_contract_table_keys() {
        let p = avalanche_profile();
        let r = SymbolResolver::new(&p);
        assert_eq!(r.resolve_market_ref("cUSDC").map(|m| m.market), Some(addr(0xa2)));
        assert_eq!(r.resolve_market_ref("csAVAX").map(|m| m.symbol), Some("sAVAX".to_owned()));
        assert!(r.resolve_market_ref("cDAI").is_none());
    }

    #[test]
    fn builtin_base_tokens_resolve_through_config() -> eyre::Result<()> {
        let cfg: AgentConfig = toml::from_str(
            r#"
[networks.base.contracts]
Comptroller = "0x0101010101010101010101010101010101010101"
cwstETH = "0x0202020202020202020202020202020202020202"
ccbETH = "0x0303030303030303030303030303030303030303"
"#,
        )?;
        let p = cfg.resolve_network(8453)?;
        let r = SymbolResolver::new(&p);
        assert_eq!(r.resolve("WSTETH"), "wstETH");
        assert_eq!(r.resolve_for_market("WSTETH").map(|m| m.market), Some(addr(2)));
        assert_eq!(r.resolve_for_market("cbeth").map(|m| m.market), Some(addr(3)));
        Ok(())
    }

    #[test]
    fn describe_reports_unresolved_inputs() {
        let p = avalanche_profile();
        let r = SymbolResolver::new(&p);
        let d = r.describe("nope");
        assert!(!d.resolved);
        assert!(d.market.is_none());
        assert!(d.display_name.is_none());
        let d = r.describe("avax");
        assert_eq!(d.token_address.as_deref(), Some("native"));
        assert_eq!(d.decimals, Some(18));
        assert_eq!(d.display_name.as_deref(), Some("Avalanche"));
        let d = r.describe("usdc");
        assert_eq!(d.display_name.as_deref(), Some("USD Coin"));
    }
}
