use crate::{config::HttpConfig, registry::NetworkProfile};
use async_trait::async_trait;
use eyre::Context as _;
use reqwest::Client;
use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};
use tracing::debug;

/// USD price per whole token, keyed by token-table symbol.
pub type PriceMap = BTreeMap<String, f64>;

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn prices_for_network(&self, network: &NetworkProfile) -> eyre::Result<PriceMap>;
}

/// Stablecoins priced at par without a lookup.
const STABLES: &[&str] = &["USDC", "USDT", "DAI", "USDC.E", "USDBC"];

/// Wrapped or bridged symbols that trade on Binance under another ticker.
const BINANCE_ALIASES: &[(&str, &str)] = &[
    ("WETH", "ETH"),
    ("WAVAX", "AVAX"),
    ("BTC.B", "BTC"),
    ("WBTC", "BTC"),
    ("XCDOT", "DOT"),
    ("WGLMR", "GLMR"),
];

fn is_stable(symbol: &str) -> bool {
    STABLES.iter().any(|s| s.eq_ignore_ascii_case(symbol))
}

/// The Binance base asset used to price a token-table symbol.
pub fn binance_base_asset(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    BINANCE_ALIASES
        .iter()
        .find(|(from, _)| *from == upper)
        .map_or(upper, |(_, to)| (*to).to_owned())
}

fn allow_insecure_http() -> bool {
    std::env::var("CMARKET_ALLOW_INSECURE_HTTP")
        .ok()
        .is_some_and(|v| {
            matches!(
                v.as_str(),
                "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON"
            )
        })
}

fn is_loopback_http(url: &str) -> bool {
    fn host_prefix_ok(s: &str, prefix: &str) -> bool {
        if !s.starts_with(prefix) {
            return false;
        }
        matches!(s.as_bytes().get(prefix.len()), None | Some(b':' | b'/'))
    }
    let u = url.trim();
    host_prefix_ok(u, "http://127.0.0.1")
        || host_prefix_ok(u, "http://localhost")
        || host_prefix_ok(u, "http://[::1]")
}

#[derive(Debug, Deserialize)]
struct BinanceTickerPrice {
    price: String,
}

/// Keyless Binance spot tickers (`<BASE>USDT`).
#[derive(Debug, Clone)]
pub struct BinancePriceFeed {
    base_url: String,
    client: Client,
}

impl BinancePriceFeed {
    pub fn new(cfg: &HttpConfig) -> eyre::Result<Self> {
        let base = cfg.binance_base_url.trim().trim_end_matches('/').to_owned();
        if !base.starts_with("https://") && !is_loopback_http(&base) && !allow_insecure_http() {
            eyre::bail!(
                "binance_base_url must use https (or loopback); set CMARKET_ALLOW_INSECURE_HTTP=1 to override"
            );
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
            .build()
            .context("build http client")?;
        Ok(Self {
            base_url: base,
            client,
        })
    }

    async fn ticker_usd(&self, base_asset: &str) -> eyre::Result<f64> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={base_asset}USDT",
            self.base_url
        );
        let v: BinanceTickerPrice = self
            .client
            .get(url)
            .send()
            .await
            .context("binance request")?
            .error_for_status()
            .context("binance status")?
            .json()
            .await
            .context("binance json")?;
        v.price.parse::<f64>().context("parse binance price")
    }
}

#[async_trait]
impl PriceFeed for BinancePriceFeed {
    async fn prices_for_network(&self, network: &NetworkProfile) -> eyre::Result<PriceMap> {
        let mut out = PriceMap::new();
        let mut by_asset: BTreeMap<String, Option<f64>> = BTreeMap::new();
        let mut last_err: Option<eyre::Report> = None;
        let mut wanted = 0_usize;

        for t in &network.tokens {
            if is_stable(&t.symbol) {
                out.insert(t.symbol.clone(), 1.0_f64);
                continue;
            }
            wanted = wanted.saturating_add(1);
            let asset = binance_base_asset(&t.symbol);
            if !by_asset.contains_key(&asset) {
                let p = match self.ticker_usd(&asset).await {
                    Ok(p) => Some(p),
                    Err(e) => {
                        debug!(symbol = %t.symbol, asset = %asset, error = %format!("{e:#}"), "no binance price");
                        last_err = Some(e);
                        None
                    }
                };
                by_asset.insert(asset.clone(), p);
            }
            if let Some(Some(p)) = by_asset.get(&asset) {
                out.insert(t.symbol.clone(), *p);
            }
        }

        // Only a wholesale outage is an error; unlisted tokens just stay unpriced.
        if wanted > 0 && by_asset.values().all(Option::is_none) {
            return Err(last_err
                .unwrap_or_else(|| eyre::eyre!("no prices available"))
                .wrap_err(format!("price feed unavailable for {}", network.name)));
        }
        Ok(out)
    }
}

/// Fixed prices for tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticPrices {
    pub prices: PriceMap,
    pub fail: bool,
}

#[cfg(test)]
impl StaticPrices {
    pub fn with(pairs: &[(&str, f64)]) -> Self {
        Self {
            prices: pairs.iter().map(|(s, p)| ((*s).to_owned(), *p)).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            prices: PriceMap::new(),
            fail: true,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl PriceFeed for StaticPrices {
    async fn prices_for_network(&self, _network: &NetworkProfile) -> eyre::Result<PriceMap> {
        if self.fail {
            eyre::bail!("price service unreachable");
        }
        Ok(self.prices.clone())
    }
}
