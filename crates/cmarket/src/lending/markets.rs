use super::{abi::ICToken, resolver::ResolvedMarket, AgentContext};
use crate::{
    amount::display_amount,
    errors::AgentError,
    financial_math::{mantissa_to_f64, rate_per_block_to_apy, token_base_to_usd, utilization_pct},
    price::PriceMap,
    registry::NATIVE_SENTINEL,
};
use alloy::primitives::{Address, U256};
use serde::Serialize;
use tracing::warn;

/// Raw on-chain state of one market, as read in a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub exchange_rate_mantissa: U256,
    pub supply_rate_per_block: U256,
    pub borrow_rate_per_block: U256,
    pub total_supply: U256,
    pub total_borrows: U256,
    pub cash: U256,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketSummary {
    pub symbol: String,
    pub market: String,
    pub underlying: String,
    pub decimals: u8,
    pub exchange_rate: f64,
    pub supply_apy: f64,
    pub borrow_apy: f64,
    pub total_supply_ctokens: String,
    pub total_borrows: String,
    pub cash: String,
    pub utilization: f64,
    pub price_usd: f64,
    pub total_borrows_usd: f64,
    pub cash_usd: f64,
}

/// Six independent reads, issued concurrently; any failure fails the snapshot.
pub async fn get_market_snapshot(ctx: &AgentContext, market: Address) -> Result<MarketSnapshot, AgentError> {
    let (exchange_rate_mantissa, supply_rate_per_block, borrow_rate_per_block, total_supply, total_borrows, cash) =
        tokio::try_join!(
            ctx.read("exchangeRateStored", market, ICToken::exchangeRateStoredCall {}),
            ctx.read("supplyRatePerBlock", market, ICToken::supplyRatePerBlockCall {}),
            ctx.read("borrowRatePerBlock", market, ICToken::borrowRatePerBlockCall {}),
            ctx.read("totalSupply", market, ICToken::totalSupplyCall {}),
            ctx.read("totalBorrows", market, ICToken::totalBorrowsCall {}),
            ctx.read("getCash", market, ICToken::getCashCall {}),
        )?;
    Ok(MarketSnapshot {
        exchange_rate_mantissa,
        supply_rate_per_block,
        borrow_rate_per_block,
        total_supply,
        total_borrows,
        cash,
    })
}

fn summarize(ctx: &AgentContext, m: &ResolvedMarket, s: &MarketSnapshot, prices: &PriceMap) -> MarketSummary {
    let price = prices.get(&m.symbol).copied().unwrap_or_default();
    MarketSummary {
        symbol: m.symbol.clone(),
        market: m.market.to_string(),
        underlying: m
            .underlying
            .erc20()
            .map_or_else(|| NATIVE_SENTINEL.to_owned(), |a| a.to_string()),
        decimals: m.decimals,
        exchange_rate: mantissa_to_f64(s.exchange_rate_mantissa),
        supply_apy: rate_per_block_to_apy(s.supply_rate_per_block, ctx.network.blocks_per_year),
        borrow_apy: rate_per_block_to_apy(s.borrow_rate_per_block, ctx.network.blocks_per_year),
        total_supply_ctokens: display_amount(s.total_supply, crate::registry::CTOKEN_DECIMALS),
        total_borrows: display_amount(s.total_borrows, m.decimals),
        cash: display_amount(s.cash, m.decimals),
        utilization: utilization_pct(s.total_borrows, s.total_supply, s.exchange_rate_mantissa),
        price_usd: price,
        total_borrows_usd: token_base_to_usd(s.total_borrows, m.decimals, price),
        cash_usd: token_base_to_usd(s.cash, m.decimals, price),
    }
}

/// Every market in the contract table; unreadable markets are logged and skipped.
pub async fn get_all_markets(ctx: &AgentContext) -> Vec<MarketSummary> {
    let prices = ctx.prices_or_empty().await;
    let resolver = ctx.resolver();
    let mut out = Vec::with_capacity(ctx.network.contracts.market_count());

    for (root, _) in ctx.network.contracts.markets() {
        let Some(m) = resolver.resolve_for_market(root) else {
            warn!(market = root, "market has no token entry; skipped");
            continue;
        };
        match get_market_snapshot(ctx, m.market).await {
            Ok(s) => out.push(summarize(ctx, &m, &s, &prices)),
            Err(e) => warn!(market = %m.market_key(), error = %e, "market snapshot failed; skipped"),
        }
    }
    out
}

pub async fn get_market_details(ctx: &AgentContext, raw: &str) -> Result<MarketSummary, AgentError> {
    let m = ctx.resolver().resolve_market_ref(raw).ok_or_else(|| {
        AgentError::validation(format!("Market not available for {} on {}", raw.trim(), ctx.network.name))
    })?;
    let (snapshot, prices) = tokio::join!(get_market_snapshot(ctx, m.market), ctx.prices_or_empty());
    Ok(summarize(ctx, &m, &snapshot?, &prices))
}
