use super::{
    abi::{IComptroller, ICToken},
    resolver::ResolvedMarket,
    AgentContext,
};
use crate::{
    amount::display_amount,
    errors::AgentError,
    financial_math::{
        accum, factor_divergence_pct, health_factor, mantissa_to_f64, mul_f64, token_base_to_usd,
    },
    price::PriceMap,
    wallet::WalletIdentity,
};
use alloy::primitives::{Address, U256};
use serde::Serialize;
use tracing::warn;

/// Stand-in collateral factor when the comptroller cannot be asked.
pub const PLACEHOLDER_COLLATERAL_FACTOR: f64 = 0.75;

/// Percentage points an on-chain factor may differ from the placeholder
/// before it is flagged.
pub const COLLATERAL_FACTOR_TOLERANCE_PCT: f64 = 5.0;

const EXCHANGE_RATE_SCALE: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralFactorSource {
    Comptroller,
    Placeholder,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountPosition {
    pub symbol: String,
    pub market: String,
    pub supplied_underlying: String,
    pub borrowed_underlying: String,
    pub supply_value_usd: f64,
    pub borrow_value_usd: f64,
    pub is_collateral: bool,
    pub collateral_factor: f64,
    pub collateral_factor_source: CollateralFactorSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountLiquiditySummary {
    pub account: String,
    pub liquidity_usd: f64,
    pub shortfall_usd: f64,
    pub health_factor: f64,
    pub total_collateral_usd: f64,
    pub total_borrow_usd: f64,
    pub borrow_capacity_usd: f64,
    pub positions: Vec<AccountPosition>,
}

/// `cTokenBalance * exchangeRateMantissa / 1e18`, in underlying base units.
pub fn supplied_underlying(ctoken_balance: U256, exchange_rate_mantissa: U256) -> U256 {
    ctoken_balance.saturating_mul(exchange_rate_mantissa) / U256::from(EXCHANGE_RATE_SCALE)
}

async fn collateral_factor(ctx: &AgentContext, m: &ResolvedMarket) -> (f64, CollateralFactorSource) {
    match ctx
        .read(
            "comptroller.markets",
            ctx.network.contracts.comptroller,
            IComptroller::marketsCall { cToken: m.market },
        )
        .await
    {
        Ok(r) if r.isListed => {
            let factor = mantissa_to_f64(r.collateralFactorMantissa);
            if factor_divergence_pct(factor, PLACEHOLDER_COLLATERAL_FACTOR) > COLLATERAL_FACTOR_TOLERANCE_PCT {
                warn!(
                    market = %m.market_key(),
                    factor,
                    placeholder = PLACEHOLDER_COLLATERAL_FACTOR,
                    "on-chain collateral factor diverges from placeholder"
                );
            }
            (factor, CollateralFactorSource::Comptroller)
        }
        Ok(_) => {
            warn!(market = %m.market_key(), "market not listed in comptroller; using placeholder factor");
            (PLACEHOLDER_COLLATERAL_FACTOR, CollateralFactorSource::Placeholder)
        }
        Err(e) => {
            warn!(market = %m.market_key(), error = %e, "collateral factor unavailable; using placeholder");
            (PLACEHOLDER_COLLATERAL_FACTOR, CollateralFactorSource::Placeholder)
        }
    }
}

pub async fn get_user_position(
    ctx: &AgentContext,
    m: &ResolvedMarket,
    account: Address,
    prices: &PriceMap,
) -> Result<AccountPosition, AgentError> {
    let (ctoken_balance, snapshot) = tokio::try_join!(
        ctx.read("balanceOf", m.market, ICToken::balanceOfCall { owner: account }),
        ctx.read(
            "getAccountSnapshot",
            m.market,
            ICToken::getAccountSnapshotCall { account }
        ),
    )?;
    if !snapshot.errorCode.is_zero() {
        return Err(AgentError::Protocol {
            context: "getAccountSnapshot",
            code: snapshot.errorCode,
        });
    }
    let (factor, source) = collateral_factor(ctx, m).await;

    let supplied = supplied_underlying(ctoken_balance, snapshot.exchangeRateMantissa);
    let borrowed = snapshot.borrowBalance;
    let price = prices.get(&m.symbol).copied().unwrap_or_default();

    Ok(AccountPosition {
        symbol: m.symbol.clone(),
        market: m.market.to_string(),
        supplied_underlying: display_amount(supplied, m.decimals),
        borrowed_underlying: display_amount(borrowed, m.decimals),
        supply_value_usd: token_base_to_usd(supplied, m.decimals, price),
        borrow_value_usd: token_base_to_usd(borrowed, m.decimals, price),
        // Only entered markets are visited, and entering is what makes a market collateral.
        is_collateral: true,
        collateral_factor: factor,
        collateral_factor_source: source,
    })
}

fn parse_account(ctx: &AgentContext, account: Option<&str>) -> Result<Address, AgentError> {
    match account.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .parse::<Address>()
            .map_err(|e| AgentError::validation(format!("invalid account address {raw:?}: {e}"))),
        None => ctx
            .wallet
            .as_ref()
            .map(WalletIdentity::address)
            .ok_or_else(|| {
                AgentError::validation("an account address is required when no wallet is configured")
            }),
    }
}

pub async fn get_account_liquidity(
    ctx: &AgentContext,
    account: Option<&str>,
) -> Result<AccountLiquiditySummary, AgentError> {
    let account = parse_account(ctx, account)?;
    let comptroller = ctx.network.contracts.comptroller;

    let (liq, assets) = tokio::try_join!(
        ctx.read(
            "getAccountLiquidity",
            comptroller,
            IComptroller::getAccountLiquidityCall { account }
        ),
        ctx.read("getAssetsIn", comptroller, IComptroller::getAssetsInCall { account }),
    )?;
    if !liq.errorCode.is_zero() {
        return Err(AgentError::Protocol {
            context: "getAccountLiquidity",
            code: liq.errorCode,
        });
    }

    let prices = ctx.prices_or_empty().await;
    let resolver = ctx.resolver();
    let mut positions = Vec::with_capacity(assets.len());
    for market in assets {
        let Some(m) = resolver.resolve_market_ref(&market.to_string()) else {
            warn!(%market, "entered market is not in the contract table; skipped");
            continue;
        };
        match get_user_position(ctx, &m, account, &prices).await {
            Ok(p) => positions.push(p),
            Err(e) => warn!(market = %m.market_key(), error = %e, "position fetch failed; skipped"),
        }
    }

    let mut total_collateral_usd = 0.0_f64;
    let mut total_borrow_usd = 0.0_f64;
    let mut borrow_capacity_usd = 0.0_f64;
    for p in &positions {
        accum(&mut total_collateral_usd, p.supply_value_usd);
        accum(&mut total_borrow_usd, p.borrow_value_usd);
        accum(&mut borrow_capacity_usd, mul_f64(p.supply_value_usd, p.collateral_factor));
    }

    Ok(AccountLiquiditySummary {
        account: account.to_string(),
        liquidity_usd: mantissa_to_f64(liq.liquidity),
        shortfall_usd: mantissa_to_f64(liq.shortfall),
        health_factor: health_factor(total_collateral_usd, total_borrow_usd),
        total_collateral_usd,
        total_borrow_usd,
        borrow_capacity_usd,
        positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chains::mock::{ret, MockChain},
        financial_math::NO_BORROW_HEALTH_FACTOR,
        lending::testutil,
        registry::fixtures::addr,
    };

    const E18: u128 = 1_000_000_000_000_000_000;

    fn stub_comptroller(chain: &MockChain, code: u64, markets: Vec<Address>) {
        chain
            .respond::<IComptroller::getAccountLiquidityCall>(
                addr(0xc0),
                ret((U256::from(code), U256::from(500 * E18), U256::ZERO)),
            )
            .respond::<IComptroller::getAssetsInCall>(addr(0xc0), ret(markets));
    }

    fn stub_factor(chain: &MockChain, mantissa: u128) {
        chain.respond::<IComptroller::marketsCall>(addr(0xc0), ret((true, U256::from(mantissa), false)));
    }

    /// `ctokens` at exchange mantissa `exch`, with `borrow` base units owed.
    fn stub_position(chain: &MockChain, market: Address, ctokens: u128, exch: u128, borrow: u128) {
        chain
            .respond::<ICToken::balanceOfCall>(market, ret(U256::from(ctokens)))
            .respond::<ICToken::getAccountSnapshotCall>(
                market,
                ret((U256::ZERO, U256::from(ctokens), U256::from(borrow), U256::from(exch))),
            );
    }

    #[test]
    fn supplied_underlying_scales_by_exchange_rate() {
        // 50 cTokens (8 decimals) at 0.02 USDC each (6 decimals) = 1 USDC.
        let exch = U256::from(200_000_000_000_000_u64);
        assert_eq!(
            supplied_underlying(U256::from(5_000_000_000_u64), exch),
            U256::from(1_000_000_u64)
        );
    }

    #[tokio::test]
    async fn no_borrows_reports_sentinel_health_factor() -> eyre::Result<()> {
        let h = testutil::with_wallet()?;
        stub_comptroller(&h.chain, 0, vec![addr(0xa2)]);
        stub_factor(&h.chain, 750_000_000_000_000_000);
        // 500 cTokens -> 10 USDC supplied, nothing borrowed.
        stub_position(&h.chain, addr(0xa2), 50_000_000_000, 200_000_000_000_000, 0);

        let s = get_account_liquidity(&h.ctx, None).await?;
        assert!((s.health_factor - NO_BORROW_HEALTH_FACTOR).abs() < f64::EPSILON, "hf {}", s.health_factor);
        assert!((s.total_collateral_usd - 10.0).abs() < 1e-9, "collateral {}", s.total_collateral_usd);
        assert!((s.liquidity_usd - 500.0).abs() < 1e-9, "liquidity {}", s.liquidity_usd);
        assert!((s.borrow_capacity_usd - 7.5).abs() < 1e-9, "capacity {}", s.borrow_capacity_usd);
        assert_eq!(s.positions.len(), 1);
        assert_eq!(s.positions.first().map(|p| p.supplied_underlying.as_str()), Some("10"));
        Ok(())
    }

    #[tokio::test]
    async fn health_factor_is_collateral_over_borrows() -> eyre::Result<()> {
        let h = testutil::with_wallet()?;
        stub_comptroller(&h.chain, 0, vec![addr(0xa1), addr(0xa2)]);
        stub_factor(&h.chain, 750_000_000_000_000_000);
        // 1 AVAX supplied at $20; 4 USDC borrowed.
        stub_position(&h.chain, addr(0xa1), 100_000_000, 10_000_000_000_000_000_000_000_000_000, 0);
        stub_position(&h.chain, addr(0xa2), 0, 200_000_000_000_000, 4_000_000);

        let s = get_account_liquidity(&h.ctx, None).await?;
        assert!((s.total_collateral_usd - 20.0).abs() < 1e-9, "collateral {}", s.total_collateral_usd);
        assert!((s.total_borrow_usd - 4.0).abs() < 1e-9, "borrow {}", s.total_borrow_usd);
        assert!((s.health_factor - 5.0).abs() < 1e-9, "hf {}", s.health_factor);
        Ok(())
    }

    #[tokio::test]
    async fn nonzero_liquidity_code_is_fatal() -> eyre::Result<()> {
        let h = testutil::with_wallet()?;
        stub_comptroller(&h.chain, 3, vec![]);
        let err = get_account_liquidity(&h.ctx, None).await.err();
        assert_eq!(err.as_ref().map(AgentError::code), Some("protocol_error"));
        assert!(matches!(
            err,
            Some(AgentError::Protocol { context: "getAccountLiquidity", code }) if code == U256::from(3_u64)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn failing_position_is_skipped() -> eyre::Result<()> {
        let h = testutil::with_wallet()?;
        stub_comptroller(&h.chain, 0, vec![addr(0xa1), addr(0xa2)]);
        stub_factor(&h.chain, 750_000_000_000_000_000);
        h.chain.fail_reads_from(addr(0xa1));
        stub_position(&h.chain, addr(0xa2), 50_000_000_000, 200_000_000_000_000, 0);

        let s = get_account_liquidity(&h.ctx, None).await?;
        let symbols: Vec<&str> = s.positions.iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["USDC"]);
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_error_code_skips_that_position() -> eyre::Result<()> {
        let h = testutil::with_wallet()?;
        stub_comptroller(&h.chain, 0, vec![addr(0xa2)]);
        h.chain
            .respond::<ICToken::balanceOfCall>(addr(0xa2), ret(U256::from(1_u64)))
            .respond::<ICToken::getAccountSnapshotCall>(
                addr(0xa2),
                ret((U256::from(9_u64), U256::ZERO, U256::ZERO, U256::ZERO)),
            );
        let s = get_account_liquidity(&h.ctx, None).await?;
        assert!(s.positions.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn comptroller_factor_is_used_and_placeholder_is_fallback() -> eyre::Result<()> {
        let h = testutil::with_wallet()?;
        stub_comptroller(&h.chain, 0, vec![addr(0xa2)]);
        stub_position(&h.chain, addr(0xa2), 50_000_000_000, 200_000_000_000_000, 0);

        // No markets() response: placeholder.
        let s = get_account_liquidity(&h.ctx, None).await?;
        let p = s.positions.first().cloned();
        assert_eq!(p.as_ref().map(|p| p.collateral_factor_source), Some(CollateralFactorSource::Placeholder));

        // A divergent on-chain factor is reported as-is.
        stub_factor(&h.chain, 500_000_000_000_000_000);
        let s = get_account_liquidity(&h.ctx, None).await?;
        let p = s.positions.first().cloned();
        assert_eq!(p.as_ref().map(|p| p.collateral_factor_source), Some(CollateralFactorSource::Comptroller));
        assert!(p.is_some_and(|p| (p.collateral_factor - 0.5).abs() < 1e-9));
        Ok(())
    }

    #[test]
    fn placeholder_divergence_threshold() {
        assert!(factor_divergence_pct(0.72, PLACEHOLDER_COLLATERAL_FACTOR) <= COLLATERAL_FACTOR_TOLERANCE_PCT);
        assert!(factor_divergence_pct(0.5, PLACEHOLDER_COLLATERAL_FACTOR) > COLLATERAL_FACTOR_TOLERANCE_PCT);
    }

    #[tokio::test]
    async fn explicit_account_works_in_read_only_mode() -> eyre::Result<()> {
        let h = testutil::read_only()?;
        stub_comptroller(&h.chain, 0, vec![]);
        let s = get_account_liquidity(&h.ctx, Some("0x00000000000000000000000000000000000000aa")).await?;
        assert!(s.positions.is_empty());

        let missing = get_account_liquidity(&h.ctx, None).await.err();
        assert_eq!(missing.as_ref().map(AgentError::code), Some("validation_error"));
        let bad = get_account_liquidity(&h.ctx, Some("0x12")).await.err();
        assert_eq!(bad.as_ref().map(AgentError::code), Some("validation_error"));
        Ok(())
    }
}
