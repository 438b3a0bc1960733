//! State-changing lending operations.
//!
//! Every operation runs the same gate before touching the chain: mode guard,
//! then address and amount validation, then (where an explicit amount is
//! given) a balance pre-check. Only after that are transactions submitted,
//! strictly one after another. Prerequisite transactions (market entry,
//! approvals) are awaited to a successful receipt before the next step; the
//! final action returns as soon as the node accepts it.

use super::{
    abi::{IComptroller, ICErc20, ICEther, ICToken, IERC20},
    resolver::ResolvedMarket,
    AgentContext,
};
use crate::{
    amount::{display_amount, parse_positive_amount},
    errors::{normalize_chain_error, AgentError, ChainOp},
    financial_math::{accum, token_base_to_usd},
    registry::{TokenEntry, Underlying, CTOKEN_DECIMALS, NATIVE_DECIMALS},
    wallet::WalletIdentity,
};
use alloy::{
    network::TransactionBuilder as _,
    primitives::{Address, B256, U256},
    rpc::types::TransactionRequest,
};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct PrerequisiteTx {
    pub action: &'static str,
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxOutcome {
    pub action: &'static str,
    pub tx_hash: String,
    pub explorer_url: String,
    /// Contract (or recipient) the final transaction was sent to.
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<PrerequisiteTx>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllowanceInfo {
    pub symbol: String,
    pub token: String,
    pub owner: String,
    pub spender: String,
    pub allowance: String,
    pub unlimited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MembershipInfo {
    pub account: String,
    pub market: String,
    pub symbol: String,
    pub is_member: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptStatus {
    pub tx_hash: String,
    /// `pending`, `success` or `reverted`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    pub explorer_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenBalance {
    pub symbol: String,
    pub name: String,
    pub balance: String,
    pub price_usd: f64,
    pub value_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletInfo {
    pub network: String,
    pub chain_id: u64,
    pub native_symbol: String,
    pub explorer_url: String,
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub balances: Vec<TokenBalance>,
    pub total_value_usd: f64,
}

// ── validation helpers ───────────────────────────────────────────────

fn parse_address(what: &str, raw: &str) -> Result<Address, AgentError> {
    let raw = raw.trim();
    let addr = raw
        .parse::<Address>()
        .map_err(|e| AgentError::validation(format!("invalid {what} address {raw:?}: {e}")))?;
    if addr.is_zero() {
        return Err(AgentError::validation(format!("{what} must not be the zero address")));
    }
    Ok(addr)
}

fn parse_amount(raw: &str, decimals: u8) -> Result<U256, AgentError> {
    parse_positive_amount(raw, decimals)
        .map_err(|e| AgentError::validation(format!("invalid amount {:?}: {e}", raw.trim())))
}

fn resolve_market(ctx: &AgentContext, raw: &str) -> Result<ResolvedMarket, AgentError> {
    ctx.resolver().resolve_for_market(raw).ok_or_else(|| {
        AgentError::validation(format!(
            "Market not available for {} on {}",
            raw.trim(),
            ctx.network.name
        ))
    })
}

fn resolve_token<'a>(ctx: &'a AgentContext, raw: &str) -> Result<&'a TokenEntry, AgentError> {
    ctx.resolver().resolve_token(raw).ok_or_else(|| {
        AgentError::validation(format!("unknown token {} on {}", raw.trim(), ctx.network.name))
    })
}

fn require_erc20(token: &TokenEntry) -> Result<Address, AgentError> {
    token.underlying.erc20().ok_or_else(|| {
        AgentError::validation(format!(
            "{} is the native asset and has no token contract",
            token.symbol
        ))
    })
}

/// A spender is either an address or a market symbol.
fn resolve_spender(ctx: &AgentContext, raw: &str) -> Result<Address, AgentError> {
    if raw.trim().starts_with("0x") {
        return parse_address("spender", raw);
    }
    resolve_market(ctx, raw).map(|m| m.market)
}

// ── chain helpers ────────────────────────────────────────────────────

async fn underlying_balance(
    ctx: &AgentContext,
    owner: Address,
    underlying: Underlying,
) -> Result<U256, AgentError> {
    match underlying {
        Underlying::Native => ctx
            .chain
            .native_balance(owner)
            .await
            .map_err(|e| normalize_chain_error(ChainOp::Read, "native balance", &e)),
        Underlying::Erc20(token) => {
            ctx.read("balanceOf", token, IERC20::balanceOfCall { account: owner })
                .await
        }
    }
}

/// Pre-flight balance check. An unreadable balance is not fatal; the chain
/// remains the final arbiter.
async fn ensure_balance(
    ctx: &AgentContext,
    owner: Address,
    token: &TokenEntry,
    amount: U256,
) -> Result<(), AgentError> {
    match underlying_balance(ctx, owner, token.underlying).await {
        Ok(available) if available < amount => Err(AgentError::InsufficientBalance {
            symbol: token.symbol.clone(),
            requested: display_amount(amount, token.decimals),
            available: display_amount(available, token.decimals),
        }),
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(symbol = %token.symbol, error = %e, "balance pre-check skipped");
            Ok(())
        }
    }
}

/// Approve `spender` for `U256::MAX` when the current allowance cannot cover `amount`.
async fn ensure_allowance(
    ctx: &AgentContext,
    wallet: &WalletIdentity,
    token: Address,
    spender: Address,
    amount: U256,
    prerequisites: &mut Vec<PrerequisiteTx>,
) -> Result<(), AgentError> {
    let current = ctx
        .read(
            "allowance",
            token,
            IERC20::allowanceCall {
                owner: wallet.address(),
                spender,
            },
        )
        .await?;
    if current >= amount {
        return Ok(());
    }
    let hash = ctx
        .submit(
            wallet,
            "approve",
            token,
            IERC20::approveCall {
                spender,
                value: U256::MAX,
            },
            U256::ZERO,
        )
        .await?;
    info!(%token, %spender, tx = %hash, "approval submitted");
    let r = ctx.confirm("approve", hash).await?;
    prerequisites.push(PrerequisiteTx {
        action: "approve",
        tx_hash: hash.to_string(),
        block_number: r.block_number,
    });
    Ok(())
}

async fn is_member(ctx: &AgentContext, account: Address, market: Address) -> Result<bool, AgentError> {
    ctx.read(
        "checkMembership",
        ctx.network.contracts.comptroller,
        IComptroller::checkMembershipCall {
            account,
            cToken: market,
        },
    )
    .await
}

fn outcome(
    ctx: &AgentContext,
    action: &'static str,
    hash: B256,
    target: Address,
    symbol: Option<&str>,
    amount: Option<String>,
    prerequisites: Vec<PrerequisiteTx>,
) -> TxOutcome {
    let tx_hash = hash.to_string();
    info!(action, tx = %tx_hash, %target, network = %ctx.network.name, "transaction submitted");
    TxOutcome {
        action,
        explorer_url: ctx.network.explorer_tx_url(&tx_hash),
        tx_hash,
        target: target.to_string(),
        symbol: symbol.map(str::to_owned),
        amount,
        prerequisites,
    }
}

// ── read-side helpers that need a wallet ─────────────────────────────

pub async fn get_wallet_info(ctx: &AgentContext) -> Result<WalletInfo, AgentError> {
    let net = &ctx.network;
    let mut info = WalletInfo {
        network: net.name.clone(),
        chain_id: net.chain_id,
        native_symbol: net.native_symbol.clone(),
        explorer_url: net.explorer_url.clone(),
        mode: ctx.mode(),
        address: None,
        balances: Vec::new(),
        total_value_usd: 0.0_f64,
    };
    let Some(wallet) = ctx.wallet.as_ref() else {
        return Ok(info);
    };
    info.address = Some(wallet.address().to_string());

    let prices = ctx.prices_or_empty().await;
    for token in &net.tokens {
        match underlying_balance(ctx, wallet.address(), token.underlying).await {
            Ok(base) => {
                let price = prices.get(&token.symbol).copied().unwrap_or_default();
                let value_usd = token_base_to_usd(base, token.decimals, price);
                accum(&mut info.total_value_usd, value_usd);
                info.balances.push(TokenBalance {
                    symbol: token.symbol.clone(),
                    name: token.display_name.clone(),
                    balance: display_amount(base, token.decimals),
                    price_usd: price,
                    value_usd,
                });
            }
            Err(e) => warn!(symbol = %token.symbol, error = %e, "balance read failed; skipped"),
        }
    }
    Ok(info)
}

pub async fn check_allowance(ctx: &AgentContext, symbol: &str, spender: &str) -> Result<AllowanceInfo, AgentError> {
    let wallet = ctx.require_wallet()?;
    let token = resolve_token(ctx, symbol)?;
    let token_addr = require_erc20(token)?;
    let spender = resolve_spender(ctx, spender)?;
    let allowance = ctx
        .read(
            "allowance",
            token_addr,
            IERC20::allowanceCall {
                owner: wallet.address(),
                spender,
            },
        )
        .await?;
    Ok(AllowanceInfo {
        symbol: token.symbol.clone(),
        token: token_addr.to_string(),
        owner: wallet.address().to_string(),
        spender: spender.to_string(),
        allowance: display_amount(allowance, token.decimals),
        unlimited: allowance == U256::MAX,
    })
}

pub async fn check_market_membership(ctx: &AgentContext, market: &str) -> Result<MembershipInfo, AgentError> {
    let wallet = ctx.require_wallet()?;
    let m = ctx.resolver().resolve_market_ref(market).ok_or_else(|| {
        AgentError::validation(format!("Market not available for {} on {}", market.trim(), ctx.network.name))
    })?;
    let is_member = is_member(ctx, wallet.address(), m.market).await?;
    Ok(MembershipInfo {
        account: wallet.address().to_string(),
        market: m.market.to_string(),
        symbol: m.symbol,
        is_member,
    })
}

pub async fn get_transaction_receipt(ctx: &AgentContext, tx_hash: &str) -> Result<ReceiptStatus, AgentError> {
    let raw = tx_hash.trim();
    let hash = raw
        .parse::<B256>()
        .map_err(|e| AgentError::validation(format!("invalid transaction hash {raw:?}: {e}")))?;
    let r = ctx
        .chain
        .transaction_receipt(hash)
        .await
        .map_err(|e| normalize_chain_error(ChainOp::Read, "transaction receipt", &e))?;
    let tx_hash = hash.to_string();
    Ok(ReceiptStatus {
        explorer_url: ctx.network.explorer_tx_url(&tx_hash),
        tx_hash,
        status: match r {
            None => "pending",
            Some(ref r) if r.success => "success",
            Some(_) => "reverted",
        },
        block_number: r.and_then(|r| r.block_number),
        gas_used: r.map(|r| r.gas_used),
    })
}

// ── transfers and approvals ──────────────────────────────────────────

pub async fn send_native_token(ctx: &AgentContext, to: &str, amount: &str) -> Result<TxOutcome, AgentError> {
    let wallet = ctx.require_wallet()?;
    let to = parse_address("recipient", to)?;
    let native = ctx.network.native_token().cloned().unwrap_or_else(|| TokenEntry {
        symbol: ctx.network.native_symbol.clone(),
        display_name: ctx.network.native_symbol.clone(),
        decimals: NATIVE_DECIMALS,
        underlying: Underlying::Native,
    });
    let value = parse_amount(amount, native.decimals)?;
    ensure_balance(ctx, wallet.address(), &native, value).await?;

    let tx = TransactionRequest::default()
        .with_from(wallet.address())
        .with_to(to)
        .with_value(value);
    let hash = ctx
        .chain
        .send_transaction(wallet.signer(), tx)
        .await
        .map_err(|e| normalize_chain_error(ChainOp::Submit, "native transfer", &e))?;
    Ok(outcome(
        ctx,
        "send_native_token",
        hash,
        to,
        Some(&native.symbol),
        Some(display_amount(value, native.decimals)),
        Vec::new(),
    ))
}

pub async fn send_erc20_token(
    ctx: &AgentContext,
    symbol: &str,
    to: &str,
    amount: &str,
) -> Result<TxOutcome, AgentError> {
    let wallet = ctx.require_wallet()?;
    let token = resolve_token(ctx, symbol)?;
    let token_addr = token.underlying.erc20().ok_or_else(|| {
        AgentError::validation(format!(
            "{} is the native asset; use send_native_token",
            token.symbol
        ))
    })?;
    let to = parse_address("recipient", to)?;
    let value = parse_amount(amount, token.decimals)?;
    ensure_balance(ctx, wallet.address(), token, value).await?;

    let hash = ctx
        .submit(wallet, "transfer", token_addr, IERC20::transferCall { to, value }, U256::ZERO)
        .await?;
    Ok(outcome(
        ctx,
        "send_erc20_token",
        hash,
        token_addr,
        Some(&token.symbol),
        Some(display_amount(value, token.decimals)),
        Vec::new(),
    ))
}

/// Omitting `amount` approves `U256::MAX`.
pub async fn approve_token(
    ctx: &AgentContext,
    symbol: &str,
    spender: &str,
    amount: Option<&str>,
) -> Result<TxOutcome, AgentError> {
    let wallet = ctx.require_wallet()?;
    let token = resolve_token(ctx, symbol)?;
    let token_addr = require_erc20(token)?;
    let spender = resolve_spender(ctx, spender)?;
    let value = match amount {
        Some(a) => parse_amount(a, token.decimals)?,
        None => U256::MAX,
    };

    let hash = ctx
        .submit(wallet, "approve", token_addr, IERC20::approveCall { spender, value }, U256::ZERO)
        .await?;
    Ok(outcome(
        ctx,
        "approve_token",
        hash,
        token_addr,
        Some(&token.symbol),
        Some(if value == U256::MAX {
            "unlimited".to_owned()
        } else {
            display_amount(value, token.decimals)
        }),
        Vec::new(),
    ))
}

pub async fn enter_markets(ctx: &AgentContext, markets: &[String]) -> Result<TxOutcome, AgentError> {
    let wallet = ctx.require_wallet()?;
    if markets.is_empty() {
        return Err(AgentError::validation("at least one market is required"));
    }
    let resolver = ctx.resolver();
    let mut addrs = Vec::with_capacity(markets.len());
    for raw in markets {
        let m = resolver.resolve_market_ref(raw).ok_or_else(|| {
            AgentError::validation(format!("Market not available for {} on {}", raw.trim(), ctx.network.name))
        })?;
        if !addrs.contains(&m.market) {
            addrs.push(m.market);
        }
    }

    let comptroller = ctx.network.contracts.comptroller;
    let hash = ctx
        .submit(
            wallet,
            "enterMarkets",
            comptroller,
            IComptroller::enterMarketsCall { cTokens: addrs },
            U256::ZERO,
        )
        .await?;
    Ok(outcome(ctx, "enter_markets", hash, comptroller, None, None, Vec::new()))
}

// ── lending actions ──────────────────────────────────────────────────

/// Supply underlying to a market, entering it and approving it first when needed.
pub async fn supply_to_market(ctx: &AgentContext, symbol: &str, amount: &str) -> Result<TxOutcome, AgentError> {
    let wallet = ctx.require_wallet()?;
    let m = resolve_market(ctx, symbol)?;
    let token = resolve_token(ctx, &m.symbol)?;
    let value = parse_amount(amount, m.decimals)?;
    ensure_balance(ctx, wallet.address(), token, value).await?;

    let mut prerequisites = Vec::new();
    if !is_member(ctx, wallet.address(), m.market).await? {
        let comptroller = ctx.network.contracts.comptroller;
        let hash = ctx
            .submit(
                wallet,
                "enterMarkets",
                comptroller,
                IComptroller::enterMarketsCall {
                    cTokens: vec![m.market],
                },
                U256::ZERO,
            )
            .await?;
        info!(market = %m.market_key(), tx = %hash, "entering market before supply");
        let r = ctx.confirm("enterMarkets", hash).await?;
        prerequisites.push(PrerequisiteTx {
            action: "enter_markets",
            tx_hash: hash.to_string(),
            block_number: r.block_number,
        });
    }

    let hash = match m.underlying {
        Underlying::Native => {
            ctx.submit(wallet, "mint", m.market, ICEther::mintCall {}, value)
                .await?
        }
        Underlying::Erc20(token_addr) => {
            ensure_allowance(ctx, wallet, token_addr, m.market, value, &mut prerequisites).await?;
            ctx.submit(
                wallet,
                "mint",
                m.market,
                ICErc20::mintCall { mintAmount: value },
                U256::ZERO,
            )
            .await?
        }
    };
    Ok(outcome(
        ctx,
        "supply_to_market",
        hash,
        m.market,
        Some(&m.symbol),
        Some(display_amount(value, m.decimals)),
        prerequisites,
    ))
}

/// Borrow against existing collateral. Never enters markets on the caller's behalf.
pub async fn borrow_from_market(ctx: &AgentContext, symbol: &str, amount: &str) -> Result<TxOutcome, AgentError> {
    let wallet = ctx.require_wallet()?;
    let m = resolve_market(ctx, symbol)?;
    let value = parse_amount(amount, m.decimals)?;

    let hash = ctx
        .submit(wallet, "borrow", m.market, ICToken::borrowCall { borrowAmount: value }, U256::ZERO)
        .await?;
    Ok(outcome(
        ctx,
        "borrow_from_market",
        hash,
        m.market,
        Some(&m.symbol),
        Some(display_amount(value, m.decimals)),
        Vec::new(),
    ))
}

/// Repay a borrow. Without an amount an ERC20 market repays `U256::MAX`,
/// which the protocol reads as "the whole debt".
pub async fn repay_borrow(ctx: &AgentContext, symbol: &str, amount: Option<&str>) -> Result<TxOutcome, AgentError> {
    let wallet = ctx.require_wallet()?;
    let m = resolve_market(ctx, symbol)?;
    let token = resolve_token(ctx, &m.symbol)?;
    let value = match (amount, m.underlying) {
        (Some(a), _) => {
            let v = parse_amount(a, m.decimals)?;
            ensure_balance(ctx, wallet.address(), token, v).await?;
            v
        }
        (None, Underlying::Erc20(_)) => U256::MAX,
        (None, Underlying::Native) => {
            return Err(AgentError::validation(format!(
                "repaying a {} borrow requires an explicit amount",
                m.symbol
            )));
        }
    };

    let mut prerequisites = Vec::new();
    let hash = match m.underlying {
        Underlying::Native => {
            ctx.submit(wallet, "repayBorrow", m.market, ICEther::repayBorrowCall {}, value)
                .await?
        }
        Underlying::Erc20(token_addr) => {
            ensure_allowance(ctx, wallet, token_addr, m.market, value, &mut prerequisites).await?;
            ctx.submit(
                wallet,
                "repayBorrow",
                m.market,
                ICErc20::repayBorrowCall { repayAmount: value },
                U256::ZERO,
            )
            .await?
        }
    };
    Ok(outcome(
        ctx,
        "repay_borrow",
        hash,
        m.market,
        Some(&m.symbol),
        Some(if value == U256::MAX {
            "max".to_owned()
        } else {
            display_amount(value, m.decimals)
        }),
        prerequisites,
    ))
}

/// Redeem a cToken amount (always 8 decimals).
pub async fn redeem_tokens(ctx: &AgentContext, symbol: &str, ctoken_amount: &str) -> Result<TxOutcome, AgentError> {
    let wallet = ctx.require_wallet()?;
    let m = resolve_market(ctx, symbol)?;
    let value = parse_amount(ctoken_amount, CTOKEN_DECIMALS)?;

    let held = ctx
        .read(
            "balanceOf",
            m.market,
            ICToken::balanceOfCall {
                owner: wallet.address(),
            },
        )
        .await?;
    if held < value {
        return Err(AgentError::InsufficientBalance {
            symbol: m.market_key(),
            requested: display_amount(value, CTOKEN_DECIMALS),
            available: display_amount(held, CTOKEN_DECIMALS),
        });
    }

    let hash = ctx
        .submit(wallet, "redeem", m.market, ICToken::redeemCall { redeemTokens: value }, U256::ZERO)
        .await?;
    Ok(outcome(
        ctx,
        "redeem_tokens",
        hash,
        m.market,
        Some(&m.market_key()),
        Some(display_amount(value, CTOKEN_DECIMALS)),
        Vec::new(),
    ))
}

pub async fn redeem_underlying(ctx: &AgentContext, symbol: &str, amount: &str) -> Result<TxOutcome, AgentError> {
    let wallet = ctx.require_wallet()?;
    let m = resolve_market(ctx, symbol)?;
    let value = parse_amount(amount, m.decimals)?;

    let hash = ctx
        .submit(
            wallet,
            "redeemUnderlying",
            m.market,
            ICToken::redeemUnderlyingCall { redeemAmount: value },
            U256::ZERO,
        )
        .await?;
    Ok(outcome(
        ctx,
        "redeem_underlying",
        hash,
        m.market,
        Some(&m.symbol),
        Some(display_amount(value, m.decimals)),
        Vec::new(),
    ))
}
