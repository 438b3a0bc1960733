//! The wallet agent: symbol resolution, market and account analytics, and the
//! guarded transaction pipeline for one Compound-fork deployment.

pub mod abi;
pub mod account;
pub mod markets;
pub mod orchestrator;
pub mod resolver;

use crate::{
    chains::{self, ChainClient, ReceiptSummary},
    errors::{normalize_chain_error, AgentError, ChainOp},
    price::{PriceFeed, PriceMap},
    registry::NetworkProfile,
    wallet::WalletIdentity,
};
use alloy::{
    primitives::{Address, B256, U256},
    sol_types::SolCall,
};
use resolver::SymbolResolver;
use std::sync::Arc;
use tracing::warn;

pub use account::AccountLiquiditySummary;
pub use markets::MarketSummary;
pub use orchestrator::{
    AllowanceInfo, MembershipInfo, ReceiptStatus, TxOutcome, WalletInfo,
};
pub use resolver::SymbolResolution;

/// Everything one agent instance needs, constructed once per process (or per test).
pub struct AgentContext {
    pub network: NetworkProfile,
    pub chain: Arc<dyn ChainClient>,
    pub prices: Arc<dyn PriceFeed>,
    pub wallet: Option<WalletIdentity>,
}

impl AgentContext {
    pub fn new(
        network: NetworkProfile,
        chain: Arc<dyn ChainClient>,
        prices: Arc<dyn PriceFeed>,
        wallet: Option<WalletIdentity>,
    ) -> Result<Self, AgentError> {
        network.validate()?;
        Ok(Self {
            network,
            chain,
            prices,
            wallet,
        })
    }

    pub(crate) const fn resolver(&self) -> SymbolResolver<'_> {
        SymbolResolver::new(&self.network)
    }

    pub const fn mode(&self) -> &'static str {
        if self.wallet.is_some() {
            "transaction"
        } else {
            "read_only"
        }
    }

    /// Mode guard: the first check of every state-changing operation.
    pub(crate) fn require_wallet(&self) -> Result<&WalletIdentity, AgentError> {
        self.wallet.as_ref().ok_or(AgentError::TransactionMode)
    }

    pub(crate) async fn read<C>(&self, label: &str, to: Address, call: C) -> Result<C::Return, AgentError>
    where
        C: SolCall + Send + Sync,
    {
        chains::read_contract(self.chain.as_ref(), to, call)
            .await
            .map_err(|e| normalize_chain_error(ChainOp::Read, label, &e))
    }

    pub(crate) async fn submit<C>(
        &self,
        wallet: &WalletIdentity,
        label: &str,
        to: Address,
        call: C,
        value: U256,
    ) -> Result<B256, AgentError>
    where
        C: SolCall + Send + Sync,
    {
        chains::submit_call(self.chain.as_ref(), wallet.signer(), to, call, value)
            .await
            .map_err(|e| normalize_chain_error(ChainOp::Submit, label, &e))
    }

    /// Wait for a prerequisite transaction; a revert stops the sequence.
    pub(crate) async fn confirm(&self, label: &str, tx: B256) -> Result<ReceiptSummary, AgentError> {
        let r = self
            .chain
            .wait_for_receipt(tx)
            .await
            .map_err(|e| normalize_chain_error(ChainOp::Confirm, label, &e))?;
        if !r.success {
            return Err(AgentError::ContractCall(format!(
                "{label} reverted on-chain ({tx})"
            )));
        }
        Ok(r)
    }

    /// Price lookup as optional enrichment: failures become an empty map.
    pub(crate) async fn prices_or_empty(&self) -> PriceMap {
        match self.prices.prices_for_network(&self.network).await {
            Ok(p) => p,
            Err(e) => {
                warn!(network = %self.network.name, error = %format!("{e:#}"), "price feed unavailable; USD values will be 0");
                PriceMap::new()
            }
        }
    }
}

/// Public facade over an [`AgentContext`]; one method per agent operation.
pub struct WalletAgent {
    ctx: AgentContext,
}

impl WalletAgent {
    pub const fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    pub const fn context(&self) -> &AgentContext {
        &self.ctx
    }

    pub fn resolve_symbol(&self, raw: &str) -> SymbolResolution {
        self.ctx.resolver().describe(raw)
    }

    pub async fn get_wallet_info(&self) -> Result<WalletInfo, AgentError> {
        orchestrator::get_wallet_info(&self.ctx).await
    }

    pub async fn get_all_markets(&self) -> Vec<MarketSummary> {
        markets::get_all_markets(&self.ctx).await
    }

    pub async fn get_market_details(&self, market: &str) -> Result<MarketSummary, AgentError> {
        markets::get_market_details(&self.ctx, market).await
    }

    pub async fn get_account_liquidity(
        &self,
        account: Option<&str>,
    ) -> Result<AccountLiquiditySummary, AgentError> {
        account::get_account_liquidity(&self.ctx, account).await
    }

    pub async fn check_allowance(&self, symbol: &str, spender: &str) -> Result<AllowanceInfo, AgentError> {
        orchestrator::check_allowance(&self.ctx, symbol, spender).await
    }

    pub async fn approve_token(
        &self,
        symbol: &str,
        spender: &str,
        amount: Option<&str>,
    ) -> Result<TxOutcome, AgentError> {
        orchestrator::approve_token(&self.ctx, symbol, spender, amount).await
    }

    pub async fn check_market_membership(&self, market: &str) -> Result<MembershipInfo, AgentError> {
        orchestrator::check_market_membership(&self.ctx, market).await
    }

    pub async fn enter_markets(&self, markets: &[String]) -> Result<TxOutcome, AgentError> {
        orchestrator::enter_markets(&self.ctx, markets).await
    }

    pub async fn send_native_token(&self, to: &str, amount: &str) -> Result<TxOutcome, AgentError> {
        orchestrator::send_native_token(&self.ctx, to, amount).await
    }

    pub async fn send_erc20_token(
        &self,
        symbol: &str,
        to: &str,
        amount: &str,
    ) -> Result<TxOutcome, AgentError> {
        orchestrator::send_erc20_token(&self.ctx, symbol, to, amount).await
    }

    pub async fn supply_to_market(&self, symbol: &str, amount: &str) -> Result<TxOutcome, AgentError> {
        orchestrator::supply_to_market(&self.ctx, symbol, amount).await
    }

    pub async fn borrow_from_market(&self, symbol: &str, amount: &str) -> Result<TxOutcome, AgentError> {
        orchestrator::borrow_from_market(&self.ctx, symbol, amount).await
    }

    pub async fn repay_borrow(&self, symbol: &str, amount: Option<&str>) -> Result<TxOutcome, AgentError> {
        orchestrator::repay_borrow(&self.ctx, symbol, amount).await
    }

    pub async fn redeem_tokens(&self, symbol: &str, ctoken_amount: &str) -> Result<TxOutcome, AgentError> {
        orchestrator::redeem_tokens(&self.ctx, symbol, ctoken_amount).await
    }

    pub async fn redeem_underlying(&self, symbol: &str, amount: &str) -> Result<TxOutcome, AgentError> {
        orchestrator::redeem_underlying(&self.ctx, symbol, amount).await
    }

    pub async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<ReceiptStatus, AgentError> {
        orchestrator::get_transaction_receipt(&self.ctx, tx_hash).await
    }
}
