mod schema;

pub use schema::list_tools_result;

use super::jsonrpc::{err, ok, tool_err, tool_ok, JsonRpcResponse, METHOD_NOT_FOUND};
use crate::{
    errors::{AgentError, ToolError},
    lending::WalletAgent,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn req_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, AgentError> {
    opt_str(args, key).ok_or_else(|| AgentError::validation(format!("missing required argument: {key}")))
}

/// Amounts may arrive as JSON strings or numbers; numbers are taken at their
/// decimal rendering.
fn amount_arg(args: &Value, key: &str) -> Result<Option<String>, AgentError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_owned())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(AgentError::validation(format!("{key} must be a decimal string"))),
    }
}

fn req_amount(args: &Value, key: &str) -> Result<String, AgentError> {
    amount_arg(args, key)?.ok_or_else(|| AgentError::validation(format!("missing required argument: {key}")))
}

fn str_list(args: &Value, key: &str) -> Result<Vec<String>, AgentError> {
    let arr = args
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| AgentError::validation(format!("{key} must be an array of strings")))?;
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.trim().to_owned())
                .ok_or_else(|| AgentError::validation(format!("{key} must be an array of strings")))
        })
        .collect()
}

fn respond<T: Serialize>(req_id: Value, tool: &str, r: Result<T, AgentError>) -> JsonRpcResponse {
    match r {
        Ok(v) => ok(req_id, tool_ok(&v)),
        Err(e) => {
            debug!(tool, code = e.code(), error = %e, "tool failed");
            ok(req_id, tool_err(ToolError::from(e)))
        }
    }
}

pub async fn handle_tools_call(req_id: Value, tool_name: &str, args: &Value, agent: &WalletAgent) -> JsonRpcResponse {
    match tool_name {
        // Read-only tools
        "get_wallet_info" => respond(req_id, tool_name, agent.get_wallet_info().await),
        "get_all_markets" => respond(req_id, tool_name, Ok::<_, AgentError>(agent.get_all_markets().await)),
        "get_market_info" => {
            let r = match req_str(args, "market") {
                Ok(m) => agent.get_market_details(m).await,
                Err(e) => Err(e),
            };
            respond(req_id, tool_name, r)
        }
        "get_account_liquidity" => respond(
            req_id,
            tool_name,
            agent.get_account_liquidity(opt_str(args, "account")).await,
        ),
        "resolve_symbol" => {
            let r = req_str(args, "symbol").map(|s| agent.resolve_symbol(s));
            respond(req_id, tool_name, r)
        }
        "get_transaction_receipt" => {
            let r = match req_str(args, "tx_hash") {
                Ok(h) => agent.get_transaction_receipt(h).await,
                Err(e) => Err(e),
            };
            respond(req_id, tool_name, r)
        }
        "check_allowance" => {
            let r = match (req_str(args, "symbol"), req_str(args, "spender")) {
                (Ok(sym), Ok(spender)) => agent.check_allowance(sym, spender).await,
                (Err(e), _) | (_, Err(e)) => Err(e),
            };
            respond(req_id, tool_name, r)
        }
        "check_market_membership" => {
            let r = match req_str(args, "market") {
                Ok(m) => agent.check_market_membership(m).await,
                Err(e) => Err(e),
            };
            respond(req_id, tool_name, r)
        }

        // Write tools
        _ if schema::is_write_tool(tool_name) => {
            let r = write_tool(agent, tool_name, args).await;
            respond(req_id, tool_name, r)
        }

        _ => err(req_id, METHOD_NOT_FOUND, format!("unknown tool: {tool_name}")),
    }
}

async fn write_tool(
    agent: &WalletAgent,
    tool_name: &str,
    args: &Value,
) -> Result<crate::lending::TxOutcome, AgentError> {
    // Mode guard before argument validation, matching the lending core.
    agent.context().require_wallet()?;
    match tool_name {
        "send_native_token" => {
            agent
                .send_native_token(req_str(args, "to")?, &req_amount(args, "amount")?)
                .await
        }
        "send_erc20_token" => {
            agent
                .send_erc20_token(
                    req_str(args, "symbol")?,
                    req_str(args, "to")?,
                    &req_amount(args, "amount")?,
                )
                .await
        }
        "approve_token" => {
            let amount = amount_arg(args, "amount")?;
            agent
                .approve_token(req_str(args, "symbol")?, req_str(args, "spender")?, amount.as_deref())
                .await
        }
        "enter_markets" => agent.enter_markets(&str_list(args, "markets")?).await,
        "supply_to_market" => {
            agent
                .supply_to_market(req_str(args, "symbol")?, &req_amount(args, "amount")?)
                .await
        }
        "borrow_from_market" => {
            agent
                .borrow_from_market(req_str(args, "symbol")?, &req_amount(args, "amount")?)
                .await
        }
        "repay_borrow" => {
            let amount = amount_arg(args, "amount")?;
            agent.repay_borrow(req_str(args, "symbol")?, amount.as_deref()).await
        }
        "redeem_tokens" => {
            agent
                .redeem_tokens(req_str(args, "symbol")?, &req_amount(args, "ctoken_amount")?)
                .await
        }
        "redeem_underlying" => {
            agent
                .redeem_underlying(req_str(args, "symbol")?, &req_amount(args, "amount")?)
                .await
        }
        other => Err(AgentError::validation(format!("unknown tool: {other}"))),
    }
}
