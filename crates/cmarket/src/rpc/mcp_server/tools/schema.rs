use serde_json::{json, Value};

const WRITE_TOOLS: &[&str] = &[
    "send_native_token",
    "send_erc20_token",
    "approve_token",
    "enter_markets",
    "supply_to_market",
    "borrow_from_market",
    "repay_borrow",
    "redeem_tokens",
    "redeem_underlying",
];

pub(super) fn is_write_tool(name: &str) -> bool {
    WRITE_TOOLS.contains(&name)
}

fn no_args() -> Value {
    json!({ "type": "object", "properties": {}, "additionalProperties": false })
}

fn read_tool_schemas() -> Vec<Value> {
    vec![
        json!({ "name": "get_wallet_info", "description": "Active network, mode (transaction or read_only), wallet address, and token balances with USD values.", "inputSchema": no_args() }),
        json!({ "name": "get_all_markets", "description": "Every configured lending market with exchange rate, supply/borrow APY, utilization, and USD totals. Unreadable markets are omitted.", "inputSchema": no_args() }),
        json!({ "name": "get_market_info", "description": "One market's metrics, by symbol (case-insensitive, aliases accepted) or market contract address.", "inputSchema": {
          "type": "object",
          "properties": {
            "market": { "type": "string", "description": "Token symbol (e.g. usdc, savax) or market contract address." }
          },
          "required": ["market"],
          "additionalProperties": false
        }}),
        json!({ "name": "get_account_liquidity", "description": "Liquidity, shortfall, per-market positions, and health factor (999 when nothing is borrowed) for an account.", "inputSchema": {
          "type": "object",
          "properties": {
            "account": { "type": "string", "description": "Address to inspect. Defaults to the configured wallet." }
          },
          "additionalProperties": false
        }}),
        json!({ "name": "resolve_symbol", "description": "Show how a symbol resolves on the active network: canonical token, display name, decimals, and market contract.", "inputSchema": {
          "type": "object",
          "properties": { "symbol": { "type": "string" } },
          "required": ["symbol"],
          "additionalProperties": false
        }}),
        json!({ "name": "get_transaction_receipt", "description": "Status (pending, success, reverted) of a transaction returned by a write tool.", "inputSchema": {
          "type": "object",
          "properties": { "tx_hash": { "type": "string", "pattern": "^0x[0-9a-fA-F]{64}$" } },
          "required": ["tx_hash"],
          "additionalProperties": false
        }}),
        json!({ "name": "check_allowance", "description": "Current ERC20 allowance from the wallet to a spender. Requires a configured wallet.", "inputSchema": {
          "type": "object",
          "properties": {
            "symbol": { "type": "string" },
            "spender": { "type": "string", "description": "Spender address, or a market symbol to use that market's contract." }
          },
          "required": ["symbol", "spender"],
          "additionalProperties": false
        }}),
        json!({ "name": "check_market_membership", "description": "Whether the wallet has entered a market (counts it as collateral). Requires a configured wallet.", "inputSchema": {
          "type": "object",
          "properties": {
            "market": { "type": "string", "description": "Market contract address or token symbol." }
          },
          "required": ["market"],
          "additionalProperties": false
        }}),
    ]
}

fn write_tool_schemas() -> Vec<Value> {
    let amount = json!({ "type": "string", "description": "Decimal amount in whole-token units, e.g. \"1.5\"." });
    vec![
        json!({ "name": "send_native_token", "description": "Transfer the chain's native asset.", "inputSchema": {
          "type": "object",
          "properties": { "to": { "type": "string" }, "amount": amount },
          "required": ["to", "amount"],
          "additionalProperties": false
        }}),
        json!({ "name": "send_erc20_token", "description": "Transfer an ERC20 token from the network's token table.", "inputSchema": {
          "type": "object",
          "properties": { "symbol": { "type": "string" }, "to": { "type": "string" }, "amount": amount },
          "required": ["symbol", "to", "amount"],
          "additionalProperties": false
        }}),
        json!({ "name": "approve_token", "description": "Approve a spender for an ERC20 token. Omitting amount approves the maximum value.", "inputSchema": {
          "type": "object",
          "properties": {
            "symbol": { "type": "string" },
            "spender": { "type": "string", "description": "Spender address or market symbol." },
            "amount": amount
          },
          "required": ["symbol", "spender"],
          "additionalProperties": false
        }}),
        json!({ "name": "enter_markets", "description": "Enter one or more markets so that supplied assets count as collateral.", "inputSchema": {
          "type": "object",
          "properties": {
            "markets": { "type": "array", "items": { "type": "string" }, "minItems": 1, "description": "Market addresses or token symbols." }
          },
          "required": ["markets"],
          "additionalProperties": false
        }}),
        json!({ "name": "supply_to_market", "description": "Supply an asset. Enters the market and approves the market contract first when needed.", "inputSchema": {
          "type": "object",
          "properties": { "symbol": { "type": "string" }, "amount": amount },
          "required": ["symbol", "amount"],
          "additionalProperties": false
        }}),
        json!({ "name": "borrow_from_market", "description": "Borrow an asset against entered collateral. Does not enter markets.", "inputSchema": {
          "type": "object",
          "properties": { "symbol": { "type": "string" }, "amount": amount },
          "required": ["symbol", "amount"],
          "additionalProperties": false
        }}),
        json!({ "name": "repay_borrow", "description": "Repay a borrow. Omitting amount repays the full debt for ERC20 markets; native-asset markets need an explicit amount.", "inputSchema": {
          "type": "object",
          "properties": { "symbol": { "type": "string" }, "amount": amount },
          "required": ["symbol"],
          "additionalProperties": false
        }}),
        json!({ "name": "redeem_tokens", "description": "Redeem a cToken amount (8 decimals) for the underlying asset.", "inputSchema": {
          "type": "object",
          "properties": {
            "symbol": { "type": "string" },
            "ctoken_amount": { "type": "string", "description": "cToken amount, up to 8 decimal places." }
          },
          "required": ["symbol", "ctoken_amount"],
          "additionalProperties": false
        }}),
        json!({ "name": "redeem_underlying", "description": "Redeem cTokens worth an exact underlying amount.", "inputSchema": {
          "type": "object",
          "properties": { "symbol": { "type": "string" }, "amount": amount },
          "required": ["symbol", "amount"],
          "additionalProperties": false
        }}),
    ]
}

pub fn list_tools_result() -> Value {
    let mut tools = read_tool_schemas();
    tools.extend(write_tool_schemas());
    json!({ "tools": tools })
}
