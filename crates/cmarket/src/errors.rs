use alloy::primitives::U256;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

/// A structured error suitable for returning to an MCP client as tool output.
#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub data: Value,
}

impl ToolError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Failure taxonomy of the wallet agent.
///
/// Anything raised before a side-effecting call (`Validation`,
/// `InsufficientBalance`, `TransactionMode`) guarantees that no transaction
/// of a multi-step sequence was broadcast.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Validation(String),

    #[error("insufficient {symbol} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        symbol: String,
        requested: String,
        available: String,
    },

    #[error("transaction mode required: configure a signing key (CMARKET_PRIVATE_KEY) to submit transactions")]
    TransactionMode,

    #[error("contract read failed: {0}")]
    ContractRead(String),

    #[error("contract call failed: {0}")]
    ContractCall(String),

    #[error("transaction not confirmed: {0}")]
    TransactionTimeout(String),

    #[error("{context} returned protocol error code {code}")]
    Protocol { context: &'static str, code: U256 },
}

impl AgentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Validation(_) => "validation_error",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::TransactionMode => "transaction_mode_required",
            Self::ContractRead(_) => "contract_read_failed",
            Self::ContractCall(_) => "contract_call_failed",
            Self::TransactionTimeout(_) => "transaction_timeout",
            Self::Protocol { .. } => "protocol_error",
        }
    }
}

impl From<AgentError> for ToolError {
    fn from(e: AgentError) -> Self {
        let message = e.to_string();
        let code = e.code();
        match e {
            AgentError::InsufficientBalance {
                symbol,
                requested,
                available,
            } => Self::new(code, message).with_data(json!({
              "symbol": symbol, "requested": requested, "available": available,
            })),
            AgentError::Protocol { context, code: pc } => Self::new(code, message)
                .with_data(json!({ "context": context, "protocol_code": pc.to_string() })),
            AgentError::TransactionMode => Self::new(code, message)
                .with_data(json!({ "hint": "set CMARKET_PRIVATE_KEY and restart the server" })),
            AgentError::Configuration(_)
            | AgentError::Validation(_)
            | AgentError::ContractRead(_)
            | AgentError::ContractCall(_)
            | AgentError::TransactionTimeout(_) => Self::new(code, message),
        }
    }
}

/// Which collaborator primitive produced a chain error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOp {
    Read,
    Submit,
    Confirm,
}

/// Map a raw chain-client error into the agent taxonomy.
///
/// The raw report is logged at debug level only; the returned message never
/// carries RPC URLs, JSON-RPC payloads, or transport detail.
pub fn normalize_chain_error(op: ChainOp, label: &str, e: &eyre::Report) -> AgentError {
    debug!(error = %format!("{e:#}"), op = ?op, label, "chain collaborator error");
    let s = format!("{e:#}").to_lowercase();

    let timed_out = s.contains("timed out") || s.contains("timeout");

    match op {
        ChainOp::Confirm if timed_out => AgentError::TransactionTimeout(format!("{label}: timed out")),
        ChainOp::Read if timed_out => AgentError::ContractRead(format!("{label}: timed out")),
        ChainOp::Submit if timed_out => AgentError::ContractCall(format!("{label}: timed out")),
        ChainOp::Read => {
            if s.contains("execution reverted") || s.contains("revert") {
                AgentError::ContractRead(format!("{label}: execution reverted"))
            } else if s.contains("decode") || s.contains("abi") {
                AgentError::ContractRead(format!("{label}: unexpected contract response"))
            } else {
                AgentError::ContractRead(format!("{label} failed"))
            }
        }
        ChainOp::Submit | ChainOp::Confirm => {
            if s.contains("insufficient funds") {
                AgentError::ContractCall(format!("{label}: insufficient funds for gas"))
            } else if s.contains("nonce too low") || s.contains("replacement transaction") {
                AgentError::ContractCall(format!(
                    "{label}: nonce conflict with a pending transaction; retry shortly"
                ))
            } else if s.contains("execution reverted") || s.contains("revert") {
                AgentError::ContractCall(format!("{label}: execution reverted"))
            } else if s.contains("intrinsic gas too low") {
                AgentError::ContractCall(format!("{label}: intrinsic gas too low"))
            } else {
                AgentError::ContractCall(format!("{label} failed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_maps_with_structured_data() {
        let te = ToolError::from(AgentError::InsufficientBalance {
            symbol: "USDC".into(),
            requested: "10".into(),
            available: "2.5".into(),
        });
        assert_eq!(te.code, "insufficient_balance");
        assert!(te.message.contains("USDC"), "message: {}", te.message);
        assert_eq!(
            te.data.get("available").and_then(Value::as_str),
            Some("2.5")
        );
    }

    #[test]
    fn transaction_mode_error_carries_remediation_hint() {
        let te = ToolError::from(AgentError::TransactionMode);
        assert_eq!(te.code, "transaction_mode_required");
        assert!(te.message.contains("signing key"), "message: {}", te.message);
        assert!(te.data.get("hint").is_some());
    }

    #[test]
    fn protocol_error_reports_numeric_code() {
        let e = AgentError::Protocol {
            context: "getAccountLiquidity",
            code: U256::from(3_u64),
        };
        assert_eq!(e.to_string(), "getAccountLiquidity returned protocol error code 3");
        let te = ToolError::from(e);
        assert_eq!(te.data.get("protocol_code").and_then(Value::as_str), Some("3"));
    }

    #[test]
    fn submit_errors_do_not_leak_transport_detail() {
        let raw = eyre::eyre!("server returned an error response: error code -32000: insufficient funds for gas * price + value")
            .wrap_err("broadcast raw tx via https://rpc.example.org/secret-key");
        let e = normalize_chain_error(ChainOp::Submit, "mint", &raw);
        assert_eq!(
            e,
            AgentError::ContractCall("mint: insufficient funds for gas".into())
        );
        assert!(!e.to_string().contains("https://"));
    }

    #[test]
    fn read_errors_collapse_to_a_single_message() {
        let raw = eyre::eyre!("connection refused (os error 111)").wrap_err("eth_call");
        let e = normalize_chain_error(ChainOp::Read, "exchangeRateStored", &raw);
        assert_eq!(
            e,
            AgentError::ContractRead("exchangeRateStored failed".into())
        );
    }

    #[test]
    fn confirm_timeout_is_distinguishable() {
        let raw = eyre::eyre!("timed out waiting for tx receipt");
        let e = normalize_chain_error(ChainOp::Confirm, "enterMarkets", &raw);
        assert_eq!(e.code(), "transaction_timeout");
    }

    #[test]
    fn read_and_submit_timeouts_keep_their_own_codes() {
        let raw = eyre::eyre!("operation timed out").wrap_err("error sending request for url");
        let read = normalize_chain_error(ChainOp::Read, "exchangeRateStored", &raw);
        assert_eq!(
            read,
            AgentError::ContractRead("exchangeRateStored: timed out".into())
        );
        assert_eq!(read.code(), "contract_read_failed");

        let submit = normalize_chain_error(ChainOp::Submit, "mint", &raw);
        assert_eq!(submit, AgentError::ContractCall("mint: timed out".into()));
        assert!(!submit.to_string().contains("not confirmed"));

        let confirm = normalize_chain_error(ChainOp::Confirm, "approve", &raw);
        assert_eq!(
            confirm,
            AgentError::TransactionTimeout("approve: timed out".into())
        );
    }
}
