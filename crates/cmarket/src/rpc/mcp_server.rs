use crate::lending::WalletAgent;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt as _, AsyncRead, AsyncWrite, BufReader};
use tracing::{info, warn};

mod jsonrpc;
mod tools;
mod transport;

use jsonrpc::{err, ok, JsonRpcResponse};
use tools::{handle_tools_call, list_tools_result};

const PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

fn handle_initialize(req_id: Value, agent: &WalletAgent) -> JsonRpcResponse {
    let ctx = agent.context();
    ok(
        req_id,
        json!({
          "protocolVersion": PROTOCOL_VERSION,
          "serverInfo": { "name": "cmarket", "version": env!("CARGO_PKG_VERSION") },
          "capabilities": { "tools": {} },
          "instructions": format!(
              "Compound-fork lending wallet on {} (chain id {}), {} mode.",
              ctx.network.name, ctx.network.chain_id, ctx.mode()
          ),
        }),
    )
}

async fn dispatch(agent: &WalletAgent, req: JsonRpcRequest) -> JsonRpcResponse {
    if req.jsonrpc != "2.0" {
        return err(req.id, jsonrpc::INVALID_REQUEST, "invalid jsonrpc version");
    }
    match req.method.as_str() {
        "initialize" => handle_initialize(req.id, agent),
        "ping" => ok(req.id, json!({})),
        "tools/list" => ok(req.id, list_tools_result()),
        "tools/call" => {
            let Some(name) = req.params.get("name").and_then(Value::as_str) else {
                return err(req.id, jsonrpc::INVALID_PARAMS, "missing tool name");
            };
            let args = req.params.get("arguments").cloned().unwrap_or(Value::Null);
            handle_tools_call(req.id, name, &args, agent).await
        }
        _ => err(req.id, jsonrpc::METHOD_NOT_FOUND, "method not found"),
    }
}

/// Serve newline-delimited JSON-RPC until the reader closes. One request is
/// handled at a time; notifications (no `id`) get no response.
pub async fn serve<R, W>(agent: &WalletAgent, reader: R, mut writer: W) -> eyre::Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.len() > crate::rpc::MAX_JSONRPC_LINE_BYTES {
            warn!(bytes = line.len(), "oversized jsonrpc line; closing session");
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let v: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "invalid json on stdin");
                continue;
            }
        };
        if v.get("id").is_none() {
            continue;
        }
        let req: JsonRpcRequest = match serde_json::from_value(v) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to parse jsonrpc request");
                continue;
            }
        };
        let resp = dispatch(agent, req).await;
        transport::write_frame(&mut writer, &resp).await?;
    }
    Ok(())
}

pub async fn run(agent: WalletAgent) -> eyre::Result<()> {
    let ctx = agent.context();
    info!(
        network = %ctx.network.name,
        chain_id = ctx.network.chain_id,
        mode = ctx.mode(),
        markets = ctx.network.contracts.market_count(),
        "mcp server ready"
    );
    serve(&agent, tokio::io::stdin(), tokio::io::stdout()).await
}
