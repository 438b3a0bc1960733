pub mod mcp_server;

/// Longest accepted JSON-RPC line on stdin; longer input ends the session.
pub const MAX_JSONRPC_LINE_BYTES: usize = 1_000_000;
