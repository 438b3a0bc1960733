use crate::errors::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

pub fn ok(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".into(),
        id,
        result: Some(result),
        error: None,
    }
}

pub fn err(id: Value, code: i64, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".into(),
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.into(),
        }),
    }
}

fn text_content(text: String, is_error: bool) -> Value {
    json!({
      "content": [{ "type": "text", "text": text }],
      "isError": is_error
    })
}

/// Success envelope: the payload serialized as a single text block.
pub fn tool_ok<T: Serialize>(payload: &T) -> Value {
    match serde_json::to_string(payload) {
        Ok(text) => text_content(text, false),
        Err(e) => tool_err(ToolError::new(
            "internal_error",
            format!("failed to serialize result: {e}"),
        )),
    }
}

pub fn tool_err(tool_error: ToolError) -> Value {
    let text = serde_json::to_string(&tool_error).unwrap_or_else(|_e| {
        r#"{"code":"internal_error","message":"failed to serialize error"}"#.to_owned()
    });
    text_content(text, true)
}
