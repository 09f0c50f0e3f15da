//! JSON-RPC 2.0 framing for Substrate node requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PorError, Result};

/// SCALE metadata magic number ("meta") as hex, prefixed.
const METADATA_MAGIC: &str = "0x6d657461";

#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

/// A decoded message from the node.
#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    /// Absent for subscription notifications.
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

impl Response {
    /// Converts the response into the call result.
    pub fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(PorError::transport(format!(
                "RPC error {}: {}",
                err.code, err.message
            )));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Runtime version as reported by `state_getRuntimeVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
    pub spec_name: String,
    pub spec_version: u32,
    #[serde(default)]
    pub impl_name: Option<String>,
}

/// Serializes a request frame.
pub(crate) fn encode_request(id: u64, method: &str, params: Value) -> Result<String> {
    let request = Request {
        jsonrpc: "2.0",
        id,
        method,
        params,
    };
    serde_json::to_string(&request)
        .map_err(|e| PorError::internal(format!("Failed to encode {method} request: {e}")))
}

/// Parses a response frame.
pub(crate) fn decode_response(text: &str) -> Result<Response> {
    serde_json::from_str(text)
        .map_err(|e| PorError::transport(format!("Malformed RPC response: {e}")))
}

/// Returns true if the hex string carries SCALE-encoded runtime metadata.
pub(crate) fn is_metadata(hex: &str) -> bool {
    hex.len() > METADATA_MAGIC.len() && hex.starts_with(METADATA_MAGIC)
}
