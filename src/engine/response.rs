//! Call outcomes and response shaping

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use tracing::warn;

/// Marker key identifying a paused call
pub const HUMAN_INTERVENTION_KEY: &str = "_humanIntervention";

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// `application/json` and `+json` types
    Json(Value),
    /// Images, audio, video, PDFs and octet streams
    Binary(Bytes),
    /// Everything else
    Text(String),
}

impl ResponseData {
    /// JSON form; binary payloads become base64 strings
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Binary(bytes) => Value::String(STANDARD.encode(bytes)),
            Self::Text(text) => Value::String(text.clone()),
        }
    }
}

/// The remote API's answer, whatever its status
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// `content-type` header, if any
    pub content_type: Option<String>,
    /// Decoded body
    pub data: ResponseData,
}

impl ApiResponse {
    /// Read and decode a response
    ///
    /// # Errors
    ///
    /// Returns the transport error if the body cannot be read.
    pub async fn from_response(response: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        let data = decode_body(content_type.as_deref(), bytes);
        Ok(Self {
            status,
            content_type,
            data,
        })
    }

    /// Return `true` for 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `{data, contentType, status}`
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "data": self.data.to_json(),
            "contentType": self.content_type,
            "status": self.status,
        })
    }
}

/// Decode a body by content type
#[must_use]
pub fn decode_body(content_type: Option<&str>, bytes: Bytes) -> ResponseData {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if essence == "application/json" || essence.ends_with("+json") {
        if bytes.is_empty() {
            return ResponseData::Json(Value::Null);
        }
        return match serde_json::from_slice(&bytes) {
            Ok(value) => ResponseData::Json(value),
            Err(e) => {
                warn!(error = %e, "Response declared JSON but did not parse");
                ResponseData::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
        };
    }

    if is_binary(&essence) {
        return ResponseData::Binary(bytes);
    }

    ResponseData::Text(String::from_utf8_lossy(&bytes).into_owned())
}

fn is_binary(essence: &str) -> bool {
    essence.starts_with("image/")
        || essence.starts_with("audio/")
        || essence.starts_with("video/")
        || essence == "application/octet-stream"
        || essence == "application/pdf"
}

/// Returned instead of a result when a call pauses
#[derive(Debug, Clone, PartialEq)]
pub struct PauseMarker {
    /// Tool-call id to resume with
    pub tool_call_id: String,
    /// Approval payload: `ui`, `originalToolCallId`, `originalToolName`
    pub args: Value,
    /// Client, operation, method and path of the paused call
    pub metadata: Value,
    /// Redacted auth
    pub auth: Value,
}

impl PauseMarker {
    /// `{_humanIntervention: true, toolCallId, args, metadata, auth}`
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            HUMAN_INTERVENTION_KEY: true,
            "toolCallId": self.tool_call_id,
            "args": self.args,
            "metadata": self.metadata,
            "auth": self.auth,
        })
    }

    /// Parse a marker out of a tool result
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        if value.get(HUMAN_INTERVENTION_KEY).and_then(Value::as_bool) != Some(true) {
            return None;
        }
        Some(Self {
            tool_call_id: value.get("toolCallId")?.as_str()?.to_string(),
            args: value.get("args").cloned().unwrap_or_else(|| json!({})),
            metadata: value.get("metadata").cloned().unwrap_or(Value::Null),
            auth: value.get("auth").cloned().unwrap_or(Value::Null),
        })
    }
}

/// A paused call the human denied
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Original tool-call id
    pub tool_call_id: String,
    /// Tool that was not run
    pub tool_name: String,
    /// Human's reason
    pub reason: Option<String>,
}

/// Result of executing or resuming a tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The HTTP request ran; any status
    Completed(ApiResponse),
    /// Waiting for a human
    Paused(PauseMarker),
    /// A human denied the call
    Rejected(Rejection),
}

impl ToolOutcome {
    /// Return `true` when paused
    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused(_))
    }

    /// The response, if the call completed
    #[must_use]
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            Self::Completed(response) => Some(response),
            _ => None,
        }
    }

    /// Tool result handed back to the model
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Completed(response) => response.to_json(),
            Self::Paused(marker) => marker.to_json(),
            Self::Rejected(rejection) => json!({
                "rejected": true,
                "toolCallId": rejection.tool_call_id,
                "toolName": rejection.tool_name,
                "reason": rejection.reason,
            }),
        }
    }
}
