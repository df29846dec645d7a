//! Loading OpenAPI documents
//!
//! A document may be handed over already parsed, as JSON or YAML text, read
//! from a file, or fetched from a URL. Every form ends up as a
//! [`serde_json::Value`] the registry walks.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{Error, Result};

/// Where an OpenAPI document comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    /// Already parsed document
    Inline(Value),
    /// JSON or YAML text
    Text(String),
    /// Local file containing JSON or YAML
    File(PathBuf),
    /// Remote document fetched with GET
    Url(String),
}

impl SchemaSource {
    /// Resolve the source into a parsed document
    ///
    /// # Errors
    ///
    /// Returns [`Error::Document`] if the text cannot be parsed, the file
    /// cannot be read, or the URL cannot be fetched.
    pub async fn load(&self, http: &reqwest::Client) -> Result<Value> {
        let document = match self {
            Self::Inline(value) => value.clone(),
            Self::Text(text) => parse_document(text)?,
            Self::File(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Document(format!("Failed to read {}: {e}", path.display()))
                })?;
                parse_document(&text)?
            }
            Self::Url(url) => {
                debug!(url = %url, "Fetching OpenAPI document");
                let response = http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| Error::Document(format!("Failed to fetch {url}: {e}")))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::Document(format!(
                        "Fetching {url} returned {status}"
                    )));
                }
                let text = response
                    .text()
                    .await
                    .map_err(|e| Error::Document(format!("Failed to read {url}: {e}")))?;
                parse_document(&text)?
            }
        };

        if !document.is_object() {
            return Err(Error::Document(
                "OpenAPI document must be an object".to_string(),
            ));
        }
        if let Some(title) = document.pointer("/info/title").and_then(Value::as_str) {
            info!(title, "Loaded OpenAPI document");
        }
        Ok(document)
    }
}

impl From<Value> for SchemaSource {
    fn from(value: Value) -> Self {
        Self::Inline(value)
    }
}

/// Parse JSON or YAML text into a document
///
/// # Errors
///
/// Returns [`Error::Document`] if the text is neither valid JSON nor YAML.
pub fn parse_document(text: &str) -> Result<Value> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| Error::Document(format!("Invalid JSON document: {e}")));
    }
    serde_yaml::from_str(text).map_err(|e| Error::Document(format!("Invalid YAML document: {e}")))
}
