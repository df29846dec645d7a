//! Request assembly
//!
//! Turns an [`OperationDescriptor`] plus grouped tool arguments into a
//! concrete [`PreparedRequest`]. Pure and synchronous; sending happens in the
//! engine.

use std::collections::BTreeMap;

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use tracing::warn;

use crate::registry::{BodyShape, OperationDescriptor};

/// Argument groups with a fixed meaning; every other top-level key folds
/// into the body.
const GROUP_KEYS: [&str; 4] = ["path", "query", "headers", "body"];

/// A fully assembled outbound request
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL including the query string
    pub url: String,
    /// Final headers
    pub headers: HeaderMap,
    /// JSON body, only for POST/PUT/PATCH operations with a JSON body
    pub body: Option<Value>,
}

/// Per-client request assembly settings
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    base_url: String,
    default_headers: BTreeMap<String, String>,
    preset_body_fields: Map<String, Value>,
}

impl RequestBuilder {
    /// Builder sending to `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_headers: BTreeMap::new(),
            preset_body_fields: Map::new(),
        }
    }

    /// Headers added to every request, below header arguments and auth
    #[must_use]
    pub fn with_default_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.default_headers = headers;
        self
    }

    /// Body fields merged under caller-supplied fields
    #[must_use]
    pub fn with_preset_body_fields(mut self, fields: Map<String, Value>) -> Self {
        self.preset_body_fields = fields;
        self
    }

    /// Base URL with any trailing `/` removed
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Assemble the request for one call
    ///
    /// Header precedence, later wins: `content-type: application/json`,
    /// client defaults, header arguments, `auth_headers`.
    #[must_use]
    pub fn build(
        &self,
        operation: &OperationDescriptor,
        arguments: &Value,
        auth_headers: HeaderMap,
    ) -> PreparedRequest {
        let args = arguments.as_object().cloned().unwrap_or_default();

        let mut url = format!("{}{}", self.base_url, substitute_path(&operation.path, args.get("path")));
        let query = encode_query(args.get("query"));
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &self.default_headers {
            insert_header(&mut headers, name, value);
        }
        if let Some(Value::Object(header_args)) = args.get("headers") {
            for (name, value) in header_args {
                if value.is_null() {
                    continue;
                }
                insert_header(&mut headers, name, &scalar_to_string(value));
            }
        }
        for (name, value) in auth_headers {
            if let Some(name) = name {
                headers.insert(name, value);
            }
        }

        let body = if operation.sends_body() {
            self.body(operation, &args)
        } else {
            None
        };

        PreparedRequest {
            method: operation.method.clone(),
            url,
            headers,
            body,
        }
    }

    fn body(&self, operation: &OperationDescriptor, args: &Map<String, Value>) -> Option<Value> {
        let extras: Map<String, Value> = args
            .iter()
            .filter(|(key, _)| !GROUP_KEYS.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut payload = match args.get("body") {
            Some(Value::Null) | None if extras.is_empty() && self.preset_body_fields.is_empty() => {
                return None;
            }
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(body) => body.clone(),
        };

        if let Value::Object(fields) = &mut payload {
            for (key, value) in extras {
                fields.entry(key).or_insert(value);
            }
            for (key, value) in &self.preset_body_fields {
                fields.entry(key.clone()).or_insert_with(|| value.clone());
            }
        } else if !extras.is_empty() {
            warn!(
                operation = %operation.id,
                "Body is not an object, extra top-level arguments dropped"
            );
        }

        match operation.request_body.as_ref().map(|b| b.shape) {
            Some(BodyShape::Wrapped) => {
                let mut wrapper = Map::new();
                wrapper.insert("body".to_string(), payload);
                Some(Value::Object(wrapper))
            }
            _ => Some(payload),
        }
    }
}

/// Replace `{name}` placeholders with encoded values; unknown ones stay literal
fn substitute_path(template: &str, path_args: Option<&Value>) -> String {
    let Some(Value::Object(values)) = path_args else {
        return template.to_string();
    };
    let mut path = template.to_string();
    for (name, value) in values {
        if value.is_null() {
            continue;
        }
        let placeholder = format!("{{{name}}}");
        if path.contains(&placeholder) {
            path = path.replace(&placeholder, &encode_component(&scalar_to_string(value)));
        }
    }
    path
}

/// `name=value` pairs joined with `&`, null values skipped
fn encode_query(query_args: Option<&Value>) -> String {
    let Some(Value::Object(values)) = query_args else {
        return String::new();
    };
    values
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| {
            format!(
                "{}={}",
                encode_component(name),
                encode_component(&scalar_to_string(value))
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode one URL component, spaces as `%20`
#[must_use]
pub fn encode_component(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// String form of an argument value: strings verbatim, arrays comma-joined,
/// objects as JSON
#[must_use]
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        // Never log the value: it may be a credential.
        _ => warn!(header = name, "Skipping invalid header"),
    }
}
