//! Auth secrets for outbound requests
//!
//! # Security
//!
//! - Secret values are encrypted before they leave the process and travel in
//!   a single `x-auth-secrets` header
//! - Secret values and the encryption key are NEVER logged
//! - Anything handed to a policy or embedded in a pause marker goes through
//!   [`AuthObject::redacted`]
//!
//! # Wire format
//!
//! The header value is base64url without padding of
//! `iv (12 bytes) | tag (16 bytes) | ciphertext`, produced with AES-256-GCM
//! under a base64-encoded 32-byte key. The plaintext is a JSON object mapping
//! each variable key to its value.

use std::collections::BTreeMap;
use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::registry::OperationDescriptor;
use crate::{Error, Result};

/// Header carrying the encrypted secrets
pub const AUTH_SECRETS_HEADER: &str = "x-auth-secrets";

const IV_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

/// One named secret
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthVariable {
    /// Secret name, usually the header or query name the API expects
    pub key: String,
    /// Secret value
    pub value: String,
}

impl AuthVariable {
    /// Create a variable
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Debug for AuthVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthVariable")
            .field("key", &self.key)
            .field("value", &"***")
            .finish()
    }
}

/// Per-call auth material
///
/// Transient: never persisted. Only `variables` are encrypted onto the wire.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthObject {
    /// Base64-encoded AES-256 key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
    /// Secrets to encrypt
    #[serde(default)]
    pub variables: Vec<AuthVariable>,
    /// Caller-defined extension fields, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for AuthObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthObject")
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "***"))
            .field("variables", &self.variables)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AuthObject {
    /// Auth with variables and a key
    #[must_use]
    pub fn new(encryption_key: impl Into<String>, variables: Vec<AuthVariable>) -> Self {
        Self {
            encryption_key: Some(encryption_key.into()),
            variables,
            extra: Map::new(),
        }
    }

    /// Fill a missing encryption key from `fallback`
    #[must_use]
    pub fn with_key_fallback(mut self, fallback: Option<&AuthObject>) -> Self {
        if self.encryption_key.is_none() {
            self.encryption_key = fallback.and_then(|f| f.encryption_key.clone());
        }
        self
    }

    /// Copy safe to log or show to a human: no key, values masked
    #[must_use]
    pub fn redacted(&self) -> Value {
        let variables: Vec<Value> = self
            .variables
            .iter()
            .map(|v| json!({ "key": v.key, "value": "***" }))
            .collect();
        let mut out = self.extra.clone();
        out.insert("variables".to_string(), Value::Array(variables));
        Value::Object(out)
    }

    /// Headers for an outbound request
    ///
    /// Missing or invalid keys are logged and yield no header; the call still
    /// goes out and the remote API decides.
    #[must_use]
    pub fn headers(&self, operation: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let Some(key) = self.encryption_key.as_deref() else {
            if !self.variables.is_empty() {
                warn!(operation, "Auth variables supplied without an encryption key");
            }
            return headers;
        };
        if self.variables.is_empty() {
            return headers;
        }

        match encrypt_secrets(&self.variables, key) {
            Ok(payload) => match HeaderValue::from_str(&payload) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(AUTH_SECRETS_HEADER), value);
                    debug!(operation, count = self.variables.len(), "Attached encrypted secrets");
                }
                Err(_) => warn!(operation, "Encrypted secrets are not a valid header value"),
            },
            Err(e) => warn!(operation, error = %e, "Failed to encrypt auth secrets"),
        }
        headers
    }
}

/// A secret an operation expects, derived from its security requirements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDeclaration {
    /// Name the API expects (header, query or cookie name)
    pub key: String,
    /// Scheme description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Always `true` for declared secrets
    pub required: bool,
    /// Scheme type, e.g. `apiKey`
    #[serde(rename = "type")]
    pub scheme_type: String,
    /// Where the API reads it: `header`, `query` or `cookie`
    pub location: String,
}

/// Secrets an operation needs
///
/// Reads the first security requirement (operation-level, else inherited)
/// and declares one secret per `apiKey` scheme in it.
#[must_use]
pub fn required_secrets(
    operation: &OperationDescriptor,
    schemes: &Map<String, Value>,
) -> Vec<SecretDeclaration> {
    let Some(requirement) = operation.security.first() else {
        return Vec::new();
    };

    requirement
        .keys()
        .filter_map(|scheme_name| {
            let scheme = schemes.get(scheme_name)?;
            if scheme.get("type").and_then(Value::as_str) != Some("apiKey") {
                return None;
            }
            Some(SecretDeclaration {
                key: scheme.get("name").and_then(Value::as_str)?.to_string(),
                description: scheme
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                required: true,
                scheme_type: "apiKey".to_string(),
                location: scheme
                    .get("in")
                    .and_then(Value::as_str)
                    .unwrap_or("header")
                    .to_string(),
            })
        })
        .collect()
}

// ── Encryption ────────────────────────────────────────────────────────────────

fn cipher(key_b64: &str) -> Result<Aes256Gcm> {
    let raw = STANDARD
        .decode(key_b64.trim())
        .map_err(|_| Error::Crypto("encryption key is not valid base64".to_string()))?;
    if raw.len() != KEY_SIZE {
        return Err(Error::Crypto(format!(
            "encryption key must be {KEY_SIZE} bytes, got {}",
            raw.len()
        )));
    }
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&raw)))
}

/// Encrypt `variables` into an `x-auth-secrets` header value
///
/// # Errors
///
/// Returns [`Error::Crypto`] if the key is not 32 bytes of base64 or
/// encryption fails.
pub fn encrypt_secrets(variables: &[AuthVariable], key_b64: &str) -> Result<String> {
    let cipher = cipher(key_b64)?;
    let plaintext: BTreeMap<&str, &str> = variables
        .iter()
        .map(|v| (v.key.as_str(), v.value.as_str()))
        .collect();
    let plaintext = serde_json::to_vec(&plaintext)?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut ciphertext = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|_| Error::Crypto("failed to encrypt secrets".to_string()))?;
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::Crypto("failed to encrypt secrets".to_string()));
    }
    let tag = ciphertext.split_off(ciphertext.len() - TAG_SIZE);

    let mut packed = Vec::with_capacity(IV_SIZE + TAG_SIZE + ciphertext.len());
    packed.extend_from_slice(&nonce);
    packed.extend_from_slice(&tag);
    packed.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(packed))
}

/// Decrypt an `x-auth-secrets` header value back into key → value pairs
///
/// # Errors
///
/// Returns [`Error::Crypto`] on a malformed payload, a wrong key, or a
/// tampered ciphertext.
pub fn decrypt_secrets(payload: &str, key_b64: &str) -> Result<BTreeMap<String, String>> {
    let cipher = cipher(key_b64)?;
    let packed = URL_SAFE_NO_PAD
        .decode(payload.trim())
        .map_err(|_| Error::Crypto("secrets payload is not valid base64url".to_string()))?;
    if packed.len() < IV_SIZE + TAG_SIZE {
        return Err(Error::Crypto("secrets payload is too short".to_string()));
    }

    let (iv, rest) = packed.split_at(IV_SIZE);
    let (tag, data) = rest.split_at(TAG_SIZE);
    let mut combined = Vec::with_capacity(data.len() + TAG_SIZE);
    combined.extend_from_slice(data);
    combined.extend_from_slice(tag);

    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), combined.as_slice())
        .map_err(|_| Error::Crypto("failed to decrypt secrets".to_string()))?;
    Ok(serde_json::from_slice(&plaintext)?)
}

// ── Providers ─────────────────────────────────────────────────────────────────

/// Supplies auth at call time, e.g. from a vault
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Auth for one call of `operation`, or `None` to send without secrets
    async fn auth_for(&self, operation: &OperationDescriptor) -> Result<Option<AuthObject>>;
}

/// Auth provider that always returns the same object
pub struct StaticAuth(pub AuthObject);

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn auth_for(&self, _operation: &OperationDescriptor) -> Result<Option<AuthObject>> {
        Ok(Some(self.0.clone()))
    }
}
