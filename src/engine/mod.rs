//! Tool execution engine
//!
//! One [`ApiClient`] per OpenAPI document. A call moves through
//!
//! ```text
//! Ready → Validating → Deciding ─┬→ Executing → Completed
//!                                └→ Paused ─(resume)→ Resuming ─┬→ Executing → Completed
//!                                                               └→ Rejected
//! ```
//!
//! Executing sends exactly one HTTP request and never retries. Non-2xx
//! responses complete normally with their status; only transport failures
//! are errors.

mod policy;
mod response;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::TryFutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthObject, AuthProvider, required_secrets};
use crate::pending::{PendingCallStore, PendingToolContext};
use crate::registry::{
    OperationDescriptor, OperationRegistry, OperationSummary, RegistryOptions, SchemaSource,
    sanitize_client_name,
};
use crate::request::RequestBuilder;
use crate::schema::validate_arguments;
use crate::{Error, Result};

pub use policy::{
    FnPolicy, HumanDecision, HumanInterventionDecision, HumanInterventionPolicy,
    InterventionContext, PatternPolicy, merge_overrides, policy_fn,
};
pub use response::{
    ApiResponse, HUMAN_INTERVENTION_KEY, PauseMarker, Rejection, ResponseData, ToolOutcome,
    decode_body,
};

/// Default outbound request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ── Descriptors and options ───────────────────────────────────────────────────

/// A tool as presented to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name, `^[A-Za-z0-9_-]{1,128}$`
    pub name: String,
    /// Description
    pub description: String,
    /// JSON Schema of the arguments
    pub input_schema: Value,
    /// Owning client
    pub client_name: String,
    /// Operation behind the tool
    pub operation_id: String,
    /// Whether every call pauses for approval
    pub requires_approval: bool,
}

/// Execution switches
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Validate arguments before anything else
    pub validate_arguments: bool,
    /// Pause every call
    pub disable_all_executions: bool,
    /// Tool names or operation ids that always pause
    pub disabled_executions: HashSet<String>,
    /// Auth used when a call brings none
    pub auth: Option<AuthObject>,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            validate_arguments: true,
            disable_all_executions: false,
            disabled_executions: HashSet::new(),
            auth: None,
        }
    }
}

impl ToolOptions {
    fn forces_pause(&self, operation: &OperationDescriptor) -> bool {
        self.disable_all_executions
            || self.disabled_executions.contains(&operation.tool_name)
            || self.disabled_executions.contains(&operation.id)
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Tool-call id the model used
    pub tool_call_id: String,
    /// Auth for this call only
    pub auth: Option<AuthObject>,
    /// Cancels the call when triggered
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    /// Options for a tool-call id
    pub fn new(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            ..Self::default()
        }
    }

    /// Attach per-call auth
    #[must_use]
    pub fn with_auth(mut self, auth: AuthObject) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Attach a cancellation token
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

// ── ToolClient trait ──────────────────────────────────────────────────────────

/// A named source of executable tools
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Client name, never containing `__`
    fn name(&self) -> &str;

    /// Tools exposed to the model
    async fn tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Operations with id, method, path and descriptions
    fn list_operations(&self) -> Vec<OperationSummary>;

    /// Run a tool by tool name
    async fn execute(&self, tool_name: &str, args: Value, options: CallOptions) -> Result<ToolOutcome>;

    /// Run an operation by id
    async fn call_operation(
        &self,
        operation_id: &str,
        args: Value,
        options: CallOptions,
    ) -> Result<ToolOutcome>;

    /// Finish a paused call whose context was already consumed
    async fn resume_context(
        &self,
        context: PendingToolContext,
        decision: HumanDecision,
        options: CallOptions,
    ) -> Result<ToolOutcome>;
}

// ── ApiClient ─────────────────────────────────────────────────────────────────

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    document: Value,
    name: Option<String>,
    registry_options: RegistryOptions,
    headers: BTreeMap<String, String>,
    preset_body_fields: Map<String, Value>,
    timeout: Duration,
    tool_options: ToolOptions,
    client_auth: Option<AuthObject>,
    policy: Option<Arc<dyn HumanInterventionPolicy>>,
    auth_provider: Option<Arc<dyn AuthProvider>>,
    pending: Option<Arc<PendingCallStore>>,
    http: Option<reqwest::Client>,
}

impl ApiClientBuilder {
    /// Start from a parsed document
    #[must_use]
    pub fn new(document: Value) -> Self {
        Self {
            document,
            name: None,
            registry_options: RegistryOptions::default(),
            headers: BTreeMap::new(),
            preset_body_fields: Map::new(),
            timeout: DEFAULT_TIMEOUT,
            tool_options: ToolOptions::default(),
            client_auth: None,
            policy: None,
            auth_provider: None,
            pending: None,
            http: None,
        }
    }

    /// Start from any [`SchemaSource`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Document`] if the source cannot be loaded.
    pub async fn from_source(source: &SchemaSource) -> Result<Self> {
        let document = source.load(&reqwest::Client::new()).await?;
        Ok(Self::new(document))
    }

    /// Client name; defaults to the sanitized document title
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override `servers[0].url`
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.registry_options.base_url = Some(base_url.into());
        self
    }

    /// Only expose these operation ids or `x-tool-name`s
    #[must_use]
    pub fn include(mut self, operations: Vec<String>) -> Self {
        self.registry_options.include = Some(operations);
        self
    }

    /// Headers added to every request
    #[must_use]
    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Body fields merged under caller fields
    #[must_use]
    pub fn preset_body_fields(mut self, fields: Map<String, Value>) -> Self {
        self.preset_body_fields = fields;
        self
    }

    /// Outbound request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execution switches
    #[must_use]
    pub fn tool_options(mut self, options: ToolOptions) -> Self {
        self.tool_options = options;
        self
    }

    /// Lowest-precedence auth
    #[must_use]
    pub fn auth(mut self, auth: AuthObject) -> Self {
        self.client_auth = Some(auth);
        self
    }

    /// Human-intervention policy
    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn HumanInterventionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Call-time auth lookup
    #[must_use]
    pub fn auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    /// Share a pending store with other clients
    #[must_use]
    pub fn pending_store(mut self, store: Arc<PendingCallStore>) -> Self {
        self.pending = Some(store);
        self
    }

    /// Use a preconfigured HTTP client; the timeout setting is ignored
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns [`Error::Document`] for a non-object document and
    /// [`Error::Config`] when no base URL is known or the HTTP client cannot
    /// be created.
    pub fn build(self) -> Result<ApiClient> {
        let registry = OperationRegistry::build(&self.document, &self.registry_options)?;

        let name = match &self.name {
            Some(name) => sanitize_client_name(name),
            None => sanitize_client_name(registry.title().unwrap_or("api")),
        };
        let base_url = registry.base_url().map(str::to_string).ok_or_else(|| {
            Error::Config(format!(
                "Client '{name}' has no base URL: document declares no servers"
            ))
        })?;

        let http = match self.http {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?,
        };

        let requests = RequestBuilder::new(base_url)
            .with_default_headers(self.headers)
            .with_preset_body_fields(self.preset_body_fields);

        info!(client = %name, operations = registry.len(), "Registered API client");

        Ok(ApiClient {
            name,
            registry: Arc::new(registry),
            requests,
            http,
            pending: self.pending.unwrap_or_default(),
            policy: self.policy,
            auth_provider: self.auth_provider,
            client_auth: self.client_auth,
            tool_options: self.tool_options,
        })
    }
}

/// Executes the operations of one OpenAPI document
pub struct ApiClient {
    name: String,
    registry: Arc<OperationRegistry>,
    requests: RequestBuilder,
    http: reqwest::Client,
    pending: Arc<PendingCallStore>,
    policy: Option<Arc<dyn HumanInterventionPolicy>>,
    auth_provider: Option<Arc<dyn AuthProvider>>,
    client_auth: Option<AuthObject>,
    tool_options: ToolOptions,
}

impl ApiClient {
    /// Start building a client for `document`
    #[must_use]
    pub fn builder(document: Value) -> ApiClientBuilder {
        ApiClientBuilder::new(document)
    }

    /// The operation registry
    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// The pending store this client pauses into
    #[must_use]
    pub fn pending(&self) -> &Arc<PendingCallStore> {
        &self.pending
    }

    /// Base URL requests go to
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.requests.base_url()
    }

    /// Consume the pending context for `tool_call_id` and finish the call
    ///
    /// # Errors
    ///
    /// Returns [`Error::PendingContextNotFound`] if the call is not paused
    /// (or was already resumed), plus any execution error.
    pub async fn resume(
        &self,
        tool_call_id: &str,
        decision: HumanDecision,
        options: CallOptions,
    ) -> Result<ToolOutcome> {
        let context = self.pending.consume(tool_call_id)?;
        self.resume_context(context, decision, options).await
    }

    fn descriptor(&self, operation: &OperationDescriptor) -> ToolDescriptor {
        ToolDescriptor {
            name: operation.tool_name.clone(),
            description: operation.tool_description(),
            input_schema: operation.input_schema.clone(),
            client_name: self.name.clone(),
            operation_id: operation.id.clone(),
            requires_approval: self.tool_options.forces_pause(operation),
        }
    }

    fn validate(&self, operation: &OperationDescriptor, args: Value) -> Result<Value> {
        if !self.tool_options.validate_arguments {
            return Ok(args);
        }
        let result = validate_arguments(&args, &operation.call_schema);
        if result.is_valid() {
            return Ok(result.coerced);
        }
        debug!(
            tool = %operation.tool_name,
            violations = result.violations.len(),
            "Tool arguments failed validation"
        );
        Err(Error::SchemaValidation {
            tool: operation.tool_name.clone(),
            message: result.format_error(&operation.call_schema),
        })
    }

    /// Per-call auth > tool-options auth > auth provider > client auth.
    /// A per-call object without a key borrows the key of the next source.
    async fn resolve_auth(
        &self,
        operation: &OperationDescriptor,
        call_auth: Option<AuthObject>,
    ) -> Option<AuthObject> {
        let fallback = match &self.tool_options.auth {
            Some(auth) => Some(auth.clone()),
            None => self.provided_auth(operation).await.or_else(|| self.client_auth.clone()),
        };

        let resolved = match call_auth {
            Some(auth) => Some(auth.with_key_fallback(fallback.as_ref())),
            None => fallback,
        };

        if resolved.as_ref().is_none_or(|a| a.variables.is_empty()) {
            let declared = required_secrets(operation, self.registry.security_schemes());
            if !declared.is_empty() {
                let keys: Vec<&str> = declared.iter().map(|d| d.key.as_str()).collect();
                warn!(
                    operation = %operation.id,
                    secrets = ?keys,
                    "AuthMissing: operation declares secrets but none were supplied"
                );
            }
        }
        resolved
    }

    async fn provided_auth(&self, operation: &OperationDescriptor) -> Option<AuthObject> {
        let provider = self.auth_provider.as_ref()?;
        match provider.auth_for(operation).await {
            Ok(auth) => auth,
            Err(e) => {
                warn!(operation = %operation.id, error = %e, "Auth provider failed");
                None
            }
        }
    }

    async fn decide(
        &self,
        operation: &OperationDescriptor,
        args: &Value,
        options: &CallOptions,
        auth: Option<&AuthObject>,
    ) -> Result<HumanInterventionDecision> {
        if self.tool_options.forces_pause(operation) {
            return Ok(HumanInterventionDecision::pause(args.clone()));
        }
        let Some(policy) = &self.policy else {
            return Ok(HumanInterventionDecision::Continue);
        };

        let context = InterventionContext {
            tool_name: operation.tool_name.clone(),
            operation_id: operation.id.clone(),
            client_name: self.name.clone(),
            tool_call_id: options.tool_call_id.clone(),
            args: args.clone(),
            auth: auth.map_or_else(|| json!({}), AuthObject::redacted),
        };

        match &options.cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(Error::Cancelled(options.tool_call_id.clone())),
                decision = policy.decide(&context) => decision,
            },
            None => policy.decide(&context).await,
        }
    }

    async fn run(
        &self,
        operation: &OperationDescriptor,
        args: Value,
        options: CallOptions,
    ) -> Result<ToolOutcome> {
        let args = self.validate(operation, args)?;
        let auth = self.resolve_auth(operation, options.auth.clone()).await;

        match self.decide(operation, &args, &options, auth.as_ref()).await? {
            HumanInterventionDecision::Pause { args: pause_args } => {
                Ok(self.pause(operation, args, pause_args, &options, auth.as_ref()))
            }
            HumanInterventionDecision::Continue => {
                self.send(operation, &args, auth.as_ref(), options.cancel.as_ref(), &options.tool_call_id)
                    .await
            }
        }
    }

    fn pause(
        &self,
        operation: &OperationDescriptor,
        args: Value,
        pause_args: Value,
        options: &CallOptions,
        auth: Option<&AuthObject>,
    ) -> ToolOutcome {
        let mut marker_args = match pause_args {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("ui".to_string(), other);
                map
            }
        };
        marker_args
            .entry("originalToolCallId")
            .or_insert_with(|| Value::String(options.tool_call_id.clone()));
        marker_args
            .entry("originalToolName")
            .or_insert_with(|| Value::String(operation.tool_name.clone()));

        self.pending.insert(PendingToolContext {
            original_tool_call_id: options.tool_call_id.clone(),
            tool_name: operation.tool_name.clone(),
            client_name: self.name.clone(),
            operation_id: operation.id.clone(),
            original_args: args,
            created_at: Instant::now(),
        });
        info!(
            client = %self.name,
            tool = %operation.tool_name,
            tool_call_id = %options.tool_call_id,
            "Tool call paused for human review"
        );

        ToolOutcome::Paused(PauseMarker {
            tool_call_id: options.tool_call_id.clone(),
            args: Value::Object(marker_args),
            metadata: json!({
                "clientName": self.name,
                "operationId": operation.id,
                "method": operation.method.as_str(),
                "path": operation.path,
            }),
            auth: auth.map_or_else(|| json!({}), AuthObject::redacted),
        })
    }

    async fn send(
        &self,
        operation: &OperationDescriptor,
        args: &Value,
        auth: Option<&AuthObject>,
        cancel: Option<&CancellationToken>,
        tool_call_id: &str,
    ) -> Result<ToolOutcome> {
        let auth_headers = auth.map(|a| a.headers(&operation.id)).unwrap_or_default();
        let prepared = self.requests.build(operation, args, auth_headers);
        debug!(
            operation = %operation.id,
            method = %prepared.method,
            url = %prepared.url,
            "Sending request"
        );

        let mut request = self
            .http
            .request(prepared.method, &prepared.url)
            .headers(prepared.headers);
        if let Some(body) = &prepared.body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let exchange = request.send().and_then(ApiResponse::from_response);
        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return Err(Error::Cancelled(tool_call_id.to_string())),
                result = exchange => result,
            },
            None => exchange.await,
        };
        let response = result.map_err(|source| Error::Execution {
            operation: operation.id.clone(),
            source,
        })?;

        if response.is_success() {
            info!(operation = %operation.id, status = response.status, "Tool call completed");
        } else {
            warn!(operation = %operation.id, status = response.status, "Remote API returned an error status");
        }
        Ok(ToolOutcome::Completed(response))
    }
}

#[async_trait]
impl ToolClient for ApiClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self
            .registry
            .operations()
            .map(|op| self.descriptor(op))
            .collect())
    }

    fn list_operations(&self) -> Vec<OperationSummary> {
        self.registry.list_operations()
    }

    async fn execute(&self, tool_name: &str, args: Value, options: CallOptions) -> Result<ToolOutcome> {
        let operation = self
            .registry
            .by_tool_name(tool_name)
            .ok_or_else(|| Error::OperationNotFound(tool_name.to_string()))?
            .clone();
        self.run(&operation, args, options).await
    }

    async fn call_operation(
        &self,
        operation_id: &str,
        args: Value,
        options: CallOptions,
    ) -> Result<ToolOutcome> {
        let operation = self
            .registry
            .get(operation_id)
            .ok_or_else(|| Error::OperationNotFound(operation_id.to_string()))?
            .clone();
        self.run(&operation, args, options).await
    }

    async fn resume_context(
        &self,
        context: PendingToolContext,
        decision: HumanDecision,
        options: CallOptions,
    ) -> Result<ToolOutcome> {
        match decision {
            HumanDecision::Deny { reason } => {
                info!(
                    tool = %context.tool_name,
                    tool_call_id = %context.original_tool_call_id,
                    "Paused tool call denied"
                );
                Ok(ToolOutcome::Rejected(Rejection {
                    tool_call_id: context.original_tool_call_id,
                    tool_name: context.tool_name,
                    reason,
                }))
            }
            HumanDecision::Approve { overrides } => {
                let operation = self
                    .registry
                    .get(&context.operation_id)
                    .ok_or_else(|| Error::OperationNotFound(context.operation_id.clone()))?
                    .clone();
                let merged = merge_overrides(&context.original_args, overrides.as_ref());
                let args = self.validate(&operation, merged)?;
                let auth = self.resolve_auth(&operation, options.auth.clone()).await;
                info!(
                    tool = %context.tool_name,
                    tool_call_id = %context.original_tool_call_id,
                    "Resuming approved tool call"
                );
                self.send(
                    &operation,
                    &args,
                    auth.as_ref(),
                    options.cancel.as_ref(),
                    &context.original_tool_call_id,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthVariable;
    use pretty_assertions::assert_eq;

    fn petstore() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": { "title": "Swagger Petstore" },
            "servers": [{ "url": "http://127.0.0.1:9" }],
            "security": [{ "api_key": [] }],
            "paths": {
                "/pets/{petId}": {
                    "get": {
                        "operationId": "getPet",
                        "parameters": [
                            { "name": "petId", "in": "path", "required": true, "schema": { "type": "integer" } }
                        ]
                    },
                    "delete": {
                        "operationId": "deletePet",
                        "parameters": [
                            { "name": "petId", "in": "path", "required": true, "schema": { "type": "integer" } }
                        ]
                    }
                }
            },
            "components": {
                "securitySchemes": {
                    "api_key": { "type": "apiKey", "name": "X-API-Key", "in": "header" }
                }
            }
        })
    }

    fn delete_policy() -> Arc<dyn HumanInterventionPolicy> {
        Arc::new(PatternPolicy::new(&["^delete"]).unwrap())
    }

    // ── Construction ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn name_defaults_to_sanitized_title() {
        let client = ApiClient::builder(petstore()).build().unwrap();
        assert_eq!(client.name(), "swagger_petstore");

        let tools = client.tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["getPet", "deletePet"]);
    }

    #[test]
    fn missing_base_url_is_config_error() {
        let mut doc = petstore();
        doc.as_object_mut().unwrap().remove("servers");
        assert!(matches!(
            ApiClient::builder(doc).build(),
            Err(Error::Config(_))
        ));
    }

    // ── Validation ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_network() {
        let client = ApiClient::builder(petstore()).build().unwrap();

        let err = client
            .execute("getPet", json!({ "path": {} }), CallOptions::new("T0"))
            .await
            .unwrap_err();

        match err {
            Error::SchemaValidation { tool, message } => {
                assert_eq!(tool, "getPet");
                assert!(message.contains("path.petId"), "message: {message}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_operation_not_found() {
        let client = ApiClient::builder(petstore()).build().unwrap();
        let err = client
            .execute("nope", json!({}), CallOptions::new("T0"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OperationNotFound(_)));
    }

    // ── Pausing ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn policy_pause_stores_context_and_returns_marker() {
        let client = ApiClient::builder(petstore())
            .policy(delete_policy())
            .build()
            .unwrap();

        let outcome = client
            .execute(
                "deletePet",
                json!({ "path": { "petId": "10" } }),
                CallOptions::new("T1"),
            )
            .await
            .unwrap();

        let ToolOutcome::Paused(marker) = outcome else {
            panic!("expected pause");
        };
        assert_eq!(marker.tool_call_id, "T1");
        assert_eq!(marker.args["originalToolCallId"], "T1");
        assert_eq!(marker.args["originalToolName"], "deletePet");
        assert_eq!(marker.args["ui"], json!({ "path": { "petId": 10 } }));

        let stored = client.pending().get("T1").unwrap();
        assert_eq!(stored.original_args, json!({ "path": { "petId": 10 } }));
        assert_eq!(stored.client_name, "swagger_petstore");
    }

    #[tokio::test]
    async fn disabled_executions_force_pause_without_policy() {
        let options = ToolOptions {
            disabled_executions: HashSet::from(["getPet".to_string()]),
            ..ToolOptions::default()
        };
        let client = ApiClient::builder(petstore())
            .tool_options(options)
            .build()
            .unwrap();

        let tools = client.tools().await.unwrap();
        assert!(tools.iter().find(|t| t.name == "getPet").unwrap().requires_approval);

        let outcome = client
            .execute("getPet", json!({ "path": { "petId": 1 } }), CallOptions::new("T2"))
            .await
            .unwrap();
        assert!(outcome.is_paused());
    }

    #[tokio::test]
    async fn marker_auth_is_redacted() {
        let key = {
            use base64::Engine as _;
            base64::engine::general_purpose::STANDARD.encode([3u8; 32])
        };
        let client = ApiClient::builder(petstore())
            .tool_options(ToolOptions {
                disable_all_executions: true,
                ..ToolOptions::default()
            })
            .build()
            .unwrap();

        let outcome = client
            .execute(
                "getPet",
                json!({ "path": { "petId": 1 } }),
                CallOptions::new("T3")
                    .with_auth(AuthObject::new(key.clone(), vec![AuthVariable::new("X-API-Key", "s3cret")])),
            )
            .await
            .unwrap();

        let rendered = outcome.to_json().to_string();
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains(&key));
    }

    // ── Resume ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn deny_rejects_and_consumes() {
        let client = ApiClient::builder(petstore())
            .policy(delete_policy())
            .build()
            .unwrap();
        client
            .execute("deletePet", json!({ "path": { "petId": 1 } }), CallOptions::new("T4"))
            .await
            .unwrap();

        let outcome = client
            .resume("T4", HumanDecision::deny("not today"), CallOptions::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ToolOutcome::Rejected(Rejection {
                tool_call_id: "T4".to_string(),
                tool_name: "deletePet".to_string(),
                reason: Some("not today".to_string()),
            })
        );

        let again = client
            .resume("T4", HumanDecision::approve(), CallOptions::default())
            .await;
        assert!(matches!(again, Err(Error::PendingContextNotFound(_))));
    }

    #[tokio::test]
    async fn approve_with_invalid_override_fails_validation() {
        let client = ApiClient::builder(petstore())
            .policy(delete_policy())
            .build()
            .unwrap();
        client
            .execute("deletePet", json!({ "path": { "petId": 1 } }), CallOptions::new("T5"))
            .await
            .unwrap();

        let mut overrides = Map::new();
        overrides.insert("path".to_string(), json!({ "petId": "abc" }));
        let err = client
            .resume("T5", HumanDecision::approve_with(overrides), CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaValidation { .. }));
    }

    #[tokio::test]
    async fn cancelled_policy_leaves_no_pending_context() {
        struct NeverDecides;

        #[async_trait]
        impl HumanInterventionPolicy for NeverDecides {
            async fn decide(&self, _: &InterventionContext) -> Result<HumanInterventionDecision> {
                std::future::pending().await
            }
        }

        let client = ApiClient::builder(petstore())
            .policy(Arc::new(NeverDecides))
            .build()
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = client
            .execute(
                "deletePet",
                json!({ "path": { "petId": 1 } }),
                CallOptions::new("T6").with_cancel(token),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled(id) if id == "T6"));
        assert!(client.pending().is_empty());
    }
}
