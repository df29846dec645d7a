//! Multi-API aggregation
//!
//! A [`Toolkit`] fronts several [`ToolClient`]s under namespaced names of the
//! form `<client>__<tool>`. Client names never contain `__`, so the first
//! separator always splits a name unambiguously. All clients pause into one
//! shared [`PendingCallStore`], which lets `resume` find the owning client
//! from the tool-call id alone.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::engine::{
    ApiClientBuilder, CallOptions, HumanDecision, PatternPolicy, ToolClient, ToolDescriptor,
    ToolOutcome,
};
use crate::pending::{PendingCallStore, spawn_eviction_task};
use crate::registry::OperationSummary;
use crate::registry::naming::MAX_TOOL_NAME_LEN;
use crate::stream::{
    Message, MessagePart, Role, ToolCallPart, ToolResultPart, is_human_loop, tool_result_frame,
};
use crate::{Error, Result};

/// Separator between client and tool names
pub const NAMESPACE_SEPARATOR: &str = "__";

/// `<client>__<tool>`, truncated to the tool-name limit
#[must_use]
pub fn namespaced_name(client: &str, tool: &str) -> String {
    let mut name = format!("{client}{NAMESPACE_SEPARATOR}{tool}");
    name.truncate(MAX_TOOL_NAME_LEN);
    name
}

/// Split `<client>__<rest>` on the first separator
///
/// # Errors
///
/// Returns [`Error::InvalidOperationId`] if either side is empty or the
/// separator is missing.
pub fn split_namespaced(name: &str) -> Result<(&str, &str)> {
    match name.split_once(NAMESPACE_SEPARATOR) {
        Some((client, rest)) if !client.is_empty() && !rest.is_empty() => Ok((client, rest)),
        _ => Err(Error::InvalidOperationId(name.to_string())),
    }
}

/// Several API clients behind one tool surface
pub struct Toolkit {
    clients: Vec<Arc<dyn ToolClient>>,
    index: HashMap<String, usize>,
    pending: Arc<PendingCallStore>,
}

impl Toolkit {
    /// Aggregate prebuilt clients sharing `pending`
    ///
    /// The clients must pause into `pending` for [`resume`](Self::resume) to
    /// find their calls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if two clients share a name.
    pub fn new(clients: Vec<Arc<dyn ToolClient>>, pending: Arc<PendingCallStore>) -> Result<Self> {
        let mut index = HashMap::with_capacity(clients.len());
        for (slot, client) in clients.iter().enumerate() {
            if index.insert(client.name().to_string(), slot).is_some() {
                return Err(Error::Config(format!(
                    "Duplicate client name '{}'; set distinct names",
                    client.name()
                )));
            }
        }
        debug!(clients = clients.len(), "Toolkit assembled");
        Ok(Self {
            clients,
            index,
            pending,
        })
    }

    /// Build every client against one shared pending store
    ///
    /// # Errors
    ///
    /// Returns the first client build error, or [`Error::Config`] on
    /// duplicate names.
    pub fn from_builders(builders: Vec<ApiClientBuilder>, pending: Arc<PendingCallStore>) -> Result<Self> {
        let clients = builders
            .into_iter()
            .map(|builder| {
                builder
                    .pending_store(Arc::clone(&pending))
                    .build()
                    .map(|client| Arc::new(client) as Arc<dyn ToolClient>)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(clients, pending)
    }

    /// Load every configured document and build the toolkit
    ///
    /// With `pending.ttl` set, an eviction task is spawned on the current
    /// runtime; it stops when the toolkit is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Document`] if a document cannot be loaded, or any
    /// client build error.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pending = Arc::new(match config.pending.ttl {
            Some(ttl) => PendingCallStore::with_ttl(ttl),
            None => PendingCallStore::new(),
        });
        let fetcher = reqwest::Client::builder()
            .timeout(config.execution.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut builders = Vec::with_capacity(config.clients.len());
        for client in &config.clients {
            let document = client.source.load(&fetcher).await?;
            let mut builder = ApiClientBuilder::new(document)
                .headers(client.headers.clone())
                .preset_body_fields(client.preset_body_fields.clone())
                .timeout(config.execution.timeout)
                .tool_options(config.execution.tool_options());
            if let Some(name) = &client.name {
                builder = builder.name(name);
            }
            if let Some(base_url) = &client.base_url {
                builder = builder.base_url(base_url);
            }
            if let Some(include) = &client.include {
                builder = builder.include(include.clone());
            }
            if !client.pause_patterns.is_empty() {
                builder = builder.policy(Arc::new(PatternPolicy::new(&client.pause_patterns)?));
            }
            builders.push(builder);
        }

        let toolkit = Self::from_builders(builders, Arc::clone(&pending))?;
        if config.pending.ttl.is_some() {
            spawn_eviction_task(pending, config.pending.sweep_interval);
        }
        Ok(toolkit)
    }

    /// Shared pending store
    #[must_use]
    pub fn pending(&self) -> &Arc<PendingCallStore> {
        &self.pending
    }

    /// Client names in registration order
    pub fn client_names(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(|c| c.name())
    }

    /// Client by name
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientNotFound`] for an unknown name.
    pub fn client(&self, name: &str) -> Result<&Arc<dyn ToolClient>> {
        self.index
            .get(name)
            .and_then(|slot| self.clients.get(*slot))
            .ok_or_else(|| Error::ClientNotFound(name.to_string()))
    }

    /// Tools of every client, namespaced
    ///
    /// Clients are queried concurrently; a failing client is skipped.
    pub async fn tools(&self) -> Vec<ToolDescriptor> {
        let results = join_all(self.clients.iter().map(|client| client.tools())).await;

        let mut tools = Vec::new();
        for (client, result) in self.clients.iter().zip(results) {
            match result {
                Ok(client_tools) => {
                    tools.extend(client_tools.into_iter().map(|mut tool| {
                        tool.name = namespaced_name(client.name(), &tool.name);
                        tool
                    }));
                }
                Err(e) => {
                    warn!(client = %client.name(), error = %e, "Skipping client whose tools failed to load");
                }
            }
        }
        tools
    }

    /// Operations of every client with namespaced ids
    #[must_use]
    pub fn list_operations(&self) -> Vec<OperationSummary> {
        self.clients
            .iter()
            .flat_map(|client| {
                client.list_operations().into_iter().map(|mut op| {
                    op.id = format!("{}{NAMESPACE_SEPARATOR}{}", client.name(), op.id);
                    op
                })
            })
            .collect()
    }

    /// Run an operation by namespaced id
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperationId`], [`Error::ClientNotFound`],
    /// [`Error::OperationNotFound`], plus any execution error.
    pub async fn call_operation(
        &self,
        namespaced_id: &str,
        args: Value,
        options: CallOptions,
    ) -> Result<ToolOutcome> {
        let (client_name, operation_id) = split_namespaced(namespaced_id)?;
        self.client(client_name)?
            .call_operation(operation_id, args, options)
            .await
    }

    /// Run a tool by namespaced tool name
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOperationId`], [`Error::ClientNotFound`],
    /// [`Error::OperationNotFound`], plus any execution error.
    pub async fn execute(&self, namespaced_tool: &str, args: Value, options: CallOptions) -> Result<ToolOutcome> {
        let (client_name, tool_name) = split_namespaced(namespaced_tool)?;
        let client = self.client(client_name)?;

        match client.execute(tool_name, args.clone(), options.clone()).await {
            Err(Error::OperationNotFound(_)) if namespaced_tool.len() == MAX_TOOL_NAME_LEN => {
                // Namespacing truncated the name; find the tool it came from.
                let full = client
                    .tools()
                    .await?
                    .into_iter()
                    .find(|t| namespaced_name(client_name, &t.name) == namespaced_tool)
                    .ok_or_else(|| Error::OperationNotFound(namespaced_tool.to_string()))?;
                client.execute(&full.name, args, options).await
            }
            other => other,
        }
    }

    /// Resume a paused call on whichever client paused it
    ///
    /// # Errors
    ///
    /// Returns [`Error::PendingContextNotFound`] if nothing is paused under
    /// `tool_call_id`, plus any execution error.
    pub async fn resume(
        &self,
        tool_call_id: &str,
        decision: HumanDecision,
        options: CallOptions,
    ) -> Result<ToolOutcome> {
        let owner = self
            .pending
            .get(tool_call_id)
            .ok_or_else(|| Error::PendingContextNotFound(tool_call_id.to_string()))?
            .client_name;
        let client = self.client(&owner)?;
        let context = self.pending.consume(tool_call_id)?;
        client.resume_context(context, decision, options).await
    }

    /// Resume the calls a human answered in the last turn of `messages`
    ///
    /// The history must end with an assistant message holding
    /// `FAKE_HUMAN_INTERACTION` calls and a tool message answering them. Each
    /// answer resumes its original call. In the returned history the synthetic
    /// calls are gone and the real results stand where the answers were. Any
    /// other history comes back unchanged.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHumanInput`] for an unreadable answer, plus anything
    /// [`resume`](Self::resume) returns.
    pub async fn parse_messages(&self, messages: &[Message]) -> Result<Vec<Message>> {
        self.parse_messages_with_frames(messages)
            .await
            .map(|(history, _)| history)
    }

    /// [`parse_messages`](Self::parse_messages), also returning one `a:`
    /// frame per resumed call for an open data stream
    ///
    /// # Errors
    ///
    /// Same as [`parse_messages`](Self::parse_messages).
    pub async fn parse_messages_with_frames(
        &self,
        messages: &[Message],
    ) -> Result<(Vec<Message>, Vec<Bytes>)> {
        let mut history = messages.to_vec();
        let mut frames = Vec::new();
        let [.., assistant, last] = history.as_mut_slice() else {
            return Ok((history, frames));
        };
        if assistant.role != Role::Assistant || last.role != Role::Tool {
            return Ok((history, frames));
        }

        let mut answered = HashSet::new();
        let mut parts = Vec::with_capacity(last.parts.len());
        for part in std::mem::take(&mut last.parts) {
            let answer = match part {
                MessagePart::ToolResult(answer) => answer,
                other => {
                    parts.push(other);
                    continue;
                }
            };
            match assistant.tool_call(&answer.tool_call_id).filter(|c| is_human_loop(c)) {
                Some(fake) => {
                    let resumed = self.resume_answer(fake, &answer).await?;
                    frames.push(tool_result_frame(&resumed)?);
                    answered.insert(answer.tool_call_id);
                    parts.push(MessagePart::ToolResult(resumed));
                }
                None => parts.push(MessagePart::ToolResult(answer)),
            }
        }
        last.parts = parts;

        assistant.parts.retain(|part| {
            !matches!(part, MessagePart::ToolCall(call) if answered.contains(&call.tool_call_id))
        });
        Ok((history, frames))
    }

    async fn resume_answer(&self, fake: &ToolCallPart, answer: &ToolResultPart) -> Result<ToolResultPart> {
        let invalid = |reason: String| Error::InvalidHumanInput {
            tool_call_id: fake.tool_call_id.clone(),
            reason,
        };
        let original_id = fake
            .args
            .get("originalToolCallId")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("approval call has no originalToolCallId".to_string()))?;
        let decision = HumanDecision::from_human_input(&answer.result).ok_or_else(|| {
            invalid(format!("expected an object or a boolean, got {}", answer.result))
        })?;
        let context = self
            .pending
            .get(original_id)
            .ok_or_else(|| Error::PendingContextNotFound(original_id.to_string()))?;

        debug!(tool_call_id = %original_id, client = %context.client_name, "Resuming from chat history");
        let outcome = self
            .resume(original_id, decision, CallOptions::new(original_id))
            .await?;

        Ok(ToolResultPart {
            tool_call_id: original_id.to_string(),
            tool_name: Some(namespaced_name(&context.client_name, &context.tool_name)),
            result: outcome.to_json(),
        })
    }
}
