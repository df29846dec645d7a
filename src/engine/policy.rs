//! Human-intervention policies and decisions

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{Error, Result};

/// What a policy sees before a call executes
#[derive(Debug, Clone, PartialEq)]
pub struct InterventionContext {
    /// Tool name the model called
    pub tool_name: String,
    /// Operation behind the tool
    pub operation_id: String,
    /// Owning client
    pub client_name: String,
    /// Tool-call id the model used
    pub tool_call_id: String,
    /// Validated arguments
    pub args: Value,
    /// Redacted auth: no key, masked values
    pub auth: Value,
}

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq)]
pub enum HumanInterventionDecision {
    /// Execute right away
    Continue,
    /// Pause and ask a human; `args` usually carries `ui`,
    /// `originalToolCallId` and `originalToolName`
    Pause {
        /// Payload for the approval UI
        args: Value,
    },
}

impl HumanInterventionDecision {
    /// Pause with `ui` as the approval payload
    #[must_use]
    pub fn pause(ui: Value) -> Self {
        Self::Pause {
            args: json!({ "ui": ui }),
        }
    }

    /// Parse the `{shouldPause, args}` shape external policies return
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        if value.get("shouldPause").and_then(Value::as_bool) == Some(true) {
            Self::Pause {
                args: value.get("args").cloned().unwrap_or_else(|| json!({})),
            }
        } else {
            Self::Continue
        }
    }

    /// Return `true` for [`Self::Pause`]
    #[must_use]
    pub fn should_pause(&self) -> bool {
        matches!(self, Self::Pause { .. })
    }
}

/// Decides whether a call needs a human first
#[async_trait]
pub trait HumanInterventionPolicy: Send + Sync {
    /// Inspect a validated call
    async fn decide(&self, context: &InterventionContext) -> Result<HumanInterventionDecision>;
}

/// Policy backed by a synchronous closure
pub struct FnPolicy<F>(F);

/// Wrap a closure as a policy
pub fn policy_fn<F>(f: F) -> FnPolicy<F>
where
    F: Fn(&InterventionContext) -> HumanInterventionDecision + Send + Sync,
{
    FnPolicy(f)
}

#[async_trait]
impl<F> HumanInterventionPolicy for FnPolicy<F>
where
    F: Fn(&InterventionContext) -> HumanInterventionDecision + Send + Sync,
{
    async fn decide(&self, context: &InterventionContext) -> Result<HumanInterventionDecision> {
        Ok((self.0)(context))
    }
}

/// Pause every call whose tool name or operation id matches one of a set of
/// patterns
///
/// Patterns are regular expressions; the approval payload is the call's
/// arguments.
#[derive(Debug, Clone)]
pub struct PatternPolicy {
    patterns: Vec<Regex>,
}

impl PatternPolicy {
    /// Compile the patterns
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a pattern is not a valid regex.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref())
                    .map_err(|e| Error::Config(format!("Invalid pause pattern '{}': {e}", p.as_ref())))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Return `true` if `tool_name` matches any pattern
    #[must_use]
    pub fn matches(&self, tool_name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(tool_name))
    }
}

#[async_trait]
impl HumanInterventionPolicy for PatternPolicy {
    async fn decide(&self, context: &InterventionContext) -> Result<HumanInterventionDecision> {
        if self.matches(&context.tool_name) || self.matches(&context.operation_id) {
            Ok(HumanInterventionDecision::pause(context.args.clone()))
        } else {
            Ok(HumanInterventionDecision::Continue)
        }
    }
}

/// A human's answer to a paused call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum HumanDecision {
    /// Run the call, with top-level argument overrides
    Approve {
        /// Keys replacing the original arguments
        #[serde(default, skip_serializing_if = "Option::is_none")]
        overrides: Option<Map<String, Value>>,
    },
    /// Do not run the call
    Deny {
        /// Optional explanation passed back to the model
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl HumanDecision {
    /// Approve unchanged
    #[must_use]
    pub fn approve() -> Self {
        Self::Approve { overrides: None }
    }

    /// Approve with overrides
    #[must_use]
    pub fn approve_with(overrides: Map<String, Value>) -> Self {
        Self::Approve {
            overrides: Some(overrides),
        }
    }

    /// Deny with a reason
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: Some(reason.into()),
        }
    }

    /// Read a human's answer to an approval prompt
    ///
    /// `{"decision": ...}` is taken as written. Any other object approves the
    /// call with its keys as overrides, and a bare boolean approves or denies.
    /// Returns `None` for anything else.
    #[must_use]
    pub fn from_human_input(input: &Value) -> Option<Self> {
        match input {
            Value::Object(map) if map.contains_key("decision") => {
                serde_json::from_value(input.clone()).ok()
            }
            Value::Object(map) => Some(Self::approve_with(map.clone())),
            Value::Bool(true) => Some(Self::approve()),
            Value::Bool(false) => Some(Self::Deny { reason: None }),
            _ => None,
        }
    }
}

/// Shallow merge: every top-level key in `overrides` replaces the original
#[must_use]
pub fn merge_overrides(original: &Value, overrides: Option<&Map<String, Value>>) -> Value {
    let Some(overrides) = overrides else {
        return original.clone();
    };
    let mut merged = original.as_object().cloned().unwrap_or_default();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context(tool: &str) -> InterventionContext {
        InterventionContext {
            tool_name: tool.to_string(),
            operation_id: tool.to_string(),
            client_name: "petstore".to_string(),
            tool_call_id: "T1".to_string(),
            args: json!({ "path": { "petId": 10 } }),
            auth: json!({}),
        }
    }

    #[tokio::test]
    async fn pattern_policy_pauses_matching_tools() {
        let policy = PatternPolicy::new(&["^delete"]).unwrap();

        let paused = policy.decide(&context("deletePet")).await.unwrap();
        let continued = policy.decide(&context("listPets")).await.unwrap();

        assert_eq!(
            paused,
            HumanInterventionDecision::Pause {
                args: json!({ "ui": { "path": { "petId": 10 } } })
            }
        );
        assert_eq!(continued, HumanInterventionDecision::Continue);
    }

    #[tokio::test]
    async fn pattern_policy_also_matches_operation_id() {
        // GIVEN: an x-tool-name that hides the operation id
        let policy = PatternPolicy::new(&["^delete"]).unwrap();
        let ctx = InterventionContext {
            tool_name: "remove_pet".to_string(),
            operation_id: "deletePet".to_string(),
            ..context("remove_pet")
        };

        // THEN: the id still triggers the pause
        assert!(policy.decide(&ctx).await.unwrap().should_pause());
        assert!(!policy.decide(&context("remove_pet")).await.unwrap().should_pause());
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        assert!(matches!(PatternPolicy::new(&["("]), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn closure_policy() {
        let policy = policy_fn(|ctx: &InterventionContext| {
            if ctx.args["path"]["petId"] == 10 {
                HumanInterventionDecision::pause(json!({ "warning": "protected pet" }))
            } else {
                HumanInterventionDecision::Continue
            }
        });
        assert!(policy.decide(&context("x")).await.unwrap().should_pause());
    }

    #[test]
    fn decision_from_external_shape() {
        assert_eq!(
            HumanInterventionDecision::from_json(&json!({ "shouldPause": false })),
            HumanInterventionDecision::Continue
        );
        assert_eq!(
            HumanInterventionDecision::from_json(&json!({ "shouldPause": true, "args": { "ui": 1 } })),
            HumanInterventionDecision::Pause { args: json!({ "ui": 1 }) }
        );
    }

    #[test]
    fn human_decision_wire_shape() {
        let approve: HumanDecision =
            serde_json::from_value(json!({ "decision": "approve", "overrides": { "a": 1 } })).unwrap();
        let deny: HumanDecision = serde_json::from_value(json!({ "decision": "deny" })).unwrap();

        assert!(matches!(approve, HumanDecision::Approve { overrides: Some(_) }));
        assert_eq!(deny, HumanDecision::Deny { reason: None });
    }

    #[test]
    fn human_input_shapes() {
        assert_eq!(
            HumanDecision::from_human_input(&json!({ "decision": "deny", "reason": "no" })),
            Some(HumanDecision::deny("no"))
        );
        assert_eq!(
            HumanDecision::from_human_input(&json!({ "query": { "force": true } })),
            Some(HumanDecision::approve_with(
                json!({ "query": { "force": true } }).as_object().cloned().unwrap()
            ))
        );
        assert_eq!(HumanDecision::from_human_input(&json!(true)), Some(HumanDecision::approve()));
        assert_eq!(
            HumanDecision::from_human_input(&json!(false)),
            Some(HumanDecision::Deny { reason: None })
        );
        assert_eq!(HumanDecision::from_human_input(&Value::Null), None);
        assert_eq!(HumanDecision::from_human_input(&json!({ "decision": "maybe" })), None);
    }

    #[test]
    fn overrides_win_per_top_level_key() {
        let original = json!({ "path": { "petId": 10 }, "query": { "force": false } });
        let mut overrides = Map::new();
        overrides.insert("query".to_string(), json!({ "force": true }));

        assert_eq!(
            merge_overrides(&original, Some(&overrides)),
            json!({ "path": { "petId": 10 }, "query": { "force": true } })
        );
        assert_eq!(merge_overrides(&original, None), original);
    }
}
