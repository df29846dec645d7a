//! Normalized call schemas
//!
//! A [`CallSchema`] is the engine's own view of an OpenAPI schema fragment:
//! `$ref`s are already resolved (or replaced by placeholder nodes), binary
//! strings are rewritten, and every object knows exactly which of its
//! properties are required. It renders back to JSON Schema for the model
//! with [`CallSchema::to_json_schema`].

mod translator;
mod validator;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value, json};

pub use translator::SchemaTranslator;
pub(crate) use translator::resolve_local;
pub use validator::{
    SchemaValidationResult, ValidationViolation, validate_arguments,
};

/// Description attached to binary string fields
pub(crate) const BINARY_DESCRIPTION: &str = "absolute paths to local files";

/// Kind of value a [`CallSchema`] node accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// JSON object
    Object,
    /// JSON array
    Array,
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// Whole JSON number
    Integer,
    /// JSON boolean
    Boolean,
    /// Unconstrained
    Any,
    /// Placeholder for a `$ref` that was cyclic or could not be resolved
    Reference,
}

impl SchemaKind {
    /// JSON Schema `type` keyword for this kind, if it has one
    #[must_use]
    pub fn type_name(self) -> Option<&'static str> {
        match self {
            Self::Object => Some("object"),
            Self::Array => Some("array"),
            Self::String => Some("string"),
            Self::Number => Some("number"),
            Self::Integer => Some("integer"),
            Self::Boolean => Some("boolean"),
            Self::Any | Self::Reference => None,
        }
    }
}

/// Array item schemas
#[derive(Debug, Clone, PartialEq)]
pub enum Items {
    /// Every element has the same schema
    Single(Box<CallSchema>),
    /// Positional element schemas
    Tuple(Vec<CallSchema>),
}

/// What an object does with keys it does not declare
#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalProperties {
    /// `true` accepts anything, `false` rejects undeclared keys
    Allowed(bool),
    /// Undeclared keys must match this schema
    Schema(Box<CallSchema>),
}

/// Normalized, validator-ready schema tree
#[derive(Debug, Clone, PartialEq)]
pub struct CallSchema {
    /// Node kind
    pub kind: SchemaKind,
    /// Object properties
    pub properties: BTreeMap<String, CallSchema>,
    /// Required property names; every other property is optional
    pub required: Vec<String>,
    /// Array items
    pub items: Option<Items>,
    /// Handling of undeclared object keys
    pub additional_properties: Option<AdditionalProperties>,
    /// Human description
    pub description: Option<String>,
    /// `format` keyword
    pub format: Option<String>,
    /// Allowed values
    pub enum_values: Vec<Value>,
    /// Default value
    pub default: Option<Value>,
    /// Whether `null` is accepted
    pub nullable: bool,
    /// `oneOf` alternatives
    pub one_of: Vec<CallSchema>,
    /// `anyOf` alternatives
    pub any_of: Vec<CallSchema>,
    /// `allOf` members
    pub all_of: Vec<CallSchema>,
    /// Numeric lower bound
    pub minimum: Option<f64>,
    /// Numeric upper bound
    pub maximum: Option<f64>,
    /// Minimum string length
    pub min_length: Option<u64>,
    /// Maximum string length
    pub max_length: Option<u64>,
    /// JSON pointer for [`SchemaKind::Reference`] placeholders
    pub reference: Option<String>,
}

impl Default for CallSchema {
    fn default() -> Self {
        Self::of_kind(SchemaKind::Any)
    }
}

impl CallSchema {
    /// Empty node of the given kind
    #[must_use]
    pub fn of_kind(kind: SchemaKind) -> Self {
        Self {
            kind,
            properties: BTreeMap::new(),
            required: Vec::new(),
            items: None,
            additional_properties: None,
            description: None,
            format: None,
            enum_values: Vec::new(),
            default: None,
            nullable: false,
            one_of: Vec::new(),
            any_of: Vec::new(),
            all_of: Vec::new(),
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            reference: None,
        }
    }

    /// Object that accepts any keys
    #[must_use]
    pub fn open_object() -> Self {
        Self {
            additional_properties: Some(AdditionalProperties::Allowed(true)),
            ..Self::of_kind(SchemaKind::Object)
        }
    }

    /// Placeholder for a `$ref` pointer
    #[must_use]
    pub fn placeholder(pointer: &str) -> Self {
        Self {
            reference: Some(pointer.to_string()),
            ..Self::of_kind(SchemaKind::Reference)
        }
    }

    /// Builder-style description setter
    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Whether `name` is listed as required
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Whether this object rejects undeclared keys
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(
            self.additional_properties,
            Some(AdditionalProperties::Allowed(false))
        )
    }

    /// Pointers of every placeholder in this tree
    pub fn collect_references(&self, out: &mut BTreeSet<String>) {
        if let Some(pointer) = &self.reference {
            out.insert(pointer.clone());
        }
        for child in self.properties.values() {
            child.collect_references(out);
        }
        match &self.items {
            Some(Items::Single(item)) => item.collect_references(out),
            Some(Items::Tuple(items)) => items.iter().for_each(|i| i.collect_references(out)),
            None => {}
        }
        if let Some(AdditionalProperties::Schema(extra)) = &self.additional_properties {
            extra.collect_references(out);
        }
        for child in self.one_of.iter().chain(&self.any_of).chain(&self.all_of) {
            child.collect_references(out);
        }
    }

    /// Render as a JSON Schema object
    ///
    /// Placeholders become `{"$ref": "#/$defs/<name>"}`; the caller is
    /// responsible for attaching the matching `$defs`.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        if let Some(pointer) = &self.reference {
            let mut out = Map::new();
            out.insert(
                "$ref".to_string(),
                Value::String(format!("#/$defs/{}", definition_name(pointer))),
            );
            if let Some(description) = &self.description {
                out.insert("description".to_string(), json!(description));
            }
            return Value::Object(out);
        }

        let mut out = Map::new();
        match (self.kind.type_name(), self.nullable) {
            (Some(ty), true) => {
                out.insert("type".to_string(), json!([ty, "null"]));
            }
            (Some(ty), false) => {
                out.insert("type".to_string(), json!(ty));
            }
            (None, _) => {}
        }
        if let Some(description) = &self.description {
            out.insert("description".to_string(), json!(description));
        }
        if let Some(format) = &self.format {
            out.insert("format".to_string(), json!(format));
        }
        if !self.enum_values.is_empty() {
            out.insert("enum".to_string(), Value::Array(self.enum_values.clone()));
        }
        if let Some(default) = &self.default {
            out.insert("default".to_string(), default.clone());
        }
        if let Some(min) = self.minimum {
            out.insert("minimum".to_string(), json!(min));
        }
        if let Some(max) = self.maximum {
            out.insert("maximum".to_string(), json!(max));
        }
        if let Some(min) = self.min_length {
            out.insert("minLength".to_string(), json!(min));
        }
        if let Some(max) = self.max_length {
            out.insert("maxLength".to_string(), json!(max));
        }

        if self.kind == SchemaKind::Object {
            let properties: Map<String, Value> = self
                .properties
                .iter()
                .map(|(name, prop)| (name.clone(), prop.to_json_schema()))
                .collect();
            out.insert("properties".to_string(), Value::Object(properties));
            if !self.required.is_empty() {
                out.insert("required".to_string(), json!(self.required));
            }
        }
        match &self.additional_properties {
            Some(AdditionalProperties::Allowed(allowed)) => {
                out.insert("additionalProperties".to_string(), json!(allowed));
            }
            Some(AdditionalProperties::Schema(extra)) => {
                out.insert("additionalProperties".to_string(), extra.to_json_schema());
            }
            None => {}
        }
        match &self.items {
            Some(Items::Single(item)) => {
                out.insert("items".to_string(), item.to_json_schema());
            }
            Some(Items::Tuple(items)) => {
                let rendered: Vec<Value> = items.iter().map(CallSchema::to_json_schema).collect();
                out.insert("prefixItems".to_string(), Value::Array(rendered));
                out.insert("items".to_string(), json!(false));
            }
            None => {}
        }
        for (keyword, members) in [
            ("oneOf", &self.one_of),
            ("anyOf", &self.any_of),
            ("allOf", &self.all_of),
        ] {
            if !members.is_empty() {
                let rendered: Vec<Value> = members.iter().map(CallSchema::to_json_schema).collect();
                out.insert(keyword.to_string(), Value::Array(rendered));
            }
        }

        Value::Object(out)
    }
}

/// `$defs` key for a JSON pointer
///
/// `#/components/schemas/Pet` maps to `Pet`; any other pointer is flattened
/// into a single identifier.
#[must_use]
pub fn definition_name(pointer: &str) -> String {
    if let Some(name) = pointer.strip_prefix("#/components/schemas/") {
        if !name.contains('/') {
            return unescape_pointer_segment(name);
        }
    }
    let flattened: String = pointer
        .trim_start_matches('#')
        .trim_start_matches('/')
        .split('/')
        .map(unescape_pointer_segment)
        .collect::<Vec<_>>()
        .join("_");
    flattened
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

pub(crate) fn unescape_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}
