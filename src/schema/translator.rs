//! OpenAPI schema fragment → [`CallSchema`] translation
//!
//! Translation never fails. Anything the translator does not understand
//! becomes [`SchemaKind::Any`], and `$ref`s that are cyclic or dangling become
//! placeholder nodes instead of errors.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{AdditionalProperties, BINARY_DESCRIPTION, CallSchema, Items, SchemaKind};

/// Translates schema fragments of one OpenAPI document
///
/// Resolved `$ref`s are memoized per translator in an arena keyed by pointer,
/// so translating many operations of the same document resolves each shared
/// component once. A translation that cut a cycle at one of its ancestors
/// depends on where it was reached from and is not memoized.
pub struct SchemaTranslator<'a> {
    document: &'a Value,
    arena: Vec<CallSchema>,
    index: HashMap<String, usize>,
    cycle_cuts: Vec<String>,
}

impl<'a> SchemaTranslator<'a> {
    /// Create a translator that resolves `$ref`s against `document`
    #[must_use]
    pub fn new(document: &'a Value) -> Self {
        Self {
            document,
            arena: Vec::new(),
            index: HashMap::new(),
            cycle_cuts: Vec::new(),
        }
    }

    /// Translate a fragment with no refs in flight
    pub fn translate(&mut self, fragment: &Value) -> CallSchema {
        self.cycle_cuts.clear();
        let mut visiting = HashSet::new();
        self.translate_with(fragment, &mut visiting)
    }

    /// Translate a fragment while `visiting` holds the pointers currently being
    /// expanded higher up the tree
    pub fn translate_with(&mut self, fragment: &Value, visiting: &mut HashSet<String>) -> CallSchema {
        let Some(obj) = fragment.as_object() else {
            return CallSchema::default();
        };

        if let Some(pointer) = obj.get("$ref").and_then(Value::as_str) {
            let mut resolved = self.translate_ref(pointer, visiting);
            if let Some(description) = obj.get("description").and_then(Value::as_str) {
                resolved.description = Some(description.to_string());
            }
            return resolved;
        }

        let (kind, type_allows_null) = kind_of(obj);
        let mut schema = CallSchema::of_kind(kind);
        schema.nullable = type_allows_null || obj.get("nullable") == Some(&Value::Bool(true));
        schema.description = obj
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        schema.format = obj.get("format").and_then(Value::as_str).map(str::to_string);
        schema.enum_values = obj
            .get("enum")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        schema.default = obj.get("default").cloned();
        schema.minimum = obj.get("minimum").and_then(Value::as_f64);
        schema.maximum = obj.get("maximum").and_then(Value::as_f64);
        schema.min_length = obj.get("minLength").and_then(Value::as_u64);
        schema.max_length = obj.get("maxLength").and_then(Value::as_u64);

        if schema.format.as_deref() == Some("binary") {
            schema.kind = SchemaKind::String;
            schema.format = Some("uri-reference".to_string());
            schema.description = Some(match schema.description.take() {
                Some(description) => format!("{description} ({BINARY_DESCRIPTION})"),
                None => BINARY_DESCRIPTION.to_string(),
            });
        }

        match schema.kind {
            SchemaKind::Object => self.translate_object(obj, &mut schema, visiting),
            SchemaKind::Array => schema.items = Some(self.translate_items(obj, visiting)),
            _ => {}
        }

        schema.one_of = self.translate_all(obj.get("oneOf"), visiting);
        schema.any_of = self.translate_all(obj.get("anyOf"), visiting);
        schema.all_of = self.translate_all(obj.get("allOf"), visiting);

        schema
    }

    /// Number of distinct `$ref` targets resolved so far
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.arena.len()
    }

    /// Translate the target of `pointer` as a standalone definition
    ///
    /// The pointer itself counts as visiting, so a self-referencing component
    /// comes back with a placeholder where it points at itself. Returns `None`
    /// when the pointer does not resolve.
    pub fn definition(&mut self, pointer: &str) -> Option<CallSchema> {
        let target = resolve_local(self.document, pointer)?;
        self.cycle_cuts.clear();
        let mut visiting = HashSet::from([pointer.to_string()]);
        Some(self.translate_with(target, &mut visiting))
    }

    fn translate_ref(&mut self, pointer: &str, visiting: &mut HashSet<String>) -> CallSchema {
        if visiting.contains(pointer) {
            debug!(pointer, "Cyclic $ref, emitting placeholder");
            self.cycle_cuts.push(pointer.to_string());
            return CallSchema::placeholder(pointer);
        }
        if let Some(&slot) = self.index.get(pointer) {
            return self.arena[slot].clone();
        }

        let Some(target) = resolve_local(self.document, pointer) else {
            warn!(pointer, "Unresolved $ref, emitting placeholder");
            return CallSchema::placeholder(pointer);
        };

        let mark = self.cycle_cuts.len();
        visiting.insert(pointer.to_string());
        let translated = self.translate_with(target, visiting);
        visiting.remove(pointer);

        // `visiting` now holds only the ancestors of `pointer`
        if self.cycle_cuts[mark..].iter().any(|cut| visiting.contains(cut)) {
            return translated;
        }
        self.index.insert(pointer.to_string(), self.arena.len());
        self.arena.push(translated.clone());
        translated
    }

    fn translate_object(
        &mut self,
        obj: &Map<String, Value>,
        schema: &mut CallSchema,
        visiting: &mut HashSet<String>,
    ) {
        if let Some(properties) = obj.get("properties").and_then(Value::as_object) {
            for (name, prop) in properties {
                let translated = self.translate_with(prop, visiting);
                schema.properties.insert(name.clone(), translated);
            }
        }

        schema.required = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        schema.additional_properties = Some(match obj.get("additionalProperties") {
            Some(Value::Bool(false)) => AdditionalProperties::Allowed(false),
            Some(extra @ Value::Object(_)) => {
                AdditionalProperties::Schema(Box::new(self.translate_with(extra, visiting)))
            }
            _ => AdditionalProperties::Allowed(true),
        });
    }

    fn translate_items(&mut self, obj: &Map<String, Value>, visiting: &mut HashSet<String>) -> Items {
        let positional = obj
            .get("prefixItems")
            .or_else(|| obj.get("items").filter(|items| items.is_array()));

        if let Some(Value::Array(elements)) = positional {
            if elements.is_empty() {
                return Items::Single(Box::new(CallSchema::open_object()));
            }
            return Items::Tuple(
                elements
                    .iter()
                    .map(|element| self.translate_with(element, visiting))
                    .collect(),
            );
        }

        match obj.get("items") {
            Some(item @ Value::Object(map)) if !map.is_empty() => {
                Items::Single(Box::new(self.translate_with(item, visiting)))
            }
            _ => Items::Single(Box::new(CallSchema::open_object())),
        }
    }

    fn translate_all(&mut self, members: Option<&Value>, visiting: &mut HashSet<String>) -> Vec<CallSchema> {
        members
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .map(|member| self.translate_with(member, visiting))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Resolve a document-local `#/...` pointer
pub(crate) fn resolve_local<'a>(document: &'a Value, pointer: &str) -> Option<&'a Value> {
    let path = pointer.strip_prefix('#')?;
    if path.is_empty() {
        return Some(document);
    }
    document.pointer(path)
}

/// Determine the node kind from `type`, falling back to structural hints
fn kind_of(obj: &Map<String, Value>) -> (SchemaKind, bool) {
    match obj.get("type") {
        Some(Value::String(ty)) => (parse_kind(ty), ty == "null"),
        Some(Value::Array(types)) => {
            let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
            let allows_null = names.contains(&"null");
            let concrete: Vec<&str> = names.into_iter().filter(|t| *t != "null").collect();
            match concrete.as_slice() {
                [single] => (parse_kind(single), allows_null),
                _ => (SchemaKind::Any, allows_null),
            }
        }
        _ if obj.contains_key("properties") || obj.contains_key("additionalProperties") => {
            (SchemaKind::Object, false)
        }
        _ if obj.contains_key("items") || obj.contains_key("prefixItems") => (SchemaKind::Array, false),
        _ => (SchemaKind::Any, false),
    }
}

fn parse_kind(ty: &str) -> SchemaKind {
    match ty {
        "object" => SchemaKind::Object,
        "array" => SchemaKind::Array,
        "string" => SchemaKind::String,
        "number" => SchemaKind::Number,
        "integer" => SchemaKind::Integer,
        "boolean" => SchemaKind::Boolean,
        _ => SchemaKind::Any,
    }
}
