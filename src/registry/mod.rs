//! Operation registry
//!
//! Walks the `paths` of an OpenAPI document once and produces an immutable,
//! explicit map from operation id to [`OperationDescriptor`]. Dispatch is a
//! plain lookup in that map.
//!
//! Malformed operations never block discovery: they are skipped with a
//! warning and the rest of the document still registers.

mod document;
pub mod naming;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::schema::{
    AdditionalProperties, CallSchema, SchemaKind, SchemaTranslator, definition_name, resolve_local,
};
use crate::{Error, Result};

pub use document::{SchemaSource, parse_document};
pub use naming::{sanitize_client_name, sanitize_tool_name, synthetic_operation_id};

/// Path item keys that are operations
const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Extension naming the tool explicitly
const TOOL_NAME_EXTENSION: &str = "x-tool-name";

/// Where a parameter travels in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// `{name}` placeholder in the path
    Path,
    /// Query string
    Query,
    /// Request header
    Header,
}

impl ParameterLocation {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            _ => None,
        }
    }

    /// Argument group holding parameters of this location
    #[must_use]
    pub fn group(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "headers",
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    /// Parameter name
    pub name: String,
    /// Location
    pub location: ParameterLocation,
    /// Whether the caller must supply it
    pub required: bool,
    /// Translated schema
    pub schema: CallSchema,
    /// Human description
    pub description: Option<String>,
}

/// Whether the wire body is the payload itself or wrapped in `{"body": ...}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyShape {
    /// Payload is sent as-is
    #[default]
    Direct,
    /// Document declared a single `body` property; the model sees the inner
    /// schema and the payload is re-wrapped on send
    Wrapped,
}

/// JSON request body of an operation
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodyDescriptor {
    /// Schema of the payload the model supplies
    pub schema: CallSchema,
    /// Whether a body is required
    pub required: bool,
    /// Declared JSON media type
    pub content_type: String,
    /// Wire shape
    pub shape: BodyShape,
}

/// Security requirement: scheme name → scopes
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

/// A single callable operation
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    /// Unique id within the registry
    pub id: String,
    /// Model-facing tool name
    pub tool_name: String,
    /// HTTP method
    pub method: Method,
    /// URL template with `{param}` placeholders
    pub path: String,
    /// Short summary
    pub summary: Option<String>,
    /// Long description
    pub description: Option<String>,
    /// Declared path, query and header parameters
    pub parameters: Vec<ParameterDescriptor>,
    /// JSON request body, if any
    pub request_body: Option<RequestBodyDescriptor>,
    /// Security requirements, operation-level or inherited from the document
    pub security: Vec<SecurityRequirement>,
    /// Root schema the arguments are validated against
    pub call_schema: CallSchema,
    /// Root schema rendered as JSON Schema with `$defs`
    pub input_schema: Value,
}

impl OperationDescriptor {
    /// Description shown to the model
    #[must_use]
    pub fn tool_description(&self) -> String {
        self.description
            .clone()
            .or_else(|| self.summary.clone())
            .unwrap_or_else(|| format!("{} {}", self.method, self.path))
    }

    /// Parameters in one location
    pub fn parameters_in(
        &self,
        location: ParameterLocation,
    ) -> impl Iterator<Item = &ParameterDescriptor> {
        self.parameters.iter().filter(move |p| p.location == location)
    }

    /// Whether requests carry a JSON body
    #[must_use]
    pub fn sends_body(&self) -> bool {
        self.request_body.is_some()
            && matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }

    fn summary_entry(&self) -> OperationSummary {
        OperationSummary {
            id: self.id.clone(),
            method: self.method.to_string(),
            path: self.path.clone(),
            summary: self.summary.clone(),
            description: self.description.clone(),
        }
    }
}

/// Listing entry for [`OperationRegistry::list_operations`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    /// Operation id
    pub id: String,
    /// HTTP method
    pub method: String,
    /// URL template
    pub path: String,
    /// Short summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Long description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Registry construction options
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Base URL overriding `servers[0].url`
    pub base_url: Option<String>,
    /// Only register operations whose id or `x-tool-name` is listed
    pub include: Option<Vec<String>>,
}

/// Immutable map of the operations of one document
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    title: Option<String>,
    base_url: Option<String>,
    operations: Vec<Arc<OperationDescriptor>>,
    by_id: HashMap<String, usize>,
    by_tool_name: HashMap<String, usize>,
    security_schemes: Map<String, Value>,
}

impl OperationRegistry {
    /// Build with default options
    ///
    /// # Errors
    ///
    /// Returns [`Error::Document`] if the document is not an object.
    pub fn from_document(document: &Value) -> Result<Self> {
        Self::build(document, &RegistryOptions::default())
    }

    /// Build a registry from a parsed document
    ///
    /// # Errors
    ///
    /// Returns [`Error::Document`] if the document is not an object.
    pub fn build(document: &Value, options: &RegistryOptions) -> Result<Self> {
        if !document.is_object() {
            return Err(Error::Document(
                "OpenAPI document must be an object".to_string(),
            ));
        }

        let title = document
            .pointer("/info/title")
            .and_then(Value::as_str)
            .map(str::to_string);
        let base_url = options.base_url.clone().or_else(|| {
            document
                .pointer("/servers/0/url")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        let security_schemes = document
            .pointer("/components/securitySchemes")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let document_security = parse_security(document.get("security")).unwrap_or_default();

        let mut registry = Self {
            title,
            base_url,
            operations: Vec::new(),
            by_id: HashMap::new(),
            by_tool_name: HashMap::new(),
            security_schemes,
        };

        let Some(paths) = document.get("paths").and_then(Value::as_object) else {
            warn!("OpenAPI document has no paths");
            return Ok(registry);
        };

        let mut builder = DescriptorBuilder {
            document,
            translator: SchemaTranslator::new(document),
            document_security,
            taken_tool_names: HashSet::new(),
        };

        let include = options.include.as_deref();
        for (path, item) in paths {
            let Some(item) = item.as_object() else {
                warn!(path = %path, "Skipping path item that is not an object");
                continue;
            };
            let shared_parameters = item.get("parameters");

            for method in HTTP_METHODS {
                let Some(operation) = item.get(method) else {
                    continue;
                };
                match builder.build(path, method, operation, shared_parameters, include) {
                    Ok(Some(mut descriptor)) => {
                        if registry.by_id.contains_key(&descriptor.id) {
                            warn!(operation = %descriptor.id, "Skipping operation with duplicate id");
                            continue;
                        }
                        // Names are reserved only for operations that register
                        descriptor.tool_name =
                            naming::unique_name(&descriptor.tool_name, &mut builder.taken_tool_names);
                        registry.insert(descriptor);
                    }
                    Ok(None) => {
                        debug!(path = %path, method = %method, "Operation filtered out");
                    }
                    Err(e) => {
                        warn!(path = %path, method = %method, error = %e, "Skipping operation");
                    }
                }
            }
        }

        debug!(
            operations = registry.operations.len(),
            refs = builder.translator.resolved_count(),
            "Built operation registry"
        );
        Ok(registry)
    }

    fn insert(&mut self, descriptor: OperationDescriptor) {
        let slot = self.operations.len();
        self.by_id.insert(descriptor.id.clone(), slot);
        self.by_tool_name.insert(descriptor.tool_name.clone(), slot);
        self.operations.push(Arc::new(descriptor));
    }

    /// Document title
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// `components.securitySchemes`
    #[must_use]
    pub fn security_schemes(&self) -> &Map<String, Value> {
        &self.security_schemes
    }

    /// Look up an operation by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<OperationDescriptor>> {
        self.by_id.get(id).map(|&slot| &self.operations[slot])
    }

    /// Look up an operation by tool name
    #[must_use]
    pub fn by_tool_name(&self, name: &str) -> Option<&Arc<OperationDescriptor>> {
        self.by_tool_name.get(name).map(|&slot| &self.operations[slot])
    }

    /// All operations, ordered by path then method
    pub fn operations(&self) -> impl Iterator<Item = &Arc<OperationDescriptor>> {
        self.operations.iter()
    }

    /// Id, method, path and descriptions of every operation
    #[must_use]
    pub fn list_operations(&self) -> Vec<OperationSummary> {
        self.operations.iter().map(|op| op.summary_entry()).collect()
    }

    /// Number of registered operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Return `true` when no operation registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

// ── Descriptor construction ───────────────────────────────────────────────────

struct DescriptorBuilder<'a> {
    document: &'a Value,
    translator: SchemaTranslator<'a>,
    document_security: Vec<SecurityRequirement>,
    taken_tool_names: HashSet<String>,
}

impl<'a> DescriptorBuilder<'a> {
    fn build(
        &mut self,
        path: &str,
        method: &str,
        operation: &Value,
        shared_parameters: Option<&Value>,
        include: Option<&[String]>,
    ) -> Result<Option<OperationDescriptor>> {
        let operation = operation
            .as_object()
            .ok_or_else(|| Error::Document("operation is not an object".to_string()))?;
        let http_method = method
            .to_ascii_uppercase()
            .parse::<Method>()
            .map_err(|e| Error::Document(format!("invalid method: {e}")))?;

        let id = match operation.get("operationId") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            Some(Value::String(_)) | None => synthetic_operation_id(method, path),
            Some(other) => {
                return Err(Error::Document(format!(
                    "operationId must be a string, got {other}"
                )));
            }
        };

        let explicit_name = operation
            .get(TOOL_NAME_EXTENSION)
            .and_then(Value::as_str)
            .and_then(sanitize_tool_name);
        if let Some(include) = include {
            let listed = include.contains(&id)
                || explicit_name.as_ref().is_some_and(|name| include.contains(name));
            if !listed {
                return Ok(None);
            }
        }
        let tool_name = explicit_name
            .or_else(|| sanitize_tool_name(&id))
            .or_else(|| sanitize_tool_name(&synthetic_operation_id(method, path)))
            .ok_or_else(|| Error::Document("no usable tool name".to_string()))?;

        let parameters = self.parameters(shared_parameters, operation.get("parameters"));
        let request_body = match operation.get("requestBody") {
            Some(body) => self.request_body(body),
            None => None,
        };
        let security =
            parse_security(operation.get("security")).unwrap_or_else(|| self.document_security.clone());

        let call_schema = root_schema(&parameters, request_body.as_ref());
        let input_schema = self.render_with_definitions(&call_schema);

        Ok(Some(OperationDescriptor {
            id,
            tool_name,
            method: http_method,
            path: path.to_string(),
            summary: string_field(operation, "summary"),
            description: string_field(operation, "description"),
            parameters,
            request_body,
            security,
            call_schema,
            input_schema,
        }))
    }

    /// Merge path-level and operation-level parameters; operation-level wins
    /// on the same name and location.
    fn parameters(
        &mut self,
        shared: Option<&Value>,
        own: Option<&Value>,
    ) -> Vec<ParameterDescriptor> {
        let mut merged: Vec<ParameterDescriptor> = Vec::new();
        let raw = shared
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .chain(own.and_then(Value::as_array).into_iter().flatten());

        for param in raw {
            let Some(descriptor) = self.parameter(param) else {
                continue;
            };
            if let Some(existing) = merged
                .iter_mut()
                .find(|p| p.name == descriptor.name && p.location == descriptor.location)
            {
                *existing = descriptor;
            } else {
                merged.push(descriptor);
            }
        }
        merged
    }

    fn parameter(&mut self, raw: &Value) -> Option<ParameterDescriptor> {
        let param = self.deref(raw)?;
        let name = param.get("name").and_then(Value::as_str)?;
        let location_raw = param.get("in").and_then(Value::as_str)?;
        let Some(location) = ParameterLocation::parse(location_raw) else {
            debug!(param = name, location = location_raw, "Ignoring parameter location");
            return None;
        };

        let description = param
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let schema_fragment = param.get("schema").unwrap_or(param);
        let mut schema = self.translator.translate(schema_fragment);
        if schema.description.is_none() {
            schema.description.clone_from(&description);
        }

        Some(ParameterDescriptor {
            name: name.to_string(),
            location,
            required: location == ParameterLocation::Path
                || param.get("required") == Some(&Value::Bool(true)),
            schema,
            description,
        })
    }

    fn request_body(&mut self, raw: &Value) -> Option<RequestBodyDescriptor> {
        let body = self.deref(raw)?;
        let content = body.get("content").and_then(Value::as_object)?;
        let (content_type, media) = content
            .get_key_value("application/json")
            .or_else(|| content.iter().find(|(ty, _)| is_json_media_type(ty)))?;

        let mut schema = match media.get("schema") {
            Some(fragment) => self.translator.translate(fragment),
            None => CallSchema::open_object(),
        };
        let shape = if is_body_wrapper(&schema) {
            schema = schema.properties.remove("body").unwrap_or_default();
            BodyShape::Wrapped
        } else {
            BodyShape::Direct
        };
        if schema.description.is_none() {
            schema.description = body
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        Some(RequestBodyDescriptor {
            schema,
            required: body.get("required") == Some(&Value::Bool(true)),
            content_type: content_type.clone(),
            shape,
        })
    }

    /// Follow a `$ref` on a parameter or request body object
    fn deref<'v>(&self, raw: &'v Value) -> Option<&'v Value>
    where
        'a: 'v,
    {
        match raw.get("$ref").and_then(Value::as_str) {
            Some(pointer) => {
                let resolved = resolve_local(self.document, pointer);
                if resolved.is_none() {
                    warn!(pointer, "Unresolved $ref");
                }
                resolved
            }
            None => Some(raw),
        }
    }

    /// Render a root schema with the `$defs` its placeholders point at
    fn render_with_definitions(&mut self, root: &CallSchema) -> Value {
        let mut rendered = root.to_json_schema();

        let mut pending = BTreeSet::new();
        root.collect_references(&mut pending);
        if pending.is_empty() {
            return rendered;
        }

        let mut seen = BTreeSet::new();
        let mut definitions = Map::new();
        while let Some(pointer) = pending.pop_first() {
            if !seen.insert(pointer.clone()) {
                continue;
            }
            let definition = match self.translator.definition(&pointer) {
                Some(schema) => {
                    let mut nested = BTreeSet::new();
                    schema.collect_references(&mut nested);
                    pending.extend(nested.into_iter().filter(|p| !seen.contains(p)));
                    schema.to_json_schema()
                }
                None => json!({}),
            };
            definitions.insert(definition_name(&pointer), definition);
        }

        if let Value::Object(map) = &mut rendered {
            map.insert("$defs".to_string(), Value::Object(definitions));
        }
        rendered
    }
}

/// Root argument schema: `{path, query, headers, body}` plus open extras
fn root_schema(
    parameters: &[ParameterDescriptor],
    request_body: Option<&RequestBodyDescriptor>,
) -> CallSchema {
    let mut root = CallSchema::open_object();

    for location in [
        ParameterLocation::Path,
        ParameterLocation::Query,
        ParameterLocation::Header,
    ] {
        let mut group = CallSchema::open_object();
        for param in parameters.iter().filter(|p| p.location == location) {
            group
                .properties
                .insert(param.name.clone(), param.schema.clone());
            if param.required {
                group.required.push(param.name.clone());
            }
        }
        if group.properties.is_empty() {
            continue;
        }
        if location == ParameterLocation::Path || !group.required.is_empty() {
            root.required.push(location.group().to_string());
        }
        root.properties.insert(location.group().to_string(), group);
    }

    if let Some(body) = request_body {
        root.properties
            .insert("body".to_string(), body.schema.clone());
        if body.required {
            root.required.push("body".to_string());
        }
    }

    root
}

fn is_body_wrapper(schema: &CallSchema) -> bool {
    schema.kind == SchemaKind::Object
        && schema.properties.len() == 1
        && schema.properties.contains_key("body")
        && !matches!(
            schema.additional_properties,
            Some(AdditionalProperties::Schema(_))
        )
}

fn is_json_media_type(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    essence == "application/json" || essence.ends_with("+json")
}

fn parse_security(raw: Option<&Value>) -> Option<Vec<SecurityRequirement>> {
    let list = raw?.as_array()?;
    Some(
        list.iter()
            .filter_map(|requirement| serde_json::from_value(requirement.clone()).ok())
            .collect(),
    )
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn petstore() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": { "title": "Swagger Petstore", "version": "1.0.0" },
            "servers": [{ "url": "https://petstore.example.com/v1" }],
            "security": [{ "api_key": [] }],
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "summary": "List all pets",
                        "parameters": [
                            { "name": "limit", "in": "query", "schema": { "type": "integer" } },
                            { "name": "X-Trace", "in": "header", "schema": { "type": "string" } },
                            { "name": "session", "in": "cookie", "schema": { "type": "string" } }
                        ]
                    },
                    "post": {
                        "operationId": "createPet",
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Pet" }
                                }
                            }
                        },
                        "security": []
                    }
                },
                "/pets/{petId}": {
                    "parameters": [
                        { "name": "petId", "in": "path", "required": true, "schema": { "type": "string" } }
                    ],
                    "get": {
                        "parameters": [
                            { "name": "petId", "in": "path", "required": true, "schema": { "type": "integer" } }
                        ]
                    },
                    "delete": { "operationId": "deletePet" },
                    "summary": "not an operation"
                },
                "/tree": {
                    "put": {
                        "operationId": "putTree",
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "body": { "$ref": "#/components/schemas/Node" }
                                        }
                                    }
                                }
                            }
                        }
                    }
                },
                "/broken": {
                    "get": "nope"
                }
            },
            "components": {
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "required": ["name"],
                        "properties": { "name": { "type": "string" } }
                    },
                    "Node": {
                        "type": "object",
                        "properties": {
                            "children": {
                                "type": "array",
                                "items": { "$ref": "#/components/schemas/Node" }
                            }
                        }
                    }
                },
                "securitySchemes": {
                    "api_key": { "type": "apiKey", "name": "X-API-Key", "in": "header" }
                }
            }
        })
    }

    // ── Discovery ───────────────────────────────────────────────────────────

    #[test]
    fn registers_real_methods_and_skips_malformed() {
        let registry = OperationRegistry::from_document(&petstore()).unwrap();

        let ids: Vec<&str> = registry.operations().map(|op| op.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["listPets", "createPet", "get_pets_by_petId", "deletePet", "putTree"]
        );
        assert_eq!(registry.title(), Some("Swagger Petstore"));
        assert_eq!(registry.base_url(), Some("https://petstore.example.com/v1"));
    }

    #[test]
    fn synthetic_ids_are_stable_across_builds() {
        let doc = petstore();
        let first: Vec<String> = OperationRegistry::from_document(&doc)
            .unwrap()
            .operations()
            .map(|op| op.id.clone())
            .collect();
        let second: Vec<String> = OperationRegistry::from_document(&doc)
            .unwrap()
            .operations()
            .map(|op| op.id.clone())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn base_url_override_wins() {
        let options = RegistryOptions {
            base_url: Some("http://localhost:9999".to_string()),
            ..RegistryOptions::default()
        };
        let registry = OperationRegistry::build(&petstore(), &options).unwrap();
        assert_eq!(registry.base_url(), Some("http://localhost:9999"));
    }

    #[test]
    fn include_filter_limits_operations() {
        let options = RegistryOptions {
            include: Some(vec!["deletePet".to_string()]),
            ..RegistryOptions::default()
        };
        let registry = OperationRegistry::build(&petstore(), &options).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("deletePet").is_some());
    }

    #[test]
    fn include_matches_ids_not_derived_names() {
        // GIVEN: two ids that sanitize to the same tool name
        let doc = json!({
            "paths": {
                "/a": { "get": { "operationId": "get.pet" } },
                "/b": { "get": { "operationId": "get_pet" } },
                "/c": { "get": { "operationId": "lookup", "x-tool-name": "find_pet" } }
            }
        });
        let options = RegistryOptions {
            include: Some(vec!["get_pet".to_string(), "find_pet".to_string()]),
            ..RegistryOptions::default()
        };

        // WHEN: only get_pet and the x-tool-name find_pet are listed
        let registry = OperationRegistry::build(&doc, &options).unwrap();

        // THEN: get.pet stays out and get_pet keeps its own name
        let ops: Vec<(&str, &str)> = registry
            .operations()
            .map(|op| (op.id.as_str(), op.tool_name.as_str()))
            .collect();
        assert_eq!(ops, vec![("get_pet", "get_pet"), ("lookup", "find_pet")]);
    }

    #[test]
    fn duplicate_id_does_not_reserve_a_tool_name() {
        let doc = json!({
            "paths": {
                "/a": { "get": { "operationId": "fetch" } },
                "/b": {
                    "get": { "operationId": "fetch" },
                    "post": { "operationId": "fetch_2" }
                }
            }
        });
        let registry = OperationRegistry::from_document(&doc).unwrap();

        let names: Vec<&str> = registry.operations().map(|op| op.tool_name.as_str()).collect();
        assert_eq!(names, vec!["fetch", "fetch_2"]);
        assert_eq!(registry.by_tool_name("fetch_2").unwrap().id, "fetch_2");
    }

    // ── Parameters ──────────────────────────────────────────────────────────

    #[test]
    fn parameters_are_bucketed_and_cookies_ignored() {
        let registry = OperationRegistry::from_document(&petstore()).unwrap();
        let list = registry.get("listPets").unwrap();

        assert_eq!(list.parameters.len(), 2);
        assert_eq!(list.parameters_in(ParameterLocation::Query).count(), 1);
        assert_eq!(list.parameters_in(ParameterLocation::Header).count(), 1);
        assert_eq!(
            list.input_schema["properties"]["headers"]["properties"]["X-Trace"]["type"],
            "string"
        );
    }

    #[test]
    fn operation_parameters_override_path_level() {
        let registry = OperationRegistry::from_document(&petstore()).unwrap();

        let get = registry.get("get_pets_by_petId").unwrap();
        assert_eq!(get.parameters.len(), 1);
        assert_eq!(get.parameters[0].schema.kind, SchemaKind::Integer);

        let delete = registry.get("deletePet").unwrap();
        assert_eq!(delete.parameters[0].schema.kind, SchemaKind::String);
        assert_eq!(delete.input_schema["required"], json!(["path"]));
    }

    // ── Request bodies ──────────────────────────────────────────────────────

    #[test]
    fn required_body_is_required_in_root_schema() {
        let registry = OperationRegistry::from_document(&petstore()).unwrap();
        let create = registry.get("createPet").unwrap();

        let body = create.request_body.as_ref().unwrap();
        assert!(body.required);
        assert_eq!(body.shape, BodyShape::Direct);
        assert_eq!(create.input_schema["required"], json!(["body"]));
        assert_eq!(
            create.input_schema["properties"]["body"]["required"],
            json!(["name"])
        );
    }

    #[test]
    fn single_body_property_is_unwrapped_and_defs_attached() {
        let registry = OperationRegistry::from_document(&petstore()).unwrap();
        let tree = registry.get("putTree").unwrap();

        let body = tree.request_body.as_ref().unwrap();
        assert_eq!(body.shape, BodyShape::Wrapped);
        assert!(body.schema.properties.contains_key("children"));
        assert_eq!(
            tree.input_schema["properties"]["body"]["properties"]["children"]["items"],
            json!({ "$ref": "#/$defs/Node" })
        );
        assert_eq!(
            tree.input_schema["$defs"]["Node"]["properties"]["children"]["items"],
            json!({ "$ref": "#/$defs/Node" })
        );
    }

    // ── Security ────────────────────────────────────────────────────────────

    #[test]
    fn security_falls_back_to_document_level() {
        let registry = OperationRegistry::from_document(&petstore()).unwrap();

        assert_eq!(registry.get("listPets").unwrap().security.len(), 1);
        assert!(registry.get("createPet").unwrap().security.is_empty());
        assert!(registry.security_schemes().contains_key("api_key"));
    }

    // ── Listing ─────────────────────────────────────────────────────────────

    #[test]
    fn list_operations_reports_method_and_path() {
        let registry = OperationRegistry::from_document(&petstore()).unwrap();
        let listing = registry.list_operations();

        assert_eq!(listing[0].id, "listPets");
        assert_eq!(listing[0].method, "GET");
        assert_eq!(listing[0].path, "/pets");
        assert_eq!(listing[0].summary.as_deref(), Some("List all pets"));
    }

    #[test]
    fn tool_names_are_unique_within_registry() {
        let doc = json!({
            "paths": {
                "/a": { "get": { "operationId": "fetch.item" } },
                "/b": { "get": { "operationId": "fetch item" } }
            }
        });
        let registry = OperationRegistry::from_document(&doc).unwrap();
        let names: Vec<&str> = registry.operations().map(|op| op.tool_name.as_str()).collect();
        assert_eq!(names, vec!["fetch_item", "fetch_item_2"]);
    }

    #[test]
    fn non_object_document_is_an_error() {
        assert!(OperationRegistry::from_document(&json!([])).is_err());
    }
}
