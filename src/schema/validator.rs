//! Argument validation against a [`CallSchema`].
//!
//! Runs before any HTTP request is made. The goal is to produce
//! **LLM-friendly** error messages that tell the model *exactly* what it did
//! wrong and what the valid parameters are.
//!
//! # Validation steps (per object, recursively)
//!
//! 1. **Required parameters** – every name listed under `required` must be
//!    present, and non-null unless the property is nullable.
//! 2. **Unknown parameters** – rejected only when the object is closed
//!    (`additionalProperties: false`).
//! 3. **Type validation with coercion** – safe coercions are applied:
//!    - `"123"` → `123` for `integer` / `number` fields
//!    - `"true"` / `"false"` → `true` / `false` for `boolean` fields
//! 4. **Enum values** and **numeric / length constraints**.
//!
//! Optional properties that are absent are never an error.

use std::fmt::Write as _;

use serde_json::{Map, Value};

use super::{AdditionalProperties, CallSchema, Items, SchemaKind};

/// A single validation violation with a human-readable, LLM-actionable message.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationViolation {
    /// Dotted path of the offending value (empty for top-level issues).
    pub param: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl ValidationViolation {
    fn new(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            message: message.into(),
        }
    }
}

/// The result of validating arguments against a schema.
#[derive(Debug, Clone)]
pub struct SchemaValidationResult {
    /// All violations found. Empty means the arguments are valid.
    pub violations: Vec<ValidationViolation>,
    /// Arguments after safe type coercions have been applied.
    pub coerced: Value,
}

impl SchemaValidationResult {
    /// Returns `true` if there are no violations.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Format violations into an LLM-friendly error string, followed by the
    /// parameters the schema accepts.
    #[must_use]
    pub fn format_error(&self, schema: &CallSchema) -> String {
        let mut out = String::from("Tool call validation failed:\n\n");

        for v in &self.violations {
            if v.param.is_empty() {
                let _ = writeln!(out, "- {}", v.message);
            } else {
                let _ = writeln!(out, "- Parameter '{}': {}", v.param, v.message);
            }
        }

        let valid_params = collect_valid_params(schema);
        if !valid_params.is_empty() {
            out.push_str("\nValid parameters for this tool:\n");
            for (name, info) in &valid_params {
                let _ = writeln!(out, "  - {name}: {info}");
            }
        }

        out
    }
}

// ── Public entry point ────────────────────────────────────────────────────────

/// Validate `arguments` against `schema`.
///
/// `coerced` holds the arguments after safe coercions; use it for the actual
/// call when `is_valid()` returns `true`. A `null` argument value is treated
/// as an empty object when the schema is an object.
#[must_use]
pub fn validate_arguments(arguments: &Value, schema: &CallSchema) -> SchemaValidationResult {
    let normalized = if arguments.is_null() && schema.kind == SchemaKind::Object {
        Value::Object(Map::new())
    } else {
        arguments.clone()
    };

    let mut violations = Vec::new();
    let coerced = validate_node("", &normalized, schema, &mut violations);

    let coerced = if violations.is_empty() {
        coerced
    } else {
        normalized
    };

    SchemaValidationResult { violations, coerced }
}

// ── Recursive validation ──────────────────────────────────────────────────────

fn validate_node(
    path: &str,
    value: &Value,
    schema: &CallSchema,
    violations: &mut Vec<ValidationViolation>,
) -> Value {
    if value.is_null() && schema.nullable {
        return Value::Null;
    }

    let coerced = match schema.kind {
        SchemaKind::Object => validate_object(path, value, schema, violations),
        SchemaKind::Array => validate_array(path, value, schema, violations),
        SchemaKind::Any | SchemaKind::Reference => value.clone(),
        scalar => match try_coerce(value, scalar) {
            Ok(v) => {
                check_constraints(path, &v, schema, violations);
                v
            }
            Err(msg) => {
                violations.push(ValidationViolation::new(path, msg));
                value.clone()
            }
        },
    };

    if !schema.enum_values.is_empty() && !schema.enum_values.contains(&coerced) {
        let options: Vec<String> = schema
            .enum_values
            .iter()
            .map(value_to_display_string)
            .collect();
        violations.push(ValidationViolation::new(
            path,
            format!("must be one of: {}", options.join(", ")),
        ));
    }

    let coerced = validate_alternatives(path, coerced, schema, violations);

    for member in &schema.all_of {
        validate_node(path, &coerced, member, violations);
    }

    coerced
}

fn validate_object(
    path: &str,
    value: &Value,
    schema: &CallSchema,
    violations: &mut Vec<ValidationViolation>,
) -> Value {
    let Value::Object(arg_map) = value else {
        violations.push(ValidationViolation::new(
            path,
            format!("expected object, got {}", json_type_name(value)),
        ));
        return value.clone();
    };

    let before = violations.len();

    // Step 1 – required parameters.
    for name in &schema.required {
        let nullable = schema.properties.get(name).is_some_and(|p| p.nullable);
        match arg_map.get(name) {
            None => violations.push(ValidationViolation::new(
                join(path, name),
                "required parameter is missing",
            )),
            Some(Value::Null) if !nullable => violations.push(ValidationViolation::new(
                join(path, name),
                "required parameter must not be null",
            )),
            _ => {}
        }
    }

    // Step 2 – unknown parameters, only for closed objects.
    if schema.is_closed() {
        let known: Vec<&str> = schema.properties.keys().map(String::as_str).collect();
        for key in arg_map.keys() {
            if !schema.properties.contains_key(key) {
                violations.push(ValidationViolation::new(
                    join(path, key),
                    format!("unknown parameter, valid parameters are: {}", known.join(", ")),
                ));
            }
        }
    }

    // Stop here so the message is not cluttered by cascading type errors.
    if violations.len() > before {
        return value.clone();
    }

    // Steps 3-4 – per-property validation.
    let mut coerced = Map::new();
    for (key, raw) in arg_map {
        let child_path = join(path, key);
        let checked = match schema.properties.get(key) {
            // Null is acceptable for optional properties.
            Some(_) if raw.is_null() => Value::Null,
            Some(prop) => validate_node(&child_path, raw, prop, violations),
            None => match &schema.additional_properties {
                Some(AdditionalProperties::Schema(extra)) => {
                    validate_node(&child_path, raw, extra, violations)
                }
                _ => raw.clone(),
            },
        };
        coerced.insert(key.clone(), checked);
    }

    Value::Object(coerced)
}

fn validate_array(
    path: &str,
    value: &Value,
    schema: &CallSchema,
    violations: &mut Vec<ValidationViolation>,
) -> Value {
    let Value::Array(elements) = value else {
        violations.push(ValidationViolation::new(
            path,
            format!("expected array, got {}", json_type_name(value)),
        ));
        return value.clone();
    };

    let checked = elements
        .iter()
        .enumerate()
        .map(|(i, element)| {
            let element_path = format!("{path}[{i}]");
            let element_schema = match &schema.items {
                Some(Items::Single(item)) => Some(item.as_ref()),
                Some(Items::Tuple(items)) => items.get(i),
                None => None,
            };
            match element_schema {
                Some(s) => validate_node(&element_path, element, s, violations),
                None => element.clone(),
            }
        })
        .collect();

    Value::Array(checked)
}

/// `oneOf` / `anyOf`: the value must satisfy at least one alternative.
///
/// `oneOf` is checked with `anyOf` semantics: a value matching several
/// alternatives is accepted. An alternative that takes the value unchanged
/// wins over one that only matches after coercion.
fn validate_alternatives(
    path: &str,
    value: Value,
    schema: &CallSchema,
    violations: &mut Vec<ValidationViolation>,
) -> Value {
    for (keyword, alternatives) in [("oneOf", &schema.one_of), ("anyOf", &schema.any_of)] {
        if alternatives.is_empty() {
            continue;
        }
        let matches: Vec<Value> = alternatives
            .iter()
            .filter_map(|alternative| {
                let mut scratch = Vec::new();
                let coerced = validate_node(path, &value, alternative, &mut scratch);
                scratch.is_empty().then_some(coerced)
            })
            .collect();
        let exact = matches.iter().position(|coerced| *coerced == value);
        let matched = match exact {
            Some(i) => matches.into_iter().nth(i),
            None => matches.into_iter().next(),
        };
        match matched {
            Some(coerced) => return coerced,
            None => violations.push(ValidationViolation::new(
                path,
                format!("does not match any of the {} {keyword} alternatives", alternatives.len()),
            )),
        }
    }
    value
}

fn check_constraints(
    path: &str,
    value: &Value,
    schema: &CallSchema,
    violations: &mut Vec<ValidationViolation>,
) {
    if let Some(num) = value.as_f64() {
        if let Some(min) = schema.minimum {
            if num < min {
                violations.push(ValidationViolation::new(path, format!("must be >= {min}")));
            }
        }
        if let Some(max) = schema.maximum {
            if num > max {
                violations.push(ValidationViolation::new(path, format!("must be <= {max}")));
            }
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count() as u64;
        if let Some(min_len) = schema.min_length {
            if len < min_len {
                violations.push(ValidationViolation::new(
                    path,
                    format!("must be at least {min_len} characters long"),
                ));
            }
        }
        if let Some(max_len) = schema.max_length {
            if len > max_len {
                violations.push(ValidationViolation::new(
                    path,
                    format!("must be at most {max_len} characters long"),
                ));
            }
        }
    }
}

// ── Type coercion ─────────────────────────────────────────────────────────────

/// Attempt to coerce `value` to a scalar kind.
fn try_coerce(value: &Value, kind: SchemaKind) -> Result<Value, String> {
    match kind {
        SchemaKind::String => coerce_to_string(value),
        SchemaKind::Integer => coerce_to_integer(value),
        SchemaKind::Number => coerce_to_number(value),
        SchemaKind::Boolean => coerce_to_boolean(value),
        _ => Ok(value.clone()),
    }
}

fn coerce_to_string(value: &Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        _ => Err(format!("expected string, got {}", json_type_name(value))),
    }
}

/// 2^63; whole floats in `[-2^63, 2^63)` convert to `i64` exactly.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn coerce_to_integer(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::Number(n) => {
            // Float with no fractional part → integer.
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    if !(-I64_BOUND..I64_BOUND).contains(&f) {
                        return Err(format!("integer {n} is out of the 64-bit range"));
                    }
                    #[allow(clippy::cast_possible_truncation)]
                    return Ok(Value::Number((f as i64).into()));
                }
            }
            Err(format!("expected integer, got float {n}"))
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(|i| Value::Number(i.into()))
            .map_err(|_| {
                format!("expected integer, got string \"{s}\" which is not a valid integer")
            }),
        _ => Err(format!("expected integer, got {}", json_type_name(value))),
    }
}

fn coerce_to_number(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
            .ok_or_else(|| {
                format!("expected number, got string \"{s}\" which is not a valid number")
            }),
        _ => Err(format!("expected number, got {}", json_type_name(value))),
    }
}

fn coerce_to_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "0" | "no" => Ok(Value::Bool(false)),
            _ => Err(format!(
                "expected boolean, got string \"{s}\"; use true or false"
            )),
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(Value::Bool(true)),
            Some(0) => Ok(Value::Bool(false)),
            _ => Err(format!("expected boolean, got number {n}; use true or false")),
        },
        _ => Err(format!("expected boolean, got {}", json_type_name(value))),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn value_to_display_string(v: &Value) -> String {
    match v {
        Value::String(s) => format!("\"{s}\""),
        _ => v.to_string(),
    }
}

/// Collect valid parameter names with type/description info, descending one
/// level into parameter groups such as `path` and `query`.
fn collect_valid_params(schema: &CallSchema) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (name, prop) in &schema.properties {
        out.push((name.clone(), describe(prop, schema.is_required(name))));
        if prop.kind == SchemaKind::Object {
            for (child, child_prop) in &prop.properties {
                out.push((
                    format!("{name}.{child}"),
                    describe(child_prop, prop.is_required(child)),
                ));
            }
        }
    }
    out
}

fn describe(prop: &CallSchema, required: bool) -> String {
    let ty = prop.kind.type_name().unwrap_or("any");
    let req = if required { " [required]" } else { " [optional]" };
    let enum_hint = if prop.enum_values.is_empty() {
        String::new()
    } else {
        let opts: Vec<String> = prop.enum_values.iter().map(value_to_display_string).collect();
        format!(", one of: {}", opts.join(", "))
    };
    match prop.description.as_deref() {
        Some(desc) if !desc.is_empty() => format!("({ty}{req}){enum_hint}: {desc}"),
        _ => format!("({ty}{req}){enum_hint}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
