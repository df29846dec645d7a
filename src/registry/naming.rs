//! Operation ids, tool names and client names

use std::collections::HashSet;

/// Maximum tool name length accepted by model providers
pub const MAX_TOOL_NAME_LEN: usize = 128;

/// Maximum length of a derived client name
pub const MAX_CLIENT_NAME_LEN: usize = 16;

/// Deterministic id for an operation without `operationId`
///
/// `GET /pets/{petId}` becomes `get_pets_by_petId` and `GET /` becomes
/// `get_root`.
#[must_use]
pub fn synthetic_operation_id(method: &str, path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let segment = match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(param) => format!("by_{param}"),
                None => segment.to_string(),
            };
            segment
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
                .collect()
        })
        .collect();

    let joined = if segments.is_empty() {
        "root".to_string()
    } else {
        segments.join("_")
    };
    format!("{}_{joined}", method.to_ascii_lowercase())
}

/// Sanitize a raw name into `^[A-Za-z0-9_-]{1,128}$`, or `None` if nothing
/// usable remains
#[must_use]
pub fn sanitize_tool_name(raw: &str) -> Option<String> {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let mut name = collapse_underscores(&replaced);
    name.truncate(MAX_TOOL_NAME_LEN);
    let name = name.trim_end_matches('_').to_string();
    (!name.is_empty()).then_some(name)
}

/// Lowercase identifier derived from an API title, never containing `__`
#[must_use]
pub fn sanitize_client_name(raw: &str) -> String {
    let replaced: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let mut name = collapse_underscores(&replaced);
    name.truncate(MAX_CLIENT_NAME_LEN);
    let name = name.trim_end_matches('_');
    if name.is_empty() {
        "api".to_string()
    } else {
        name.to_string()
    }
}

/// Return `base` or the first `base_N` not yet in `taken`, and record it
pub fn unique_name(base: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 2usize;
    loop {
        let suffix = format!("_{n}");
        let mut candidate = base.to_string();
        candidate.truncate(MAX_TOOL_NAME_LEN - suffix.len());
        candidate.push_str(&suffix);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Collapse runs of `_` and trim them at both ends
fn collapse_underscores(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_underscore = false;
    for c in raw.chars() {
        if c == '_' {
            if !prev_underscore {
                out.push(c);
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn synthetic_ids_follow_path_shape() {
        assert_eq!(synthetic_operation_id("GET", "/pets/{petId}"), "get_pets_by_petId");
        assert_eq!(synthetic_operation_id("delete", "/pets"), "delete_pets");
        assert_eq!(synthetic_operation_id("get", "/"), "get_root");
        assert_eq!(
            synthetic_operation_id("post", "/v1/pet-store/items.json"),
            "post_v1_pet_store_items_json"
        );
    }

    #[test]
    fn synthetic_ids_are_deterministic() {
        let first = synthetic_operation_id("patch", "/users/{id}/roles/{role}");
        let second = synthetic_operation_id("patch", "/users/{id}/roles/{role}");
        assert_eq!(first, second);
        assert_eq!(first, "patch_users_by_id_roles_by_role");
    }

    #[test]
    fn tool_names_are_sanitized() {
        assert_eq!(sanitize_tool_name("getPet").as_deref(), Some("getPet"));
        assert_eq!(
            sanitize_tool_name("pets.list (v2)").as_deref(),
            Some("pets_list_v2")
        );
        assert_eq!(sanitize_tool_name("a__b").as_deref(), Some("a_b"));
        assert_eq!(sanitize_tool_name("...").as_deref(), None);
        assert_eq!(sanitize_tool_name(&"x".repeat(300)).map(|n| n.len()), Some(128));
    }

    #[test]
    fn client_names_never_contain_separator() {
        assert_eq!(sanitize_client_name("Swagger Petstore"), "swagger_petstore");
        assert_eq!(sanitize_client_name("My__API"), "my_api");
        assert_eq!(sanitize_client_name("A Very Long Weather Service"), "a_very_long_weat");
        assert_eq!(sanitize_client_name("!!!"), "api");
    }

    #[test]
    fn unique_name_appends_counter() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("get", &mut taken), "get");
        assert_eq!(unique_name("get", &mut taken), "get_2");
        assert_eq!(unique_name("get", &mut taken), "get_3");
    }
}
