//! Template interpolation for action parameters.
//!
//! Action parameters may reference event fields or shared variables via
//! `{field}` tokens. Tokens are resolved against the scopes in order
//! (event payload first, then the variable store); a token no scope can
//! resolve is left verbatim and logged at debug level, so a typo shows up
//! in the rendered output instead of silently disappearing.
//!
//! Token names are dotted paths: `{gift.name}` descends into objects and
//! `{items.0}` indexes arrays.

use serde_json::Value;
use tracing::debug;

/// Looks up a dotted path inside a JSON value.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolves `path` against the scopes in order, first hit wins.
fn resolve<'a>(scopes: &[&'a Value], path: &str) -> Option<&'a Value> {
    scopes.iter().find_map(|scope| lookup_path(scope, path))
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders one template string against the given scopes.
pub fn render(template: &str, scopes: &[&Value]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let token = &after[..end];
                match resolve(scopes, token) {
                    Some(value) => out.push_str(&value_to_text(value)),
                    None => {
                        debug!(token, "Unresolved template token");
                        out.push('{');
                        out.push_str(token);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated brace, keep the rest as-is.
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Recursively renders every string inside a JSON parameter value.
pub fn render_params(params: &Value, scopes: &[&Value]) -> Value {
    match params {
        Value::String(s) => Value::String(render(s, scopes)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_params(v, scopes)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_params(v, scopes)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_event_fields() {
        let payload = json!({"username": "bob", "coins": 50});
        let out = render("Thanks {username} for {coins} coins", &[&payload]);
        assert_eq!(out, "Thanks bob for 50 coins");
    }

    #[test]
    fn payload_wins_over_variables() {
        let payload = json!({"name": "event"});
        let vars = json!({"name": "variable", "goal": 1000});
        let out = render("{name} / {goal}", &[&payload, &vars]);
        assert_eq!(out, "event / 1000");
    }

    #[test]
    fn unresolved_tokens_are_preserved() {
        let payload = json!({"a": 1});
        assert_eq!(render("{a} {missing}", &[&payload]), "1 {missing}");
    }

    #[test]
    fn dotted_paths_and_indices() {
        let payload = json!({"gift": {"name": "rose"}, "tags": ["new", "vip"]});
        assert_eq!(render("{gift.name}/{tags.1}", &[&payload]), "rose/vip");
    }

    #[test]
    fn renders_nested_params() {
        let payload = json!({"username": "bob"});
        let params = json!({
            "message": "hi {username}",
            "meta": {"who": "{username}"},
            "count": 3,
        });
        let rendered = render_params(&params, &[&payload]);
        assert_eq!(rendered["message"], "hi bob");
        assert_eq!(rendered["meta"]["who"], "bob");
        assert_eq!(rendered["count"], 3);
    }
}
