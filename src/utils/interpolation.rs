//! Template-string interpolation for task files.
//!
//! Action string fields may embed tokens that are replaced at execution time:
//! - `{{var}}` resolves against run-scoped variables (including the
//!   `match_x`/`match_y`/`match_score` values stored by image actions)
//! - `{{@key}}` resolves against the task's `globals`, with dotted paths
//!   reaching into JSON objects (`{{@app.title}}`)
//!
//! Unknown tokens are left intact so a bad task file is easy to diagnose
//! from the logs.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Replace `{{var}}` and `{{@global}}` tokens in `template`.
///
/// Whitespace inside the braces is ignored (`{{ var }}` == `{{var}}`).
/// Non-string globals render as compact JSON.
pub fn interpolate_string(
    template: &str,
    vars: &HashMap<String, String>,
    globals: &BTreeMap<String, Value>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(close) = after_open.find("}}") else {
            // Unterminated token: emit the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let raw_token = &rest[start..start + 2 + close + 2];
        let token = after_open[..close].trim();

        let replacement = if token.is_empty() {
            None
        } else if let Some(key) = token.strip_prefix('@') {
            lookup_global(globals, key.trim())
        } else {
            vars.get(token).cloned()
        };

        match replacement {
            Some(value) => out.push_str(&value),
            None => out.push_str(raw_token),
        }

        rest = &after_open[close + 2..];
    }

    out.push_str(rest);
    out
}

/// Interpolate all string values in a JSON structure (recursively).
///
/// Arrays and objects are traversed; non-string leaves pass through.
pub fn interpolate_json(
    value: &Value,
    vars: &HashMap<String, String>,
    globals: &BTreeMap<String, Value>,
) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate_string(s, vars, globals)),
        Value::Array(arr) => Value::Array(
            arr.iter()
                .map(|v| interpolate_json(v, vars, globals))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_json(v, vars, globals)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Resolve a dotted path (e.g., "app.title") through the globals map.
/// String leaves are returned as-is; anything else renders as compact JSON.
fn lookup_global(globals: &BTreeMap<String, Value>, path: &str) -> Option<String> {
    let mut segments = path.split('.');
    let first = segments.next()?.trim();
    let mut current = globals.get(first)?;

    for seg in segments {
        match current {
            Value::Object(map) => current = map.get(seg.trim())?,
            _ => return None,
        }
    }

    match current {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_globals() -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    #[test]
    fn replaces_run_variables() {
        let mut vars = HashMap::new();
        vars.insert("match_x".into(), "412".into());
        vars.insert("match_y".into(), "209".into());

        let out = interpolate_string("clicked at {{match_x}},{{ match_y }}", &vars, &no_globals());
        assert_eq!(out, "clicked at 412,209");
    }

    #[test]
    fn replaces_globals_with_dotted_paths() {
        let vars = HashMap::new();
        let mut globals = BTreeMap::new();
        globals.insert(
            "app".into(),
            json!({ "title": "Inventory", "retries": 3 }),
        );

        assert_eq!(
            interpolate_string("{{@app.title}} x{{@app.retries}}", &vars, &globals),
            "Inventory x3"
        );
    }

    #[test]
    fn unknown_tokens_survive_untouched() {
        let out = interpolate_string("see {{missing}} and {{@gone}}", &HashMap::new(), &no_globals());
        assert_eq!(out, "see {{missing}} and {{@gone}}");
    }

    #[test]
    fn unterminated_token_is_kept_verbatim() {
        let out = interpolate_string("oops {{open", &HashMap::new(), &no_globals());
        assert_eq!(out, "oops {{open");
    }

    #[test]
    fn empty_token_is_kept() {
        let out = interpolate_string("a{{}}b", &HashMap::new(), &no_globals());
        assert_eq!(out, "a{{}}b");
    }

    #[test]
    fn json_values_interpolate_recursively() {
        let mut vars = HashMap::new();
        vars.insert("shot".into(), "after_login".into());

        let v = json!({
            "path": "shots/{{shot}}.png",
            "tags": ["{{shot}}", 7]
        });
        assert_eq!(
            interpolate_json(&v, &vars, &no_globals()),
            json!({
                "path": "shots/after_login.png",
                "tags": ["after_login", 7]
            })
        );
    }
}
