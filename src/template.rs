use serde_json::Value;

/// Resolves a selector template against a record payload.
///
/// Implementations must never fail: a reference that cannot be resolved
/// renders as an empty string.
pub trait TemplateResolver: Send + Sync {
    fn resolve(&self, payload: &Value, template: &str) -> String;
}

/// Default resolver for `{{ path.to.field }}` style templates.
///
/// Text outside of the braces is copied verbatim. Paths are dotted, numeric
/// segments index into arrays. Strings render raw, `null` and missing values
/// render empty, everything else renders as compact JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathResolver;

impl TemplateResolver for PathResolver {
    fn resolve(&self, payload: &Value, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after_open = &rest[open + 2..];
            match after_open.find("}}") {
                Some(close) => {
                    let path = after_open[..close].trim();
                    out.push_str(&render(lookup(payload, path)));
                    rest = &after_open[close + 2..];
                }
                None => {
                    // unterminated, keep the rest literally
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(payload, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => {
            segment.parse::<usize>().ok().and_then(|idx| items.get(idx))
        }
        _ => None,
    })
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolves_top_level_field() {
        let payload = json!({ "value": "abc" });
        assert_eq!(PathResolver.resolve(&payload, "{{value}}"), "abc");
        assert_eq!(PathResolver.resolve(&payload, "{{ value }}"), "abc");
    }

    #[test]
    fn test_resolves_nested_paths_and_indices() {
        let payload = json!({
            "user": { "name": "ann", "tags": ["x", "y"] },
            "count": 3,
            "ok": true
        });
        assert_eq!(PathResolver.resolve(&payload, "{{user.name}}"), "ann");
        assert_eq!(PathResolver.resolve(&payload, "{{user.tags.1}}"), "y");
        assert_eq!(
            PathResolver.resolve(&payload, "{{user.name}}-{{count}}-{{ok}}"),
            "ann-3-true"
        );
    }

    #[test]
    fn test_missing_reference_renders_empty() {
        let payload = json!({ "value": null });
        assert_eq!(PathResolver.resolve(&payload, "{{value}}"), "");
        assert_eq!(PathResolver.resolve(&payload, "{{nope.deeper}}"), "");
        assert_eq!(PathResolver.resolve(&payload, "id:{{nope}}"), "id:");
    }

    #[test]
    fn test_composite_values_render_as_json() {
        let payload = json!({ "obj": { "a": 1 }, "arr": [1, 2] });
        assert_eq!(PathResolver.resolve(&payload, "{{obj}}"), r#"{"a":1}"#);
        assert_eq!(PathResolver.resolve(&payload, "{{arr}}"), "[1,2]");
    }

    #[test]
    fn test_literal_text_and_unterminated_braces() {
        let payload = json!({ "value": "v" });
        assert_eq!(PathResolver.resolve(&payload, "plain"), "plain");
        assert_eq!(PathResolver.resolve(&payload, "{{value"), "{{value");
        assert_eq!(PathResolver.resolve(&payload, "a{{}}b"), "ab");
    }
}
