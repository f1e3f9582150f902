use serde_json::{Map, Value};

/// Looks a parameter up where API gateways tend to put it: the top level,
/// a nested `body` object, and under each alias in the same order. With
/// `query_fallback`, a free-form `query` field is used as a last resort.
pub fn extract_param<'a>(
    body: &'a Map<String, Value>,
    name: &str,
    aliases: &[&str],
    query_fallback: bool,
) -> Option<&'a Value> {
    let nested = body.get("body").and_then(Value::as_object);

    for key in std::iter::once(name).chain(aliases.iter().copied()) {
        if let Some(value) = body.get(key) {
            return Some(value);
        }
        if let Some(value) = nested.and_then(|inner| inner.get(key)) {
            return Some(value);
        }
    }

    if query_fallback {
        return body.get("query");
    }
    None
}

/// String-valued parameter; empty strings and non-strings count as absent.
pub fn extract_str<'a>(
    body: &'a Map<String, Value>,
    name: &str,
    aliases: &[&str],
    query_fallback: bool,
) -> Option<&'a str> {
    extract_param(body, name, aliases, query_fallback)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
