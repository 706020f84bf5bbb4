//! Query-string style parameter decoding.
//!
//! Bracketed keys build nested structures: `a[b]=c` becomes `{"a":{"b":"c"}}`
//! and `tags[]=x&tags[]=y` becomes `{"tags":["x","y"]}`. Insertion order is
//! preserved so decoded parameters re-serialize in request order.
//!
//! Keys nested deeper than [`MAX_NESTING_DEPTH`] are dropped; building,
//! serializing and dropping a value all recurse per level.

use serde_json::{Map, Value};

/// Decoded request parameters.
pub type Params = Map<String, Value>;

/// Deepest bracket nesting accepted in a key.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Decode an `application/x-www-form-urlencoded` string.
pub fn parse_query(input: &str) -> Params {
    let pairs = url::form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()));
    from_pairs(pairs)
}

/// Build nested parameters from flat key/value pairs.
pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Params {
    let mut params = Params::new();
    for (key, value) in pairs {
        if key.is_empty() {
            continue;
        }
        let Some((base, path)) = split_key(&key) else {
            tracing::debug!(
                key_len = key.len(),
                max_depth = MAX_NESTING_DEPTH,
                "Dropping parameter nested too deeply"
            );
            continue;
        };
        insert(&mut params, base, &path, value);
    }
    params
}

/// Split `a[b][]` into (`a`, ["b", ""]). Unbalanced brackets keep the key
/// literal; `None` when nesting exceeds [`MAX_NESTING_DEPTH`].
fn split_key(key: &str) -> Option<(&str, Vec<&str>)> {
    let Some(open) = key.find('[') else {
        return Some((key, Vec::new()));
    };
    if open == 0 {
        return Some((key, Vec::new()));
    }

    let base = &key[..open];
    let mut rest = &key[open..];
    let mut path = Vec::new();
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return Some((key, Vec::new()));
        };
        if path.len() == MAX_NESTING_DEPTH {
            return None;
        }
        path.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return Some((key, Vec::new()));
    }
    Some((base, path))
}

fn container_for(segment: &str) -> Value {
    if segment.is_empty() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn insert(target: &mut Params, key: &str, path: &[&str], value: String) {
    match path.first() {
        None => {
            target.insert(key.to_string(), Value::String(value));
        }
        Some(head) => {
            let node = target
                .entry(key.to_string())
                .or_insert_with(|| container_for(head));
            descend(node, path, value);
        }
    }
}

fn descend(node: &mut Value, path: &[&str], value: String) {
    let Some((head, rest)) = path.split_first() else {
        *node = Value::String(value);
        return;
    };

    if !node.is_array() && !node.is_object() {
        *node = container_for(head);
    }

    if let Value::Array(items) = node {
        if head.is_empty() {
            match rest.first() {
                None => items.push(Value::String(value)),
                Some(next) => {
                    items.push(container_for(next));
                    if let Some(last) = items.last_mut() {
                        descend(last, rest, value);
                    }
                }
            }
            return;
        }
        // A named key under a list turns the list into a map keyed by index.
        let map: Map<String, Value> = items
            .drain(..)
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect();
        *node = Value::Object(map);
    }

    if let Value::Object(map) = node {
        let key = if head.is_empty() {
            map.len().to_string()
        } else {
            head.to_string()
        };
        match rest.first() {
            None => {
                map.insert(key, Value::String(value));
            }
            Some(next) => {
                let child = map.entry(key).or_insert_with(|| container_for(next));
                descend(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_and_nested() {
        let params = parse_query("foo=bar&a%5Bb%5D=c");
        assert_eq!(Value::Object(params), json!({"foo": "bar", "a": {"b": "c"}}));
    }

    #[test]
    fn order_is_preserved() {
        let params = parse_query("z=1&a=2");
        let keys: Vec<_> = params.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn list_append() {
        let params = parse_query("tags[]=x&tags[]=y&deep[a][]=1");
        assert_eq!(
            Value::Object(params),
            json!({"tags": ["x", "y"], "deep": {"a": ["1"]}})
        );
    }

    #[test]
    fn malformed_brackets_stay_literal() {
        let params = parse_query("a[b=1&[x]=2&c]=3");
        assert_eq!(params.get("a[b"), Some(&json!("1")));
        assert_eq!(params.get("[x]"), Some(&json!("2")));
        assert_eq!(params.get("c]"), Some(&json!("3")));
    }

    #[test]
    fn plus_decodes_to_space() {
        let params = parse_query("q=hello+world");
        assert_eq!(params.get("q"), Some(&json!("hello world")));
    }

    #[test]
    fn nesting_at_the_limit_is_kept() {
        let key = format!("a{}", "[x]".repeat(MAX_NESTING_DEPTH));
        let params = parse_query(&format!("{}=1&b=2", key));

        let mut node = params.get("a").unwrap();
        for _ in 1..MAX_NESTING_DEPTH {
            node = node.get("x").unwrap();
        }
        assert_eq!(node.get("x"), Some(&json!("1")));
        assert_eq!(params.get("b"), Some(&json!("2")));
    }

    #[test]
    fn excessive_nesting_is_dropped_without_exhausting_the_stack() {
        let input = format!("a{}=1&b=2", "[x]".repeat(100_000));
        let params = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(move || parse_query(&input))
            .unwrap()
            .join()
            .unwrap();

        assert!(params.get("a").is_none());
        assert_eq!(params.get("b"), Some(&json!("2")));
    }
}
