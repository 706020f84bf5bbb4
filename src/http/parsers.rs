//! Request body parsers.
//!
//! # Responsibilities
//! - Map a content type to a configured parser (exact match, then `*`)
//! - Decode JSON and form bodies into [`Params`]
//!
//! # Design Decisions
//! - Content type parameters (`; charset=...`) are ignored when matching
//! - A JSON array body becomes a map keyed by index
//! - Parse failures are `BadRequest`, rendered as 400

use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::ParserKind;
use crate::error::BridgeError;
use crate::http::params::{parse_query, Params};

/// Wildcard key in the parser map.
pub const WILDCARD: &str = "*";

/// Strip parameters and normalize case: `Application/JSON; charset=utf-8` → `application/json`.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Content-type keyed parser table.
#[derive(Debug, Clone, Default)]
pub struct ParserSet {
    by_type: BTreeMap<String, ParserKind>,
}

impl ParserSet {
    pub fn new(parsers: &BTreeMap<String, ParserKind>) -> Self {
        Self {
            by_type: parsers
                .iter()
                .map(|(k, v)| (media_type(k), *v))
                .collect(),
        }
    }

    /// Parser for `media_type`, falling back to the wildcard entry.
    pub fn select(&self, media_type: &str) -> Option<ParserKind> {
        self.by_type
            .get(media_type)
            .or_else(|| self.by_type.get(WILDCARD))
            .copied()
    }
}

/// Run parser `kind` over `raw`.
pub fn parse_body(kind: ParserKind, raw: &str) -> Result<Params, BridgeError> {
    match kind {
        ParserKind::Form => Ok(parse_query(raw)),
        ParserKind::Json => parse_json(raw),
    }
}

fn parse_json(raw: &str) -> Result<Params, BridgeError> {
    if raw.trim().is_empty() {
        return Ok(Params::new());
    }

    let value: Value =
        serde_json::from_str(raw).map_err(|e| BridgeError::BadRequest(e.to_string()))?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect()),
        _ => Err(BridgeError::BadRequest(
            "JSON body must be an object or array".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exact_match_then_wildcard() {
        let mut table = BTreeMap::new();
        table.insert("Application/JSON".to_string(), ParserKind::Json);
        let set = ParserSet::new(&table);
        assert_eq!(set.select("application/json"), Some(ParserKind::Json));
        assert_eq!(set.select("text/xml"), None);

        table.insert(WILDCARD.to_string(), ParserKind::Form);
        let set = ParserSet::new(&table);
        assert_eq!(set.select("text/xml"), Some(ParserKind::Form));
    }

    #[test]
    fn media_type_strips_parameters() {
        assert_eq!(media_type("application/json; charset=UTF-8"), "application/json");
        assert_eq!(media_type(""), "");
    }

    #[test]
    fn json_bodies() {
        let params = parse_body(ParserKind::Json, r#"{"foo":"bar","n":1}"#).unwrap();
        assert_eq!(Value::Object(params), json!({"foo": "bar", "n": 1}));

        let list = parse_body(ParserKind::Json, r#"["a","b"]"#).unwrap();
        assert_eq!(list.get("1"), Some(&json!("b")));

        assert!(parse_body(ParserKind::Json, "").unwrap().is_empty());
        assert!(matches!(
            parse_body(ParserKind::Json, "{oops"),
            Err(BridgeError::BadRequest(_))
        ));
        assert!(parse_body(ParserKind::Json, "42").is_err());
    }
}
