//! Decoding of the LTI passback blob embedded in each raw attempt.
//!
//! The blob is usually JSON but older producers wrote Python literals. Decoders
//! run in order and the first one yielding a mapping wins. If none does, the
//! result is an empty mapping. Decoding never fails.

use serde_json::{Map, Value};
use tracing::debug;

use crate::literal;

type Decoder = fn(&str) -> Option<Map<String, Value>>;

const DECODERS: [(&str, Decoder); 2] = [("json", decode_json), ("literal", decode_literal)];

pub fn decode(raw: Option<&Value>) -> Map<String, Value> {
    match raw {
        Some(Value::String(text)) if !text.trim().is_empty() => decode_str(text),
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

pub fn decode_str(text: &str) -> Map<String, Value> {
    DECODERS
        .iter()
        .find_map(|(name, decoder)| {
            let decoded = decoder(text);
            if decoded.is_some() {
                debug!(decoder = *name, "passback params decoded");
            }
            decoded
        })
        .unwrap_or_default()
}

fn decode_json(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn decode_literal(text: &str) -> Option<Map<String, Value>> {
    match literal::parse(text).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_json() {
        let map = decode_str(r#"{"oauth_consumer_key": "k1"}"#);
        assert_eq!(map.get("oauth_consumer_key"), Some(&json!("k1")));
    }

    #[test]
    fn falls_back_to_python_literal() {
        let map = decode_str("{'lis_result_sourcedid': 'src-1', 'extra': None}");
        assert_eq!(map.get("lis_result_sourcedid"), Some(&json!("src-1")));
        assert_eq!(map.get("extra"), Some(&Value::Null));
    }

    #[test]
    fn garbage_decodes_to_empty_mapping() {
        assert!(decode_str("{not valid at all").is_empty());
        assert!(decode_str("[1, 2, 3]").is_empty());
        assert!(decode_str("'just a string'").is_empty());
    }

    #[test]
    fn absent_null_and_blank_values_decode_to_empty() {
        assert!(decode(None).is_empty());
        assert!(decode(Some(&Value::Null)).is_empty());
        assert!(decode(Some(&json!("   "))).is_empty());
        assert!(decode(Some(&json!(42))).is_empty());
    }

    #[test]
    fn already_decoded_object_is_used_as_is() {
        let map = decode(Some(&json!({"oauth_consumer_key": "k2"})));
        assert_eq!(map.get("oauth_consumer_key"), Some(&json!("k2")));
    }

    #[test]
    fn deeply_nested_input_decodes_to_empty() {
        assert!(decode_str(&"[".repeat(200_000)).is_empty());
        assert!(decode_str(&"(".repeat(200_000)).is_empty());
        assert!(decode_str(&"{'a': ".repeat(200_000)).is_empty());
        assert!(decode(Some(&json!("{\"a\": [".repeat(50_000)))).is_empty());
    }

    #[test]
    fn nested_tuples_decode_quickly() {
        let depth = 40;
        let text = format!("{{'k': {}1{}}}", "(".repeat(depth), ",)".repeat(depth));
        let started = std::time::Instant::now();
        let map = decode_str(&text);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert!(map.contains_key("k"));

        let unbalanced = format!("{}1{}", "(".repeat(depth), ",)".repeat(depth - 1));
        assert!(decode_str(&unbalanced).is_empty());
    }

    #[test]
    fn very_long_input_is_handled() {
        let long_value = "x".repeat(1_000_000);
        let map = decode_str(&format!("{{'lis_result_sourcedid': '{long_value}'}}"));
        assert_eq!(
            map.get("lis_result_sourcedid").and_then(Value::as_str).map(str::len),
            Some(1_000_000)
        );

        assert!(decode_str(&"9".repeat(100_000)).is_empty());
        assert!(decode_str(&format!("{{'a': '{long_value}")).is_empty());
    }
}
