//! Response extraction.
//!
//! The inference endpoint answers either with an object
//! (`{"generated_text": ...}`) or with a list of them. [`GenerationBody`]
//! names those shapes; [`extract_text`] matches over them. A `None` result
//! means the caller substitutes its fallback reply.

use serde_json::{Map, Value};

/// Reply used when a 200 response carries no usable text.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't generate a response.";

const GENERATED_TEXT: &str = "generated_text";

/// A decoded response body, tagged by top-level shape.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationBody {
    Object(Map<String, Value>),
    List(Vec<Value>),
    Other(Value),
}

impl GenerationBody {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Value>(body).map(Self::from)
    }
}

impl From<Value> for GenerationBody {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => GenerationBody::Object(map),
            Value::Array(items) => GenerationBody::List(items),
            other => GenerationBody::Other(other),
        }
    }
}

/// Pull the generated text out of `body`.
///
/// An object's own `generated_text` wins; for a list only the first element
/// is consulted. Non-string values count as missing.
pub fn extract_text(body: &GenerationBody) -> Option<&str> {
    match body {
        GenerationBody::Object(map) => generated_text(map),
        GenerationBody::List(items) => match items.first() {
            Some(Value::Object(map)) => generated_text(map),
            _ => None,
        },
        GenerationBody::Other(_) => None,
    }
}

fn generated_text(map: &Map<String, Value>) -> Option<&str> {
    map.get(GENERATED_TEXT).and_then(Value::as_str)
}
