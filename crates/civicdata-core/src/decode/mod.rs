//! Response decoding into one format-agnostic tree.
//!
//! Upstream providers mislabel content types, prefix UTF-8 byte-order marks,
//! and switch between JSON and XML depending on the endpoint variant. Everything
//! downstream only ever sees a [`DecodedTree`].

mod xml;

use crate::error::DecodeError;
use serde_json::Value;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Formats a dataset accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    Xml,
    JsonOrXml,
}

impl PayloadFormat {
    fn accepts_json(self) -> bool {
        matches!(self, PayloadFormat::Json | PayloadFormat::JsonOrXml)
    }

    fn accepts_xml(self) -> bool {
        matches!(self, PayloadFormat::Xml | PayloadFormat::JsonOrXml)
    }
}

/// Decoded payload addressed by key paths.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTree(Value);

impl DecodedTree {
    pub fn new(root: Value) -> Self {
        Self(root)
    }

    pub fn root(&self) -> &Value {
        &self.0
    }

    /// Look up a dotted path such as `records.Station`. The empty path is the root.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.0, path)
    }
}

/// Resolve a dotted path against a value. Numeric segments index into arrays.
///
/// A key that itself contains dots (`pm2.5`) is matched verbatim first.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    if let Some(exact) = value.as_object().and_then(|map| map.get(path)) {
        return Some(exact);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Strip a leading UTF-8 byte-order mark, if any.
pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// Decode raw bytes as JSON, falling back to XML when the format allows it.
pub fn decode(bytes: &[u8], format: PayloadFormat) -> Result<DecodedTree, DecodeError> {
    let body = strip_bom(bytes);
    let trimmed = body.trim_ascii_start();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    let looks_like_markup = trimmed.first() == Some(&b'<');
    let json_error = if format.accepts_json() && !looks_like_markup {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => return Ok(DecodedTree(value)),
            Err(e) => Some(DecodeError::Json(e.to_string())),
        }
    } else {
        None
    };

    if format.accepts_xml() {
        let text = std::str::from_utf8(body).map_err(|e| DecodeError::Encoding(e.to_string()))?;
        return match xml::to_value(text) {
            Ok(value) => Ok(DecodedTree(value)),
            // JSON was the primary guess; report that failure for non-markup bodies.
            Err(xml_error) => Err(json_error.unwrap_or(xml_error)),
        };
    }

    Err(json_error.unwrap_or_else(|| {
        DecodeError::Json("payload is markup but only JSON is accepted".to_string())
    }))
}
