//! Structural descriptors embedded in captured payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dom::{DomAttribute, DomElement, XhrSnapshot};
use crate::error::CaptureError;

/// Attribute prefix of the htmx naming convention.
pub const HX_ATTRIBUTE_PREFIX: &str = "hx-";

/// Placeholder for request fields the request object does not carry.
pub const NOT_AVAILABLE: &str = "N/A";

// ─── Element ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub id: String,
    pub tag_name: String,
    pub class_name: String,
    pub attributes: Vec<DomAttribute>,
    /// Present only when at least one attribute starts with `hx-`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hx_attributes: Option<Vec<DomAttribute>>,
}

impl ElementDescriptor {
    pub fn describe(element: &DomElement) -> Self {
        let hx: Vec<DomAttribute> = element
            .attributes
            .iter()
            .filter(|a| a.name.starts_with(HX_ATTRIBUTE_PREFIX))
            .cloned()
            .collect();

        Self {
            id: element.id.clone(),
            tag_name: element.tag_name.clone(),
            class_name: element.class_name.clone(),
            attributes: element.attributes.clone(),
            hx_attributes: (!hx.is_empty()).then_some(hx),
        }
    }
}

/// Descriptor as a JSON value, `null` for a missing element.
pub fn element_value(element: Option<&DomElement>) -> Result<Value, CaptureError> {
    match element {
        Some(el) => to_value(&ElementDescriptor::describe(el)),
        None => Ok(Value::Null),
    }
}

// ─── Request ─────────────────────────────────────────────────────

/// Status code, or `"N/A"` before a response exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusField {
    Code(u16),
    Missing(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDescriptor {
    pub url: String,
    pub method: String,
    pub status: StatusField,
    pub status_text: String,
}

impl RequestDescriptor {
    pub fn describe(xhr: &XhrSnapshot) -> Self {
        Self {
            url: or_not_available(xhr.url.as_deref()),
            method: or_not_available(xhr.method.as_deref()),
            status: match xhr.status {
                0 => StatusField::Missing(NOT_AVAILABLE.to_owned()),
                code => StatusField::Code(code),
            },
            status_text: or_not_available(xhr.status_text.as_deref()),
        }
    }
}

fn or_not_available(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => v.to_owned(),
        _ => NOT_AVAILABLE.to_owned(),
    }
}

pub fn request_value(xhr: Option<&XhrSnapshot>) -> Result<Value, CaptureError> {
    match xhr {
        Some(x) => to_value(&RequestDescriptor::describe(x)),
        None => Ok(Value::Null),
    }
}

// ─── Headers ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    pub request: BTreeMap<String, String>,
    pub response: BTreeMap<String, String>,
}

impl Headers {
    pub fn of(xhr: Option<&XhrSnapshot>) -> Self {
        let Some(xhr) = xhr else {
            return Self::default();
        };
        Self {
            request: xhr.request_headers.clone().unwrap_or_default(),
            response: xhr
                .response_headers
                .as_deref()
                .map(parse_headers)
                .unwrap_or_default(),
        }
    }
}

/// Parse `getAllResponseHeaders()` output: CRLF-separated `Name: value`
/// lines. Lines without a `": "` separator after a non-empty name are
/// skipped; a repeated name keeps the last value.
pub fn parse_headers(raw: &str) -> BTreeMap<String, String> {
    raw.split("\r\n")
        .filter_map(|line| match line.find(": ") {
            Some(idx) if idx > 0 => Some((line[..idx].to_owned(), line[idx + 2..].to_owned())),
            _ => None,
        })
        .collect()
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value, CaptureError> {
    serde_json::to_value(value).map_err(|e| CaptureError::Descriptor(e.to_string()))
}
