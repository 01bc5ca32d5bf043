//! Snapshots of page objects handed to the capture agent by its host.
//!
//! These mirror the shape of the DOM values an htmx event carries, reduced
//! to what the descriptors need. All of them deserialize from the JSON the
//! page adapter produces, with every field optional.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hxdbg_core::types::KIND_CONNECTION_TEST;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomAttribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DomElement {
    pub id: String,
    pub tag_name: String,
    pub class_name: String,
    pub attributes: Vec<DomAttribute>,
}

impl DomElement {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(DomAttribute {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

/// The request object attached to request-related events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct XhrSnapshot {
    pub url: Option<String>,
    pub method: Option<String>,
    /// `0` until a response arrives.
    pub status: u16,
    pub status_text: Option<String>,
    pub request_headers: Option<BTreeMap<String, String>>,
    /// Raw `getAllResponseHeaders()` text, CRLF-separated.
    pub response_headers: Option<String>,
}

/// `detail.target` is an element for most events and a CSS selector for
/// `htmx:targetError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailTarget {
    Element(DomElement),
    Selector(String),
}

impl DetailTarget {
    pub fn element(&self) -> Option<&DomElement> {
        match self {
            Self::Element(el) => Some(el),
            Self::Selector(_) => None,
        }
    }
}

/// `event.detail`: the well-known fields plus everything else verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elt: Option<DomElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<DetailTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xhr: Option<XhrSnapshot>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawDetail {
    pub fn with_elt(mut self, elt: DomElement) -> Self {
        self.elt = Some(elt);
        self
    }

    pub fn with_target(mut self, target: DomElement) -> Self {
        self.target = Some(DetailTarget::Element(target));
        self
    }

    pub fn with_xhr(mut self, xhr: XhrSnapshot) -> Self {
        self.xhr = Some(xhr);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Extra field by name, `null` when absent.
    pub fn field(&self, key: &str) -> Value {
        self.fields.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn target_element(&self) -> Option<&DomElement> {
        self.target.as_ref().and_then(DetailTarget::element)
    }
}

/// One DOM event occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub target: Option<DomElement>,
    #[serde(default)]
    pub detail: Option<RawDetail>,
}

impl RawEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            detail: None,
        }
    }

    pub fn with_target(mut self, target: DomElement) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_detail(mut self, detail: RawDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Connection self-tests dispatched through the DOM are not captured.
    pub fn is_self_test(&self) -> bool {
        self.kind == "TEST"
            || self.kind == KIND_CONNECTION_TEST
            || self
                .detail
                .as_ref()
                .and_then(|d| d.fields.get("type"))
                .and_then(Value::as_str)
                == Some(KIND_CONNECTION_TEST)
    }
}
