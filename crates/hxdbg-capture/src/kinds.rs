//! Recognized htmx event kinds and how each one's `detail` is reduced.
//!
//! The table maps groups of kinds to an extraction function. Kinds not in
//! the table keep their detail verbatim.

use serde_json::{Value, json};

use crate::descriptor::{element_value, request_value};
use crate::dom::RawDetail;
use crate::error::CaptureError;

/// Kinds the capture agent listens for on the document.
pub const CAPTURED_KINDS: [&str; 15] = [
    "htmx:afterRequest",
    "htmx:afterSwap",
    "htmx:beforeRequest",
    "htmx:beforeSend",
    "htmx:beforeSwap",
    "htmx:configRequest",
    "htmx:historyCacheError",
    "htmx:load",
    "htmx:responseError",
    "htmx:xhr:loadend",
    "htmx:xhr:loadstart",
    "htmx:xhr:progress",
    "htmx:onLoadError",
    "htmx:targetError",
    "htmx:timeout",
];

/// Kind of the record emitted by the instrumented processing entry point.
pub const PROCESS_KIND: &str = "htmx:process";

pub type Extractor = fn(&RawDetail) -> Result<Value, CaptureError>;

const EXTRACTORS: &[(&[&str], Extractor)] = &[
    (
        &[
            "htmx:afterOnLoad",
            "htmx:afterRequest",
            "htmx:afterSettle",
            "htmx:afterSwap",
            "htmx:beforeOnLoad",
            "htmx:beforeRequest",
            "htmx:beforeSwap",
            "htmx:beforeSend",
            "htmx:configRequest",
            "htmx:historyCacheError",
            "htmx:beforeHistoryUpdate",
            "htmx:onLoadError",
            "htmx:responseError",
            "htmx:sendError",
            "htmx:swapError",
            "htmx:timeout",
        ],
        request_shape,
    ),
    (
        &[
            "htmx:afterProcessNode",
            "htmx:beforeProcessNode",
            "htmx:load",
            "htmx:beforeCleanupElement",
            "htmx:xhr:abort",
            "htmx:xhr:loadstart",
            "htmx:xhr:loadend",
            "htmx:xhr:progress",
        ],
        element_only,
    ),
    (&["htmx:confirm"], confirm),
    (
        &[
            "htmx:historyCacheMiss",
            "htmx:historyCacheMissError",
            "htmx:historyCacheMissLoad",
        ],
        history_cache,
    ),
    (
        &[
            "htmx:historyRestore",
            "htmx:beforeHistorySave",
            "htmx:pushedIntoHistory",
            "htmx:replacedInHistory",
        ],
        history_path,
    ),
    (&["htmx:sseError"], sse_error),
    (&["htmx:targetError"], target_error),
    (
        &["htmx:validation:validate", "htmx:validation:failed"],
        validation,
    ),
    (&["htmx:validation:halted"], validation_halted),
];

pub fn is_captured(kind: &str) -> bool {
    CAPTURED_KINDS.contains(&kind)
}

/// Extraction function for `kind`; unknown kinds fall back to [`raw_detail`].
pub fn extractor_for(kind: &str) -> Extractor {
    EXTRACTORS
        .iter()
        .find(|(kinds, _)| kinds.contains(&kind))
        .map(|(_, extract)| *extract)
        .unwrap_or(raw_detail)
}

/// Reduce an event's detail according to its kind.
pub fn extract(kind: &str, detail: &RawDetail) -> Result<Value, CaptureError> {
    extractor_for(kind)(detail)
}

// ─── Extractors ──────────────────────────────────────────────────

fn request_shape(d: &RawDetail) -> Result<Value, CaptureError> {
    Ok(json!({
        "elt": element_value(d.elt.as_ref())?,
        "xhr": request_value(d.xhr.as_ref())?,
        "target": element_value(d.target_element())?,
        "requestConfig": d.field("requestConfig"),
    }))
}

fn element_only(d: &RawDetail) -> Result<Value, CaptureError> {
    Ok(json!({ "elt": element_value(d.elt.as_ref())? }))
}

fn confirm(d: &RawDetail) -> Result<Value, CaptureError> {
    Ok(json!({
        "elt": element_value(d.elt.as_ref())?,
        "target": element_value(d.target_element())?,
        "triggeringEvent": d.field("triggeringEvent"),
        "question": d.field("question"),
    }))
}

fn history_cache(d: &RawDetail) -> Result<Value, CaptureError> {
    Ok(json!({
        "xhr": request_value(d.xhr.as_ref())?,
        "path": d.field("path"),
    }))
}

fn history_path(d: &RawDetail) -> Result<Value, CaptureError> {
    Ok(json!({ "path": d.field("path") }))
}

fn sse_error(d: &RawDetail) -> Result<Value, CaptureError> {
    Ok(json!({
        "elt": element_value(d.elt.as_ref())?,
        "error": d.field("error"),
        "source": d.field("source"),
    }))
}

/// `detail.target` is the selector that failed to resolve, kept as-is.
fn target_error(d: &RawDetail) -> Result<Value, CaptureError> {
    let target = match &d.target {
        Some(t) => crate::descriptor::to_value(t)?,
        None => Value::Null,
    };
    Ok(json!({
        "elt": element_value(d.elt.as_ref())?,
        "target": target,
    }))
}

fn validation(d: &RawDetail) -> Result<Value, CaptureError> {
    Ok(json!({
        "elt": element_value(d.elt.as_ref())?,
        "message": d.field("message"),
        "validity": d.field("validity"),
    }))
}

fn validation_halted(d: &RawDetail) -> Result<Value, CaptureError> {
    Ok(json!({
        "elt": element_value(d.elt.as_ref())?,
        "errors": d.field("errors"),
    }))
}

pub fn raw_detail(d: &RawDetail) -> Result<Value, CaptureError> {
    crate::descriptor::to_value(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{DomElement, XhrSnapshot};

    fn button() -> DomElement {
        DomElement::new("BUTTON")
            .with_id("go")
            .with_attr("hx-get", "/items")
    }

    #[test]
    fn every_captured_kind_has_a_table_entry() {
        for kind in CAPTURED_KINDS {
            assert!(
                EXTRACTORS.iter().any(|(kinds, _)| kinds.contains(&kind)),
                "{kind} falls through to the raw extractor"
            );
        }
    }

    #[test]
    fn no_kind_is_listed_twice() {
        let mut seen = std::collections::BTreeSet::new();
        for (kinds, _) in EXTRACTORS {
            for kind in *kinds {
                assert!(seen.insert(*kind), "{kind} listed twice");
            }
        }
    }

    #[test]
    fn request_kinds_describe_element_xhr_and_target() {
        let detail = RawDetail::default()
            .with_elt(button())
            .with_target(DomElement::new("DIV").with_id("list"))
            .with_xhr(XhrSnapshot {
                url: Some("/items".to_owned()),
                method: Some("GET".to_owned()),
                ..XhrSnapshot::default()
            })
            .with_field("requestConfig", json!({"verb": "get"}));

        let value = extract("htmx:beforeRequest", &detail).expect("extract");
        assert_eq!(value["elt"]["id"], "go");
        assert_eq!(value["target"]["id"], "list");
        assert_eq!(value["xhr"]["method"], "GET");
        assert_eq!(value["xhr"]["status"], "N/A");
        assert_eq!(value["requestConfig"]["verb"], "get");
    }

    #[test]
    fn element_only_kinds_drop_everything_else() {
        let detail = RawDetail::default()
            .with_elt(button())
            .with_field("noise", json!(1));
        let value = extract("htmx:xhr:progress", &detail).expect("extract");
        assert_eq!(value.as_object().map(|o| o.len()), Some(1));
        assert_eq!(value["elt"]["tagName"], "BUTTON");
    }

    #[test]
    fn target_error_keeps_selector() {
        let detail: RawDetail = serde_json::from_value(json!({
            "elt": {"tagName": "A"},
            "target": "#nowhere"
        }))
        .expect("detail");
        let value = extract("htmx:targetError", &detail).expect("extract");
        assert_eq!(value["target"], "#nowhere");
    }

    #[test]
    fn history_path_kinds() {
        let detail = RawDetail::default().with_field("path", json!("/page/2"));
        assert_eq!(
            extract("htmx:pushedIntoHistory", &detail).expect("extract"),
            json!({"path": "/page/2"})
        );
        let miss = extract("htmx:historyCacheMiss", &detail).expect("extract");
        assert_eq!(miss["xhr"], Value::Null);
    }

    #[test]
    fn validation_kinds() {
        let detail = RawDetail::default()
            .with_elt(DomElement::new("INPUT"))
            .with_field("message", json!("required"))
            .with_field("errors", json!([{"message": "required"}]));
        let failed = extract("htmx:validation:failed", &detail).expect("extract");
        assert_eq!(failed["message"], "required");
        let halted = extract("htmx:validation:halted", &detail).expect("extract");
        assert_eq!(halted["errors"][0]["message"], "required");
    }

    #[test]
    fn unknown_kind_keeps_raw_detail() {
        let detail = RawDetail::default().with_field("custom", json!({"a": 1}));
        let value = extract("htmx:somethingNew", &detail).expect("extract");
        assert_eq!(value, json!({"custom": {"a": 1}}));
    }
}
