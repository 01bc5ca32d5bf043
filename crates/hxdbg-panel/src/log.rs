//! Grouped event log shown by a panel session.
//!
//! Records fold into groups keyed by their target element; within a group,
//! repeats of the same `(type, target)` pair collapse into one entry that
//! accumulates timestamps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hxdbg_core::types::HTMX_PREFIX;

/// Group for records with neither a target nor an htmx type.
pub const CATCH_ALL_GROUP: &str = "other";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedLogEntry {
    #[serde(rename = "type")]
    pub kind: String,
    /// Arrival timestamps, oldest first.
    pub timestamps: Vec<String>,
    pub target: Value,
    pub detail: Value,
}

impl GroupedLogEntry {
    pub fn count(&self) -> usize {
        self.timestamps.len()
    }

    /// htmx attributes of the target element, if it lists any.
    pub fn hx_attributes(&self) -> Vec<(&str, &str)> {
        self.target
            .get("hxAttributes")
            .and_then(Value::as_array)
            .map(|attrs| {
                attrs
                    .iter()
                    .filter_map(|a| Some((a.get("name")?.as_str()?, a.get("value")?.as_str()?)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogGroup {
    pub key: String,
    pub entries: Vec<GroupedLogEntry>,
}

/// Result of folding one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    /// Neither target nor detail; dropped.
    Suppressed,
    /// Not a JSON object.
    Invalid,
    Added { group: String },
    Merged { group: String, count: usize },
}

#[derive(Debug, Clone, Default)]
pub struct GroupedLog {
    groups: Vec<LogGroup>,
    suppress_empty: bool,
}

impl GroupedLog {
    pub fn new(suppress_empty: bool) -> Self {
        Self {
            groups: Vec::new(),
            suppress_empty,
        }
    }

    /// Fold one event payload into the log. `now` stands in for a missing
    /// timestamp.
    pub fn fold(&mut self, event: &Value, now: &str) -> FoldOutcome {
        let Some(obj) = event.as_object() else {
            tracing::warn!("received invalid event: {event}");
            return FoldOutcome::Invalid;
        };

        let detail = obj.get("detail").filter(|d| truthy(d));
        if self.suppress_empty
            && !obj.get("target").is_some_and(truthy)
            && detail.is_none_or(is_empty)
        {
            tracing::debug!("suppressed empty event");
            return FoldOutcome::Suppressed;
        }

        let kind = non_empty_str(obj.get("type"))
            .or_else(|| non_empty_str(detail.and_then(|d| d.get("type"))))
            .unwrap_or("unknown")
            .to_owned();
        let timestamp = non_empty_str(obj.get("timestamp"))
            .unwrap_or(now)
            .to_owned();
        let target = obj
            .get("target")
            .filter(|t| truthy(t))
            .or_else(|| detail.and_then(|d| d.get("target")).filter(|t| truthy(t)))
            .cloned()
            .unwrap_or(Value::Null);

        let key = group_key(&kind, &target);
        let group = match self.groups.iter().position(|g| g.key == key) {
            Some(idx) => &mut self.groups[idx],
            None => {
                self.groups.push(LogGroup {
                    key: key.clone(),
                    entries: Vec::new(),
                });
                let last = self.groups.len() - 1;
                &mut self.groups[last]
            }
        };

        if let Some(existing) = group
            .entries
            .iter_mut()
            .find(|e| e.kind == kind && e.target == target)
        {
            existing.timestamps.push(timestamp);
            return FoldOutcome::Merged {
                group: key,
                count: existing.timestamps.len(),
            };
        }

        group.entries.push(GroupedLogEntry {
            kind,
            timestamps: vec![timestamp],
            target,
            detail: detail.cloned().unwrap_or(Value::Null),
        });
        FoldOutcome::Added { group: key }
    }

    pub fn groups(&self) -> &[LogGroup] {
        &self.groups
    }

    pub fn group(&self, key: &str) -> Option<&LogGroup> {
        self.groups.iter().find(|g| g.key == key)
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

/// Target id, else lowercased tag name, else the part after `htmx:`,
/// else the catch-all group.
pub fn group_key(kind: &str, target: &Value) -> String {
    if let Some(id) = non_empty_str(target.get("id")) {
        return id.to_owned();
    }
    if let Some(tag) = non_empty_str(target.get("tagName")) {
        return tag.to_lowercase();
    }
    if kind.starts_with(HTMX_PREFIX) {
        return kind.split(':').nth(1).unwrap_or_default().to_owned();
    }
    CATCH_ALL_GROUP.to_owned()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        other => !truthy(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: &str = "2026-03-01T00:00:00.000Z";

    fn log() -> GroupedLog {
        GroupedLog::new(true)
    }

    #[test]
    fn same_type_and_target_merge_in_arrival_order() {
        let mut log = log();
        let target = json!({"id": "save", "tagName": "BUTTON"});
        let r1 = json!({"type": "htmx:afterRequest", "timestamp": "t1", "target": target});
        let r2 = json!({"type": "htmx:afterRequest", "timestamp": "t2", "target": target});

        assert_eq!(
            log.fold(&r1, NOW),
            FoldOutcome::Added {
                group: "save".to_owned()
            }
        );
        assert_eq!(
            log.fold(&r2, NOW),
            FoldOutcome::Merged {
                group: "save".to_owned(),
                count: 2
            }
        );

        let group = log.group("save").expect("group");
        assert_eq!(group.entries.len(), 1);
        assert_eq!(group.entries[0].timestamps, vec!["t1", "t2"]);
    }

    #[test]
    fn different_target_in_same_group_is_separate_entry() {
        let mut log = log();
        log.fold(
            &json!({"type": "htmx:load", "target": {"tagName": "DIV", "className": "a"}}),
            NOW,
        );
        log.fold(
            &json!({"type": "htmx:load", "target": {"tagName": "DIV", "className": "b"}}),
            NOW,
        );
        assert_eq!(log.group("div").map(|g| g.entries.len()), Some(2));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn group_key_fallbacks() {
        assert_eq!(group_key("htmx:load", &json!({"id": "main", "tagName": "DIV"})), "main");
        assert_eq!(group_key("htmx:load", &json!({"id": "", "tagName": "SECTION"})), "section");
        assert_eq!(group_key("htmx:xhr:loadend", &Value::Null), "xhr");
        assert_eq!(group_key("htmx:afterSwap", &Value::Null), "afterSwap");
        assert_eq!(group_key("custom", &Value::Null), "other");
    }

    #[test]
    fn empty_events_are_suppressed() {
        let mut log = log();
        assert_eq!(
            log.fold(&json!({"type": "htmx:load"}), NOW),
            FoldOutcome::Suppressed
        );
        assert_eq!(
            log.fold(&json!({"type": "htmx:load", "detail": {}}), NOW),
            FoldOutcome::Suppressed
        );
        assert!(log.is_empty());

        let mut permissive = GroupedLog::new(false);
        assert!(matches!(
            permissive.fold(&json!({"type": "htmx:load"}), NOW),
            FoldOutcome::Added { .. }
        ));
    }

    #[test]
    fn type_timestamp_and_target_fall_back_to_detail() {
        let mut log = log();
        let outcome = log.fold(
            &json!({"detail": {"type": "htmx:beforeSwap", "target": {"id": "list"}}}),
            NOW,
        );
        assert_eq!(
            outcome,
            FoldOutcome::Added {
                group: "list".to_owned()
            }
        );
        let entry = &log.group("list").expect("group").entries[0];
        assert_eq!(entry.kind, "htmx:beforeSwap");
        assert_eq!(entry.timestamps, vec![NOW]);
        assert_eq!(entry.target["id"], "list");
    }

    #[test]
    fn unknown_type_goes_to_catch_all() {
        let mut log = log();
        log.fold(&json!({"detail": {"x": 1}}), NOW);
        let entry = &log.group(CATCH_ALL_GROUP).expect("catch-all").entries[0];
        assert_eq!(entry.kind, "unknown");
    }

    #[test]
    fn non_object_is_invalid() {
        let mut log = log();
        assert_eq!(log.fold(&json!("text"), NOW), FoldOutcome::Invalid);
    }

    #[test]
    fn groups_keep_insertion_order_and_clear() {
        let mut log = log();
        for id in ["b", "a", "c"] {
            log.fold(&json!({"type": "htmx:load", "target": {"id": id}}), NOW);
        }
        let keys: Vec<&str> = log.groups().iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn hx_attributes_of_target() {
        let entry = GroupedLogEntry {
            kind: "htmx:load".to_owned(),
            timestamps: vec![NOW.to_owned()],
            target: json!({"hxAttributes": [{"name": "hx-get", "value": "/x"}]}),
            detail: Value::Null,
        };
        assert_eq!(entry.hx_attributes(), vec![("hx-get", "/x")]);
    }
}
