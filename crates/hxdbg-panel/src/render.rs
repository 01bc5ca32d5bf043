//! Plain-text rendering of the visible log.

use std::fmt::Write as _;

use crate::filter::VisibleGroup;
use crate::log::GroupedLogEntry;

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Append the pretty-printed entry JSON under each event.
    pub full_data: bool,
}

pub fn render_groups(groups: &[VisibleGroup<'_>], opts: RenderOptions) -> String {
    let mut out = String::new();
    for group in groups {
        out.push_str(&render_group(group, opts));
    }
    out
}

pub fn render_group(group: &VisibleGroup<'_>, opts: RenderOptions) -> String {
    let mut out = format!("Group: {} ({} events)\n", group.key, group.entries.len());
    for entry in &group.entries {
        out.push_str(&render_entry(entry, opts));
    }
    out
}

pub fn render_entry(entry: &GroupedLogEntry, opts: RenderOptions) -> String {
    let kind = if entry.kind.is_empty() {
        "Unknown Event"
    } else {
        entry.kind.as_str()
    };
    let mut out = format!("  {kind} ({})\n", entry.timestamps.join(", "));

    if !entry.target.is_null() {
        let field = |name: &str| {
            entry
                .target
                .get(name)
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(NOT_AVAILABLE)
                .to_owned()
        };
        let _ = writeln!(out, "    Tag: {}", field("tagName"));
        let _ = writeln!(out, "    ID: {}", field("id"));
        let _ = writeln!(out, "    Class: {}", field("className"));

        let attrs = entry.hx_attributes();
        if attrs.is_empty() {
            out.push_str("    No HX attributes found.\n");
        } else {
            out.push_str("    HX Attributes:\n");
            for (name, value) in attrs {
                let _ = writeln!(out, "      {name}: {value}");
            }
        }
    }

    if opts.full_data {
        if let Ok(json) = serde_json::to_string_pretty(entry) {
            for line in json.lines() {
                let _ = writeln!(out, "    | {line}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::EventFilter;
    use crate::log::GroupedLog;
    use serde_json::json;

    #[test]
    fn renders_group_header_event_line_and_target() {
        let mut log = GroupedLog::new(true);
        let target = json!({
            "id": "save",
            "tagName": "BUTTON",
            "hxAttributes": [{"name": "hx-post", "value": "/save"}]
        });
        log.fold(&json!({"type": "htmx:afterRequest", "timestamp": "t1", "target": target}), "now");
        log.fold(&json!({"type": "htmx:afterRequest", "timestamp": "t2", "target": target}), "now");

        let text = render_groups(&log.visible(EventFilter::All, ""), RenderOptions::default());
        assert_eq!(
            text,
            "Group: save (1 events)\n\
             \x20 htmx:afterRequest (t1, t2)\n\
             \x20   Tag: BUTTON\n\
             \x20   ID: save\n\
             \x20   Class: N/A\n\
             \x20   HX Attributes:\n\
             \x20     hx-post: /save\n"
        );
    }

    #[test]
    fn missing_attributes_and_full_data() {
        let mut log = GroupedLog::new(true);
        log.fold(&json!({"type": "htmx:load", "timestamp": "t1", "target": {"tagName": "DIV"}}), "now");

        let text = render_groups(
            &log.visible(EventFilter::All, ""),
            RenderOptions { full_data: true },
        );
        assert!(text.contains("No HX attributes found."));
        assert!(text.contains("ID: N/A"));
        assert!(text.contains("| {"));
        assert!(text.contains("\"type\": \"htmx:load\""));
    }

    #[test]
    fn targetless_entry_has_only_header_line() {
        let mut log = GroupedLog::new(false);
        log.fold(&json!({"type": "htmx:afterSwap", "timestamp": "t1"}), "now");
        let text = render_groups(&log.visible(EventFilter::All, ""), RenderOptions::default());
        assert_eq!(text, "Group: afterSwap (1 events)\n  htmx:afterSwap (t1)\n");
    }
}
