//! Type filter and text search over the grouped log.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::log::{GroupedLog, GroupedLogEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFilter {
    #[default]
    All,
    /// Request-side events.
    Request,
    /// Response-side events, including anything load-related.
    Response,
}

impl EventFilter {
    pub fn matches(self, kind: &str) -> bool {
        match self {
            Self::All => true,
            Self::Request => {
                kind.contains("beforeRequest")
                    || kind.contains("beforeSend")
                    || kind.contains("xhr:loadstart")
            }
            Self::Response => {
                kind.contains("afterRequest")
                    || kind.contains("xhr:loadend")
                    || kind.contains("load")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown event filter `{0}` (expected all, request or response)")]
pub struct UnknownFilter(String);

impl FromStr for EventFilter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "request" => Ok(Self::Request),
            "response" => Ok(Self::Response),
            _ => Err(UnknownFilter(s.to_owned())),
        }
    }
}

/// Case-insensitive match of `term` against the entry's serialized form.
/// An empty term matches everything.
pub fn search_matches(entry: &GroupedLogEntry, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    serde_json::to_string(entry)
        .map(|text| text.to_lowercase().contains(&term.to_lowercase()))
        .unwrap_or(false)
}

/// One group as displayed: only the entries that pass the filter and search.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleGroup<'a> {
    pub key: &'a str,
    pub entries: Vec<&'a GroupedLogEntry>,
}

impl GroupedLog {
    /// Groups with at least one visible entry, in insertion order.
    pub fn visible(&self, filter: EventFilter, search: &str) -> Vec<VisibleGroup<'_>> {
        self.groups()
            .iter()
            .filter_map(|group| {
                let entries: Vec<_> = group
                    .entries
                    .iter()
                    .filter(|e| filter.matches(&e.kind) && search_matches(e, search))
                    .collect();
                (!entries.is_empty()).then_some(VisibleGroup {
                    key: &group.key,
                    entries,
                })
            })
            .collect()
    }
}
