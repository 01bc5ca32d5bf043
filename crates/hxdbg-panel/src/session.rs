//! Panel session: one inspector view attached to one tab.
//!
//! Pure state machine in the same shape as the relay coordinator: the
//! caller feeds inbound messages and the current time, the session answers
//! with the requests to post back over its channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hxdbg_core::config::PanelConfig;
use hxdbg_core::types::{
    EventRecord, KIND_HTMX_EVENT, PanelMessage, PanelRequest, SourceId, format_timestamp,
    instant_from_ms,
};

use crate::log::{FoldOutcome, GroupedLog};

/// Legacy envelope kind some capture sources still emit.
pub const KIND_HTMX_DEBUG_INFO: &str = "HTMX_DEBUG_INFO";
/// Payload of the periodic self-test request.
pub const TEST_REQUEST_DATA: &str = "Test message from panel";

pub const NOTE_INITIALIZED: &str = "htmx-debugger initialized. Waiting for events...";
pub const NOTE_CLEARED: &str = "Debug information cleared. Waiting for new htmx events...";
pub const NOTE_NAVIGATED: &str = "Page reloaded. Waiting for new htmx events...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => f.write_str("Connected"),
            Self::Disconnected => f.write_str("Disconnected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteLevel {
    Info,
    Test,
    Confirmation,
    Warning,
    Error,
}

/// Free-text line shown alongside the grouped log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub level: NoteLevel,
    pub text: String,
}

/// Effect of one inbound message on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Liveness signal; timer reset.
    Alive,
    Folded(FoldOutcome),
    Noted(NoteLevel),
    Ignored,
}

#[derive(Debug, Clone)]
pub struct PanelSession {
    config: PanelConfig,
    tab_id: SourceId,
    status: ConnectionStatus,
    last_liveness_at_ms: u64,
    next_verify_at_ms: u64,
    log: GroupedLog,
    notes: Vec<Note>,
}

impl PanelSession {
    pub fn new(config: PanelConfig, tab_id: SourceId, now_ms: u64) -> Self {
        let log = GroupedLog::new(config.suppress_empty_events);
        Self {
            config,
            tab_id,
            status: ConnectionStatus::Disconnected,
            last_liveness_at_ms: now_ms,
            next_verify_at_ms: now_ms,
            log,
            notes: Vec::new(),
        }
    }

    pub fn tab_id(&self) -> SourceId {
        self.tab_id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn log(&self) -> &GroupedLog {
        &self.log
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn last_liveness_at_ms(&self) -> u64 {
        self.last_liveness_at_ms
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Open the session. The first verification is due immediately.
    pub fn start(&mut self, now_ms: u64) -> PanelRequest {
        self.note(NoteLevel::Info, NOTE_INITIALIZED);
        self.next_verify_at_ms = now_ms;
        self.init_request(now_ms)
    }

    /// The inspected page navigated: drop the log and subscribe again.
    pub fn on_navigated(&mut self, now_ms: u64) -> PanelRequest {
        tracing::info!("page reloaded, reinitializing session for {}", self.tab_id);
        self.note(NoteLevel::Warning, NOTE_NAVIGATED);
        self.log.clear();
        self.init_request(now_ms)
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.notes.clear();
        self.note(NoteLevel::Info, NOTE_CLEARED);
    }

    fn init_request(&mut self, now_ms: u64) -> PanelRequest {
        self.last_liveness_at_ms = now_ms;
        tracing::debug!("session initialized for {}", self.tab_id);
        PanelRequest::Init {
            tab_id: self.tab_id,
        }
    }

    // ─── Inbound ─────────────────────────────────────────────────

    pub fn on_message(&mut self, message: &PanelMessage, now_ms: u64) -> SessionUpdate {
        match message {
            PanelMessage::Heartbeat => {
                self.last_liveness_at_ms = now_ms;
                self.status = ConnectionStatus::Connected;
                SessionUpdate::Alive
            }
            PanelMessage::HtmxEvent { data, .. } => self.fold(data, now_ms),
            PanelMessage::Test { data } => {
                self.status = ConnectionStatus::Connected;
                self.note(
                    NoteLevel::Test,
                    format!("Test message received: {}", display_data(data)),
                );
                SessionUpdate::Noted(NoteLevel::Test)
            }
            PanelMessage::TestConfirmation { data } => {
                self.status = ConnectionStatus::Connected;
                self.note(
                    NoteLevel::Confirmation,
                    format!("Test confirmation: {}", display_data(data)),
                );
                SessionUpdate::Noted(NoteLevel::Confirmation)
            }
            PanelMessage::Error { error, .. } => {
                tracing::warn!("relay reported error: {error}");
                self.note(NoteLevel::Error, format!("Error: {error}"));
                SessionUpdate::Noted(NoteLevel::Error)
            }
            PanelMessage::ConnectionTest => SessionUpdate::Ignored,
            PanelMessage::Relayed(record) => self.on_relayed(record, now_ms),
        }
    }

    fn on_relayed(&mut self, record: &EventRecord, now_ms: u64) -> SessionUpdate {
        match record.kind.as_str() {
            KIND_HTMX_EVENT | KIND_HTMX_DEBUG_INFO => self.fold(&record.payload, now_ms),
            other => {
                tracing::warn!("unknown message type: {other}");
                SessionUpdate::Ignored
            }
        }
    }

    fn fold(&mut self, data: &Value, now_ms: u64) -> SessionUpdate {
        if data.is_null() {
            tracing::warn!("htmx event message without data");
            return SessionUpdate::Ignored;
        }
        let now = format_timestamp(instant_from_ms(now_ms));
        SessionUpdate::Folded(self.log.fold(data, &now))
    }

    fn note(&mut self, level: NoteLevel, text: impl Into<String>) {
        self.notes.push(Note {
            level,
            text: text.into(),
        });
    }

    // ─── Liveness ────────────────────────────────────────────────

    /// Re-subscribe once the relay has been silent for longer than the
    /// timeout. Resets the timer, so one silent period yields one `Init`.
    pub fn check_liveness(&mut self, now_ms: u64) -> Option<PanelRequest> {
        let silent_ms = now_ms.saturating_sub(self.last_liveness_at_ms);
        if silent_ms <= self.config.liveness_timeout_ms {
            return None;
        }
        tracing::warn!(
            "no liveness signal for {silent_ms}ms on {}, reconnecting",
            self.tab_id
        );
        self.status = ConnectionStatus::Disconnected;
        Some(self.init_request(now_ms))
    }

    /// Self-test request followed by a liveness check.
    pub fn verify(&mut self, now_ms: u64) -> Vec<PanelRequest> {
        let mut requests = vec![PanelRequest::Test {
            tab_id: self.tab_id,
            data: Value::String(TEST_REQUEST_DATA.to_owned()),
        }];
        requests.extend(self.check_liveness(now_ms));
        requests
    }

    /// Run the periodic verification if it is due.
    pub fn tick(&mut self, now_ms: u64) -> Vec<PanelRequest> {
        if now_ms < self.next_verify_at_ms {
            return Vec::new();
        }
        self.next_verify_at_ms = now_ms.saturating_add(self.config.verify_interval_ms);
        self.verify(now_ms)
    }

    pub fn next_wakeup_ms(&self) -> u64 {
        self.next_verify_at_ms
    }
}

fn display_data(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
