//! The capture agent: turns DOM events into relay records.
//!
//! Owns the three safety valves (volume cap, circuit breaker, connection
//! gating) and the processing-depth guard. The host performs the actual
//! sends and reports their outcome back; timers are driven by [`CaptureAgent::poll`].

use serde::Serialize;
use serde_json::{Value, json};

use hxdbg_core::config::CaptureConfig;
use hxdbg_core::error::TransportError;
use hxdbg_core::types::{
    Ack, EventRecord, KIND_CONNECTION_TEST, KIND_ERROR, KIND_HTMX_EVENT, KIND_TEST,
    KIND_TEST_CONFIRMATION, format_timestamp, instant_from_ms as timestamp,
};

use crate::connection::{ConnectionMachine, LinkState, Reconnect};
use crate::descriptor::{self, Headers, element_value, request_value};
use crate::dom::{DomElement, RawEvent};
use crate::error::CaptureError;
use crate::instrument::{DepthGauge, DepthToken};
use crate::kinds::{self, PROCESS_KIND};
use crate::valves::{CircuitBreaker, VolumeCap};

/// Something the host must send on the agent's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureAction {
    /// Submit to the relay, then report the outcome via
    /// [`CaptureAgent::on_send_result`].
    Send(EventRecord),
    /// Submit a connection self-test, then report via
    /// [`CaptureAgent::on_probe_result`].
    Probe(EventRecord),
}

/// Outcome of observing one event.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureDecision {
    Send(EventRecord),
    /// Circuit breaker open.
    Suppressed,
    /// Volume cap reached for the current window.
    Throttled,
    /// Self-test traffic; never captured.
    Skipped,
    /// Kind outside the listened set.
    NotCaptured,
    /// Not connected. Carries a self-test to send when none is pending.
    Gated(Option<EventRecord>),
    /// Building the record failed; carries the error report, if any.
    Failed(Option<CaptureAction>),
}

impl CaptureDecision {
    pub fn into_action(self) -> Option<CaptureAction> {
        match self {
            Self::Send(record) => Some(CaptureAction::Send(record)),
            Self::Gated(probe) => probe.map(CaptureAction::Probe),
            Self::Failed(action) => action,
            Self::Suppressed | Self::Throttled | Self::Skipped | Self::NotCaptured => None,
        }
    }
}

/// An active entry into the instrumented processing function. The host
/// calls through to the original while holding it.
#[derive(Debug)]
pub struct ProcessEntry {
    pub decision: CaptureDecision,
    _depth: DepthToken,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub captured: u64,
    pub throttled: u64,
    pub suppressed: u64,
    pub skipped: u64,
    pub gated: u64,
    pub errors: u64,
}

pub struct CaptureAgent {
    config: CaptureConfig,
    source_tag: String,
    volume: VolumeCap,
    breaker: CircuitBreaker,
    link: ConnectionMachine,
    depth: DepthGauge,
    next_check_at_ms: u64,
    reinit_at_ms: Option<u64>,
    stats: CaptureStats,
}

impl CaptureAgent {
    pub fn new(config: CaptureConfig, source_tag: impl Into<String>, now_ms: u64) -> Self {
        Self {
            volume: VolumeCap::new(config.volume_cap, config.volume_window_ms, now_ms),
            breaker: CircuitBreaker::new(config.error_cap, config.breaker_cooldown_ms),
            link: ConnectionMachine::new(&config),
            depth: DepthGauge::new(config.max_process_depth),
            next_check_at_ms: now_ms.saturating_add(config.connection_check_interval_ms),
            reinit_at_ms: None,
            stats: CaptureStats::default(),
            source_tag: source_tag.into(),
            config,
        }
    }

    /// Initial connection self-test.
    pub fn start(&mut self, now_ms: u64) -> Option<CaptureAction> {
        tracing::info!("initializing capture agent ({})", self.source_tag);
        self.next_check_at_ms = now_ms.saturating_add(self.config.connection_check_interval_ms);
        self.probe(now_ms).map(CaptureAction::Probe)
    }

    // ── Capture ──────────────────────────────────────────────────

    pub fn observe(&mut self, event: &RawEvent, now_ms: u64) -> CaptureDecision {
        if event.is_self_test() {
            self.stats.skipped += 1;
            return CaptureDecision::Skipped;
        }
        if !kinds::is_captured(&event.kind) {
            self.stats.skipped += 1;
            tracing::trace!("not listening for {}", event.kind);
            return CaptureDecision::NotCaptured;
        }
        if self.breaker.is_open() {
            self.stats.suppressed += 1;
            tracing::debug!("circuit breaker active, skipping {}", event.kind);
            return CaptureDecision::Suppressed;
        }
        if !self.volume.admit(now_ms) {
            self.stats.throttled += 1;
            tracing::debug!("too many events in the current window, skipping {}", event.kind);
            return CaptureDecision::Throttled;
        }

        match self.event_record(event, now_ms) {
            Ok(record) => {
                self.stats.captured += 1;
                self.outbound(record, now_ms)
            }
            Err(err) => CaptureDecision::Failed(self.handle_error(&err, now_ms)),
        }
    }

    /// Enter the instrumented processing function for `elt`.
    ///
    /// `None` means the depth cap was hit: the breaker is tripped and the
    /// host must not call through to the original.
    pub fn enter_process(&mut self, elt: Option<&DomElement>, now_ms: u64) -> Option<ProcessEntry> {
        let Some(token) = self.depth.enter() else {
            tracing::error!("maximum processing depth reached, possible infinite loop");
            self.trip(now_ms);
            return None;
        };

        let decision = if self.breaker.is_open() {
            self.stats.suppressed += 1;
            CaptureDecision::Suppressed
        } else {
            match self.process_record(elt, now_ms) {
                Ok(record) => self.outbound(record, now_ms),
                Err(err) => CaptureDecision::Failed(self.handle_error(&err, now_ms)),
            }
        };
        Some(ProcessEntry {
            decision,
            _depth: token,
        })
    }

    fn event_record(&self, event: &RawEvent, now_ms: u64) -> Result<EventRecord, CaptureError> {
        let at = timestamp(now_ms);
        let detail = match &event.detail {
            Some(d) => kinds::extract(&event.kind, d)?,
            None => Value::Null,
        };
        let xhr = event.detail.as_ref().and_then(|d| d.xhr.as_ref());

        let mut payload = json!({
            "type": event.kind,
            "timestamp": format_timestamp(at),
            "target": element_value(event.target.as_ref())?,
            "detail": detail,
            "headers": descriptor::to_value(&Headers::of(xhr))?,
        });
        if event.kind.starts_with("htmx:xhr:") && xhr.is_some() {
            payload["xhr"] = request_value(xhr)?;
        }

        Ok(EventRecord::new(
            KIND_HTMX_EVENT,
            self.source_tag.clone(),
            payload,
            at,
        ))
    }

    fn process_record(
        &self,
        elt: Option<&DomElement>,
        now_ms: u64,
    ) -> Result<EventRecord, CaptureError> {
        let at = timestamp(now_ms);
        let payload = json!({
            "type": PROCESS_KIND,
            "timestamp": format_timestamp(at),
            "element": element_value(elt)?,
        });
        Ok(EventRecord::new(
            KIND_HTMX_EVENT,
            self.source_tag.clone(),
            payload,
            at,
        ))
    }

    /// Connection gating for every outgoing record.
    fn outbound(&mut self, record: EventRecord, now_ms: u64) -> CaptureDecision {
        if self.link.is_connected() {
            return CaptureDecision::Send(record);
        }
        self.stats.gated += 1;
        tracing::warn!("not connected to relay, dropping {} and checking connection", record.kind);
        CaptureDecision::Gated(self.probe(now_ms))
    }

    fn probe(&mut self, now_ms: u64) -> Option<EventRecord> {
        self.link.begin_probe().then(|| self.probe_record(now_ms))
    }

    fn probe_record(&self, now_ms: u64) -> EventRecord {
        EventRecord::new(
            KIND_CONNECTION_TEST,
            self.source_tag.clone(),
            json!({"message": "Content script connection check"}),
            timestamp(now_ms),
        )
    }

    // ── Failures ─────────────────────────────────────────────────

    /// Count an internal error and report it to the relay.
    pub fn handle_error(&mut self, err: &CaptureError, now_ms: u64) -> Option<CaptureAction> {
        self.stats.errors += 1;
        tracing::error!("capture error: {err}");
        if self.breaker.record_error(now_ms) {
            self.hold_link();
        }

        if err.is_context_invalidated() {
            tracing::warn!("host context invalidated, reinitializing later");
            self.link.disconnect();
            self.reinit_at_ms = Some(now_ms.saturating_add(self.config.reinit_delay_ms));
            return None;
        }

        let report = EventRecord::new(
            KIND_ERROR,
            self.source_tag.clone(),
            json!({"error": err.to_string(), "stack": Value::Null}),
            timestamp(now_ms),
        );
        self.outbound(report, now_ms).into_action()
    }

    pub fn on_send_result(
        &mut self,
        result: Result<Ack, TransportError>,
        now_ms: u64,
    ) -> Vec<CaptureAction> {
        match result {
            Ok(ack) => {
                self.link.on_send_ok();
                tracing::trace!("record delivered: {:?}", ack.status);
                Vec::new()
            }
            Err(err) => {
                let reconnect = self.link.on_send_failed(now_ms);
                let report = self.handle_error(&CaptureError::from(err), now_ms);
                self.apply_reconnect(reconnect, now_ms);
                report.into_iter().collect()
            }
        }
    }

    pub fn on_probe_result(&mut self, result: Result<Ack, TransportError>, now_ms: u64) {
        match result {
            Ok(_) => {
                if !self.link.is_connected() {
                    tracing::info!("connection to relay verified");
                }
                self.link.on_probe_ok();
            }
            Err(err) => {
                tracing::warn!("connection check failed: {err}");
                let reconnect = self.link.on_probe_failed(now_ms);
                self.apply_reconnect(reconnect, now_ms);
            }
        }
    }

    fn apply_reconnect(&mut self, reconnect: Reconnect, now_ms: u64) {
        match reconnect {
            Reconnect::Backoff {
                attempt,
                retry_at_ms,
            } => tracing::info!(
                "reconnection attempt {attempt} of {} at {retry_at_ms}",
                self.config.max_reconnect_attempts
            ),
            Reconnect::Retest { retry_at_ms } => {
                tracing::debug!("connection check retry at {retry_at_ms}");
            }
            Reconnect::Exhausted => {
                tracing::error!("max reconnection attempts reached");
                self.trip(now_ms);
            }
            Reconnect::Unchanged => {}
        }
    }

    fn trip(&mut self, now_ms: u64) {
        if self.breaker.trip(now_ms) {
            self.hold_link();
        }
    }

    fn hold_link(&mut self) {
        if let Some(until_ms) = self.breaker.open_until_ms() {
            tracing::warn!("circuit breaker triggered, pausing capture until {until_ms}");
            self.link.suspend(until_ms);
        }
    }

    // ── Relay → capture ──────────────────────────────────────────

    /// Answer a test message from the relay with a confirmation.
    pub fn on_relay_message(&mut self, message: &EventRecord, now_ms: u64) -> Option<CaptureAction> {
        if message.kind != KIND_TEST {
            tracing::debug!("ignoring relay message {}", message.kind);
            return None;
        }
        tracing::info!("received test message: {}", message.payload);
        let confirmation = EventRecord::new(
            KIND_TEST_CONFIRMATION,
            self.source_tag.clone(),
            json!("Content script received test message"),
            timestamp(now_ms),
        );
        self.outbound(confirmation, now_ms).into_action()
    }

    // ── Timers ───────────────────────────────────────────────────

    /// Run timer-driven transitions due at `now_ms`: breaker reset,
    /// reinitialization, reconnection backoff, periodic connection check.
    pub fn poll(&mut self, now_ms: u64) -> Vec<CaptureAction> {
        let mut actions = Vec::new();

        if self.breaker.poll(now_ms) {
            tracing::info!("circuit breaker reset, resuming capture");
            if self.link.resume() {
                actions.push(CaptureAction::Probe(self.probe_record(now_ms)));
            }
        }

        if self.reinit_at_ms.is_some_and(|at| now_ms >= at) {
            self.reinit_at_ms = None;
            if let Some(probe) = self.start(now_ms) {
                actions.push(probe);
            }
        }

        if self.link.poll(now_ms) {
            actions.push(CaptureAction::Probe(self.probe_record(now_ms)));
        }

        if now_ms >= self.next_check_at_ms {
            self.next_check_at_ms = now_ms.saturating_add(self.config.connection_check_interval_ms);
            let probing = actions
                .iter()
                .any(|a| matches!(a, CaptureAction::Probe(_)));
            if !probing && self.reinit_at_ms.is_none() && self.link.periodic_check() {
                actions.push(CaptureAction::Probe(self.probe_record(now_ms)));
            }
        }

        actions
    }

    pub fn next_wakeup_ms(&self) -> u64 {
        [
            self.breaker.open_until_ms(),
            self.reinit_at_ms,
            self.link.next_due_ms(),
        ]
        .into_iter()
        .flatten()
        .fold(self.next_check_at_ms, u64::min)
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn volume(&self) -> &VolumeCap {
        &self.volume
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    pub fn source_tag(&self) -> &str {
        &self.source_tag
    }
}
