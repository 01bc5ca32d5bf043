//! `hxdbg emit`: run one capture agent cycle against the relay: connection
//! check, capture of a synthetic htmx event, send.

use std::collections::VecDeque;

use hxdbg_capture::{
    CaptureAction, CaptureAgent, CaptureDecision, DomElement, RawDetail, RawEvent, XhrSnapshot,
};
use hxdbg_core::clock::epoch_ms;
use hxdbg_core::config::CaptureConfig;
use hxdbg_core::types::{Ack, SourceId, Submission};

use crate::cli::EmitOpts;
use crate::client::send_record;

/// Entry point for `hxdbg emit`.
pub async fn cmd_emit(
    socket_path: &str,
    config: CaptureConfig,
    opts: &EmitOpts,
) -> anyhow::Result<()> {
    let tab_id = SourceId(opts.tab);
    let event = build_event(opts)?;

    let mut agent = CaptureAgent::new(config, format!("hxdbg-emit/{tab_id}"), epoch_ms());
    let start = agent.start(epoch_ms());
    drive(socket_path, tab_id, &mut agent, start).await;
    if !agent.is_connected() {
        anyhow::bail!("relay at {socket_path} did not answer the connection check");
    }

    let decision = agent.observe(&event, epoch_ms());
    let outcome = describe(&decision);
    let acks = drive(socket_path, tab_id, &mut agent, decision.into_action()).await;

    match acks.first() {
        Some(ack) => println!("{} {outcome}: {}", event.kind, serde_json::to_string(ack)?),
        None => println!("{} {outcome}", event.kind),
    }
    tracing::debug!("capture stats: {:?}", agent.stats());
    Ok(())
}

/// Perform `first` and every follow-up it triggers, feeding each outcome
/// back into the agent. Returns the acknowledgements received.
async fn drive(
    socket_path: &str,
    tab_id: SourceId,
    agent: &mut CaptureAgent,
    first: Option<CaptureAction>,
) -> Vec<Ack> {
    let mut pending: VecDeque<CaptureAction> = first.into_iter().collect();
    let mut acks = Vec::new();

    while let Some(action) = pending.pop_front() {
        let (record, is_probe) = match action {
            CaptureAction::Probe(record) => (record, true),
            CaptureAction::Send(record) => (record, false),
        };
        let submission = Submission {
            tab_id: Some(tab_id),
            message: record,
        };
        let result = send_record(socket_path, &submission).await;
        if let Ok(ack) = &result {
            acks.push(*ack);
        }
        if is_probe {
            agent.on_probe_result(result, epoch_ms());
        } else {
            pending.extend(agent.on_send_result(result, epoch_ms()));
        }
    }
    acks
}

fn describe(decision: &CaptureDecision) -> &'static str {
    match decision {
        CaptureDecision::Send(_) => "sent",
        CaptureDecision::Suppressed => "suppressed (circuit breaker open)",
        CaptureDecision::Throttled => "throttled (volume cap reached)",
        CaptureDecision::Skipped => "skipped (self-test event)",
        CaptureDecision::NotCaptured => "ignored (not a captured htmx event)",
        CaptureDecision::Gated(_) => "held (relay not connected)",
        CaptureDecision::Failed(_) => "failed",
    }
}

pub(crate) fn build_event(opts: &EmitOpts) -> anyhow::Result<RawEvent> {
    let mut element = DomElement::new(opts.tag.as_str());
    if let Some(id) = &opts.element_id {
        element = element.with_id(id.as_str());
    }
    for attr in &opts.attrs {
        let (name, value) = attr
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("attribute `{attr}` is not name=value"))?;
        element = element.with_attr(name, value);
    }

    let mut detail = RawDetail::default()
        .with_elt(element.clone())
        .with_target(element.clone());
    if let Some(url) = &opts.url {
        detail = detail.with_xhr(XhrSnapshot {
            url: Some(url.clone()),
            method: Some(opts.method.clone()),
            ..XhrSnapshot::default()
        });
    }

    Ok(RawEvent::new(opts.kind.as_str())
        .with_target(element)
        .with_detail(detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> EmitOpts {
        EmitOpts {
            tab: 1,
            kind: "htmx:afterRequest".to_string(),
            element_id: Some("save".to_string()),
            tag: "BUTTON".to_string(),
            attrs: vec!["hx-post=/save".to_string()],
            url: Some("/save".to_string()),
            method: "POST".to_string(),
        }
    }

    #[test]
    fn event_from_options() {
        let event = build_event(&opts()).expect("event");
        assert_eq!(event.kind, "htmx:afterRequest");
        let target = event.target.as_ref().expect("target");
        assert_eq!(target.id, "save");
        assert_eq!(target.attr("hx-post"), Some("/save"));

        let detail = event.detail.as_ref().expect("detail");
        let xhr = detail.xhr.as_ref().expect("xhr");
        assert_eq!(xhr.method.as_deref(), Some("POST"));
    }

    #[test]
    fn malformed_attribute_is_rejected() {
        let mut bad = opts();
        bad.attrs = vec!["hx-get".to_string()];
        let err = build_event(&bad).expect_err("no value");
        assert!(err.to_string().contains("hx-get"));
    }

    #[tokio::test]
    async fn unreachable_relay_fails_connection_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("none.sock").to_string_lossy().into_owned();
        let err = cmd_emit(&socket, CaptureConfig::default(), &opts())
            .await
            .expect_err("no relay");
        assert!(err.to_string().contains("connection check"));
    }
}
