//! `hxdbg watch`: a terminal panel attached to one tab.

use std::time::Duration;

use hxdbg_core::clock::epoch_ms;
use hxdbg_core::config::PanelConfig;
use hxdbg_core::types::{PanelMessage, SourceId};
use hxdbg_panel::{EventFilter, PanelSession, RenderOptions, render_groups};

use crate::cli::WatchOpts;
use crate::client::PanelPort;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Notes shown under the log; older ones scroll away.
const NOTES_SHOWN: usize = 5;

enum WatchEvent {
    Message(Result<Option<PanelMessage>, hxdbg_core::error::TransportError>),
    Timer,
    Quit,
}

/// Entry point for `hxdbg watch`.
pub async fn cmd_watch(
    socket_path: &str,
    config: PanelConfig,
    opts: &WatchOpts,
) -> anyhow::Result<()> {
    let filter: EventFilter = opts.filter.parse()?;
    let render = RenderOptions {
        full_data: opts.full,
    };
    let tab_id = SourceId(opts.tab);
    let mut session = PanelSession::new(config, tab_id, epoch_ms());
    // Opening a port sends its own Init.
    let _ = session.start(epoch_ms());
    let mut port: Option<PanelPort> = None;

    loop {
        if port.is_none() {
            match PanelPort::open(socket_path, tab_id).await {
                Ok(opened) => {
                    tracing::info!("panel attached to {tab_id}");
                    port = Some(opened);
                }
                Err(e) => {
                    println!("Cannot connect to relay: {e}");
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        _ = tokio::signal::ctrl_c() => break,
                    }
                }
            }
            continue;
        }
        let Some(active) = port.as_mut() else {
            continue;
        };

        let now = epoch_ms();
        let mut send_failed = false;
        for request in session.tick(now) {
            if let Err(e) = active.send(&request).await {
                tracing::warn!("panel request failed: {e}");
                send_failed = true;
                break;
            }
        }
        if send_failed {
            port = None;
            continue;
        }

        draw(&format_screen(&session, filter, &opts.search, render), !opts.no_clear);

        let wait = Duration::from_millis(session.next_wakeup_ms().saturating_sub(epoch_ms()));
        let event = tokio::select! {
            message = active.next_message() => WatchEvent::Message(message),
            _ = tokio::time::sleep(wait) => WatchEvent::Timer,
            _ = tokio::signal::ctrl_c() => WatchEvent::Quit,
        };

        match event {
            WatchEvent::Message(Ok(Some(message))) => {
                session.on_message(&message, epoch_ms());
            }
            WatchEvent::Message(Ok(None)) => {
                tracing::warn!("relay closed the panel port");
                port = None;
            }
            WatchEvent::Message(Err(e)) => {
                tracing::warn!("panel port failed: {e}");
                port = None;
            }
            WatchEvent::Timer => {}
            WatchEvent::Quit => break,
        }
    }

    Ok(())
}

fn draw(screen: &str, clear: bool) {
    if clear {
        // Clear screen + cursor home
        print!("\x1b[2J\x1b[H");
    }
    println!("{screen}");
}

/// Pure formatting of one frame, separated for testability.
pub(crate) fn format_screen(
    session: &PanelSession,
    filter: EventFilter,
    search: &str,
    render: RenderOptions,
) -> String {
    let mut out = format!("{} | {}\n\n", session.tab_id(), session.status());

    let groups = session.log().visible(filter, search);
    if groups.is_empty() {
        out.push_str("(no htmx events)\n");
    } else {
        out.push_str(&render_groups(&groups, render));
    }

    let notes = session.notes();
    if !notes.is_empty() {
        out.push('\n');
        for note in &notes[notes.len().saturating_sub(NOTES_SHOWN)..] {
            out.push_str(&note.text);
            out.push('\n');
        }
    }

    out.push_str("\nhxdbg watch - Ctrl-C to quit");
    out
}
