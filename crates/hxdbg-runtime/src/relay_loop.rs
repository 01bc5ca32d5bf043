//! Relay loop: one tokio task owns the coordinator.
//!
//! Connection tasks talk to it over an mpsc command channel, so every
//! queue, registry, and timer mutation happens on this task. Between
//! commands the loop sleeps until the coordinator's next tick or liveness
//! deadline, and runs the periodic maintenance alarms.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant, interval_at};

use hxdbg_core::clock::{Clock, SystemClock};
use hxdbg_core::config::RelayConfig;
use hxdbg_core::types::{Ack, ChannelId, PanelRequest, Submission};
use hxdbg_relay::{Coordinator, RelayStats, ReplyHandle};

use crate::channel::SocketChannel;
use crate::server;

/// Upper bound on a single idle sleep; commands wake the loop earlier.
const IDLE_WAKE_MS: u64 = 60_000;
const COMMAND_BUFFER: usize = 1_024;

pub enum RelayCommand {
    Submit {
        submission: Submission,
        reply: oneshot::Sender<Ack>,
    },
    Panel {
        channel: SocketChannel,
        request: PanelRequest,
    },
    Unsubscribe(ChannelId),
    Stats(oneshot::Sender<RelayStats>),
    Shutdown(oneshot::Sender<usize>),
}

/// Cloneable front door to the relay task.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
    next_channel: Arc<AtomicU64>,
}

impl RelayHandle {
    pub fn next_channel_id(&self) -> ChannelId {
        ChannelId(self.next_channel.fetch_add(1, Ordering::Relaxed))
    }

    /// Queue a submission and wait for its acknowledgement.
    pub async fn submit(&self, submission: Submission) -> anyhow::Result<Ack> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::Submit { submission, reply }).await?;
        Ok(rx.await.unwrap_or(Ack::DROPPED))
    }

    pub async fn panel_request(
        &self,
        channel: SocketChannel,
        request: PanelRequest,
    ) -> anyhow::Result<()> {
        self.send(RelayCommand::Panel { channel, request }).await
    }

    pub async fn unsubscribe(&self, channel_id: ChannelId) -> anyhow::Result<()> {
        self.send(RelayCommand::Unsubscribe(channel_id)).await
    }

    pub async fn stats(&self) -> anyhow::Result<RelayStats> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::Stats(reply)).await?;
        Ok(rx.await?)
    }

    /// Stop the loop. Returns the number of queued entries discarded.
    pub async fn shutdown(&self) -> anyhow::Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::Shutdown(reply)).await?;
        Ok(rx.await?)
    }

    async fn send(&self, command: RelayCommand) -> anyhow::Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("relay loop is not running"))
    }
}

/// Spawn the relay task on the wall clock.
pub fn spawn(config: RelayConfig) -> (RelayHandle, tokio::task::JoinHandle<()>) {
    spawn_with_clock(config, SystemClock)
}

pub fn spawn_with_clock<K>(
    config: RelayConfig,
    clock: K,
) -> (RelayHandle, tokio::task::JoinHandle<()>)
where
    K: Clock + Send + 'static,
{
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = RelayHandle {
        tx,
        next_channel: Arc::new(AtomicU64::new(1)),
    };
    let task = tokio::spawn(run_relay_loop(Coordinator::new(config, clock), rx));
    (handle, task)
}

/// Run the relay: coordinator task plus UDS server, until ctrl-c or SIGTERM.
pub async fn run_relay(config: RelayConfig, socket_path: &str) -> anyhow::Result<()> {
    let (relay, relay_task) = spawn(config);
    let listener = server::bind(socket_path).await?;

    let server_relay = relay.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, server_relay).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => tokio::select! {
                    _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                },
                Err(e) => {
                    tracing::warn!("cannot register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                    tracing::info!("received ctrl-c, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    if let Ok(stats) = relay.stats().await {
        log_stats(&stats);
    }
    if let Err(e) = relay.shutdown().await {
        tracing::warn!("relay loop already gone: {e}");
    }
    let _ = relay_task.await;

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("relay stopped");
    Ok(())
}

async fn run_relay_loop<K: Clock>(
    mut coordinator: Coordinator<SocketChannel, K>,
    mut rx: mpsc::Receiver<RelayCommand>,
) {
    let config = coordinator.config().clone();
    let mut keep_alive = alarm(config.keep_alive_interval_ms);
    let mut stats_log = alarm(config.stats_log_interval_ms);
    let mut counter_reset = alarm(config.counter_reset_interval_ms);

    tracing::info!(
        "relay loop started (queue capacity {}, batch {}, liveness every {}ms)",
        config.queue_capacity,
        config.batch_max,
        config.liveness_period_ms
    );

    loop {
        let now = coordinator.clock().now_ms();
        let wake_at = coordinator
            .next_wakeup_ms()
            .unwrap_or_else(|| now.saturating_add(IDLE_WAKE_MS));
        let sleep = tokio::time::sleep(Duration::from_millis(wake_at.saturating_sub(now)));

        tokio::select! {
            command = rx.recv() => match command {
                Some(command) => {
                    if handle_command(&mut coordinator, command).is_break() {
                        return;
                    }
                }
                None => break,
            },
            () = sleep => {}
            _ = keep_alive.tick() => tracing::debug!("keep-alive ping"),
            _ = stats_log.tick() => log_stats(&coordinator.stats()),
            _ = counter_reset.tick() => {
                coordinator.reset_counter();
            }
        }

        let now = coordinator.clock().now_ms();
        if coordinator.is_tick_due(now) {
            let report = coordinator.run_tick();
            tracing::trace!(
                "tick: processed={} delivered={} consumed={} errors={} remaining={}",
                report.processed,
                report.delivered,
                report.consumed,
                report.errors,
                report.remaining
            );
        }
        let gone = coordinator.fire_liveness();
        if !gone.is_empty() {
            tracing::debug!("liveness purged {} subscriptions", gone.len());
        }
    }

    let discarded = coordinator.shutdown();
    tracing::info!("relay command channel closed, {discarded} queued messages dropped");
}

fn handle_command<K: Clock>(
    coordinator: &mut Coordinator<SocketChannel, K>,
    command: RelayCommand,
) -> ControlFlow<()> {
    match command {
        RelayCommand::Submit { submission, reply } => {
            let reply = ReplyHandle::new(move |ack| {
                let _ = reply.send(ack);
            });
            coordinator.submit(submission.message, submission.tab_id, reply);
        }
        RelayCommand::Panel { channel, request } => coordinator.on_panel_request(channel, request),
        RelayCommand::Unsubscribe(channel_id) => {
            coordinator.unsubscribe(channel_id);
        }
        RelayCommand::Stats(reply) => {
            let _ = reply.send(coordinator.stats());
        }
        RelayCommand::Shutdown(reply) => {
            let discarded = coordinator.shutdown();
            tracing::info!("relay loop stopping, {discarded} queued messages dropped");
            let _ = reply.send(discarded);
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

fn alarm(period_ms: u64) -> tokio::time::Interval {
    let period = Duration::from_millis(period_ms.max(1));
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    timer
}

fn log_stats(stats: &RelayStats) {
    tracing::info!(
        "relay stats: processed={} total={} dropped={} errors={} queue={} oldest={}ms panels={}",
        stats.processed,
        stats.processed_total,
        stats.dropped_total,
        stats.errors_total,
        stats.queue_len,
        stats.oldest_queued_ms.unwrap_or(0),
        stats.subscriptions
    );
}
