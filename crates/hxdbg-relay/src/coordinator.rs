//! The relay coordinator: queue, registry, dispatch, liveness.
//!
//! One instance owns all relay state. Every mutation goes through a method
//! call made by the single task hosting it, which is what makes
//! "one subscription per source id, replace-and-release" safe without locks.
//!
//! Time comes from the injected [`Clock`]; the host decides *when* to call
//! [`Coordinator::run_tick`] and [`Coordinator::fire_liveness`] by sleeping
//! until [`Coordinator::next_wakeup_ms`].

use hxdbg_core::clock::Clock;
use hxdbg_core::config::RelayConfig;
use hxdbg_core::error::RelayError;
use hxdbg_core::types::{
    Ack, ChannelId, EventRecord, MessageClass, PanelMessage, PanelRequest, SourceId,
};

use crate::channel::PanelChannel;
use crate::dispatch::{self, ConsumeReason, Route};
use crate::queue::{PendingEntry, PendingQueue};
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::reply::ReplyHandle;
use crate::stats::RelayStats;

/// Summary of one drain tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub processed: usize,
    /// Panel messages delivered (a broadcast counts once per channel).
    pub delivered: usize,
    pub consumed: usize,
    pub errors: usize,
    /// Entries left in the queue after the tick.
    pub remaining: usize,
    /// When the next tick should run, if the queue is not empty.
    pub next_tick_at_ms: Option<u64>,
}

enum Outcome {
    Delivered(usize),
    Consumed,
}

pub struct Coordinator<C, K> {
    config: RelayConfig,
    clock: K,
    queue: PendingQueue,
    registry: SubscriptionRegistry<C>,
    stats: RelayStats,
    next_tick_at_ms: Option<u64>,
}

impl<C: PanelChannel, K: Clock> Coordinator<C, K> {
    pub fn new(config: RelayConfig, clock: K) -> Self {
        Self {
            queue: PendingQueue::new(config.queue_capacity),
            registry: SubscriptionRegistry::new(),
            stats: RelayStats::default(),
            next_tick_at_ms: None,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry<C> {
        &self.registry
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Enqueue a record for asynchronous processing.
    ///
    /// Never refuses the new record: a full queue evicts its oldest entry,
    /// whose reply is acknowledged with [`Ack::DROPPED`]. `reply` itself
    /// fires when the record is processed.
    pub fn submit(&mut self, record: EventRecord, source_id: Option<SourceId>, reply: ReplyHandle) {
        let now = self.clock.now_ms();
        if let Some(evicted) = self.queue.push(record, source_id, reply, now) {
            self.stats.dropped_total += 1;
            tracing::warn!(
                "message queue full ({}), dropping oldest message seq={} kind={}",
                self.queue.capacity(),
                evicted.seq,
                evicted.record.kind
            );
            evicted.reply.ack(Ack::DROPPED);
        }
        if self.next_tick_at_ms.is_none() {
            self.next_tick_at_ms = Some(now);
        }
    }

    /// Install (or replace) the subscription for `source_id` and start its
    /// liveness timer. A replaced subscription is released together with
    /// its timer before this returns.
    pub fn subscribe(&mut self, source_id: SourceId, channel: C) {
        let now = self.clock.now_ms();
        let channel_id = channel.id();
        let subscription =
            Subscription::new(source_id, channel, self.config.liveness_period_ms, now);

        match self.registry.install(subscription) {
            Some(previous) if previous.channel_id() != channel_id => {
                tracing::info!(
                    "panel for {source_id} moved from {} to {channel_id}",
                    previous.channel_id()
                );
            }
            Some(_) => tracing::debug!("panel for {source_id} re-initialized on {channel_id}"),
            None => tracing::info!("panel connected for {source_id} on {channel_id}"),
        }
    }

    /// Remove the subscription using `channel_id`, if any. Called when the
    /// transport reports the channel closed; a no-op for unknown channels.
    pub fn unsubscribe(&mut self, channel_id: ChannelId) -> Option<SourceId> {
        let removed = self.registry.remove_channel(channel_id)?;
        tracing::info!("panel disconnected for {}", removed.source_id);
        Some(removed.source_id)
    }

    /// Handle a request a panel sent over its own channel.
    pub fn on_panel_request(&mut self, channel: C, request: PanelRequest) {
        match request {
            PanelRequest::Init { tab_id } => self.subscribe(tab_id, channel),
            PanelRequest::Test { tab_id, data } => {
                tracing::debug!("test request from panel for {tab_id}: {data}");
            }
        }
    }

    // ── Processing ───────────────────────────────────────────────

    pub fn is_tick_due(&self, now_ms: u64) -> bool {
        self.next_tick_at_ms.is_some_and(|at| now_ms >= at)
    }

    /// Drain queued entries in arrival order, bounded by
    /// `batch_max` entries and `tick_budget_ms` of wall-clock time.
    pub fn run_tick(&mut self) -> TickReport {
        let started = self.clock.now_ms();
        let mut report = TickReport::default();

        while report.processed < self.config.batch_max {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };

            match self.process_entry(entry) {
                Ok(Outcome::Delivered(n)) => report.delivered += n,
                Ok(Outcome::Consumed) => {
                    report.consumed += 1;
                    self.stats.consumed_total += 1;
                }
                Err(err) => {
                    report.errors += 1;
                    self.stats.errors_total += 1;
                    tracing::error!("error processing message: {err}");
                    self.report_error(&err);
                }
            }
            report.processed += 1;
            self.stats.processed += 1;
            self.stats.processed_total += 1;

            if self.clock.now_ms().saturating_sub(started) >= self.config.tick_budget_ms {
                break;
            }
        }

        report.remaining = self.queue.len();
        self.next_tick_at_ms = (report.remaining > 0).then(|| {
            self.clock
                .now_ms()
                .saturating_add(self.config.reschedule_delay_ms)
        });
        report.next_tick_at_ms = self.next_tick_at_ms;

        if report.processed > 0 {
            tracing::debug!(
                "processed {} messages, total messages: {}",
                report.processed,
                self.stats.processed
            );
        }
        report
    }

    fn process_entry(&mut self, entry: PendingEntry) -> Result<Outcome, RelayError> {
        let PendingEntry {
            record,
            source_id,
            reply,
            ..
        } = entry;
        let class = record.class();
        let outcome = self.dispatch(record, source_id);

        // Acknowledge even when dispatch failed so the sender never times out.
        reply.ack(if class == MessageClass::LivenessProbe {
            Ack::ALIVE
        } else {
            Ack::PROCESSED
        });
        outcome
    }

    fn dispatch(
        &mut self,
        record: EventRecord,
        source_id: Option<SourceId>,
    ) -> Result<Outcome, RelayError> {
        match dispatch::route(record.class(), source_id) {
            Route::Consume(ConsumeReason::SelfTest) => {
                tracing::debug!(
                    "received {} from {}",
                    record.kind,
                    origin(&record, source_id)
                );
                Ok(Outcome::Consumed)
            }
            Route::Consume(ConsumeReason::LivenessProbe) => {
                tracing::trace!("liveness probe from {}", origin(&record, source_id));
                Ok(Outcome::Consumed)
            }
            Route::ToSource(id, shape) => {
                let Some(subscription) = self.registry.get(id) else {
                    tracing::debug!("{id} not found in connection list, dropping {}", record.kind);
                    return Ok(Outcome::Consumed);
                };
                let message = dispatch::shape(record, shape, Some(id))?;
                let posted = subscription.channel.post(&message);
                if let Err(err) = posted {
                    self.purge(id);
                    return Err(err.into());
                }
                Ok(Outcome::Delivered(1))
            }
            Route::Broadcast(shape) => {
                let message = dispatch::shape(record, shape, None)?;
                Ok(Outcome::Delivered(self.broadcast(&message)))
            }
        }
    }

    /// Post to every live subscription; channels that fail are purged.
    fn broadcast(&mut self, message: &PanelMessage) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();
        for subscription in self.registry.iter() {
            match subscription.channel.post(message) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::debug!("broadcast to {} failed: {err}", subscription.source_id);
                    failed.push(subscription.source_id);
                }
            }
        }
        for id in failed {
            self.purge(id);
        }
        delivered
    }

    fn purge(&mut self, source_id: SourceId) {
        if self.registry.remove(source_id).is_some() {
            self.stats.purged_total += 1;
            tracing::warn!("purged subscription for {source_id}: channel is gone");
        }
    }

    /// Surface a processing error to every live subscription.
    pub fn report_error(&mut self, err: &RelayError) {
        let message = PanelMessage::Error {
            error: err.to_string(),
            stack: None,
        };
        self.broadcast(&message);
    }

    // ── Liveness ─────────────────────────────────────────────────

    /// Send the liveness signal on every due subscription. Subscriptions
    /// whose channel is gone are purged; their source ids are returned.
    pub fn fire_liveness(&mut self) -> Vec<SourceId> {
        let now = self.clock.now_ms();
        let mut gone = Vec::new();

        for id in self.registry.due_liveness(now) {
            let Some(subscription) = self.registry.get_mut(id) else {
                continue;
            };
            match subscription.channel.post(&PanelMessage::Heartbeat) {
                Ok(()) => {
                    subscription.last_liveness_at_ms = Some(now);
                    subscription.timer.rearm(now);
                }
                Err(err) => {
                    tracing::debug!("liveness signal to {id} failed: {err}");
                    gone.push(id);
                }
            }
        }

        for &id in &gone {
            self.purge(id);
        }
        gone
    }

    /// Earliest instant at which a tick or a liveness signal is due.
    pub fn next_wakeup_ms(&self) -> Option<u64> {
        [self.next_tick_at_ms, self.registry.earliest_liveness_ms()]
            .into_iter()
            .flatten()
            .min()
    }

    // ── Maintenance ──────────────────────────────────────────────

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            queue_len: self.queue.len(),
            oldest_queued_ms: self.queue.oldest_age_ms(self.clock.now_ms()),
            subscriptions: self.registry.len(),
            ..self.stats.clone()
        }
    }

    pub fn reset_counter(&mut self) -> u64 {
        let previous = self.stats.reset_counter();
        tracing::info!("resetting message counter, previous count: {previous}");
        previous
    }

    /// Tear down: acknowledge every queued entry as dropped and release all
    /// subscriptions. Returns the number of entries discarded.
    pub fn shutdown(&mut self) -> usize {
        let mut discarded = 0;
        while let Some(entry) = self.queue.pop_front() {
            entry.reply.ack(Ack::DROPPED);
            discarded += 1;
        }
        for id in self.registry.source_ids() {
            self.registry.remove(id);
        }
        self.next_tick_at_ms = None;
        discarded
    }
}

fn origin(record: &EventRecord, source_id: Option<SourceId>) -> String {
    match source_id {
        Some(id) => id.to_string(),
        None if record.source_tag.is_empty() => "unattached sender".to_owned(),
        None => record.source_tag.clone(),
    }
}
