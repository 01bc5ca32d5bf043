//! Registry of live panel subscriptions, one per source id.

use std::collections::BTreeMap;

use hxdbg_core::types::{ChannelId, SourceId};

use crate::channel::PanelChannel;
use crate::liveness::LivenessTimer;

#[derive(Debug)]
pub struct Subscription<C> {
    pub source_id: SourceId,
    pub channel: C,
    pub created_at_ms: u64,
    /// Last time a liveness signal was delivered on this channel.
    pub last_liveness_at_ms: Option<u64>,
    pub(crate) timer: LivenessTimer,
}

impl<C: PanelChannel> Subscription<C> {
    pub fn new(source_id: SourceId, channel: C, liveness_period_ms: u64, now_ms: u64) -> Self {
        Self {
            source_id,
            channel,
            created_at_ms: now_ms,
            last_liveness_at_ms: None,
            timer: LivenessTimer::start(liveness_period_ms, now_ms),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel.id()
    }

    pub fn next_liveness_ms(&self) -> u64 {
        self.timer.next_due_ms()
    }
}

/// Keyed by source id; ordered so broadcasts are deterministic.
#[derive(Debug)]
pub struct SubscriptionRegistry<C> {
    entries: BTreeMap<SourceId, Subscription<C>>,
}

impl<C: PanelChannel> SubscriptionRegistry<C> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Install a subscription, returning the one it replaced (if any).
    /// The replaced subscription carries its liveness timer with it.
    pub fn install(&mut self, subscription: Subscription<C>) -> Option<Subscription<C>> {
        self.entries.insert(subscription.source_id, subscription)
    }

    /// Remove whichever subscription uses `channel_id`. Idempotent.
    pub fn remove_channel(&mut self, channel_id: ChannelId) -> Option<Subscription<C>> {
        let source_id = self
            .entries
            .values()
            .find(|s| s.channel_id() == channel_id)
            .map(|s| s.source_id)?;
        self.entries.remove(&source_id)
    }

    pub fn remove(&mut self, source_id: SourceId) -> Option<Subscription<C>> {
        self.entries.remove(&source_id)
    }

    pub fn get(&self, source_id: SourceId) -> Option<&Subscription<C>> {
        self.entries.get(&source_id)
    }

    pub fn get_mut(&mut self, source_id: SourceId) -> Option<&mut Subscription<C>> {
        self.entries.get_mut(&source_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription<C>> {
        self.entries.values()
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.entries.keys().copied().collect()
    }

    /// Source ids whose liveness signal is due at `now_ms`.
    pub fn due_liveness(&self, now_ms: u64) -> Vec<SourceId> {
        self.entries
            .values()
            .filter(|s| s.timer.is_due(now_ms))
            .map(|s| s.source_id)
            .collect()
    }

    pub fn earliest_liveness_ms(&self) -> Option<u64> {
        self.entries.values().map(|s| s.timer.next_due_ms()).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: PanelChannel> Default for SubscriptionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
