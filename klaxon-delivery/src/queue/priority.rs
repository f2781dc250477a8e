//! Three-tier priority queue with weighted-fair selection and aging.
//!
//! Each tier is FIFO. Dequeue first serves any tier head that has waited at
//! least the aging threshold (oldest first); otherwise it picks a tier by
//! smooth weighted round-robin over the non-empty tiers, so every backlogged
//! tier receives its weight share of dequeues.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use klaxon_common::Priority;

/// Dequeue weights for High, Medium and Low
pub const TIER_WEIGHTS: [i64; 3] = [5, 3, 1];

#[derive(Debug)]
struct Queued<T> {
    item: T,
    enqueued_at: Instant,
}

#[derive(Debug)]
pub struct PriorityQueue<T> {
    tiers: [VecDeque<Queued<T>>; 3],
    credit: [i64; 3],
    aging_threshold: Option<Duration>,
}

impl<T> PriorityQueue<T> {
    /// `aging_threshold` of `None` disables aging
    #[must_use]
    pub fn new(aging_threshold: Option<Duration>) -> Self {
        Self {
            tiers: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            credit: [0; 3],
            aging_threshold,
        }
    }

    pub fn push(&mut self, item: T, priority: Priority) {
        self.push_at(item, priority, Instant::now());
    }

    pub fn push_at(&mut self, item: T, priority: Priority, enqueued_at: Instant) {
        self.tiers[priority.index()].push_back(Queued { item, enqueued_at });
    }

    pub fn pop(&mut self) -> Option<(T, Priority)> {
        self.pop_at(Instant::now())
    }

    pub fn pop_at(&mut self, now: Instant) -> Option<(T, Priority)> {
        let tier = self.aged_tier(now).or_else(|| self.weighted_tier())?;
        let queued = self.tiers[tier].pop_front()?;

        if self.tiers[tier].is_empty() {
            self.credit[tier] = 0;
        }

        Some((queued.item, Priority::ALL[tier]))
    }

    /// Tier whose head has waited longest past the aging threshold
    fn aged_tier(&self, now: Instant) -> Option<usize> {
        let threshold = self.aging_threshold?;

        self.tiers
            .iter()
            .enumerate()
            .filter_map(|(tier, queue)| queue.front().map(|head| (tier, head.enqueued_at)))
            .filter(|(_, enqueued_at)| now.saturating_duration_since(*enqueued_at) >= threshold)
            .min_by_key(|(_, enqueued_at)| *enqueued_at)
            .map(|(tier, _)| tier)
    }

    /// Smooth weighted round-robin over non-empty tiers
    ///
    /// Ties go to the higher priority tier.
    fn weighted_tier(&mut self) -> Option<usize> {
        let mut total = 0;
        let mut best: Option<usize> = None;

        for tier in 0..self.tiers.len() {
            if self.tiers[tier].is_empty() {
                self.credit[tier] = 0;
                continue;
            }

            self.credit[tier] += TIER_WEIGHTS[tier];
            total += TIER_WEIGHTS[tier];

            if best.is_none_or(|b| self.credit[tier] > self.credit[b]) {
                best = Some(tier);
            }
        }

        let chosen = best?;
        self.credit[chosen] -= total;
        Some(chosen)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    #[must_use]
    pub fn len_of(&self, priority: Priority) -> usize {
        self.tiers[priority.index()].len()
    }

    /// Remove everything still queued, highest priority first
    pub fn drain(&mut self) -> Vec<T> {
        self.credit = [0; 3];
        self.tiers
            .iter_mut()
            .flat_map(|tier| tier.drain(..).map(|queued| queued.item))
            .collect()
    }
}
