// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Metric Buffer - lock-free pre-aggregation of ranking events
//!
//! Events are folded into per-(product, hour) atomic counters between
//! flushes. A flush drains the buffer with [`MetricBuffer::poll`], which
//! swaps in a fresh generation and hands back the old one.
//!
//! ## Concurrency
//! ```text
//! RwLock<Arc<DashMap>>      (guards only the generation pointer)
//! ├── accumulate: read lock → clone Arc → release → mutate atomics
//! └── poll:       write lock → swap Arc → release → wait for clones → drain
//! ```
//!
//! Writers never hold the pointer lock while mutating, so different keys
//! never contend and same-key writers only meet on the atomics. `poll`
//! reads the drained generation only once it holds the last reference,
//! so every increment lands in exactly one batch.

use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use shoprank_core::{AggregationKey, CountSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Drained contents of one buffer generation.
pub type MetricBatch = HashMap<AggregationKey, CountSnapshot>;

type Generation = DashMap<AggregationKey, MutableCounts>;

const MICROS_PER_UNIT: i64 = 1_000_000;

/// Convert a non-negative amount to integer micro-units.
///
/// Digits beyond the sixth decimal place are truncated. Returns `None`
/// for negative or overflowing amounts.
pub fn amount_to_micros(amount: Decimal) -> Option<u64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return None;
    }
    amount
        .checked_mul(Decimal::from(MICROS_PER_UNIT))?
        .trunc()
        .to_u64()
}

pub fn micros_to_amount(micros: u64) -> Decimal {
    Decimal::from_i128_with_scale(micros as i128, 6).normalize()
}

/// Concurrently mutated counters for one aggregation key.
#[derive(Debug, Default)]
pub struct MutableCounts {
    views: AtomicI64,
    likes: AtomicI64,
    order_count: AtomicI64,
    order_amount_micros: AtomicU64,
    order_score_micros: AtomicU64,
}

impl MutableCounts {
    #[inline]
    pub fn add_views(&self, delta: i64) {
        self.views.fetch_add(delta, Ordering::Relaxed);
    }

    /// Likes may go negative when cancellations outnumber creations.
    #[inline]
    pub fn add_likes(&self, delta: i64) {
        self.likes.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_orders(&self, count: i64, amount_micros: u64) {
        self.order_count.fetch_add(count, Ordering::Relaxed);
        self.order_amount_micros
            .fetch_add(amount_micros, Ordering::Relaxed);
    }

    /// Per-order score already computed by the caller, in micro-units.
    #[inline]
    pub fn add_order_score(&self, score_micros: u64) {
        self.order_score_micros
            .fetch_add(score_micros, Ordering::Relaxed);
    }

    /// Fold an already drained snapshot back in.
    pub fn merge(&self, counts: &CountSnapshot) {
        self.add_views(counts.views);
        self.add_likes(counts.likes);
        self.add_orders(
            counts.order_count,
            amount_to_micros(counts.order_amount).unwrap_or(0),
        );
        self.add_order_score(amount_to_micros(counts.order_score).unwrap_or(0));
    }

    /// Read the counters without blocking concurrent writers.
    pub fn snapshot(&self) -> CountSnapshot {
        CountSnapshot {
            views: self.views.load(Ordering::Relaxed),
            likes: self.likes.load(Ordering::Relaxed),
            order_count: self.order_count.load(Ordering::Relaxed),
            order_amount: micros_to_amount(self.order_amount_micros.load(Ordering::Relaxed)),
            order_score: micros_to_amount(self.order_score_micros.load(Ordering::Relaxed)),
        }
    }
}

/// Buffer counters since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub accumulated: u64,
    pub polls: u64,
    pub drained_keys: u64,
    pub requeued_keys: u64,
}

#[derive(Debug, Default)]
struct AtomicBufferStats {
    accumulated: AtomicU64,
    polls: AtomicU64,
    drained_keys: AtomicU64,
    requeued_keys: AtomicU64,
}

#[derive(Debug)]
pub struct MetricBuffer {
    generation: RwLock<Arc<Generation>>,
    stats: AtomicBufferStats,
}

impl MetricBuffer {
    pub fn new() -> Self {
        Self {
            generation: RwLock::new(Arc::new(DashMap::new())),
            stats: AtomicBufferStats::default(),
        }
    }

    /// Apply `mutator` to the counters for `key`, creating them on first use.
    pub fn accumulate<F>(&self, key: AggregationKey, mutator: F)
    where
        F: FnOnce(&MutableCounts),
    {
        let map = Arc::clone(&*self.generation.read());

        if let Some(counts) = map.get(&key) {
            mutator(&counts);
        } else {
            let counts = map.entry(key).or_default();
            mutator(&counts);
        }

        self.stats.accumulated.fetch_add(1, Ordering::Relaxed);
    }

    /// Drain the buffer, returning everything accumulated since the last poll.
    pub fn poll(&self) -> MetricBatch {
        let drained = {
            let mut generation = self.generation.write();
            std::mem::replace(&mut *generation, Arc::new(DashMap::new()))
        };

        let batch: MetricBatch = wait_for_writers(drained)
            .into_iter()
            .map(|(key, counts)| (key, counts.snapshot()))
            .collect();

        self.stats.polls.fetch_add(1, Ordering::Relaxed);
        self.stats
            .drained_keys
            .fetch_add(batch.len() as u64, Ordering::Relaxed);

        if !batch.is_empty() {
            tracing::debug!("Drained {} buffered keys", batch.len());
        }
        batch
    }

    /// Copy the current contents without draining.
    pub fn snapshot(&self) -> MetricBatch {
        let map = Arc::clone(&*self.generation.read());
        map.iter()
            .map(|entry| (*entry.key(), entry.value().snapshot()))
            .collect()
    }

    /// Merge a drained batch back into the live generation.
    pub fn requeue(&self, batch: MetricBatch) {
        let keys = batch.len() as u64;
        for (key, counts) in batch {
            self.accumulate(key, |c| c.merge(&counts));
        }
        self.stats.requeued_keys.fetch_add(keys, Ordering::Relaxed);
    }

    /// Number of distinct buffered keys.
    pub fn size(&self) -> usize {
        self.generation.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            accumulated: self.stats.accumulated.load(Ordering::Relaxed),
            polls: self.stats.polls.load(Ordering::Relaxed),
            drained_keys: self.stats.drained_keys.load(Ordering::Relaxed),
            requeued_keys: self.stats.requeued_keys.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Spin until every writer that cloned `shared` before the swap is done.
fn wait_for_writers(mut shared: Arc<Generation>) -> Generation {
    loop {
        match Arc::try_unwrap(shared) {
            Ok(map) => return map,
            Err(still_shared) => {
                shared = still_shared;
                std::thread::yield_now();
            }
        }
    }
}
