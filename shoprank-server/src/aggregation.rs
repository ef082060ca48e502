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

//! Hot-path ranking aggregation
//!
//! `add` folds an event into the in-memory buffer with no I/O. `flush`
//! drains the buffer and writes the drained counts out in three steps:
//!
//! 1. hourly and daily metric rows, as add-deltas in chunks
//! 2. per-product score increments into each hourly ranking bucket
//! 3. TTL refresh on every touched bucket
//!
//! A batch that fails part way is parked with its progress and retried
//! by the next flush before anything new is drained, so no chunk or
//! bucket is applied twice.
//!
//! In log-normalized mode each paid order is scored inside `add` with the
//! weight resolved by the most recent flush (or at construction), and only
//! the summed per-order scores are buffered.

use crate::error::ServiceResult;
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use shoprank_core::{
    AggregationKey, CountSnapshot, RankingError, RankingEvent, RankingEventType,
    RankingScoreCalculator, RankingWeight, Score, ScoringMode,
};
use shoprank_storage::metric_buffer::amount_to_micros;
use shoprank_storage::{
    IdempotencyStore, MetricBatch, MetricBuffer, MetricStore, RankingStore, StoreError, WeightStore,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AggregationSettings {
    pub flush_chunk_size: usize,
    pub ranking_ttl: Duration,
    pub scoring_mode: ScoringMode,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            flush_chunk_size: 500,
            ranking_ttl: Duration::from_secs(25 * 3600),
            scoring_mode: ScoringMode::Weighted,
        }
    }
}

/// Summary of one `flush` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Batches fully written, including a retried pending batch.
    pub batches: usize,
    pub hourly_rows: usize,
    pub daily_rows: usize,
    /// Members incremented across all buckets.
    pub scored_members: usize,
    /// Members whose delta was zero or negative.
    pub skipped_members: usize,
    pub buckets: Vec<String>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.batches == 0
    }

    fn absorb(&mut self, other: FlushReport) {
        self.batches += other.batches;
        self.hourly_rows += other.hourly_rows;
        self.daily_rows += other.daily_rows;
        self.scored_members += other.scored_members;
        self.skipped_members += other.skipped_members;
        self.buckets.extend(other.buckets);
    }
}

/// A drained batch together with how much of it is already persisted.
#[derive(Debug)]
struct PendingBatch {
    id: Uuid,
    hourly: Vec<(AggregationKey, CountSnapshot)>,
    daily: Vec<(u64, NaiveDate, CountSnapshot)>,
    hourly_chunks_done: usize,
    daily_chunks_done: usize,
    /// Score deltas per bucket key, fixed once the weight is resolved.
    increments: Option<BTreeMap<String, HashMap<String, Score>>>,
    skipped_members: usize,
    incremented: HashSet<String>,
}

impl PendingBatch {
    fn new(batch: MetricBatch) -> Self {
        let mut hourly: Vec<(AggregationKey, CountSnapshot)> = batch.into_iter().collect();
        hourly.sort_by_key(|(key, _)| *key);

        let mut per_day: BTreeMap<(u64, NaiveDate), CountSnapshot> = BTreeMap::new();
        for (key, counts) in &hourly {
            *per_day
                .entry((key.product_id, key.hour_bucket.date_naive()))
                .or_default() += counts;
        }
        let daily = per_day
            .into_iter()
            .map(|((product_id, date), counts)| (product_id, date, counts))
            .collect();

        Self {
            id: Uuid::new_v4(),
            hourly,
            daily,
            hourly_chunks_done: 0,
            daily_chunks_done: 0,
            increments: None,
            skipped_members: 0,
            incremented: HashSet::new(),
        }
    }

    fn idempotency_key(&self) -> String {
        format!("flush:{}", self.id)
    }
}

pub struct RankingAggregationService {
    buffer: MetricBuffer,
    metric_store: Arc<dyn MetricStore>,
    ranking_store: Arc<dyn RankingStore>,
    weight_store: Arc<dyn WeightStore>,
    idempotency_store: Arc<dyn IdempotencyStore>,
    settings: AggregationSettings,
    /// Weight used to score orders on the hot path.
    current_weight: RwLock<RankingWeight>,
    /// Held for the whole flush; flushes never overlap.
    pending: Mutex<Option<PendingBatch>>,
}

impl RankingAggregationService {
    pub fn new(
        metric_store: Arc<dyn MetricStore>,
        ranking_store: Arc<dyn RankingStore>,
        weight_store: Arc<dyn WeightStore>,
        idempotency_store: Arc<dyn IdempotencyStore>,
        settings: AggregationSettings,
    ) -> Self {
        let current_weight = RankingWeight::resolve(weight_store.find_latest());
        Self {
            buffer: MetricBuffer::new(),
            metric_store,
            ranking_store,
            weight_store,
            idempotency_store,
            settings: AggregationSettings {
                flush_chunk_size: settings.flush_chunk_size.max(1),
                ..settings
            },
            current_weight: RwLock::new(current_weight),
            pending: Mutex::new(None),
        }
    }

    pub fn buffer(&self) -> &MetricBuffer {
        &self.buffer
    }

    /// Id of the parked batch awaiting retry, if any.
    pub fn pending_batch(&self) -> Option<Uuid> {
        self.pending.lock().as_ref().map(|b| b.id)
    }

    /// Record one event in the buffer. Never touches a store.
    pub fn add(&self, event: &RankingEvent) -> ServiceResult<()> {
        let key = AggregationKey::from(event);
        match event.event_type {
            RankingEventType::View => self.buffer.accumulate(key, |c| c.add_views(1)),
            RankingEventType::LikeCreated => self.buffer.accumulate(key, |c| c.add_likes(1)),
            RankingEventType::LikeCanceled => self.buffer.accumulate(key, |c| c.add_likes(-1)),
            RankingEventType::OrderPaid => {
                let amount = event.order_amount.unwrap_or(Decimal::ZERO);
                let micros = amount_to_micros(amount).ok_or(RankingError::NegativeOrderAmount {
                    product_id: event.product_id,
                    amount,
                })?;
                let score_micros = match self.settings.scoring_mode {
                    ScoringMode::Weighted => 0,
                    ScoringMode::LogNormalized => {
                        let calculator = RankingScoreCalculator::new(*self.current_weight.read());
                        amount_to_micros(calculator.order_amount_score(amount).value()).unwrap_or(0)
                    }
                };
                self.buffer.accumulate(key, |c| {
                    c.add_orders(1, micros);
                    c.add_order_score(score_micros);
                });
            }
        }
        Ok(())
    }

    /// Drain the buffer and persist it.
    ///
    /// A parked batch from an earlier failure is finished first. If that
    /// retry fails again nothing new is drained.
    pub fn flush(&self) -> ServiceResult<FlushReport> {
        let mut pending = self.pending.lock();
        let mut report = FlushReport::default();

        if let Some(batch) = pending.as_mut() {
            tracing::info!("Retrying pending flush batch {}", batch.id);
            report.absorb(self.persist(batch)?);
            *pending = None;
        }

        let drained = self.buffer.poll();
        if drained.is_empty() {
            return Ok(report);
        }

        let mut batch = PendingBatch::new(drained);
        match self.persist(&mut batch) {
            Ok(written) => {
                report.absorb(written);
                Ok(report)
            }
            Err(e) => {
                tracing::warn!("Flush of batch {} failed, parking for retry: {}", batch.id, e);
                *pending = Some(batch);
                Err(e)
            }
        }
    }

    fn persist(&self, batch: &mut PendingBatch) -> ServiceResult<FlushReport> {
        let chunk_size = self.settings.flush_chunk_size;

        for chunk in batch.hourly.chunks(chunk_size).skip(batch.hourly_chunks_done) {
            self.metric_store.upsert_add_deltas(chunk)?;
            batch.hourly_chunks_done += 1;
        }
        for chunk in batch.daily.chunks(chunk_size).skip(batch.daily_chunks_done) {
            self.metric_store.upsert_daily_add_deltas(chunk)?;
            batch.daily_chunks_done += 1;
        }

        if batch.increments.is_none() {
            let weight = RankingWeight::resolve(self.weight_store.find_latest());
            *self.current_weight.write() = weight;
            let (increments, skipped) = self.score_deltas(&batch.hourly, weight);
            batch.increments = Some(increments);
            batch.skipped_members = skipped;
        }

        let mut report = FlushReport {
            batches: 1,
            hourly_rows: batch.hourly.len(),
            daily_rows: batch.daily.len(),
            skipped_members: batch.skipped_members,
            ..Default::default()
        };

        if let Some(increments) = &batch.increments {
            for (bucket_key, deltas) in increments {
                if !batch.incremented.contains(bucket_key) {
                    self.ranking_store.increment_scores(bucket_key, deltas)?;
                    batch.incremented.insert(bucket_key.clone());
                }
                report.scored_members += deltas.len();
                report.buckets.push(bucket_key.clone());
            }
        }

        for bucket_key in &report.buckets {
            self.ranking_store
                .set_ttl(bucket_key, self.settings.ranking_ttl)?;
        }

        match self.idempotency_store.save(&batch.idempotency_key()) {
            Ok(()) | Err(StoreError::DuplicateKey(_)) => {}
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(
            "Flushed batch {}: {} hourly rows, {} members across {} buckets",
            batch.id,
            report.hourly_rows,
            report.scored_members,
            report.buckets.len()
        );
        Ok(report)
    }

    /// Group positive score deltas by hourly bucket key.
    fn score_deltas(
        &self,
        rows: &[(AggregationKey, CountSnapshot)],
        weight: RankingWeight,
    ) -> (BTreeMap<String, HashMap<String, Score>>, usize) {
        let calculator = RankingScoreCalculator::new(weight);
        let mut increments: BTreeMap<String, HashMap<String, Score>> = BTreeMap::new();
        let mut skipped = 0;

        for (key, counts) in rows {
            let score = Score::floored(calculator.delta(self.settings.scoring_mode, counts));
            if score.is_zero() {
                skipped += 1;
                continue;
            }
            increments
                .entry(key.bucket_key().to_string())
                .or_default()
                .insert(key.product_id.to_string(), score);
        }
        (increments, skipped)
    }
}
