// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Cold-path ranking recalculation
//!
//! Rebuilds an hourly leaderboard from durable metric rows:
//!
//! ```text
//! combined(p) = weighted(current(p)) + weighted(previous(p)) × decay
//! ```
//!
//! The rebuilt set replaces the live bucket in one step, which corrects
//! any drift left by incremental flushes. If the next hour's bucket has
//! already been created it is replaced with `combined × decay` so the new
//! hour does not start cold.

use crate::error::{ServiceError, ServiceResult};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shoprank_core::score::validate_decay_factor;
use shoprank_core::{
    BucketKey, Clock, ProductHourlyMetric, RankingScoreCalculator, RankingWeight, RetryPolicy, Score,
};
use shoprank_storage::{IdempotencyStore, MetricStore, RankingStore, StoreError, WeightStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Trigger for one recalculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecalculationCommand {
    pub event_id: String,
    /// Hour to rebuild; the clock's current hour when absent.
    pub target_hour: Option<DateTime<Utc>>,
}

impl RecalculationCommand {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            target_hour: None,
        }
    }

    pub fn for_hour(event_id: impl Into<String>, hour: DateTime<Utc>) -> Self {
        Self {
            event_id: event_id.into(),
            target_hour: Some(hour),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("recalc:{}", self.event_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecalculationOutcome {
    /// The event id was already processed.
    AlreadyHandled,
    /// Another caller is processing the same event id right now.
    InFlight,
    /// No rows for either hour; nothing was written.
    NoMetrics { bucket_key: String },
    Recalculated {
        bucket_key: String,
        products: usize,
        next_bucket_primed: bool,
    },
}

#[derive(Debug, Clone)]
pub struct RecalculationSettings {
    pub decay_factor: Decimal,
    pub retry: RetryPolicy,
    pub ranking_ttl: Duration,
}

impl Default for RecalculationSettings {
    fn default() -> Self {
        Self {
            decay_factor: dec!(0.1),
            retry: RetryPolicy::exponential(),
            ranking_ttl: Duration::from_secs(25 * 3600),
        }
    }
}

pub struct RankingWeightRecalculationService {
    metric_store: Arc<dyn MetricStore>,
    ranking_store: Arc<dyn RankingStore>,
    weight_store: Arc<dyn WeightStore>,
    idempotency_store: Arc<dyn IdempotencyStore>,
    clock: Arc<dyn Clock>,
    settings: RecalculationSettings,
    in_flight: DashMap<String, ()>,
}

/// Releases an in-flight claim on drop.
struct InFlightClaim<'a> {
    in_flight: &'a DashMap<String, ()>,
    event_id: String,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.event_id);
    }
}

impl RankingWeightRecalculationService {
    pub fn new(
        metric_store: Arc<dyn MetricStore>,
        ranking_store: Arc<dyn RankingStore>,
        weight_store: Arc<dyn WeightStore>,
        idempotency_store: Arc<dyn IdempotencyStore>,
        clock: Arc<dyn Clock>,
        settings: RecalculationSettings,
    ) -> ServiceResult<Self> {
        validate_decay_factor(settings.decay_factor)?;
        Ok(Self {
            metric_store,
            ranking_store,
            weight_store,
            idempotency_store,
            clock,
            settings,
            in_flight: DashMap::new(),
        })
    }

    pub fn recalculate(&self, command: &RecalculationCommand) -> ServiceResult<RecalculationOutcome> {
        let Some(_claim) = self.claim(&command.event_id) else {
            tracing::debug!("Recalculation {} already in flight", command.event_id);
            return Ok(RecalculationOutcome::InFlight);
        };

        let idempotency_key = command.idempotency_key();
        if self.idempotency_store.exists_by_key(&idempotency_key)? {
            tracing::debug!("Recalculation {} already handled", command.event_id);
            return Ok(RecalculationOutcome::AlreadyHandled);
        }

        let weight = RankingWeight::resolve(self.weight_store.find_latest());
        let calculator = RankingScoreCalculator::new(weight);

        let hour = command.target_hour.unwrap_or_else(|| self.clock.now());
        let current = BucketKey::hourly(hour);
        let previous = current.previous()?;

        let current_rows = self.metric_store.find_all_by_stat_hour(current.start())?;
        let previous_rows = self.metric_store.find_all_by_stat_hour(previous.start())?;
        let bucket_key = current.to_string();

        if current_rows.is_empty() && previous_rows.is_empty() {
            tracing::info!("No metrics for {} or the hour before, skipping", bucket_key);
            self.mark_handled(&idempotency_key)?;
            return Ok(RecalculationOutcome::NoMetrics { bucket_key });
        }

        let combined = self.combine(&calculator, &current_rows, &previous_rows)?;
        self.replace_with_retry(&bucket_key, &combined)?;
        self.ranking_store
            .set_ttl(&bucket_key, self.settings.ranking_ttl)?;

        let next_key = current.next()?.to_string();
        let next_bucket_primed = if self.ranking_store.exists(&next_key)? {
            let primed = decayed(&combined, self.settings.decay_factor)?;
            self.replace_with_retry(&next_key, &primed)?;
            self.ranking_store
                .set_ttl(&next_key, self.settings.ranking_ttl)?;
            true
        } else {
            false
        };

        self.mark_handled(&idempotency_key)?;

        tracing::info!(
            "Recalculated {} ({} products, next bucket primed: {})",
            bucket_key,
            combined.len(),
            next_bucket_primed
        );
        Ok(RecalculationOutcome::Recalculated {
            bucket_key,
            products: combined.len(),
            next_bucket_primed,
        })
    }

    fn claim(&self, event_id: &str) -> Option<InFlightClaim<'_>> {
        match self.in_flight.entry(event_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightClaim {
                    in_flight: &self.in_flight,
                    event_id: event_id.to_string(),
                })
            }
        }
    }

    fn combine(
        &self,
        calculator: &RankingScoreCalculator,
        current: &[ProductHourlyMetric],
        previous: &[ProductHourlyMetric],
    ) -> ServiceResult<HashMap<String, Score>> {
        let mut combined: HashMap<String, Score> = HashMap::new();

        for row in current {
            let score = calculator.weighted_score(&row.counts());
            let entry = combined.entry(row.product_id.to_string()).or_insert(Score::ZERO);
            *entry = *entry + score;
        }
        for row in previous {
            let carried = calculator
                .weighted_score(&row.counts())
                .apply_decay(self.settings.decay_factor)?;
            let entry = combined.entry(row.product_id.to_string()).or_insert(Score::ZERO);
            *entry = *entry + carried;
        }
        Ok(combined)
    }

    fn replace_with_retry(&self, key: &str, scores: &HashMap<String, Score>) -> ServiceResult<()> {
        self.settings
            .retry
            .retry(
                "replace ranking bucket",
                || self.ranking_store.replace_all(key, scores),
                StoreError::is_transient,
            )
            .map_err(ServiceError::from)
    }

    /// Persist the idempotency key; losing a race to another writer is fine.
    fn mark_handled(&self, key: &str) -> ServiceResult<()> {
        match self.idempotency_store.save(key) {
            Ok(()) => Ok(()),
            Err(StoreError::DuplicateKey(_)) => {
                tracing::debug!("Idempotency key {} saved concurrently", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn decayed(scores: &HashMap<String, Score>, factor: Decimal) -> ServiceResult<HashMap<String, Score>> {
    scores
        .iter()
        .map(|(member, score)| -> ServiceResult<(String, Score)> {
            Ok((member.clone(), score.apply_decay(factor)?))
        })
        .collect()
}
