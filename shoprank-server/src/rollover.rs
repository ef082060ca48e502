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

//! Daily leaderboard rollover.
//!
//! Once a UTC day is over its daily bucket is rebuilt from the daily
//! metric rows, and a decayed share of it is carried into the next day's
//! bucket so that day does not start from zero.

use crate::error::{ServiceResult, ServiceError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shoprank_core::score::validate_decay_factor;
use shoprank_core::{RankingKeyGenerator, RankingScoreCalculator, RankingWeight, Score};
use shoprank_storage::{IdempotencyStore, MetricStore, RankingStore, StoreError, WeightStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RolloverSettings {
    pub carry_over_factor: Decimal,
    pub daily_ttl: Duration,
}

impl Default for RolloverSettings {
    fn default() -> Self {
        Self {
            carry_over_factor: dec!(0.1),
            daily_ttl: Duration::from_secs(48 * 3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloverOutcome {
    AlreadyHandled,
    Empty { daily_key: String },
    RolledOver {
        daily_key: String,
        next_key: String,
        products: usize,
    },
}

pub struct RankingRolloverService {
    metric_store: Arc<dyn MetricStore>,
    ranking_store: Arc<dyn RankingStore>,
    weight_store: Arc<dyn WeightStore>,
    idempotency_store: Arc<dyn IdempotencyStore>,
    keys: RankingKeyGenerator,
    settings: RolloverSettings,
}

impl RankingRolloverService {
    pub fn new(
        metric_store: Arc<dyn MetricStore>,
        ranking_store: Arc<dyn RankingStore>,
        weight_store: Arc<dyn WeightStore>,
        idempotency_store: Arc<dyn IdempotencyStore>,
        settings: RolloverSettings,
    ) -> ServiceResult<Self> {
        validate_decay_factor(settings.carry_over_factor)?;
        Ok(Self {
            metric_store,
            ranking_store,
            weight_store,
            idempotency_store,
            keys: RankingKeyGenerator::new(),
            settings,
        })
    }

    pub fn rollover_daily(&self, date: NaiveDate) -> ServiceResult<RolloverOutcome> {
        let idempotency_key = format!("rollover:{}", date);
        if self.idempotency_store.exists_by_key(&idempotency_key)? {
            return Ok(RolloverOutcome::AlreadyHandled);
        }

        let daily_key = self.keys.daily_key(date);
        let rows = self.metric_store.find_all_by_stat_date(date)?;
        if rows.is_empty() {
            self.mark_handled(&idempotency_key)?;
            return Ok(RolloverOutcome::Empty { daily_key });
        }

        let weight = RankingWeight::resolve(self.weight_store.find_latest());
        let calculator = RankingScoreCalculator::new(weight);
        let scores: HashMap<String, Score> = rows
            .iter()
            .map(|row| (row.product_id.to_string(), calculator.weighted_score(&row.counts())))
            .collect();

        self.ranking_store.replace_all(&daily_key, &scores)?;
        self.ranking_store
            .set_ttl(&daily_key, self.settings.daily_ttl)?;

        let next_key = self.keys.next_bucket_key(&daily_key)?;
        self.ranking_store
            .carry_over_scores(&daily_key, &next_key, self.settings.carry_over_factor)?;
        self.ranking_store
            .set_ttl(&next_key, self.settings.daily_ttl)?;

        self.mark_handled(&idempotency_key)?;

        tracing::info!(
            "Rolled over {} into {} ({} products)",
            daily_key,
            next_key,
            scores.len()
        );
        Ok(RolloverOutcome::RolledOver {
            daily_key,
            next_key,
            products: scores.len(),
        })
    }

    fn mark_handled(&self, key: &str) -> ServiceResult<()> {
        match self.idempotency_store.save(key) {
            Ok(()) | Err(StoreError::DuplicateKey(_)) => Ok(()),
            Err(e) => Err(ServiceError::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoprank_core::CountSnapshot;
    use shoprank_storage::{
        InMemoryIdempotencyStore, InMemoryMetricStore, InMemoryRankingStore, InMemoryWeightStore,
    };

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn setup() -> (Arc<InMemoryMetricStore>, Arc<InMemoryRankingStore>, RankingRolloverService) {
        let metrics = Arc::new(InMemoryMetricStore::new());
        let rankings = Arc::new(InMemoryRankingStore::new());
        let service = RankingRolloverService::new(
            metrics.clone(),
            rankings.clone(),
            Arc::new(InMemoryWeightStore::new()),
            Arc::new(InMemoryIdempotencyStore::new()),
            RolloverSettings::default(),
        )
        .unwrap();
        (metrics, rankings, service)
    }

    #[test]
    fn test_rollover_rebuilds_and_carries() {
        let (metrics, rankings, service) = setup();
        metrics
            .upsert_daily_add_delta(
                1,
                date(10),
                &CountSnapshot {
                    views: 100,
                    likes: 10,
                    order_count: 1,
                    order_amount: dec!(1000),
                    ..Default::default()
                },
            )
            .unwrap();
        rankings
            .increment_scores(
                "ranking:products:daily:20250311",
                &HashMap::from([("2".to_string(), Score::new(dec!(3)).unwrap())]),
            )
            .unwrap();

        let outcome = service.rollover_daily(date(10)).unwrap();
        assert_eq!(
            outcome,
            RolloverOutcome::RolledOver {
                daily_key: "ranking:products:daily:20250310".to_string(),
                next_key: "ranking:products:daily:20250311".to_string(),
                products: 1,
            }
        );

        let today = rankings.get_all_scores("ranking:products:daily:20250310").unwrap();
        assert_eq!(today["1"].value(), dec!(612.00));

        let tomorrow = rankings.get_all_scores("ranking:products:daily:20250311").unwrap();
        assert_eq!(tomorrow["1"].value(), dec!(61.20));
        assert_eq!(tomorrow["2"].value(), dec!(3));
        assert!(rankings.ttl("ranking:products:daily:20250311").is_some());
    }

    #[test]
    fn test_rollover_is_idempotent_per_date() {
        let (metrics, rankings, service) = setup();
        metrics
            .upsert_daily_add_delta(
                1,
                date(10),
                &CountSnapshot {
                    views: 10,
                    ..Default::default()
                },
            )
            .unwrap();

        service.rollover_daily(date(10)).unwrap();
        assert_eq!(
            service.rollover_daily(date(10)).unwrap(),
            RolloverOutcome::AlreadyHandled
        );

        let tomorrow = rankings.get_all_scores("ranking:products:daily:20250311").unwrap();
        assert_eq!(tomorrow["1"].value(), dec!(0.10));
    }

    #[test]
    fn test_empty_day() {
        let (_, rankings, service) = setup();
        assert_eq!(
            service.rollover_daily(date(1)).unwrap(),
            RolloverOutcome::Empty {
                daily_key: "ranking:products:daily:20250301".to_string()
            }
        );
        assert!(rankings.keys().is_empty());
    }
}
