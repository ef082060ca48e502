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

//! Background jobs driven by tokio intervals.
//!
//! Every job body is blocking store I/O, so each tick hands the work to
//! `spawn_blocking` and the loop only awaits the result.

use crate::aggregation::RankingAggregationService;
use crate::recalculation::{RankingWeightRecalculationService, RecalculationCommand};
use crate::rollover::RankingRolloverService;
use chrono::Duration as ChronoDuration;
use shoprank_core::{BucketKey, Clock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub flush_interval: Duration,
    pub recalculation_interval: Duration,
    pub rollover_check_interval: Duration,
}

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(
        config: SchedulerConfig,
        aggregation: Arc<RankingAggregationService>,
        recalculation: Arc<RankingWeightRecalculationService>,
        rollover: Arc<RankingRolloverService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);

        let handles = vec![
            tokio::spawn(flush_loop(
                aggregation,
                config.flush_interval,
                shutdown.subscribe(),
            )),
            tokio::spawn(recalculation_loop(
                recalculation,
                Arc::clone(&clock),
                config.recalculation_interval,
                shutdown.subscribe(),
            )),
            tokio::spawn(rollover_loop(
                rollover,
                clock,
                config.rollover_check_interval,
                shutdown.subscribe(),
            )),
        ];

        tracing::info!(
            "Scheduler started (flush every {:?}, recalculation every {:?})",
            config.flush_interval,
            config.recalculation_interval
        );
        Self { shutdown, handles }
    }

    /// Stop all loops and wait for any in-progress job to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Scheduler task ended abnormally: {}", e);
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn flush_loop(
    aggregation: Arc<RankingAggregationService>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let service = Arc::clone(&aggregation);
                match tokio::task::spawn_blocking(move || service.flush()).await {
                    Ok(Ok(report)) if !report.is_empty() => {
                        tracing::debug!(
                            "Flushed {} rows into {} buckets",
                            report.hourly_rows,
                            report.buckets.len()
                        );
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!("Scheduled flush failed: {}", e),
                    Err(e) => tracing::error!("Flush task panicked: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn recalculation_loop(
    recalculation: Arc<RankingWeightRecalculationService>,
    clock: Arc<dyn Clock>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = ticker(period);
    // The first tick fires immediately; skip it so a fresh start does not
    // rebuild a bucket before anything was flushed.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = clock.now();
                let command = RecalculationCommand::for_hour(
                    format!("scheduled:{}", BucketKey::hourly(now)),
                    now,
                );
                let service = Arc::clone(&recalculation);
                match tokio::task::spawn_blocking(move || service.recalculate(&command)).await {
                    Ok(Ok(outcome)) => tracing::debug!("Scheduled recalculation: {:?}", outcome),
                    Ok(Err(e)) => tracing::error!("Scheduled recalculation failed: {}", e),
                    Err(e) => tracing::error!("Recalculation task panicked: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn rollover_loop(
    rollover: Arc<RankingRolloverService>,
    clock: Arc<dyn Clock>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let yesterday = (clock.now() - ChronoDuration::days(1)).date_naive();
                let service = Arc::clone(&rollover);
                match tokio::task::spawn_blocking(move || service.rollover_daily(yesterday)).await {
                    Ok(Ok(outcome)) => tracing::debug!("Daily rollover check: {:?}", outcome),
                    Ok(Err(e)) => tracing::warn!("Daily rollover for {} failed: {}", yesterday, e),
                    Err(e) => tracing::error!("Rollover task panicked: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::AggregationSettings;
    use crate::recalculation::RecalculationSettings;
    use crate::rollover::RolloverSettings;
    use shoprank_core::{ManualClock, RankingEvent};
    use shoprank_storage::{
        InMemoryIdempotencyStore, InMemoryMetricStore, InMemoryRankingStore, InMemoryWeightStore,
        RankingStore,
    };

    #[tokio::test]
    async fn test_flush_loop_drains_buffer() {
        let metrics = Arc::new(InMemoryMetricStore::new());
        let rankings = Arc::new(InMemoryRankingStore::new());
        let weights = Arc::new(InMemoryWeightStore::new());
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new("2025-03-10T14:30:00Z".parse().unwrap()));

        let aggregation = Arc::new(RankingAggregationService::new(
            metrics.clone(),
            rankings.clone(),
            weights.clone(),
            idempotency.clone(),
            AggregationSettings::default(),
        ));
        let recalculation = Arc::new(
            RankingWeightRecalculationService::new(
                metrics.clone(),
                rankings.clone(),
                weights.clone(),
                idempotency.clone(),
                Arc::clone(&clock),
                RecalculationSettings::default(),
            )
            .unwrap(),
        );
        let rollover = Arc::new(
            RankingRolloverService::new(
                metrics.clone(),
                rankings.clone(),
                weights,
                idempotency,
                RolloverSettings::default(),
            )
            .unwrap(),
        );

        aggregation
            .add(&RankingEvent::view(1, "2025-03-10T14:10:00Z".parse().unwrap()))
            .unwrap();

        let scheduler = Scheduler::start(
            SchedulerConfig {
                flush_interval: Duration::from_millis(10),
                recalculation_interval: Duration::from_secs(3600),
                rollover_check_interval: Duration::from_secs(3600),
            },
            Arc::clone(&aggregation),
            recalculation,
            rollover,
            clock,
        );

        let mut flushed = false;
        for _ in 0..100 {
            if rankings.exists("ranking:products:hourly:2025031014").unwrap() {
                flushed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        scheduler.shutdown().await;

        assert!(flushed);
        assert!(aggregation.buffer().is_empty());
    }
}
