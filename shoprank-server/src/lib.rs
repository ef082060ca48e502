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

//! ShopRank Server
//!
//! Wires the ranking services to their stores and drives them:
//! NDJSON ingestion workers feed the hot path, and tokio interval loops
//! run flush, recalculation and daily rollover.

pub mod aggregation;
pub mod config;
pub mod error;
pub mod recalculation;
pub mod rollover;
pub mod scheduler;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use shoprank_core::{BucketKey, Clock, RankingEvent, Score, SystemClock};
use shoprank_storage::{
    BufferStats, IdempotencyStore, InMemoryIdempotencyStore, InMemoryMetricStore,
    InMemoryRankingStore, InMemoryWeightStore, MetricStore, RankingStore, WeightStore,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use aggregation::{AggregationSettings, FlushReport, RankingAggregationService};
pub use config::ShopRankConfig;
pub use error::{ServiceError, ServiceResult};
pub use recalculation::{
    RankingWeightRecalculationService, RecalculationCommand, RecalculationOutcome,
    RecalculationSettings,
};
pub use rollover::{RankingRolloverService, RolloverOutcome, RolloverSettings};
pub use scheduler::{Scheduler, SchedulerConfig};

/// The four store ports the services share.
#[derive(Clone)]
pub struct Stores {
    pub metrics: Arc<dyn MetricStore>,
    pub rankings: Arc<dyn RankingStore>,
    pub weights: Arc<dyn WeightStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            metrics: Arc::new(InMemoryMetricStore::new()),
            rankings: Arc::new(InMemoryRankingStore::new()),
            weights: Arc::new(InMemoryWeightStore::new()),
            idempotency: Arc::new(InMemoryIdempotencyStore::new()),
        }
    }
}

/// All services built from one configuration.
pub struct Pipeline {
    pub aggregation: Arc<RankingAggregationService>,
    pub recalculation: Arc<RankingWeightRecalculationService>,
    pub rollover: Arc<RankingRolloverService>,
    pub stores: Stores,
    pub clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(config: &ShopRankConfig, stores: Stores, clock: Arc<dyn Clock>) -> ServiceResult<Self> {
        let aggregation = RankingAggregationService::new(
            Arc::clone(&stores.metrics),
            Arc::clone(&stores.rankings),
            Arc::clone(&stores.weights),
            Arc::clone(&stores.idempotency),
            AggregationSettings {
                flush_chunk_size: config.aggregation.flush_chunk_size,
                ranking_ttl: config.aggregation.ranking_ttl(),
                scoring_mode: config.aggregation.scoring_mode,
            },
        );
        let recalculation = RankingWeightRecalculationService::new(
            Arc::clone(&stores.metrics),
            Arc::clone(&stores.rankings),
            Arc::clone(&stores.weights),
            Arc::clone(&stores.idempotency),
            Arc::clone(&clock),
            RecalculationSettings {
                decay_factor: config.recalculation.decay_factor,
                retry: config.recalculation.retry_policy(),
                ranking_ttl: config.aggregation.ranking_ttl(),
            },
        )?;
        let rollover = RankingRolloverService::new(
            Arc::clone(&stores.metrics),
            Arc::clone(&stores.rankings),
            Arc::clone(&stores.weights),
            Arc::clone(&stores.idempotency),
            RolloverSettings {
                carry_over_factor: config.rollover.daily_carry_over_factor,
                daily_ttl: config.rollover.daily_ttl(),
            },
        )?;

        Ok(Self {
            aggregation: Arc::new(aggregation),
            recalculation: Arc::new(recalculation),
            rollover: Arc::new(rollover),
            stores,
            clock,
        })
    }

    pub fn in_memory(config: &ShopRankConfig) -> ServiceResult<Self> {
        Self::new(config, Stores::in_memory(), Arc::new(SystemClock))
    }

    pub fn start_scheduler(&self, config: &ShopRankConfig) -> Scheduler {
        Scheduler::start(
            SchedulerConfig {
                flush_interval: config.aggregation.flush_interval(),
                recalculation_interval: config.recalculation.interval(),
                rollover_check_interval: config.rollover.check_interval(),
            },
            Arc::clone(&self.aggregation),
            Arc::clone(&self.recalculation),
            Arc::clone(&self.rollover),
            Arc::clone(&self.clock),
        )
    }
}

/// Initialize tracing once per process.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shoprank_server=info,shoprank_storage=info".into());

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[derive(Debug, Default)]
struct IngestCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    latest: Mutex<Option<DateTime<Utc>>>,
}

impl IngestCounters {
    fn observe(&self, event: &RankingEvent) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        let mut latest = self.latest.lock();
        if latest.map_or(true, |t| event.occurred_at > t) {
            *latest = Some(event.occurred_at);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub product_id: String,
    pub score: Score,
}

/// What `run` prints when the input is exhausted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub events_accepted: u64,
    pub events_rejected: u64,
    pub buffer: BufferStats,
    pub bucket_key: Option<String>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Ingest NDJSON events until EOF, then flush, recalculate the latest
/// hour seen and return its top `top_n` products.
pub async fn run(config: ShopRankConfig, input: Option<PathBuf>, top_n: usize) -> Result<RunSummary> {
    init_tracing(config.logging.json);

    tracing::info!("Starting ShopRank pipeline");
    tracing::debug!("Configuration: {:#?}", config);
    config.validate()?;

    let pipeline = Pipeline::in_memory(&config)?;
    let scheduler = pipeline.start_scheduler(&config);

    let counters = match input {
        Some(path) => {
            tracing::info!("Reading events from {:?}", path);
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {:?}", path))?;
            ingest(file, &pipeline, &config).await?
        }
        None => {
            tracing::info!("Reading events from stdin");
            ingest(tokio::io::stdin(), &pipeline, &config).await?
        }
    };

    scheduler.shutdown().await;

    let aggregation = Arc::clone(&pipeline.aggregation);
    let report = tokio::task::spawn_blocking(move || aggregation.flush()).await??;
    tracing::info!(
        "Final flush wrote {} hourly rows into {} buckets",
        report.hourly_rows,
        report.buckets.len()
    );

    let latest = *counters.latest.lock();
    let mut summary = RunSummary {
        events_accepted: counters.accepted.load(Ordering::Relaxed),
        events_rejected: counters.rejected.load(Ordering::Relaxed),
        buffer: pipeline.aggregation.buffer().stats(),
        bucket_key: None,
        leaderboard: Vec::new(),
    };

    if let Some(hour) = latest {
        let bucket = BucketKey::hourly(hour);
        let command = RecalculationCommand::for_hour(format!("final:{}", bucket), hour);
        let recalculation = Arc::clone(&pipeline.recalculation);
        let outcome = tokio::task::spawn_blocking(move || recalculation.recalculate(&command)).await??;
        tracing::info!("Final recalculation: {:?}", outcome);

        let key = bucket.to_string();
        summary.leaderboard = pipeline
            .stores
            .rankings
            .top_scores(&key, top_n)?
            .into_iter()
            .enumerate()
            .map(|(i, (product_id, score))| LeaderboardEntry {
                rank: i + 1,
                product_id,
                score,
            })
            .collect();
        summary.bucket_key = Some(key);
    }

    Ok(summary)
}

/// Fan lines out to ingestion workers sharing one receiver.
async fn ingest<R>(reader: R, pipeline: &Pipeline, config: &ShopRankConfig) -> Result<Arc<IngestCounters>>
where
    R: AsyncRead + Unpin,
{
    let (sender, receiver) = mpsc::channel::<String>(config.ingestion.channel_capacity);
    let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
    let counters = Arc::new(IngestCounters::default());

    let workers: Vec<_> = (0..config.ingestion.workers)
        .map(|worker_id| {
            let receiver = Arc::clone(&receiver);
            let aggregation = Arc::clone(&pipeline.aggregation);
            let counters = Arc::clone(&counters);
            tokio::spawn(async move {
                loop {
                    let line = { receiver.lock().await.recv().await };
                    let Some(line) = line else { break };
                    accept_line(worker_id, &line, &aggregation, &counters);
                }
            })
        })
        .collect();

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if sender.send(line).await.is_err() {
            anyhow::bail!("All ingestion workers stopped");
        }
    }
    drop(sender);

    for worker in workers {
        worker.await?;
    }
    Ok(counters)
}

fn accept_line(
    worker_id: usize,
    line: &str,
    aggregation: &RankingAggregationService,
    counters: &IngestCounters,
) {
    let event: RankingEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Worker {} skipping malformed event: {}", worker_id, e);
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    match aggregation.add(&event) {
        Ok(()) => counters.observe(&event),
        Err(e) => {
            tracing::warn!("Worker {} rejected event for product {}: {}", worker_id, event.product_id, e);
            counters.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }
}
