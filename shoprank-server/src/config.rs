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

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use shoprank_core::{RetryPolicy, ScoringMode};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// ShopRank pipeline configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShopRankConfig {
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub recalculation: RecalculationConfig,
    #[serde(default)]
    pub rollover: RolloverConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregationConfig {
    /// Milliseconds between buffer flushes
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Rows per metric store upsert
    #[serde(default = "default_flush_chunk_size")]
    pub flush_chunk_size: usize,

    /// TTL reapplied to every hourly ranking key a flush touches (25h)
    #[serde(default = "default_ranking_ttl_secs")]
    pub ranking_ttl_secs: u64,

    #[serde(default)]
    pub scoring_mode: ScoringMode,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecalculationConfig {
    /// Seconds between scheduled recalculations
    #[serde(default = "default_recalc_interval_secs")]
    pub interval_secs: u64,

    /// Weight of the previous hour in the combined score
    #[serde(default = "default_decay_factor")]
    pub decay_factor: Decimal,

    /// Attempts for each bucket replace
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RolloverConfig {
    /// Share of a day's scores carried into the next day
    #[serde(default = "default_decay_factor")]
    pub daily_carry_over_factor: Decimal,

    /// TTL applied to daily ranking keys (48h)
    #[serde(default = "default_daily_ttl_secs")]
    pub daily_ttl_secs: u64,

    /// Seconds between checks for a pending daily rollover
    #[serde(default = "default_rollover_check_secs")]
    pub check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Tasks parsing and accumulating events
    #[serde(default = "default_ingest_workers")]
    pub workers: usize,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

// Default values
fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_flush_chunk_size() -> usize {
    500
}

fn default_ranking_ttl_secs() -> u64 {
    25 * 3600
}

fn default_recalc_interval_secs() -> u64 {
    3600
}

fn default_decay_factor() -> Decimal {
    dec!(0.1)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_daily_ttl_secs() -> u64 {
    48 * 3600
}

fn default_rollover_check_secs() -> u64 {
    300
}

fn default_ingest_workers() -> usize {
    4
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            flush_chunk_size: default_flush_chunk_size(),
            ranking_ttl_secs: default_ranking_ttl_secs(),
            scoring_mode: ScoringMode::default(),
        }
    }
}

impl Default for RecalculationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_recalc_interval_secs(),
            decay_factor: default_decay_factor(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            daily_carry_over_factor: default_decay_factor(),
            daily_ttl_secs: default_daily_ttl_secs(),
            check_interval_secs: default_rollover_check_secs(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            workers: default_ingest_workers(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AggregationConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn ranking_ttl(&self) -> Duration {
        Duration::from_secs(self.ranking_ttl_secs)
    }
}

impl RecalculationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            ..RetryPolicy::exponential()
        }
    }
}

impl RolloverConfig {
    pub fn daily_ttl(&self) -> Duration {
        Duration::from_secs(self.daily_ttl_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={:?}", name, raw);
            None
        }
    }
}

impl ShopRankConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - SHOPRANK_FLUSH_INTERVAL_MS
    /// - SHOPRANK_FLUSH_CHUNK_SIZE
    /// - SHOPRANK_RANKING_TTL_SECS
    /// - SHOPRANK_SCORING_MODE: `weighted` or `log_normalized`
    /// - SHOPRANK_RECALC_INTERVAL_SECS
    /// - SHOPRANK_DECAY_FACTOR
    /// - SHOPRANK_MAX_ATTEMPTS
    /// - SHOPRANK_INITIAL_BACKOFF_MS
    /// - SHOPRANK_MAX_BACKOFF_MS
    /// - SHOPRANK_DAILY_CARRY_OVER_FACTOR
    /// - SHOPRANK_DAILY_TTL_SECS
    /// - SHOPRANK_INGEST_WORKERS
    /// - SHOPRANK_LOG_JSON
    pub fn from_env() -> Self {
        Self::default().merge_with_env()
    }

    /// Load configuration: defaults, then the file, then environment overrides
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        Ok(config.merge_with_env())
    }

    /// Override fields whose environment variable is set
    fn merge_with_env(mut self) -> Self {
        if let Some(v) = env_parse("SHOPRANK_FLUSH_INTERVAL_MS") {
            self.aggregation.flush_interval_ms = v;
        }
        if let Some(v) = env_parse("SHOPRANK_FLUSH_CHUNK_SIZE") {
            self.aggregation.flush_chunk_size = v;
        }
        if let Some(v) = env_parse("SHOPRANK_RANKING_TTL_SECS") {
            self.aggregation.ranking_ttl_secs = v;
        }
        if let Some(v) = env_parse("SHOPRANK_SCORING_MODE") {
            self.aggregation.scoring_mode = v;
        }
        if let Some(v) = env_parse("SHOPRANK_RECALC_INTERVAL_SECS") {
            self.recalculation.interval_secs = v;
        }
        if let Some(v) = env_parse("SHOPRANK_DECAY_FACTOR") {
            self.recalculation.decay_factor = v;
        }
        if let Some(v) = env_parse("SHOPRANK_MAX_ATTEMPTS") {
            self.recalculation.max_attempts = v;
        }
        if let Some(v) = env_parse("SHOPRANK_INITIAL_BACKOFF_MS") {
            self.recalculation.initial_backoff_ms = v;
        }
        if let Some(v) = env_parse("SHOPRANK_MAX_BACKOFF_MS") {
            self.recalculation.max_backoff_ms = v;
        }
        if let Some(v) = env_parse("SHOPRANK_DAILY_CARRY_OVER_FACTOR") {
            self.rollover.daily_carry_over_factor = v;
        }
        if let Some(v) = env_parse("SHOPRANK_DAILY_TTL_SECS") {
            self.rollover.daily_ttl_secs = v;
        }
        if let Some(v) = env_parse("SHOPRANK_INGEST_WORKERS") {
            self.ingestion.workers = v;
        }
        if let Some(v) = env_parse("SHOPRANK_LOG_JSON") {
            self.logging.json = v;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let unit = Decimal::ZERO..=Decimal::ONE;
        if !unit.contains(&self.recalculation.decay_factor) {
            anyhow::bail!(
                "recalculation.decay_factor must be within [0, 1], got {}",
                self.recalculation.decay_factor
            );
        }
        if !unit.contains(&self.rollover.daily_carry_over_factor) {
            anyhow::bail!(
                "rollover.daily_carry_over_factor must be within [0, 1], got {}",
                self.rollover.daily_carry_over_factor
            );
        }
        if self.recalculation.max_attempts == 0 {
            anyhow::bail!("recalculation.max_attempts must be at least 1");
        }
        if self.recalculation.initial_backoff_ms > self.recalculation.max_backoff_ms {
            anyhow::bail!("recalculation.initial_backoff_ms exceeds max_backoff_ms");
        }
        if self.aggregation.flush_chunk_size == 0 {
            anyhow::bail!("aggregation.flush_chunk_size must be at least 1");
        }
        if self.aggregation.flush_interval_ms == 0 || self.recalculation.interval_secs == 0 {
            anyhow::bail!("Scheduler intervals must be non-zero");
        }
        if self.rollover.check_interval_secs == 0 {
            anyhow::bail!("rollover.check_interval_secs must be non-zero");
        }
        if self.ingestion.workers == 0 || self.ingestion.channel_capacity == 0 {
            anyhow::bail!("ingestion.workers and ingestion.channel_capacity must be non-zero");
        }
        Ok(())
    }
}
