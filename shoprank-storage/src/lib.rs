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

//! ShopRank Storage
//!
//! The concurrent in-memory metric buffer plus the store ports the
//! ranking services talk to, each with an in-memory adapter.
//!
//! ## Ports
//!
//! - [`MetricStore`]: durable hourly and daily metric rows (upsert-accumulate)
//! - [`RankingStore`]: sorted-set style leaderboards keyed by bucket key
//! - [`WeightStore`]: latest ranking weight configuration
//! - [`IdempotencyStore`]: unique keys of completed operations

pub mod error;
pub mod idempotency_store;
pub mod metric_buffer;
pub mod metric_store;
pub mod ranking_store;
pub mod weight_store;

pub use error::{StoreError, StoreResult};
pub use idempotency_store::{IdempotencyStore, InMemoryIdempotencyStore};
pub use metric_buffer::{BufferStats, MetricBatch, MetricBuffer, MutableCounts};
pub use metric_store::{InMemoryMetricStore, MetricStore};
pub use ranking_store::{InMemoryRankingStore, RankingStore};
pub use weight_store::{InMemoryWeightStore, WeightStore};
