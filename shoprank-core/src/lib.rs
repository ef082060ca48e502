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

//! ShopRank Core
//!
//! Value types and pure functions for the product ranking engine:
//! scores, time buckets and their key algebra, ranking events, weights,
//! durable metric rows, the score calculator and retry primitives.

pub mod bucket;
pub mod calculator;
pub mod clock;
pub mod error;
pub mod event;
pub mod metric;
pub mod resilience;
pub mod score;
pub mod weight;

pub use bucket::{AggregationKey, BucketKey, Period, RankingKeyGenerator, RANKING_KEY_PREFIX};
pub use calculator::{RankingScoreCalculator, ScoringMode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{RankingError, Result};
pub use event::{RankingEvent, RankingEventType};
pub use metric::{CountSnapshot, ProductDailyMetric, ProductHourlyMetric};
pub use resilience::{RetryError, RetryPolicy};
pub use score::Score;
pub use weight::RankingWeight;
