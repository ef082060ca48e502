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

//! Ranking score formulas
//!
//! Two scoring modes:
//!
//! - **Weighted** (batch): `vw × views + lw × likes + ow × orderAmount`
//! - **Per-event**: view = `vw`, like = `lw`, order = `ow × (1 + ln(totalAmount))`
//!
//! The logarithmic order term compresses the influence of very large
//! orders. `ln(0)` is guarded: a zero amount scores exactly zero.
//!
//! The order term is not linear, so it is scored once per order as the
//! event arrives and only the sum is buffered. Summing per-event scores
//! gives the same total however the events are split across flushes.

use crate::metric::CountSnapshot;
use crate::score::Score;
use crate::weight::RankingWeight;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the flush path turns drained counts into score deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Linear in order amount; matches the recalculation job.
    #[default]
    Weighted,
    /// Sum of per-event scores, with orders log-normalized one at a time.
    LogNormalized,
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weighted" => Ok(ScoringMode::Weighted),
            "log_normalized" | "log-normalized" => Ok(ScoringMode::LogNormalized),
            other => Err(format!("unknown scoring mode: {}", other)),
        }
    }
}

/// Stateless calculator bound to one resolved weight set.
#[derive(Debug, Clone, Copy)]
pub struct RankingScoreCalculator {
    weight: RankingWeight,
}

impl RankingScoreCalculator {
    pub fn new(weight: RankingWeight) -> Self {
        Self { weight }
    }

    /// Raw weighted sum. Negative when like cancellations dominate.
    pub fn weighted(&self, counts: &CountSnapshot) -> Decimal {
        self.weight.view_weight * Decimal::from(counts.views)
            + self.weight.like_weight * Decimal::from(counts.likes)
            + self.weight.order_weight * counts.order_amount
    }

    /// Weighted ranking score, floored at zero.
    pub fn weighted_score(&self, counts: &CountSnapshot) -> Score {
        Score::floored(self.weighted(counts))
    }

    /// Raw delta for the given mode.
    pub fn delta(&self, mode: ScoringMode, counts: &CountSnapshot) -> Decimal {
        match mode {
            ScoringMode::Weighted => self.weighted(counts),
            ScoringMode::LogNormalized => {
                self.view_event_score().value() * Decimal::from(counts.views)
                    + self.like_event_score().value() * Decimal::from(counts.likes)
                    + counts.order_score
            }
        }
    }

    pub fn view_event_score(&self) -> Score {
        Score::floored(self.weight.view_weight)
    }

    pub fn like_event_score(&self) -> Score {
        Score::floored(self.weight.like_weight)
    }

    /// `ow × (1 + ln(total))`, zero for non-positive totals.
    ///
    /// Totals below `1/e` would yield a negative term and floor at zero.
    pub fn order_amount_score(&self, total_amount: Decimal) -> Score {
        if total_amount <= Decimal::ZERO {
            return Score::ZERO;
        }
        match total_amount.checked_ln() {
            Some(ln) => Score::floored(self.weight.order_weight * (Decimal::ONE + ln)),
            None => Score::ZERO,
        }
    }
}

impl Default for RankingScoreCalculator {
    fn default() -> Self {
        Self::new(RankingWeight::FALLBACK)
    }
}
