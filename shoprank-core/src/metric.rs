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

//! Count snapshots and the durable per-product metric rows they feed.
//!
//! Rows follow upsert-accumulate semantics: the first write for a bucket
//! creates the row, every later write adds its deltas.

use crate::error::{RankingError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Immutable point-in-time counts for one product bucket.
///
/// Used both as a drained delta and as the totals of a durable row.
/// `likes` may be negative when cancellations outnumber creations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CountSnapshot {
    pub views: i64,
    pub likes: i64,
    pub order_count: i64,
    pub order_amount: Decimal,
    /// Sum of per-order log-normalized scores, scored as each order arrived.
    /// Only the buffer tracks it; durable rows always report zero.
    #[serde(default)]
    pub order_score: Decimal,
}

impl CountSnapshot {
    pub fn is_empty(&self) -> bool {
        self.views == 0
            && self.likes == 0
            && self.order_count == 0
            && self.order_amount.is_zero()
            && self.order_score.is_zero()
    }
}

impl AddAssign<&CountSnapshot> for CountSnapshot {
    fn add_assign(&mut self, rhs: &CountSnapshot) {
        self.views += rhs.views;
        self.likes += rhs.likes;
        self.order_count += rhs.order_count;
        self.order_amount += rhs.order_amount;
        self.order_score += rhs.order_score;
    }
}

/// Validate the totals a row would hold after applying a delta.
fn validated_totals(product_id: u64, current: &CountSnapshot, delta: &CountSnapshot) -> Result<CountSnapshot> {
    let mut next = *current;
    next += delta;
    if next.views < 0 {
        return Err(RankingError::NegativeViewCount {
            product_id,
            view_count: next.views,
        });
    }
    if next.order_amount.is_sign_negative() && !next.order_amount.is_zero() {
        return Err(RankingError::NegativeOrderAmount {
            product_id,
            amount: next.order_amount,
        });
    }
    Ok(next)
}

/// Durable row per (product, hour).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductHourlyMetric {
    pub product_id: u64,
    pub stat_hour: DateTime<Utc>,
    pub view_count: i64,
    pub like_count: i64,
    pub order_count: i64,
    pub order_amount: Decimal,
}

impl ProductHourlyMetric {
    pub fn new(product_id: u64, stat_hour: DateTime<Utc>) -> Self {
        Self {
            product_id,
            stat_hour,
            view_count: 0,
            like_count: 0,
            order_count: 0,
            order_amount: Decimal::ZERO,
        }
    }

    pub fn counts(&self) -> CountSnapshot {
        CountSnapshot {
            views: self.view_count,
            likes: self.like_count,
            order_count: self.order_count,
            order_amount: self.order_amount,
            order_score: Decimal::ZERO,
        }
    }

    /// Add a delta. The row is left untouched if the result is invalid.
    pub fn apply(&mut self, delta: &CountSnapshot) -> Result<()> {
        let next = validated_totals(self.product_id, &self.counts(), delta)?;
        self.view_count = next.views;
        self.like_count = next.likes;
        self.order_count = next.order_count;
        self.order_amount = next.order_amount;
        Ok(())
    }
}

/// Durable row per (product, UTC day).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDailyMetric {
    pub product_id: u64,
    pub stat_date: NaiveDate,
    pub view_count: i64,
    pub like_count: i64,
    pub order_count: i64,
    pub order_amount: Decimal,
}

impl ProductDailyMetric {
    pub fn new(product_id: u64, stat_date: NaiveDate) -> Self {
        Self {
            product_id,
            stat_date,
            view_count: 0,
            like_count: 0,
            order_count: 0,
            order_amount: Decimal::ZERO,
        }
    }

    pub fn counts(&self) -> CountSnapshot {
        CountSnapshot {
            views: self.view_count,
            likes: self.like_count,
            order_count: self.order_count,
            order_amount: self.order_amount,
            order_score: Decimal::ZERO,
        }
    }

    pub fn apply(&mut self, delta: &CountSnapshot) -> Result<()> {
        let next = validated_totals(self.product_id, &self.counts(), delta)?;
        self.view_count = next.views;
        self.like_count = next.likes;
        self.order_count = next.order_count;
        self.order_amount = next.order_amount;
        Ok(())
    }
}
