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

//! Durable per-product metric rows.
//!
//! Writes are add-deltas: the first write for a (product, bucket) creates
//! the row and every later write accumulates into it. Rows are never
//! deleted here.

use crate::error::StoreResult;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use shoprank_core::{AggregationKey, CountSnapshot, ProductDailyMetric, ProductHourlyMetric};
use std::collections::BTreeMap;

pub trait MetricStore: Send + Sync {
    fn upsert_add_delta(
        &self,
        product_id: u64,
        stat_hour: DateTime<Utc>,
        delta: &CountSnapshot,
    ) -> StoreResult<()>;

    /// Apply a chunk of hourly deltas. Implementations should apply the
    /// chunk atomically; the default applies rows one at a time.
    fn upsert_add_deltas(&self, rows: &[(AggregationKey, CountSnapshot)]) -> StoreResult<()> {
        for (key, delta) in rows {
            self.upsert_add_delta(key.product_id, key.hour_bucket, delta)?;
        }
        Ok(())
    }

    fn find_all_by_stat_hour(&self, stat_hour: DateTime<Utc>) -> StoreResult<Vec<ProductHourlyMetric>>;

    fn upsert_daily_add_delta(
        &self,
        product_id: u64,
        stat_date: NaiveDate,
        delta: &CountSnapshot,
    ) -> StoreResult<()>;

    fn upsert_daily_add_deltas(&self, rows: &[(u64, NaiveDate, CountSnapshot)]) -> StoreResult<()> {
        for (product_id, stat_date, delta) in rows {
            self.upsert_daily_add_delta(*product_id, *stat_date, delta)?;
        }
        Ok(())
    }

    fn find_all_by_stat_date(&self, stat_date: NaiveDate) -> StoreResult<Vec<ProductDailyMetric>>;
}

/// BTreeMap-backed metric store.
///
/// Rows are keyed bucket-first so a bucket lookup is a single range scan.
#[derive(Debug, Default)]
pub struct InMemoryMetricStore {
    hourly: RwLock<BTreeMap<(DateTime<Utc>, u64), ProductHourlyMetric>>,
    daily: RwLock<BTreeMap<(NaiveDate, u64), ProductDailyMetric>>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hourly_row(&self, product_id: u64, stat_hour: DateTime<Utc>) -> Option<ProductHourlyMetric> {
        self.hourly.read().get(&(stat_hour, product_id)).cloned()
    }

    pub fn daily_row(&self, product_id: u64, stat_date: NaiveDate) -> Option<ProductDailyMetric> {
        self.daily.read().get(&(stat_date, product_id)).cloned()
    }

    pub fn hourly_len(&self) -> usize {
        self.hourly.read().len()
    }
}

impl MetricStore for InMemoryMetricStore {
    fn upsert_add_delta(
        &self,
        product_id: u64,
        stat_hour: DateTime<Utc>,
        delta: &CountSnapshot,
    ) -> StoreResult<()> {
        let key = AggregationKey::of(product_id, stat_hour);
        self.upsert_add_deltas(&[(key, *delta)])
    }

    fn upsert_add_deltas(&self, rows: &[(AggregationKey, CountSnapshot)]) -> StoreResult<()> {
        let mut hourly = self.hourly.write();

        // Stage every touched row first so a bad delta leaves the chunk unapplied.
        let mut staged: BTreeMap<(DateTime<Utc>, u64), ProductHourlyMetric> = BTreeMap::new();
        for (key, delta) in rows {
            let id = (key.hour_bucket, key.product_id);
            let row = staged.entry(id).or_insert_with(|| {
                hourly
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| ProductHourlyMetric::new(key.product_id, key.hour_bucket))
            });
            row.apply(delta)?;
        }

        hourly.extend(staged);
        Ok(())
    }

    fn find_all_by_stat_hour(&self, stat_hour: DateTime<Utc>) -> StoreResult<Vec<ProductHourlyMetric>> {
        Ok(self
            .hourly
            .read()
            .range((stat_hour, u64::MIN)..=(stat_hour, u64::MAX))
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn upsert_daily_add_delta(
        &self,
        product_id: u64,
        stat_date: NaiveDate,
        delta: &CountSnapshot,
    ) -> StoreResult<()> {
        self.upsert_daily_add_deltas(&[(product_id, stat_date, *delta)])
    }

    fn upsert_daily_add_deltas(&self, rows: &[(u64, NaiveDate, CountSnapshot)]) -> StoreResult<()> {
        let mut daily = self.daily.write();

        let mut staged: BTreeMap<(NaiveDate, u64), ProductDailyMetric> = BTreeMap::new();
        for (product_id, stat_date, delta) in rows {
            let id = (*stat_date, *product_id);
            let row = staged.entry(id).or_insert_with(|| {
                daily
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| ProductDailyMetric::new(*product_id, *stat_date))
            });
            row.apply(delta)?;
        }

        daily.extend(staged);
        Ok(())
    }

    fn find_all_by_stat_date(&self, stat_date: NaiveDate) -> StoreResult<Vec<ProductDailyMetric>> {
        Ok(self
            .daily
            .read()
            .range((stat_date, u64::MIN)..=(stat_date, u64::MAX))
            .map(|(_, row)| row.clone())
            .collect())
    }
}
