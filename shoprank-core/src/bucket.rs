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

//! Time buckets and ranking key algebra
//!
//! Events are assigned to buckets by their own occurrence time, never by
//! the time a flush happens to persist them.
//!
//! # Key Encoding
//!
//! ```text
//! ranking:products:hourly:{yyyyMMddHH}
//! ranking:products:daily:{yyyyMMdd}
//! ranking:products:weekly:{yyyyMMdd}    (Monday of the ISO week)
//! ranking:products:monthly:{yyyyMMdd}   (first day of the month)
//! ```
//!
//! All timestamps are UTC.

use crate::error::{RankingError, Result};
use crate::event::RankingEvent;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every product ranking key.
pub const RANKING_KEY_PREFIX: &str = "ranking:products";

/// Bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Hourly => "hourly",
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }

    /// Truncate an instant down to the start of its bucket.
    pub fn truncate(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let date = instant.date_naive();
        match self {
            Period::Hourly => start_of_day(date) + Duration::hours(i64::from(instant.hour())),
            Period::Daily => start_of_day(date),
            Period::Weekly => {
                start_of_day(date) - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Period::Monthly => start_of_day(date) - Duration::days(i64::from(date.day0())),
        }
    }

    /// Shift a bucket start by `steps` whole periods (negative = backwards).
    pub fn shift(&self, start: DateTime<Utc>, steps: i32) -> Result<DateTime<Utc>> {
        let out_of_range = || RankingError::BucketOutOfRange(format!("{} {:+} {}", start, steps, self.as_str()));
        let shifted = match self {
            Period::Hourly => start.checked_add_signed(Duration::hours(i64::from(steps))),
            Period::Daily => start.checked_add_signed(Duration::days(i64::from(steps))),
            Period::Weekly => start.checked_add_signed(Duration::weeks(i64::from(steps))),
            Period::Monthly => {
                let months = Months::new(steps.unsigned_abs());
                if steps >= 0 {
                    start.checked_add_months(months)
                } else {
                    start.checked_sub_months(months)
                }
            }
        };
        shifted.ok_or_else(out_of_range)
    }

    fn format_token(&self, start: DateTime<Utc>) -> String {
        match self {
            Period::Hourly => start.format("%Y%m%d%H").to_string(),
            _ => start.format("%Y%m%d").to_string(),
        }
    }

    fn parse_token(&self, token: &str) -> Option<DateTime<Utc>> {
        let expected_len = match self {
            Period::Hourly => 10,
            _ => 8,
        };
        if token.len() != expected_len || !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let year: i32 = token[0..4].parse().ok()?;
        let month: u32 = token[4..6].parse().ok()?;
        let day: u32 = token[6..8].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;

        let start = match self {
            Period::Hourly => {
                let hour: u32 = token[8..10].parse().ok()?;
                if hour > 23 {
                    return None;
                }
                start_of_day(date) + Duration::hours(i64::from(hour))
            }
            _ => start_of_day(date),
        };

        // A weekly token must name a Monday, a monthly token the 1st.
        (self.truncate(start) == start).then_some(start)
    }
}

impl FromStr for Period {
    type Err = RankingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hourly" => Ok(Period::Hourly),
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            other => Err(RankingError::MalformedBucketKey(format!("unknown period '{}'", other))),
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Per-product hourly aggregation key.
///
/// Equality and hashing are structural over both fields, so the key is
/// stable across process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregationKey {
    pub product_id: u64,
    pub hour_bucket: DateTime<Utc>,
}

impl AggregationKey {
    /// Key for an event, bucketed by its occurrence time.
    pub fn from(event: &RankingEvent) -> Self {
        Self::of(event.product_id, event.occurred_at)
    }

    pub fn of(product_id: u64, instant: DateTime<Utc>) -> Self {
        Self {
            product_id,
            hour_bucket: Period::Hourly.truncate(instant),
        }
    }

    /// Hourly ranking key this aggregation feeds.
    pub fn bucket_key(&self) -> BucketKey {
        BucketKey::hourly(self.hour_bucket)
    }
}

/// A parsed ranking bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketKey {
    period: Period,
    start: DateTime<Utc>,
}

impl BucketKey {
    /// Bucket containing `instant` for the given period.
    pub fn new(period: Period, instant: DateTime<Utc>) -> Self {
        Self {
            period,
            start: period.truncate(instant),
        }
    }

    pub fn hourly(instant: DateTime<Utc>) -> Self {
        Self::new(Period::Hourly, instant)
    }

    pub fn for_date(period: Period, date: NaiveDate) -> Self {
        Self::new(period, start_of_day(date))
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn previous(&self) -> Result<Self> {
        Ok(Self {
            period: self.period,
            start: self.period.shift(self.start, -1)?,
        })
    }

    pub fn next(&self) -> Result<Self> {
        Ok(Self {
            period: self.period,
            start: self.period.shift(self.start, 1)?,
        })
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            RANKING_KEY_PREFIX,
            self.period.as_str(),
            self.period.format_token(self.start)
        )
    }
}

impl FromStr for BucketKey {
    type Err = RankingError;

    fn from_str(key: &str) -> Result<Self> {
        let malformed = || RankingError::MalformedBucketKey(key.to_string());

        let rest = key
            .strip_prefix(RANKING_KEY_PREFIX)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(malformed)?;
        let (period, token) = rest.split_once(':').ok_or_else(malformed)?;
        let period: Period = period.parse().map_err(|_| malformed())?;
        let start = period.parse_token(token).ok_or_else(malformed)?;

        Ok(Self { period, start })
    }
}

/// Builds and navigates ranking bucket keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankingKeyGenerator;

impl RankingKeyGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn key(&self, period: Period, instant: DateTime<Utc>) -> String {
        BucketKey::new(period, instant).to_string()
    }

    pub fn hourly_key(&self, instant: DateTime<Utc>) -> String {
        self.key(Period::Hourly, instant)
    }

    pub fn daily_key(&self, date: NaiveDate) -> String {
        BucketKey::for_date(Period::Daily, date).to_string()
    }

    pub fn weekly_key(&self, instant: DateTime<Utc>) -> String {
        self.key(Period::Weekly, instant)
    }

    pub fn monthly_key(&self, instant: DateTime<Utc>) -> String {
        self.key(Period::Monthly, instant)
    }

    pub fn previous_bucket_key(&self, key: &str) -> Result<String> {
        Ok(key.parse::<BucketKey>()?.previous()?.to_string())
    }

    pub fn next_bucket_key(&self, key: &str) -> Result<String> {
        Ok(key.parse::<BucketKey>()?.next()?.to_string())
    }
}
