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

//! Validation errors raised by the core value types.
//!
//! Every variant here is fatal: callers must not retry an operation that
//! failed with a `RankingError`.

use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankingError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankingError {
    #[error("Score must be non-negative, got {0}")]
    NegativeScore(Decimal),

    #[error("Score literal is not a finite decimal: {0}")]
    InvalidScoreLiteral(String),

    #[error("Decay factor must be within [0, 1], got {0}")]
    DecayFactorOutOfRange(Decimal),

    #[error("Score multiplier must be non-negative, got {0}")]
    NegativeMultiplier(Decimal),

    #[error("Ranking weight must be non-negative: {field} = {value}")]
    NegativeWeight { field: &'static str, value: Decimal },

    #[error("View count must be non-negative for product {product_id}, got {view_count}")]
    NegativeViewCount { product_id: u64, view_count: i64 },

    #[error("Order amount must be non-negative for product {product_id}, got {amount}")]
    NegativeOrderAmount { product_id: u64, amount: Decimal },

    #[error("Malformed bucket key: {0}")]
    MalformedBucketKey(String),

    #[error("Bucket timestamp out of range: {0}")]
    BucketOutOfRange(String),
}
