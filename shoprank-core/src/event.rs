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

//! Behavioural events feeding the ranking pipeline.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankingEventType {
    View,
    LikeCreated,
    LikeCanceled,
    OrderPaid,
}

/// A single product event as delivered by the consumption layer.
///
/// Deserializes from the upstream JSON shape:
/// `{"productId": 1, "eventType": "ORDER_PAID", "orderAmount": "1200.50", "occurredAt": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEvent {
    pub product_id: u64,
    pub event_type: RankingEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_amount: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

impl RankingEvent {
    pub fn new(product_id: u64, event_type: RankingEventType, occurred_at: DateTime<Utc>) -> Self {
        Self {
            product_id,
            event_type,
            order_amount: None,
            occurred_at,
        }
    }

    pub fn view(product_id: u64, occurred_at: DateTime<Utc>) -> Self {
        Self::new(product_id, RankingEventType::View, occurred_at)
    }

    pub fn like(product_id: u64, occurred_at: DateTime<Utc>) -> Self {
        Self::new(product_id, RankingEventType::LikeCreated, occurred_at)
    }

    pub fn unlike(product_id: u64, occurred_at: DateTime<Utc>) -> Self {
        Self::new(product_id, RankingEventType::LikeCanceled, occurred_at)
    }

    pub fn order_paid(product_id: u64, amount: Decimal, occurred_at: DateTime<Utc>) -> Self {
        Self {
            order_amount: Some(amount),
            ..Self::new(product_id, RankingEventType::OrderPaid, occurred_at)
        }
    }
}
