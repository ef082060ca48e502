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

//! Ranking weights per signal.

use crate::error::{RankingError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingWeight {
    pub view_weight: Decimal,
    pub like_weight: Decimal,
    pub order_weight: Decimal,
}

impl RankingWeight {
    /// Used whenever the configuration store has nothing or fails.
    pub const FALLBACK: RankingWeight = RankingWeight {
        view_weight: dec!(0.10),
        like_weight: dec!(0.20),
        order_weight: dec!(0.60),
    };

    pub fn new(view_weight: Decimal, like_weight: Decimal, order_weight: Decimal) -> Result<Self> {
        for (field, value) in [
            ("view_weight", view_weight),
            ("like_weight", like_weight),
            ("order_weight", order_weight),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(RankingError::NegativeWeight { field, value });
            }
        }
        Ok(Self {
            view_weight,
            like_weight,
            order_weight,
        })
    }

    /// Resolve the outcome of a configuration lookup, falling back to
    /// [`RankingWeight::FALLBACK`] on error or absence.
    pub fn resolve<E: Display>(lookup: std::result::Result<Option<RankingWeight>, E>) -> Self {
        match lookup {
            Ok(Some(weight)) => weight,
            Ok(None) => {
                tracing::debug!("No ranking weight configured, using fallback");
                Self::FALLBACK
            }
            Err(e) => {
                tracing::warn!("Ranking weight lookup failed, using fallback: {}", e);
                Self::FALLBACK
            }
        }
    }
}

impl Default for RankingWeight {
    fn default() -> Self {
        Self::FALLBACK
    }
}
