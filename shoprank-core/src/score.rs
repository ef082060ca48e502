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

//! Non-negative ranking score with two-decimal precision.
//!
//! Scores use `rust_decimal::Decimal` so that repeated increments into the
//! leaderboard do not drift the way `f64` sums do. Every construction path
//! rounds half-up to two decimal places.

use crate::error::{RankingError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// Decimal places kept on every score.
pub const SCORE_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Score(Decimal);

impl Score {
    pub const ZERO: Score = Score(Decimal::ZERO);

    /// Create a score, failing on negative values.
    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(RankingError::NegativeScore(value));
        }
        Ok(Self(round(value)))
    }

    /// Create a score from a float literal, e.g. `Score::of(100.0)`.
    pub fn of(value: f64) -> Result<Self> {
        let decimal = Decimal::try_from(value)
            .map_err(|_| RankingError::InvalidScoreLiteral(value.to_string()))?;
        Self::new(decimal)
    }

    /// Floor a raw weighted value at zero.
    ///
    /// Ranking formulas can go negative when like cancellations outnumber
    /// creations; the leaderboard never stores a negative member score.
    pub fn floored(value: Decimal) -> Self {
        if value.is_sign_negative() {
            Self::ZERO
        } else {
            Self(round(value))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiply by a non-negative scalar.
    pub fn times(&self, multiplier: Decimal) -> Result<Self> {
        if multiplier.is_sign_negative() && !multiplier.is_zero() {
            return Err(RankingError::NegativeMultiplier(multiplier));
        }
        Ok(Self(round(self.0 * multiplier)))
    }

    /// Multiply by a decay factor in `[0, 1]` and re-round.
    pub fn apply_decay(&self, factor: Decimal) -> Result<Self> {
        validate_decay_factor(factor)?;
        Ok(Self(round(self.0 * factor)))
    }

    pub fn sum<I: IntoIterator<Item = Score>>(scores: I) -> Self {
        scores.into_iter().fold(Self::ZERO, |acc, s| acc + s)
    }
}

/// Reject decay factors outside `[0, 1]`.
pub fn validate_decay_factor(factor: Decimal) -> Result<()> {
    if factor < Decimal::ZERO || factor > Decimal::ONE {
        return Err(RankingError::DecayFactorOutOfRange(factor));
    }
    Ok(())
}

#[inline]
fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCORE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        Score(round(self.0 + rhs.0))
    }
}

impl Sum for Score {
    fn sum<I: Iterator<Item = Score>>(iter: I) -> Self {
        Score::sum(iter)
    }
}

impl TryFrom<Decimal> for Score {
    type Error = RankingError;

    fn try_from(value: Decimal) -> Result<Self> {
        Score::new(value)
    }
}

impl From<Score> for Decimal {
    fn from(score: Score) -> Decimal {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
