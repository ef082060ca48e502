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

use crate::error::StoreResult;
use parking_lot::RwLock;
use shoprank_core::RankingWeight;

pub trait WeightStore: Send + Sync {
    /// Most recently published weight set, if any.
    fn find_latest(&self) -> StoreResult<Option<RankingWeight>>;
}

/// Append-only weight history.
#[derive(Debug, Default)]
pub struct InMemoryWeightStore {
    history: RwLock<Vec<RankingWeight>>,
}

impl InMemoryWeightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weight(weight: RankingWeight) -> Self {
        let store = Self::new();
        store.publish(weight);
        store
    }

    pub fn publish(&self, weight: RankingWeight) {
        tracing::info!(
            "Publishing ranking weight view={} like={} order={}",
            weight.view_weight,
            weight.like_weight,
            weight.order_weight
        );
        self.history.write().push(weight);
    }
}

impl WeightStore for InMemoryWeightStore {
    fn find_latest(&self) -> StoreResult<Option<RankingWeight>> {
        Ok(self.history.read().last().copied())
    }
}
