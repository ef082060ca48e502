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

//! Records of completed logical operations.
//!
//! Keys are namespaced by operation: `flush:<batch-id>`,
//! `recalc:<event-id>`, `rollover:<date>`.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub trait IdempotencyStore: Send + Sync {
    fn exists_by_key(&self, key: &str) -> StoreResult<bool>;

    /// Insert a key. Fails with [`StoreError::DuplicateKey`] if it exists.
    fn save(&self, key: &str) -> StoreResult<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    records: DashMap<String, DateTime<Utc>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn saved_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.records.get(key).map(|r| *r.value())
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn exists_by_key(&self, key: &str) -> StoreResult<bool> {
        Ok(self.records.contains_key(key))
    }

    fn save(&self, key: &str) -> StoreResult<()> {
        match self.records.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                Ok(())
            }
        }
    }
}
