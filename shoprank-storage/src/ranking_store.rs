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

//! Live leaderboards.
//!
//! A ranking store holds sorted sets keyed by bucket key
//! (`ranking:products:<period>:<token>`). Members are stringified product
//! ids and scores are non-negative two-place decimals.

use crate::error::StoreResult;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use shoprank_core::score::validate_decay_factor;
use shoprank_core::Score;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub trait RankingStore: Send + Sync {
    /// Add each delta to the member's score, creating missing members.
    fn increment_scores(&self, key: &str, deltas: &HashMap<String, Score>) -> StoreResult<()>;

    /// Atomically swap the whole bucket. Readers never see a partial set.
    /// An empty map removes the key.
    fn replace_all(&self, key: &str, scores: &HashMap<String, Score>) -> StoreResult<()>;

    /// All members of the bucket; empty when the key is absent or expired.
    fn get_all_scores(&self, key: &str) -> StoreResult<HashMap<String, Score>>;

    fn exists(&self, key: &str) -> StoreResult<bool>;

    fn set_ttl(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    /// Add `factor × score(source)` into `target`, keeping target members
    /// that are absent from the source.
    fn carry_over_scores(&self, source: &str, target: &str, factor: Decimal) -> StoreResult<()> {
        validate_decay_factor(factor)?;

        let mut carried = HashMap::new();
        for (member, score) in self.get_all_scores(source)? {
            let decayed = score.apply_decay(factor)?;
            if !decayed.is_zero() {
                carried.insert(member, decayed);
            }
        }
        if carried.is_empty() {
            return Ok(());
        }
        self.increment_scores(target, &carried)
    }

    /// Highest `n` members, ties broken by member id.
    fn top_scores(&self, key: &str, n: usize) -> StoreResult<Vec<(String, Score)>> {
        let mut entries: Vec<(String, Score)> = self.get_all_scores(key)?.into_iter().collect();
        entries.sort_by(leaderboard_order);
        entries.truncate(n);
        Ok(entries)
    }

    /// Zero-based position of `member` in leaderboard order.
    fn rank_of(&self, key: &str, member: &str) -> StoreResult<Option<usize>> {
        let mut entries: Vec<(String, Score)> = self.get_all_scores(key)?.into_iter().collect();
        entries.sort_by(leaderboard_order);
        Ok(entries.iter().position(|(m, _)| m == member))
    }
}

fn leaderboard_order(a: &(String, Score), b: &(String, Score)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, Score>,
    expires_at: Option<Instant>,
}

impl SortedSet {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// Sorted-set store with lazy TTL expiry.
#[derive(Debug, Default)]
pub struct InMemoryRankingStore {
    sets: RwLock<HashMap<String, SortedSet>>,
}

impl InMemoryRankingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live, `None` for absent or persistent keys.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let sets = self.sets.read();
        let set = sets.get(key).filter(|s| !s.is_expired(now))?;
        set.expires_at.map(|at| at.saturating_duration_since(now))
    }

    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .sets
            .read()
            .iter()
            .filter(|(_, s)| !s.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl RankingStore for InMemoryRankingStore {
    fn increment_scores(&self, key: &str, deltas: &HashMap<String, Score>) -> StoreResult<()> {
        if deltas.is_empty() {
            return Ok(());
        }
        let now = Instant::now();
        let mut sets = self.sets.write();

        let set = sets.entry(key.to_string()).or_default();
        if set.is_expired(now) {
            *set = SortedSet::default();
        }
        for (member, delta) in deltas {
            let entry = set.scores.entry(member.clone()).or_insert(Score::ZERO);
            *entry = *entry + *delta;
        }
        Ok(())
    }

    fn replace_all(&self, key: &str, scores: &HashMap<String, Score>) -> StoreResult<()> {
        let mut sets = self.sets.write();
        if scores.is_empty() {
            sets.remove(key);
        } else {
            sets.insert(
                key.to_string(),
                SortedSet {
                    scores: scores.clone(),
                    expires_at: None,
                },
            );
        }
        Ok(())
    }

    fn get_all_scores(&self, key: &str) -> StoreResult<HashMap<String, Score>> {
        let now = Instant::now();
        Ok(self
            .sets
            .read()
            .get(key)
            .filter(|s| !s.is_expired(now))
            .map(|s| s.scores.clone())
            .unwrap_or_default())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .sets
            .read()
            .get(key)
            .map_or(false, |s| !s.is_expired(now)))
    }

    fn set_ttl(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        let mut sets = self.sets.write();
        if let Some(set) = sets.get_mut(key) {
            if set.is_expired(now) {
                sets.remove(key);
            } else {
                set.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }
}
