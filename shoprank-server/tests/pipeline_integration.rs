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

//! End-to-end tests for the ranking services over fault-injecting stores.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shoprank_core::{
    AggregationKey, CountSnapshot, ManualClock, ProductDailyMetric, ProductHourlyMetric,
    RankingEvent, RankingWeight, RetryPolicy, Score,
};
use shoprank_server::{
    AggregationSettings, RankingAggregationService, RankingWeightRecalculationService,
    RecalculationCommand, RecalculationOutcome, RecalculationSettings, ServiceError,
};
use shoprank_storage::{
    IdempotencyStore, InMemoryIdempotencyStore, InMemoryMetricStore, InMemoryRankingStore,
    InMemoryWeightStore, MetricStore, RankingStore, StoreError, StoreResult, WeightStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// ============================================================================
// Fault-injecting stores
// ============================================================================

const NEVER: u32 = u32::MAX;

#[derive(Default)]
struct FlakyMetricStore {
    inner: InMemoryMetricStore,
    hourly_calls: AtomicU32,
    fail_hourly_call: AtomicU32,
}

impl FlakyMetricStore {
    fn new() -> Self {
        Self {
            fail_hourly_call: AtomicU32::new(NEVER),
            ..Default::default()
        }
    }

    /// Fail the `n`th (zero-based, counted from now) hourly chunk once.
    fn fail_hourly_chunk(&self, n: u32) {
        let base = self.hourly_calls.load(Ordering::SeqCst);
        self.fail_hourly_call.store(base + n, Ordering::SeqCst);
    }
}

impl MetricStore for FlakyMetricStore {
    fn upsert_add_delta(
        &self,
        product_id: u64,
        stat_hour: DateTime<Utc>,
        delta: &CountSnapshot,
    ) -> StoreResult<()> {
        self.upsert_add_deltas(&[(AggregationKey::of(product_id, stat_hour), *delta)])
    }

    fn upsert_add_deltas(&self, rows: &[(AggregationKey, CountSnapshot)]) -> StoreResult<()> {
        let call = self.hourly_calls.fetch_add(1, Ordering::SeqCst);
        if call == self.fail_hourly_call.load(Ordering::SeqCst) {
            self.fail_hourly_call.store(NEVER, Ordering::SeqCst);
            return Err(StoreError::unavailable("metric store timed out"));
        }
        self.inner.upsert_add_deltas(rows)
    }

    fn find_all_by_stat_hour(&self, stat_hour: DateTime<Utc>) -> StoreResult<Vec<ProductHourlyMetric>> {
        self.inner.find_all_by_stat_hour(stat_hour)
    }

    fn upsert_daily_add_delta(
        &self,
        product_id: u64,
        stat_date: NaiveDate,
        delta: &CountSnapshot,
    ) -> StoreResult<()> {
        self.inner.upsert_daily_add_delta(product_id, stat_date, delta)
    }

    fn find_all_by_stat_date(&self, stat_date: NaiveDate) -> StoreResult<Vec<ProductDailyMetric>> {
        self.inner.find_all_by_stat_date(stat_date)
    }
}

struct FlakyRankingStore {
    inner: InMemoryRankingStore,
    replace_failures: AtomicU32,
    replace_calls: AtomicU32,
    increment_calls: AtomicU32,
    fail_increment_call: AtomicU32,
    ttl_failures: AtomicU32,
    writes: AtomicU32,
}

impl Default for FlakyRankingStore {
    fn default() -> Self {
        Self {
            inner: InMemoryRankingStore::new(),
            replace_failures: AtomicU32::new(0),
            replace_calls: AtomicU32::new(0),
            increment_calls: AtomicU32::new(0),
            fail_increment_call: AtomicU32::new(NEVER),
            ttl_failures: AtomicU32::new(0),
            writes: AtomicU32::new(0),
        }
    }
}

impl FlakyRankingStore {
    fn fail_next_replaces(&self, n: u32) {
        self.replace_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the `n`th (zero-based, counted from now) increment once.
    fn fail_increment(&self, n: u32) {
        let base = self.increment_calls.load(Ordering::SeqCst);
        self.fail_increment_call.store(base + n, Ordering::SeqCst);
    }

    fn fail_next_ttls(&self, n: u32) {
        self.ttl_failures.store(n, Ordering::SeqCst);
    }
}

impl RankingStore for FlakyRankingStore {
    fn increment_scores(&self, key: &str, deltas: &HashMap<String, Score>) -> StoreResult<()> {
        let call = self.increment_calls.fetch_add(1, Ordering::SeqCst);
        if call == self.fail_increment_call.load(Ordering::SeqCst) {
            self.fail_increment_call.store(NEVER, Ordering::SeqCst);
            return Err(StoreError::unavailable("ranking store connection reset"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.increment_scores(key, deltas)
    }

    fn replace_all(&self, key: &str, scores: &HashMap<String, Score>) -> StoreResult<()> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        if self.replace_failures.load(Ordering::SeqCst) > 0 {
            self.replace_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::unavailable("ranking store connection reset"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.replace_all(key, scores)
    }

    fn get_all_scores(&self, key: &str) -> StoreResult<HashMap<String, Score>> {
        self.inner.get_all_scores(key)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key)
    }

    fn set_ttl(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        if self.ttl_failures.load(Ordering::SeqCst) > 0 {
            self.ttl_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::unavailable("ranking store connection reset"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_ttl(key, ttl)
    }
}

#[derive(Default)]
struct CountingIdempotencyStore {
    inner: InMemoryIdempotencyStore,
    saves: AtomicU32,
}

impl IdempotencyStore for CountingIdempotencyStore {
    fn exists_by_key(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists_by_key(key)
    }

    fn save(&self, key: &str) -> StoreResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(key)
    }
}

struct DownWeightStore;

impl WeightStore for DownWeightStore {
    fn find_latest(&self) -> StoreResult<Option<RankingWeight>> {
        Err(StoreError::unavailable("config service down"))
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    metrics: Arc<FlakyMetricStore>,
    rankings: Arc<FlakyRankingStore>,
    idempotency: Arc<CountingIdempotencyStore>,
    aggregation: Arc<RankingAggregationService>,
    recalculation: Arc<RankingWeightRecalculationService>,
}

const PREVIOUS: &str = "ranking:products:hourly:2025031013";
const CURRENT: &str = "ranking:products:hourly:2025031014";
const NEXT: &str = "ranking:products:hourly:2025031015";

fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn harness_with(chunk_size: usize, weights: Arc<dyn WeightStore>) -> Harness {
    let metrics = Arc::new(FlakyMetricStore::new());
    let rankings = Arc::new(FlakyRankingStore::default());
    let idempotency = Arc::new(CountingIdempotencyStore::default());
    let clock = Arc::new(ManualClock::new(at("2025-03-10T14:30:00Z")));

    let aggregation = Arc::new(RankingAggregationService::new(
        metrics.clone(),
        rankings.clone(),
        weights.clone(),
        idempotency.clone(),
        AggregationSettings {
            flush_chunk_size: chunk_size,
            ..Default::default()
        },
    ));
    let recalculation = Arc::new(
        RankingWeightRecalculationService::new(
            metrics.clone(),
            rankings.clone(),
            weights,
            idempotency.clone(),
            clock,
            RecalculationSettings {
                retry: RetryPolicy::immediate(3),
                ..Default::default()
            },
        )
        .unwrap(),
    );

    Harness {
        metrics,
        rankings,
        idempotency,
        aggregation,
        recalculation,
    }
}

fn harness() -> Harness {
    harness_with(500, Arc::new(InMemoryWeightStore::new()))
}

fn counts(views: i64, likes: i64, orders: i64, amount: Decimal) -> CountSnapshot {
    CountSnapshot {
        views,
        likes,
        order_count: orders,
        order_amount: amount,
        ..Default::default()
    }
}

fn seed(h: &Harness, product_id: u64, hour: &str, delta: CountSnapshot) {
    h.metrics
        .inner
        .upsert_add_delta(product_id, at(hour), &delta)
        .unwrap();
}

fn score_of(h: &Harness, key: &str, product_id: u64) -> Option<Decimal> {
    h.rankings
        .get_all_scores(key)
        .unwrap()
        .get(&product_id.to_string())
        .map(|s| s.value())
}

// ============================================================================
// Recalculation
// ============================================================================

#[test]
fn test_combined_score_with_decay() {
    let h = harness();
    seed(&h, 1, "2025-03-10T14:00:00Z", counts(100, 10, 1, dec!(1000)));
    // 200 * 0.1 + 20 * 0.2 + 2000 * 0.6 = 1224.00
    seed(&h, 1, "2025-03-10T13:00:00Z", counts(200, 20, 2, dec!(2000)));

    let outcome = h
        .recalculation
        .recalculate(&RecalculationCommand::new("evt-1"))
        .unwrap();

    assert_eq!(
        outcome,
        RecalculationOutcome::Recalculated {
            bucket_key: CURRENT.to_string(),
            products: 1,
            next_bucket_primed: false,
        }
    );
    assert_eq!(score_of(&h, CURRENT, 1), Some(dec!(734.40)));
    assert!(h.idempotency.exists_by_key("recalc:evt-1").unwrap());
}

#[test]
fn test_previous_only_product_gets_decayed_score() {
    let h = harness();
    seed(&h, 1, "2025-03-10T14:00:00Z", counts(10, 0, 0, Decimal::ZERO));
    seed(&h, 2, "2025-03-10T13:00:00Z", counts(100, 0, 0, Decimal::ZERO));

    h.recalculation
        .recalculate(&RecalculationCommand::new("evt-cold"))
        .unwrap();

    assert_eq!(score_of(&h, CURRENT, 1), Some(dec!(1.00)));
    assert_eq!(score_of(&h, CURRENT, 2), Some(dec!(1.00)));
}

#[test]
fn test_replace_drops_stale_members() {
    let h = harness();
    h.rankings
        .inner
        .increment_scores(CURRENT, &HashMap::from([("42".to_string(), Score::new(dec!(999)).unwrap())]))
        .unwrap();
    seed(&h, 1, "2025-03-10T14:00:00Z", counts(10, 0, 0, Decimal::ZERO));

    h.recalculation
        .recalculate(&RecalculationCommand::new("evt-heal"))
        .unwrap();

    let scores = h.rankings.get_all_scores(CURRENT).unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(score_of(&h, CURRENT, 42), None);
}

#[test]
fn test_existing_next_bucket_is_primed() {
    let h = harness();
    h.rankings
        .inner
        .increment_scores(NEXT, &HashMap::from([("9".to_string(), Score::new(dec!(5)).unwrap())]))
        .unwrap();
    seed(&h, 1, "2025-03-10T14:00:00Z", counts(100, 10, 1, dec!(1000)));
    seed(&h, 2, "2025-03-10T13:00:00Z", counts(100, 0, 0, Decimal::ZERO));

    let outcome = h
        .recalculation
        .recalculate(&RecalculationCommand::new("evt-prime"))
        .unwrap();

    assert!(matches!(
        outcome,
        RecalculationOutcome::Recalculated {
            next_bucket_primed: true,
            ..
        }
    ));
    // 612.00 * 0.1 and 1.00 * 0.1
    assert_eq!(score_of(&h, NEXT, 1), Some(dec!(61.20)));
    assert_eq!(score_of(&h, NEXT, 2), Some(dec!(0.10)));
    assert_eq!(score_of(&h, NEXT, 9), None);
}

#[test]
fn test_missing_next_bucket_is_not_created() {
    let h = harness();
    seed(&h, 1, "2025-03-10T14:00:00Z", counts(1, 0, 0, Decimal::ZERO));

    h.recalculation
        .recalculate(&RecalculationCommand::new("evt-no-next"))
        .unwrap();

    assert!(!h.rankings.exists(NEXT).unwrap());
}

#[test]
fn test_replace_succeeds_after_transient_failures() {
    for failures in [1u32, 2] {
        let h = harness();
        seed(&h, 1, "2025-03-10T14:00:00Z", counts(100, 10, 1, dec!(1000)));
        h.rankings.fail_next_replaces(failures);

        let outcome = h
            .recalculation
            .recalculate(&RecalculationCommand::new(format!("evt-retry-{}", failures)))
            .unwrap();

        assert!(matches!(outcome, RecalculationOutcome::Recalculated { .. }));
        assert_eq!(h.rankings.replace_calls.load(Ordering::SeqCst), failures + 1);
        assert_eq!(score_of(&h, CURRENT, 1), Some(dec!(612.00)));
    }
}

#[test]
fn test_exhausted_retries_withhold_idempotency_key() {
    let h = harness();
    seed(&h, 1, "2025-03-10T14:00:00Z", counts(100, 10, 1, dec!(1000)));
    h.rankings.fail_next_replaces(3);

    let err = h
        .recalculation
        .recalculate(&RecalculationCommand::new("evt-down"))
        .unwrap_err();

    assert!(matches!(err, ServiceError::RetryExhausted { attempts: 3, .. }));
    assert_eq!(h.rankings.replace_calls.load(Ordering::SeqCst), 3);
    assert!(!h.idempotency.exists_by_key("recalc:evt-down").unwrap());
    assert!(!h.rankings.exists(CURRENT).unwrap());

    // the store recovered; redelivery of the same event now succeeds
    let outcome = h
        .recalculation
        .recalculate(&RecalculationCommand::new("evt-down"))
        .unwrap();
    assert!(matches!(outcome, RecalculationOutcome::Recalculated { .. }));
    assert!(h.idempotency.exists_by_key("recalc:evt-down").unwrap());
}

#[test]
fn test_repeated_event_id_writes_nothing() {
    let h = harness();
    seed(&h, 1, "2025-03-10T14:00:00Z", counts(100, 10, 1, dec!(1000)));

    let command = RecalculationCommand::new("evt-dup");
    h.recalculation.recalculate(&command).unwrap();

    let writes = h.rankings.writes.load(Ordering::SeqCst);
    let saves = h.idempotency.saves.load(Ordering::SeqCst);

    let outcome = h.recalculation.recalculate(&command).unwrap();
    assert_eq!(outcome, RecalculationOutcome::AlreadyHandled);
    assert_eq!(h.rankings.writes.load(Ordering::SeqCst), writes);
    assert_eq!(h.idempotency.saves.load(Ordering::SeqCst), saves);
}

#[test]
fn test_no_metrics_still_marks_handled() {
    let h = harness();

    let outcome = h
        .recalculation
        .recalculate(&RecalculationCommand::new("evt-empty"))
        .unwrap();

    assert_eq!(
        outcome,
        RecalculationOutcome::NoMetrics {
            bucket_key: CURRENT.to_string()
        }
    );
    assert_eq!(h.rankings.writes.load(Ordering::SeqCst), 0);
    assert!(h.idempotency.exists_by_key("recalc:evt-empty").unwrap());
}

#[test]
fn test_concurrent_runs_of_one_event_execute_once() {
    const THREADS: usize = 8;
    let h = harness();
    seed(&h, 1, "2025-03-10T14:00:00Z", counts(100, 10, 1, dec!(1000)));

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let service = Arc::clone(&h.recalculation);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service
                    .recalculate(&RecalculationCommand::new("evt-race"))
                    .unwrap()
            })
        })
        .collect();

    let executed = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|outcome| matches!(outcome, RecalculationOutcome::Recalculated { .. }))
        .count();

    assert_eq!(executed, 1);
    assert_eq!(h.rankings.replace_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_weight_lookup_failure_falls_back() {
    let h = harness_with(500, Arc::new(DownWeightStore));
    seed(&h, 1, "2025-03-10T14:00:00Z", counts(100, 10, 1, dec!(1000)));

    h.recalculation
        .recalculate(&RecalculationCommand::new("evt-fallback"))
        .unwrap();

    assert_eq!(score_of(&h, CURRENT, 1), Some(dec!(612.00)));
}

#[test]
fn test_published_weight_is_used() {
    let weights = Arc::new(InMemoryWeightStore::with_weight(
        RankingWeight::new(dec!(1), dec!(1), dec!(0)).unwrap(),
    ));
    let h = harness_with(500, weights);
    seed(&h, 1, "2025-03-10T14:00:00Z", counts(100, 10, 1, dec!(1000)));

    h.recalculation
        .recalculate(&RecalculationCommand::for_hour("evt-weights", at("2025-03-10T14:45:00Z")))
        .unwrap();

    assert_eq!(score_of(&h, CURRENT, 1), Some(dec!(110)));
}

// ============================================================================
// Flush
// ============================================================================

#[test]
fn test_flush_failure_retries_without_loss_or_double_count() {
    let h = harness_with(2, Arc::new(InMemoryWeightStore::new()));
    let t = at("2025-03-10T14:10:00Z");
    for product in 1..=5 {
        h.aggregation.add(&RankingEvent::view(product, t)).unwrap();
    }

    h.metrics.fail_hourly_chunk(1);
    assert!(h.aggregation.flush().is_err());
    assert!(h.aggregation.pending_batch().is_some());
    assert!(!h.rankings.exists(CURRENT).unwrap());

    // new traffic while the batch is parked
    h.aggregation.add(&RankingEvent::view(1, t)).unwrap();

    let report = h.aggregation.flush().unwrap();
    assert_eq!(report.batches, 2);
    assert!(h.aggregation.pending_batch().is_none());

    let hour = at("2025-03-10T14:00:00Z");
    assert_eq!(h.metrics.inner.hourly_row(1, hour).unwrap().view_count, 2);
    for product in 2..=5 {
        assert_eq!(h.metrics.inner.hourly_row(product, hour).unwrap().view_count, 1);
    }
    assert_eq!(score_of(&h, CURRENT, 1), Some(dec!(0.20)));
    assert_eq!(score_of(&h, CURRENT, 5), Some(dec!(0.10)));
}

#[test]
fn test_increment_failure_resumes_without_double_count() {
    let h = harness();
    h.aggregation.add(&RankingEvent::view(1, at("2025-03-10T13:20:00Z"))).unwrap();
    h.aggregation.add(&RankingEvent::view(1, at("2025-03-10T14:20:00Z"))).unwrap();

    // hour 13 is incremented first, then hour 14 fails
    h.rankings.fail_increment(1);
    assert!(h.aggregation.flush().is_err());
    assert!(h.aggregation.pending_batch().is_some());
    assert_eq!(h.rankings.get_all_scores(PREVIOUS).unwrap()["1"].value(), dec!(0.10));
    assert!(!h.rankings.exists(CURRENT).unwrap());

    let report = h.aggregation.flush().unwrap();
    assert_eq!(report.batches, 1);
    assert!(h.aggregation.pending_batch().is_none());

    for key in [PREVIOUS, CURRENT] {
        let scores = h.rankings.get_all_scores(key).unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores["1"].value(), dec!(0.10));
        assert!(h.rankings.inner.ttl(key).is_some());
    }
    // rows were written once, by the first attempt
    let row = h.metrics.inner.hourly_row(1, at("2025-03-10T14:00:00Z")).unwrap();
    assert_eq!(row.view_count, 1);
}

#[test]
fn test_ttl_failure_resumes_without_reincrementing() {
    let h = harness();
    h.aggregation.add(&RankingEvent::view(1, at("2025-03-10T13:20:00Z"))).unwrap();
    h.aggregation.add(&RankingEvent::view(1, at("2025-03-10T14:20:00Z"))).unwrap();

    h.rankings.fail_next_ttls(1);
    assert!(h.aggregation.flush().is_err());
    let increments_after_failure = h.rankings.increment_calls.load(Ordering::SeqCst);
    assert_eq!(increments_after_failure, 2);

    h.aggregation.flush().unwrap();
    assert_eq!(h.rankings.increment_calls.load(Ordering::SeqCst), increments_after_failure);
    for key in [PREVIOUS, CURRENT] {
        assert_eq!(h.rankings.get_all_scores(key).unwrap()["1"].value(), dec!(0.10));
        assert!(h.rankings.inner.ttl(key).is_some());
    }
}

#[test]
fn test_flush_then_recalculate_agree() {
    let h = harness();
    let t = at("2025-03-10T14:10:00Z");
    for _ in 0..100 {
        h.aggregation.add(&RankingEvent::view(1, t)).unwrap();
    }
    for _ in 0..10 {
        h.aggregation.add(&RankingEvent::like(1, t)).unwrap();
    }
    h.aggregation
        .add(&RankingEvent::order_paid(1, dec!(1000), t))
        .unwrap();

    h.aggregation.flush().unwrap();
    assert_eq!(score_of(&h, CURRENT, 1), Some(dec!(612.00)));

    h.recalculation
        .recalculate(&RecalculationCommand::new("evt-agree"))
        .unwrap();
    assert_eq!(score_of(&h, CURRENT, 1), Some(dec!(612.00)));
}

#[test]
fn test_concurrent_producers_then_flush() {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 1_000;
    let h = harness();
    let t = at("2025-03-10T14:10:00Z");

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let aggregation = Arc::clone(&h.aggregation);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    aggregation.add(&RankingEvent::view(i % 4, t)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    h.aggregation.flush().unwrap();

    let rows = h
        .metrics
        .find_all_by_stat_hour(at("2025-03-10T14:00:00Z"))
        .unwrap();
    let total: i64 = rows.iter().map(|r| r.view_count).sum();
    assert_eq!(total, (THREADS * PER_THREAD) as i64);
}

// ============================================================================
// Binary entry point
// ============================================================================

#[tokio::test]
async fn test_run_reads_ndjson_and_ranks() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    let lines = [
        r#"{"productId":1,"eventType":"VIEW","occurredAt":"2025-03-10T14:05:00Z"}"#,
        r#"{"productId":1,"eventType":"VIEW","occurredAt":"2025-03-10T14:06:00Z"}"#,
        r#"{"productId":1,"eventType":"VIEW","occurredAt":"2025-03-10T14:07:00Z"}"#,
        r#"{"productId":1,"eventType":"ORDER_PAID","orderAmount":100,"occurredAt":"2025-03-10T14:08:00Z"}"#,
        r#"{"productId":2,"eventType":"LIKE_CREATED","occurredAt":"2025-03-10T14:09:00Z"}"#,
        r#"{"productId":"oops"}"#,
        "",
    ];
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }

    let summary = shoprank_server::run(
        shoprank_server::ShopRankConfig::default(),
        Some(file.path().to_path_buf()),
        5,
    )
    .await
    .unwrap();

    assert_eq!(summary.events_accepted, 5);
    assert_eq!(summary.events_rejected, 1);
    assert_eq!(summary.bucket_key.as_deref(), Some(CURRENT));

    let board: Vec<(String, Decimal)> = summary
        .leaderboard
        .iter()
        .map(|e| (e.product_id.clone(), e.score.value()))
        .collect();
    assert_eq!(
        board,
        vec![
            ("1".to_string(), dec!(60.30)),
            ("2".to_string(), dec!(0.20)),
        ]
    );
    assert_eq!(summary.leaderboard[0].rank, 1);
}
