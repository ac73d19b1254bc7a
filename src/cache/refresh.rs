//! Refresh coordination: rebuilds the cached feed on demand and on a daily
//! wall-clock schedule, with a single-flight guard so overlapping triggers
//! collapse into one run.
//!
//! A failed build never touches the cache; readers keep the last good
//! payload (possibly flagged stale) until a build succeeds.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::store::{cache_key, CacheStore};
use crate::domain::EventQuery;
use crate::observability::metrics;
use crate::pipeline::FeedBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Running,
    Succeeded,
    Failed,
}

/// One refresh attempt, identified for log correlation.
#[derive(Debug, Clone)]
pub struct RefreshRun {
    pub id: Uuid,
    pub key: String,
    pub state: RefreshState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Serializes refreshes of the feed. The guard is injected so the owning
/// composition root (and tests) control its scope; it is per-coordinator
/// state, never a process-wide global.
#[derive(Clone)]
pub struct RefreshCoordinator {
    builder: Arc<dyn FeedBuilder>,
    store: Arc<CacheStore>,
    in_flight: Arc<AtomicBool>,
}

impl RefreshCoordinator {
    pub fn new(
        builder: Arc<dyn FeedBuilder>,
        store: Arc<CacheStore>,
        in_flight: Arc<AtomicBool>,
    ) -> Self {
        Self {
            builder,
            store,
            in_flight,
        }
    }

    /// Fire-and-forget refresh. Returns the run descriptor if this call won
    /// the single-flight race, `None` if a refresh was already in progress
    /// (a logged no-op, not an error).
    pub fn trigger(&self, query: EventQuery) -> Option<RefreshRun> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            metrics::refresh::rejected_in_flight();
            info!("refresh already in flight, ignoring trigger");
            return None;
        }

        let run = RefreshRun {
            id: Uuid::new_v4(),
            key: cache_key(&query),
            state: RefreshState::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        };

        let coordinator = self.clone();
        let descriptor = run.clone();
        tokio::spawn(async move {
            let finished = coordinator.execute(descriptor, &query).await;
            coordinator.in_flight.store(false, Ordering::SeqCst);
            match finished.state {
                RefreshState::Succeeded => {
                    info!(run_id = %finished.id, "background refresh succeeded")
                }
                _ => warn!(
                    run_id = %finished.id,
                    "background refresh failed: {}",
                    finished.error.as_deref().unwrap_or("unknown")
                ),
            }
        });

        Some(run)
    }

    /// Run one refresh to completion, waiting for the result. Used by the
    /// scheduler and the one-shot CLI path. Respects the same guard.
    pub async fn refresh_now(&self, query: &EventQuery) -> RefreshRun {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            metrics::refresh::rejected_in_flight();
            let now = Utc::now();
            return RefreshRun {
                id: Uuid::new_v4(),
                key: cache_key(query),
                state: RefreshState::Failed,
                started_at: now,
                finished_at: Some(now),
                error: Some("refresh already in flight".to_string()),
            };
        }

        let run = RefreshRun {
            id: Uuid::new_v4(),
            key: cache_key(query),
            state: RefreshState::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        };
        let finished = self.execute(run, query).await;
        self.in_flight.store(false, Ordering::SeqCst);
        finished
    }

    async fn execute(&self, mut run: RefreshRun, query: &EventQuery) -> RefreshRun {
        metrics::refresh::started();
        info!(run_id = %run.id, key = %run.key, "refresh started");
        let started = Instant::now();

        let outcome = self.builder.build_feed(query).await;
        metrics::refresh::duration_seconds(started.elapsed().as_secs_f64());

        match outcome {
            Ok(feed) => match self.store.set(query, &feed) {
                Ok(()) => {
                    metrics::refresh::succeeded();
                    run.state = RefreshState::Succeeded;
                }
                Err(e) => {
                    metrics::refresh::failed();
                    error!(run_id = %run.id, "refresh built a feed but cache write failed: {}", e);
                    run.state = RefreshState::Failed;
                    run.error = Some(e.to_string());
                }
            },
            Err(e) => {
                metrics::refresh::failed();
                run.state = RefreshState::Failed;
                run.error = Some(e.to_string());
            }
        }

        run.finished_at = Some(Utc::now());
        run
    }
}

/// Next occurrence of `at` (wall-clock in `tz`) strictly after `now`:
/// today if the time has not passed yet, otherwise tomorrow. Times erased
/// by a DST gap resolve one hour later; ambiguous times take the earlier
/// instant.
pub fn next_run_at(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let local_now = now.with_timezone(&tz);
    let mut date = local_now.date_naive();

    loop {
        let naive = date.and_time(at);
        let candidate = tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(naive + ChronoDuration::hours(1))).earliest());
        if let Some(candidate) = candidate {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return candidate;
            }
        }
        date += ChronoDuration::days(1);
    }
}

/// Daily schedule loop: sleep until the next wall-clock occurrence, refresh
/// each configured feed in turn, reschedule. Failed runs reschedule exactly
/// like successful ones.
pub async fn run_daily_schedule(
    coordinator: RefreshCoordinator,
    queries: Vec<EventQuery>,
    at: NaiveTime,
    tz: Tz,
) {
    loop {
        let now = Utc::now();
        let next = next_run_at(now, at, tz);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(
            "next scheduled refresh at {} ({} from now)",
            next.with_timezone(&tz),
            humantime_secs(wait.as_secs())
        );
        tokio::time::sleep(wait).await;

        for query in &queries {
            let run = coordinator.refresh_now(query).await;
            match run.state {
                RefreshState::Succeeded => info!(run_id = %run.id, key = %run.key, "scheduled refresh succeeded"),
                _ => warn!(
                    run_id = %run.id,
                    key = %run.key,
                    "scheduled refresh failed: {}",
                    run.error.as_deref().unwrap_or("unknown")
                ),
            }
        }
    }
}

fn humantime_secs(total: u64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    format!("{}h{:02}m", hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::{PipelineError, Result};
    use crate::domain::{CuratedFeed, EventCategory, EventRecord};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FakeBuilder {
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeBuilder {
        fn new(delay: Duration, fail: bool) -> Self {
            Self {
                delay,
                fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FeedBuilder for FakeBuilder {
        async fn build_feed(&self, _query: &EventQuery) -> Result<CuratedFeed> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(PipelineError::Provider {
                    message: "synthetic failure".to_string(),
                });
            }
            let mut feed = CuratedFeed::empty();
            feed.events = vec![EventRecord::new("Jazz Night", EventCategory::Music, "fake")];
            Ok(feed)
        }
    }

    fn query() -> EventQuery {
        EventQuery::new(EventCategory::Music, "San Francisco, CA")
    }

    fn coordinator(builder: Arc<FakeBuilder>) -> (RefreshCoordinator, Arc<CacheStore>) {
        let store = Arc::new(CacheStore::open_in_memory(Duration::from_secs(3600)).unwrap());
        let coord = RefreshCoordinator::new(
            builder,
            Arc::clone(&store),
            Arc::new(AtomicBool::new(false)),
        );
        (coord, store)
    }

    #[tokio::test]
    async fn successful_refresh_writes_cache() {
        let builder = Arc::new(FakeBuilder::new(Duration::ZERO, false));
        let (coord, store) = coordinator(Arc::clone(&builder));

        let run = coord.refresh_now(&query()).await;
        assert_eq!(run.state, RefreshState::Succeeded);
        assert!(run.finished_at.is_some());

        let cached = store.get(&query()).unwrap().unwrap();
        assert_eq!(cached.payload.events.len(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_never_writes_cache() {
        let builder = Arc::new(FakeBuilder::new(Duration::ZERO, true));
        let (coord, store) = coordinator(builder);

        let run = coord.refresh_now(&query()).await;
        assert_eq!(run.state, RefreshState::Failed);
        assert!(run.error.as_deref().unwrap().contains("synthetic failure"));
        assert!(store.get(&query()).unwrap().is_none());
    }

    #[tokio::test]
    async fn second_trigger_during_flight_is_a_no_op() {
        let builder = Arc::new(FakeBuilder::new(Duration::from_millis(200), false));
        let (coord, _store) = coordinator(Arc::clone(&builder));

        let first = coord.trigger(query());
        assert!(first.is_some());
        let second = coord.trigger(query());
        assert!(second.is_none());

        // After the in-flight run completes, triggering works again.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
        assert!(coord.trigger(query()).is_some());
    }

    #[tokio::test]
    async fn guard_is_released_after_failure() {
        let builder = Arc::new(FakeBuilder::new(Duration::ZERO, true));
        let (coord, _store) = coordinator(builder);

        let first = coord.refresh_now(&query()).await;
        assert_eq!(first.state, RefreshState::Failed);
        // A failed run must not leave the guard latched.
        let second = coord.refresh_now(&query()).await;
        assert_eq!(second.state, RefreshState::Failed);
        assert!(second.error.as_deref().unwrap().contains("synthetic failure"));
    }

    #[test]
    fn schedule_rolls_to_tomorrow_when_time_has_passed() {
        let tz = chrono_tz::America::Los_Angeles;
        let at = NaiveTime::from_hms_opt(6, 0, 0).unwrap();

        // 07:00 PDT on June 1 = 14:00 UTC; six o'clock already passed.
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap();
        let next = next_run_at(now, at, tz);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 2, 13, 0, 0).unwrap());

        // 05:00 PDT = 12:00 UTC; today still qualifies.
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let next = next_run_at(now, at, tz);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn schedule_survives_spring_forward_gap() {
        let tz = chrono_tz::America::Los_Angeles;
        // 02:30 does not exist on 2025-03-09 in Los Angeles; the run lands
        // one hour later, 03:30 PDT = 10:30 UTC.
        let at = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 8, 0, 0).unwrap();
        let next = next_run_at(now, at, tz);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 9, 10, 30, 0).unwrap());
    }
}
