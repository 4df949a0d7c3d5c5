//! Staleness decisions and single-flight refresh scheduling.
//!
//! Every read goes through here. The controller decides between three
//! paths: serve the cached snapshot, serve it and schedule a background
//! refresh, or perform a synchronous cold fetch. At most one background
//! refresh is ever in flight, and concurrent cold reads collapse onto a
//! single scrape.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::application::share::ShareCardCache;
use crate::cache::clock::Clock;
use crate::cache::config::RefreshPolicy;
use crate::cache::store::{CacheError, CacheStore};
use crate::domain::projects::{CacheSnapshot, ProjectRecord};
use crate::scrape::{ProjectSource, ScrapeError};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshPhase {
    Idle,
    Running,
}

/// Admin-facing view of the cache state.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
    pub refreshing: bool,
    pub projects: usize,
    pub policy: String,
}

/// Outcome of an admin-forced refresh.
#[derive(Debug)]
pub enum ForcedRefresh {
    Refreshed(CacheStatus),
    AlreadyRunning(CacheStatus),
}

pub struct StalenessController {
    source: Arc<dyn ProjectSource>,
    store: Arc<CacheStore>,
    clock: Arc<dyn Clock>,
    policy: RefreshPolicy,
    /// Single-flight flag shared with the spawned refresh task.
    phase: Arc<Mutex<RefreshPhase>>,
    /// Serializes cold fetches so concurrent cold reads scrape once.
    cold_gate: AsyncMutex<()>,
    share_cache: Option<Arc<ShareCardCache>>,
}

impl StalenessController {
    pub fn new(
        source: Arc<dyn ProjectSource>,
        store: Arc<CacheStore>,
        clock: Arc<dyn Clock>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            source,
            store,
            clock,
            policy,
            phase: Arc::new(Mutex::new(RefreshPhase::Idle)),
            cold_gate: AsyncMutex::new(()),
            share_cache: None,
        }
    }

    /// Wire the derived share-card cache so it is invalidated whenever the
    /// snapshot is replaced.
    pub fn with_share_cache(mut self, share_cache: Arc<ShareCardCache>) -> Self {
        self.share_cache = Some(share_cache);
        self
    }

    /// The full collection. Serves the last-known-good snapshot whenever
    /// one exists, scheduling a background refresh when it is stale; falls
    /// back to a synchronous cold fetch otherwise.
    pub async fn projects(&self) -> Result<Vec<ProjectRecord>, RefreshError> {
        if let Some(snapshot) = self.store.read_snapshot().await {
            counter!("vetrina_cache_hit_total").increment(1);
            if self.is_stale(&snapshot) {
                self.schedule_refresh();
            }
            return Ok(snapshot.projects);
        }

        counter!("vetrina_cache_miss_total").increment(1);
        self.cold_fetch().await
    }

    /// One record by id, with the same staleness handling as [`projects`].
    ///
    /// [`projects`]: Self::projects
    pub async fn project_by_id(&self, id: &str) -> Result<Option<ProjectRecord>, RefreshError> {
        if let Some(snapshot) = self.store.read_snapshot().await {
            counter!("vetrina_cache_hit_total").increment(1);
            if self.is_stale(&snapshot) {
                self.schedule_refresh();
            }
            return Ok(self.store.read_by_id(id).await);
        }

        counter!("vetrina_cache_miss_total").increment(1);
        let projects = self.cold_fetch().await?;
        Ok(projects.into_iter().find(|project| project.id == id))
    }

    /// Schedule a background refresh. A no-op while one is already in
    /// flight; returns whether this call started one.
    pub fn schedule_refresh(&self) -> bool {
        if !begin_refresh(&self.phase) {
            debug!(
                target = "cache::controller",
                "Refresh already in flight; trigger ignored"
            );
            return false;
        }

        let source = Arc::clone(&self.source);
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let share_cache = self.share_cache.clone();
        let phase = Arc::clone(&self.phase);

        tokio::spawn(async move {
            let result = scrape_and_store(
                source.as_ref(),
                store.as_ref(),
                clock.as_ref(),
                share_cache.as_deref(),
            )
            .await;

            if let Err(err) = result {
                counter!("vetrina_cache_refresh_failed_total").increment(1);
                warn!(
                    target = "cache::controller",
                    error = %err,
                    "Background refresh failed; keeping existing snapshot"
                );
            }
            *lock_phase(&phase) = RefreshPhase::Idle;
        });
        true
    }

    /// Synchronous forced refresh for the admin surface. Respects the
    /// single-flight guarantee: a refresh already in flight is reported,
    /// not duplicated.
    pub async fn refresh_now(&self) -> Result<ForcedRefresh, RefreshError> {
        if !begin_refresh(&self.phase) {
            return Ok(ForcedRefresh::AlreadyRunning(self.status()));
        }

        let result = scrape_and_store(
            self.source.as_ref(),
            self.store.as_ref(),
            self.clock.as_ref(),
            self.share_cache.as_deref(),
        )
        .await;

        *lock_phase(&self.phase) = RefreshPhase::Idle;
        result.map(|_| ForcedRefresh::Refreshed(self.status()))
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            last_update: self.store.last_update(),
            refreshing: *lock_phase(&self.phase) == RefreshPhase::Running,
            projects: self.store.project_count().unwrap_or(0),
            policy: self.policy.describe(),
        }
    }

    fn is_stale(&self, snapshot: &CacheSnapshot) -> bool {
        let age = self.clock.now() - snapshot.last_update;
        self.policy.is_stale(age)
    }

    /// Cold path: nothing cached anywhere. The async gate plus a re-check
    /// after acquiring it collapses a thundering herd onto one scrape.
    async fn cold_fetch(&self) -> Result<Vec<ProjectRecord>, RefreshError> {
        let _gate = self.cold_gate.lock().await;

        if let Some(snapshot) = self.store.read_snapshot().await {
            return Ok(snapshot.projects);
        }

        let snapshot = scrape_and_store(
            self.source.as_ref(),
            self.store.as_ref(),
            self.clock.as_ref(),
            self.share_cache.as_deref(),
        )
        .await?;
        Ok(snapshot.projects)
    }
}

/// Compare-and-set the refresh phase; `true` when this caller owns the new
/// refresh.
fn begin_refresh(phase: &Mutex<RefreshPhase>) -> bool {
    let mut guard = lock_phase(phase);
    if *guard == RefreshPhase::Running {
        return false;
    }
    *guard = RefreshPhase::Running;
    true
}

fn lock_phase(phase: &Mutex<RefreshPhase>) -> MutexGuard<'_, RefreshPhase> {
    phase.lock().unwrap_or_else(|poisoned| {
        warn!(
            target = "cache::controller",
            "Refresh phase lock poisoned; recovering"
        );
        poisoned.into_inner()
    })
}

/// One refresh: scrape, replace the snapshot, invalidate derived caches.
async fn scrape_and_store(
    source: &dyn ProjectSource,
    store: &CacheStore,
    clock: &dyn Clock,
    share_cache: Option<&ShareCardCache>,
) -> Result<CacheSnapshot, RefreshError> {
    let started = Instant::now();
    let projects = source.scrape().await?;
    let snapshot = store.write_snapshot(projects, clock.now()).await?;

    histogram!("vetrina_scrape_duration_ms").record(started.elapsed().as_millis() as f64);
    counter!("vetrina_cache_refresh_total").increment(1);

    if let Some(shares) = share_cache {
        shares.clear().await;
    }

    info!(
        target = "cache::controller",
        projects = snapshot.projects.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Snapshot replaced"
    );

    Ok(snapshot)
}
