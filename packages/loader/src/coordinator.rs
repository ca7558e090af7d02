//! The load coordinator: shared state, generation counters and the
//! operations that start, refresh or feed load sessions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use signal_map_live::{LiveEvent, LiveHandle};
use signal_map_signal_models::{
    AggregateStats, DistrictStats, FilterSet, NarrowingQuery, Point, PointCollection,
};
use signal_map_source::progress::{ProgressCallback, null_progress};
use signal_map_source::{AggregateStatsClient, PaginatedFetcher};
use signal_map_spatial::Boundary;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::run_session;
use crate::{LoadPhase, LoaderConfig, SessionOutcome};

/// Mutable coordinator state. Guarded by one mutex so every generation
/// check and the commit it gates happen atomically.
pub(crate) struct State {
    pub(crate) points: PointCollection,
    /// Next remote offset for the unconstrained path.
    pub(crate) cursor: usize,
    pub(crate) filters: FilterSet,
    /// Narrowing the current load generation was started with.
    pub(crate) narrowing: NarrowingQuery,
    pub(crate) phase: LoadPhase,
    pub(crate) load_generation: u64,
    pub(crate) stats_generation: u64,
    /// Generation of the session currently allowed to page, if any.
    pub(crate) active_session: Option<u64>,
    pub(crate) stats: Option<Arc<AggregateStats>>,
    pub(crate) connected: bool,
    pub(crate) last_update: Option<DateTime<Utc>>,
}

pub(crate) struct Inner {
    pub(crate) config: LoaderConfig,
    pub(crate) fetcher: Arc<dyn PaginatedFetcher>,
    pub(crate) stats_client: Arc<dyn AggregateStatsClient>,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    state: Mutex<State>,
}

impl Inner {
    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn progress_units(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

/// Tasks started by [`LoadCoordinator::set_filters`].
#[derive(Debug)]
pub struct FilterChange {
    /// The statistics refresh, always started.
    pub stats: JoinHandle<()>,
    /// The point reload, started only when the narrowing changed.
    pub reload: Option<JoinHandle<SessionOutcome>>,
}

/// How [`LoadCoordinator::request_refresh`] was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRoute {
    /// Sent to the server over the push channel.
    Push,
    /// Push channel unavailable; reloaded locally.
    Local,
}

/// Owns the point collection and drives load sessions.
///
/// Cheap to clone; clones share state. Must be used from within a tokio
/// runtime since sessions and stats refreshes are spawned tasks.
#[derive(Clone)]
pub struct LoadCoordinator {
    inner: Arc<Inner>,
}

impl LoadCoordinator {
    #[must_use]
    pub fn new(
        config: LoaderConfig,
        fetcher: Arc<dyn PaginatedFetcher>,
        stats_client: Arc<dyn AggregateStatsClient>,
    ) -> Self {
        Self::with_progress(config, fetcher, stats_client, null_progress())
    }

    #[must_use]
    pub fn with_progress(
        config: LoaderConfig,
        fetcher: Arc<dyn PaginatedFetcher>,
        stats_client: Arc<dyn AggregateStatsClient>,
        progress: Arc<dyn ProgressCallback>,
    ) -> Self {
        let state = State {
            points: PointCollection::with_ceiling(config.ceiling),
            cursor: 0,
            filters: FilterSet::new(),
            narrowing: NarrowingQuery::default(),
            phase: LoadPhase::Idle,
            load_generation: 0,
            stats_generation: 0,
            active_session: None,
            stats: None,
            connected: false,
            last_update: None,
        };

        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                stats_client,
                progress,
                state: Mutex::new(state),
            }),
        }
    }

    /// Cold start: loads points for the current filters from scratch.
    pub fn start(&self) -> JoinHandle<SessionOutcome> {
        self.reset()
    }

    /// Clears the collection, rewinds the cursor, bumps the load
    /// generation and starts a fresh session. Any running session is
    /// superseded.
    pub fn reset(&self) -> JoinHandle<SessionOutcome> {
        let generation = {
            let mut state = self.inner.state();
            state.load_generation += 1;
            state.points.reset();
            state.cursor = 0;
            state.narrowing = state.filters.narrowing();
            state.phase = LoadPhase::Loading;
            state.active_session = Some(state.load_generation);

            log::info!(
                "Starting load generation {} ({:?})",
                state.load_generation,
                state.narrowing
            );
            state.load_generation
        };

        self.inner
            .progress
            .set_total(progress_units(self.inner.config.ceiling));
        self.inner.progress.set_position(0);

        tokio::spawn(run_session(self.inner.clone(), generation))
    }

    /// Replaces the active filters.
    ///
    /// Statistics are always refreshed. Points are reloaded only when the
    /// narrowing projection differs from the one the current generation was
    /// loaded with (including when a narrowing filter is cleared).
    pub fn set_filters(&self, filters: FilterSet) -> FilterChange {
        let reload = {
            let mut state = self.inner.state();
            let changed = filters.narrowing() != state.narrowing;
            state.filters = filters;
            changed
        };

        let stats = self.refresh_stats();
        let reload = if reload {
            Some(self.reset())
        } else {
            log::debug!("Filter change keeps the point stream; stats only");
            None
        };

        FilterChange { stats, reload }
    }

    /// Explicit refresh of the point collection.
    ///
    /// On the unconstrained path this resumes from the current cursor
    /// without clearing anything. A narrowed load is re-run as a reset.
    /// Returns `None` when a session of the current generation is already
    /// paging; the request is coalesced into it.
    pub fn refresh_points(&self) -> Option<JoinHandle<SessionOutcome>> {
        let generation = {
            let mut state = self.inner.state();

            if state.active_session == Some(state.load_generation) {
                log::debug!(
                    "Refresh coalesced into running session (generation {})",
                    state.load_generation
                );
                return None;
            }

            if !state.narrowing.is_unconstrained() {
                drop(state);
                return Some(self.reset());
            }

            state.phase = LoadPhase::Loading;
            state.active_session = Some(state.load_generation);
            log::debug!(
                "Append refresh from offset {} (generation {})",
                state.cursor,
                state.load_generation
            );

            self.inner
                .progress
                .set_position(progress_units(state.points.len()));
            state.load_generation
        };

        Some(tokio::spawn(run_session(self.inner.clone(), generation)))
    }

    /// Fetches a new statistics snapshot for the current filters.
    ///
    /// The snapshot replaces the previous one wholesale. A failure installs
    /// the empty snapshot. A response that arrives after a newer refresh
    /// was issued is discarded.
    pub fn refresh_stats(&self) -> JoinHandle<()> {
        let (generation, filters) = {
            let mut state = self.inner.state();
            state.stats_generation += 1;
            (state.stats_generation, state.filters.clone())
        };

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let stats = match inner.stats_client.fetch_aggregates(&filters).await {
                Ok(stats) => stats,
                Err(e) => {
                    log::warn!("Aggregate stats unavailable, showing no data: {e}");
                    AggregateStats::empty()
                }
            };

            let mut state = inner.state();
            if state.stats_generation != generation {
                log::debug!(
                    "Discarding stale stats (generation {generation}, current {})",
                    state.stats_generation
                );
                return;
            }
            state.stats = Some(Arc::new(stats));
        })
    }

    /// Manual refresh.
    ///
    /// When the push channel is connected the server is asked to push a
    /// refresh for the current filters. Otherwise statistics and points
    /// are refreshed locally.
    pub fn request_refresh(&self, live: Option<&LiveHandle>) -> RefreshRoute {
        if let Some(live) = live {
            let filters = self.inner.state().filters.clone();
            if live.is_connected() && live.request_refresh(&filters) {
                return RefreshRoute::Push;
            }
        }

        log::debug!("Push channel unavailable; refreshing locally");
        self.refresh_stats();
        self.refresh_points();
        RefreshRoute::Local
    }

    /// Appends a single pushed point. Does not move the cursor.
    ///
    /// Returns `false` when the collection is at its ceiling.
    pub fn push_live_point(&self, point: Point) -> bool {
        let mut state = self.inner.state();
        if state.points.push(point) {
            state.last_update = Some(Utc::now());
            true
        } else {
            log::debug!("Dropping pushed point: collection at ceiling");
            false
        }
    }

    /// Consumes push-channel events until the channel closes.
    pub fn attach_live(&self, mut events: mpsc::Receiver<LiveEvent>) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                coordinator.handle_live_event(event);
            }
            coordinator.set_connected(false);
        })
    }

    fn handle_live_event(&self, event: LiveEvent) {
        match event {
            LiveEvent::Connected => self.set_connected(true),
            LiveEvent::Disconnected => self.set_connected(false),
            LiveEvent::GaveUp => {
                self.set_connected(false);
                log::warn!("Live updates offline; relying on polling and manual refresh");
            }
            LiveEvent::Update => {
                self.refresh_stats();
                self.refresh_points();
            }
            LiveEvent::NewSignal(point) => {
                self.push_live_point(point);
            }
        }
    }

    fn set_connected(&self, connected: bool) {
        self.inner.state().connected = connected;
    }

    /// Starts the periodic auto-refresh. `None` when polling is disabled.
    pub fn spawn_poller(&self) -> Option<JoinHandle<()>> {
        let period = self.inner.config.poll_interval()?;
        let coordinator = self.clone();

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                interval.tick().await;
                log::debug!("Periodic refresh");
                coordinator.refresh_stats();
                coordinator.refresh_points();
            }
        }))
    }

    /// Runs `f` against the current point collection.
    pub fn with_points<R>(&self, f: impl FnOnce(&PointCollection) -> R) -> R {
        f(&self.inner.state().points)
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        self.inner.state().points.len()
    }

    /// Latest statistics snapshot, `None` before the first refresh
    /// resolves.
    #[must_use]
    pub fn aggregate_stats(&self) -> Option<Arc<AggregateStats>> {
        self.inner.state().stats.clone()
    }

    #[must_use]
    pub fn phase(&self) -> LoadPhase {
        self.inner.state().phase
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase().is_loading()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.state().connected
    }

    /// Time of the last committed page or pushed point.
    #[must_use]
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.inner.state().last_update
    }

    #[must_use]
    pub fn filters(&self) -> FilterSet {
        self.inner.state().filters.clone()
    }

    #[must_use]
    pub fn load_generation(&self) -> u64 {
        self.inner.state().load_generation
    }

    /// Next remote offset of the unconstrained stream.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.inner.state().cursor
    }

    /// District statistics over the current collection. Recomputed on
    /// every call.
    #[must_use]
    pub fn compute_district_stats(&self, boundary: &Boundary) -> DistrictStats {
        let state = self.inner.state();
        signal_map_spatial::compute_district_stats(&state.points, boundary)
    }
}
