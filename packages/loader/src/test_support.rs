//! In-process doubles for the fetcher and stats client.

#![allow(clippy::cast_precision_loss)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use signal_map_signal_models::{AggregateStats, FilterSet, NarrowingQuery, Point};
use signal_map_source::{AggregateStatsClient, Page, PaginatedFetcher, SourceError};
use tokio::sync::oneshot;

pub fn point_at(latitude: f64) -> Point {
    Point {
        latitude,
        longitude: 5.0,
        signal: -70,
        speed: 1.0,
        operator: String::new(),
        network_type: String::new(),
        battery: None,
    }
}

/// Polls `condition` on the (paused) tokio clock until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never became true");
}

/// Serves rows `0..rows` of a virtual table; row `i` becomes a point at
/// latitude `i`. Narrowed queries get [`FakeFetcher::NARROWED_ROWS`]
/// points at negative latitudes.
#[derive(Default)]
pub struct FakeFetcher {
    rows: AtomicUsize,
    drop_every: AtomicUsize,
    calls: Mutex<Vec<(usize, usize)>>,
    narrowed: Mutex<Vec<NarrowingQuery>>,
    failures: Mutex<VecDeque<SourceError>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeFetcher {
    pub const NARROWED_ROWS: usize = 7;

    pub fn with_rows(rows: usize) -> Arc<Self> {
        let fetcher = Self::default();
        fetcher.rows.store(rows, Ordering::SeqCst);
        Arc::new(fetcher)
    }

    pub fn set_rows(&self, rows: usize) {
        self.rows.store(rows, Ordering::SeqCst);
    }

    /// Rows whose index is a multiple of `n` are returned but fail
    /// normalisation (counted in `returned`, absent from `items`).
    pub fn drop_every(&self, n: usize) {
        self.drop_every.store(n, Ordering::SeqCst);
    }

    pub fn fail_next(&self, error: SourceError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// The next request blocks until the returned sender fires.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    /// Unconstrained requests as `(offset, limit)`.
    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn narrowed_calls(&self) -> Vec<NarrowingQuery> {
        self.narrowed.lock().unwrap().clone()
    }

    pub async fn wait_for_calls(&self, n: usize) {
        eventually(|| self.calls.lock().unwrap().len() + self.narrowed.lock().unwrap().len() >= n)
            .await;
    }

    fn page(&self, offset: usize, limit: usize) -> Page {
        let rows = self.rows.load(Ordering::SeqCst);
        let drop_every = self.drop_every.load(Ordering::SeqCst);
        let end = rows.min(offset.saturating_add(limit)).max(offset);

        let items = (offset..end)
            .filter(|i| drop_every == 0 || i % drop_every != 0)
            .map(|i| point_at(i as f64))
            .collect();

        Page {
            items,
            returned: end - offset,
        }
    }
}

#[async_trait]
impl PaginatedFetcher for FakeFetcher {
    async fn fetch_page(
        &self,
        query: &NarrowingQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Page, SourceError> {
        if query.is_unconstrained() {
            self.calls.lock().unwrap().push((offset, limit));
        } else {
            self.narrowed.lock().unwrap().push(query.clone());
        }

        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            hold.await.ok();
        }

        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        if query.is_unconstrained() {
            Ok(self.page(offset, limit))
        } else {
            Ok(Page {
                items: (0..Self::NARROWED_ROWS)
                    .map(|i| point_at(-1.0 - i as f64))
                    .collect(),
                returned: Self::NARROWED_ROWS,
            })
        }
    }
}

/// Answers call `n` with `total_signals = n` and a single company key
/// `call-n`, so snapshots from different calls never share fields.
#[derive(Default)]
pub struct FakeStats {
    calls: AtomicUsize,
    fail: AtomicBool,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn wait_for_calls(&self, n: usize) {
        eventually(|| self.calls() >= n).await;
    }
}

#[async_trait]
impl AggregateStatsClient for FakeStats {
    async fn fetch_aggregates(&self, _filters: &FilterSet) -> Result<AggregateStats, SourceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            hold.await.ok();
        }

        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(SourceError::Api {
                message: "aggregation unavailable".to_owned(),
            });
        }

        Ok(AggregateStats {
            total_signals: n as u64,
            signals_by_company: BTreeMap::from([(format!("call-{n}"), 1)]),
            ..AggregateStats::default()
        })
    }
}
