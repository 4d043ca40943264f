//! Consumer facade: report queries, the published risk snapshot and its
//! periodic refresh.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::fetch::{CachePolicy, ConditionalFetchCache, FetchError, Transport};
use crate::reports::{merge, MergedReports, Report, ReportQuery, ReportWindows};
use crate::risk::{aggregate, paint_segments, PaintedSegment, RiskSnapshot, SegmentColorMap, SegmentColorsPayload};
use crate::scheduler::{ActivationGuard, RefreshScheduler, RefreshTask, SchedulerState};
use crate::store::RevalidationStore;

pub const SEGMENTS_KEY: &str = "segments";
pub const LINES_KEY: &str = "lines";

type RiskCallback = Box<dyn Fn(Arc<RiskSnapshot>) + Send + Sync>;

/// Handle returned by [`Engine::subscribe_risk_updates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Output of one risk pipeline run.
pub struct RiskUpdate {
    pub snapshot: RiskSnapshot,
    pub colors: SegmentColorMap,
}

/// Latest snapshot plus everyone listening for the next one.
struct RiskPublisher {
    tx: watch::Sender<Arc<RiskSnapshot>>,
    colors: RwLock<Option<Arc<SegmentColorMap>>>,
    callbacks: Mutex<Vec<(SubscriptionId, RiskCallback)>>,
    next_id: Mutex<u64>,
}

impl RiskPublisher {
    fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(RiskSnapshot::default()));
        Self {
            tx,
            colors: RwLock::new(None),
            callbacks: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    fn publish(&self, update: RiskUpdate) {
        let snapshot = Arc::new(update.snapshot);
        *self.colors.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(update.colors));
        self.tx.send_replace(snapshot.clone());

        let callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, callback) in callbacks.iter() {
            callback(snapshot.clone());
        }
        tracing::info!(lines = snapshot.len(), subscribers = callbacks.len(), "published risk snapshot");
    }

    fn subscribe(&self, callback: RiskCallback) -> SubscriptionId {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            SubscriptionId(*next)
        };
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }
}

/// Fetch segment colors and known lines, then aggregate.
pub struct RiskRefresh {
    cache: ConditionalFetchCache,
    cfg: Arc<EngineConfig>,
    publisher: Arc<RiskPublisher>,
}

impl RiskRefresh {
    async fn known_lines(&self) -> BTreeSet<String> {
        let locator = self.cfg.lines_locator();
        match self
            .cache
            .fetch_json::<Map<String, Value>>(LINES_KEY, &locator, CachePolicy::Revalidate)
            .await
        {
            Ok(lines) => lines.into_iter().map(|(line, _)| line).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "falling back to configured known lines");
                self.cfg.known_lines.clone()
            }
        }
    }
}

#[async_trait]
impl RefreshTask for RiskRefresh {
    type Output = RiskUpdate;
    type Error = FetchError;

    async fn run(&self) -> Result<RiskUpdate, FetchError> {
        let locator = self.cfg.segments_locator();
        let (payload, known_lines) = tokio::join!(
            self.cache
                .fetch_json::<SegmentColorsPayload>(SEGMENTS_KEY, &locator, CachePolicy::Revalidate),
            self.known_lines(),
        );
        let colors = payload?.segment_colors;
        let snapshot = aggregate(&colors, &known_lines);
        Ok(RiskUpdate { snapshot, colors })
    }

    fn apply(&self, update: RiskUpdate) {
        self.publisher.publish(update);
    }
}

/// Entry point for consumers.
pub struct Engine {
    cfg: Arc<EngineConfig>,
    cache: ConditionalFetchCache,
    publisher: Arc<RiskPublisher>,
    scheduler: RefreshScheduler<RiskRefresh>,
    activation: ActivationGuard,
}

impl Engine {
    pub fn new(
        cfg: EngineConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn RevalidationStore>,
    ) -> Self {
        let cfg = Arc::new(cfg);
        let cache = ConditionalFetchCache::new(transport, store);
        let publisher = Arc::new(RiskPublisher::new());
        let refresh = Arc::new(RiskRefresh {
            cache: cache.clone(),
            cfg: cfg.clone(),
            publisher: publisher.clone(),
        });
        let scheduler = RefreshScheduler::new(refresh);

        Self {
            cfg,
            cache,
            publisher,
            scheduler,
            activation: ActivationGuard::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Fetch the windows concurrently and merge them. A window that fails to
    /// load contributes nothing.
    pub async fn get_reports(
        &self,
        recent: &ReportQuery,
        carve_out: Option<&ReportQuery>,
        prior_day: &ReportQuery,
    ) -> MergedReports {
        let (recent, carve_out, prior_day) = tokio::join!(
            self.load_window(recent),
            async {
                match carve_out {
                    Some(query) => self.load_window(query).await,
                    None => Vec::new(),
                }
            },
            self.load_window(prior_day),
        );

        let merged = merge(recent, &carve_out, &prior_day);
        tracing::debug!(
            live = merged.live().len(),
            historic = merged.historic().len(),
            prior_day = merged.prior_day().len(),
            "merged report windows"
        );
        merged
    }

    /// Reports for the configured windows as of now.
    pub async fn current_reports(&self) -> MergedReports {
        let windows = ReportWindows::at(Utc::now(), &self.cfg);
        self.get_reports(&windows.recent, None, &windows.prior_day).await
    }

    async fn load_window(&self, query: &ReportQuery) -> Vec<Report> {
        match self
            .cache
            .fetch_json::<Vec<Report>>(&query.key, &query.locator, query.policy)
            .await
        {
            Ok(reports) => reports,
            Err(e) => {
                tracing::warn!(key = %query.key, error = %e, "report window unavailable");
                Vec::new()
            }
        }
    }

    pub fn risk_snapshot(&self) -> Arc<RiskSnapshot> {
        self.publisher.tx.borrow().clone()
    }

    pub fn watch_risk(&self) -> watch::Receiver<Arc<RiskSnapshot>> {
        self.publisher.tx.subscribe()
    }

    /// Call `callback` with every snapshot applied from now on.
    pub fn subscribe_risk_updates<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(Arc<RiskSnapshot>) + Send + Sync + 'static,
    {
        self.publisher.subscribe(Box::new(callback))
    }

    pub fn unsubscribe_risk_updates(&self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    /// Color the given geometry segments with the latest segment colors.
    pub fn paint_segments<S: AsRef<str>>(&self, segment_ids: &[S]) -> Vec<PaintedSegment> {
        let colors = self
            .publisher
            .colors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        paint_segments(segment_ids, colors.as_deref())
    }

    /// Run the risk pipeline once and publish the result. Waits for a
    /// scheduled run in flight, so an older result never replaces a newer
    /// one. On failure the current snapshot stays published.
    pub async fn refresh_risk(&self) -> Result<Arc<RiskSnapshot>, FetchError> {
        self.scheduler.refresh_now().await.inspect_err(|e| {
            tracing::warn!(error = %e, "risk refresh failed, keeping previous snapshot");
        })?;
        Ok(self.risk_snapshot())
    }

    /// First-activation refresh; later calls do nothing and return
    /// `Ok(false)`. A failed first refresh still consumes the activation.
    pub async fn activate(&self) -> Result<bool, FetchError> {
        if !self.activation.try_activate() {
            return Ok(false);
        }
        tracing::info!("first activation, refreshing risk");
        self.refresh_risk().await?;
        Ok(true)
    }

    pub fn start_periodic_refresh(&self, interval: Duration) {
        self.scheduler.start(interval);
    }

    pub fn stop_periodic_refresh(&self) {
        self.scheduler.stop();
    }

    pub fn refresh_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
