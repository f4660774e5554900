// Chart session - One event loop per chart driving the fetch coordinator
use crate::application::fetch_coordinator::{FetchCoordinator, FetchTicket, RequestId, Settled};
use crate::application::live_updates::{ChangeSubscription, LiveUpdateNotifier};
use crate::application::render_state::{NearestHit, RenderSnapshot};
use crate::application::values_repository::{ValuesRepository, ValuesResponse};
use crate::domain::aggregation::AggregationPolicy;
use crate::domain::coordinates::Viewport;
use crate::domain::error::ChartError;
use crate::domain::time_series::ChartSeries;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 32;
const OUTCOME_BUFFER: usize = 64;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Chart session has shut down")]
pub struct SessionClosed;

/// Tooltip query against a viewport, in plot-area pixels.
#[derive(Debug, Clone)]
pub struct NearestQuery {
    pub viewport: Viewport,
    pub x: f64,
    pub y: f64,
    pub radius_px: f64,
    /// Series ids to consider; all series when `None`.
    pub visible: Option<Vec<String>>,
}

enum SessionCommand {
    Viewport {
        viewport: Viewport,
        reply: oneshot::Sender<Arc<RenderSnapshot>>,
    },
    Nearest {
        query: NearestQuery,
        reply: oneshot::Sender<Option<NearestHit>>,
    },
}

struct FetchOutcome {
    id: RequestId,
    result: Result<ValuesResponse, ChartError>,
}

/// Cheap handle to a running session. The session shuts down, aborting its
/// fetches, once every handle is dropped.
#[derive(Clone)]
pub struct ChartHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<Arc<RenderSnapshot>>,
}

impl ChartHandle {
    /// Apply a new viewport and return the snapshot taken right after the
    /// coverage check.
    pub async fn set_viewport(&self, viewport: Viewport) -> Result<Arc<RenderSnapshot>, SessionClosed> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Viewport { viewport, reply })
            .await
            .map_err(|_| SessionClosed)?;
        response.await.map_err(|_| SessionClosed)
    }

    pub async fn nearest(&self, query: NearestQuery) -> Result<Option<NearestHit>, SessionClosed> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Nearest { query, reply })
            .await
            .map_err(|_| SessionClosed)?;
        response.await.map_err(|_| SessionClosed)
    }

    /// Receiver that sees every snapshot published from now on.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RenderSnapshot>> {
        self.snapshots.clone()
    }
}

pub struct ChartSession {
    chart_id: String,
    coordinator: FetchCoordinator,
    repository: Arc<dyn ValuesRepository>,
    notifier: LiveUpdateNotifier,
    in_flight: HashMap<RequestId, JoinHandle<()>>,
    outcomes: mpsc::Sender<FetchOutcome>,
    snapshots: watch::Sender<Arc<RenderSnapshot>>,
}

impl ChartSession {
    /// Start the session task for one chart and return its handle.
    pub fn spawn(
        chart_id: String,
        series: Vec<ChartSeries>,
        policy: AggregationPolicy,
        repository: Arc<dyn ValuesRepository>,
        notifier: LiveUpdateNotifier,
    ) -> ChartHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(RenderSnapshot::default()));

        let session = Self {
            chart_id,
            coordinator: FetchCoordinator::new(series, policy),
            repository,
            notifier,
            in_flight: HashMap::new(),
            outcomes: outcome_tx,
            snapshots: snapshot_tx,
        };
        tokio::spawn(session.run(command_rx, outcome_rx));

        ChartHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut outcomes: mpsc::Receiver<FetchOutcome>,
    ) {
        let topics = self.coordinator.paths().to_vec();
        tracing::info!(chart = %self.chart_id, topics = topics.len(), "Chart session started");

        // Commands are served while the notification channel connects.
        let notifier = self.notifier.clone();
        let attaching = async move { notifier.attach(&topics).await };
        tokio::pin!(attaching);
        let mut attached = false;
        let mut on_fallback = false;
        let mut live: Option<ChangeSubscription> = None;

        loop {
            tokio::select! {
                biased;

                (subscription, error) = &mut attaching, if !attached => {
                    attached = true;
                    live = Some(subscription);
                    if let Some(error) = error {
                        on_fallback = true;
                        self.coordinator.record_error(error);
                        self.publish();
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(outcome) = outcomes.recv() => self.settle(outcome),
                changed = next_change(&mut live) => {
                    if changed {
                        self.refresh();
                    } else if on_fallback {
                        tracing::warn!(chart = %self.chart_id, "Polling stopped, live updates disabled");
                        live = None;
                    } else {
                        tracing::warn!(chart = %self.chart_id, "Change notifications lost, polling instead");
                        self.coordinator.record_error(ChartError::Subscription(
                            "notification channel closed".to_string(),
                        ));
                        live = Some(self.notifier.fallback());
                        on_fallback = true;
                        self.publish();
                    }
                }
            }
        }

        self.shutdown();
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Viewport { viewport, reply } => {
                let level_before = self.coordinator.level();
                let tickets = self.coordinator.ensure_coverage(&viewport);
                let changed = !tickets.is_empty() || self.coordinator.level() != level_before;
                self.launch(tickets);
                if changed {
                    self.publish();
                }
                let _ = reply.send(self.snapshots.borrow().clone());
            }
            SessionCommand::Nearest { query, reply } => {
                let hit = self.coordinator.nearest_point(
                    &query.viewport,
                    query.x,
                    query.y,
                    query.radius_px,
                    query.visible.as_deref(),
                );
                let _ = reply.send(hit);
            }
        }
    }

    fn settle(&mut self, outcome: FetchOutcome) {
        self.in_flight.remove(&outcome.id);
        if self.coordinator.complete(outcome.id, outcome.result) == Settled::Stale {
            self.recheck();
        }
        self.publish();
    }

    /// The resource changed: drop cached data and refetch what is visible.
    fn refresh(&mut self) {
        tracing::debug!(chart = %self.chart_id, "Change signal received");
        self.coordinator.invalidate();
        self.recheck();
        self.publish();
    }

    fn recheck(&mut self) {
        if let Some(viewport) = self.coordinator.last_viewport() {
            let tickets = self.coordinator.ensure_coverage(&viewport);
            self.launch(tickets);
        }
    }

    fn launch(&mut self, tickets: Vec<FetchTicket>) {
        for ticket in tickets {
            let repository = self.repository.clone();
            let outcomes = self.outcomes.clone();
            let task = tokio::spawn(async move {
                let result = repository.fetch_values(&ticket.request).await;
                let _ = outcomes.send(FetchOutcome { id: ticket.id, result }).await;
            });
            self.in_flight.insert(ticket.id, task);
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.coordinator.snapshot()));
    }

    fn shutdown(&mut self) {
        for (_, task) in self.in_flight.drain() {
            task.abort();
        }
        let aborted = self.coordinator.abort_all();
        self.publish();
        tracing::info!(chart = %self.chart_id, aborted = aborted.len(), "Chart session stopped");
    }
}

async fn next_change(live: &mut Option<ChangeSubscription>) -> bool {
    match live {
        Some(subscription) => subscription.changed().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::live_updates::manual::{ManualNotifier, StalledNotifier};
    use crate::application::live_updates::{DEFAULT_POLL_INTERVAL, SUBSCRIBE_TIMEOUT};
    use crate::domain::aggregation::AggregationLevel;
    use crate::application::values_repository::mock::MockValuesRepository;
    use crate::domain::error::ErrorKind;

    fn series() -> Vec<ChartSeries> {
        vec![ChartSeries::new("cpu".into(), "host.cpu".into(), "%".into(), 0)]
    }

    fn start(repository: Arc<MockValuesRepository>, notifier: Arc<ManualNotifier>) -> ChartHandle {
        ChartSession::spawn(
            "test".to_string(),
            series(),
            AggregationPolicy::default(),
            repository,
            LiveUpdateNotifier::new(notifier, DEFAULT_POLL_INTERVAL),
        )
    }

    fn viewport() -> Viewport {
        Viewport::new(0, 1000, 500.0, 200.0)
    }

    #[tokio::test]
    async fn test_viewport_fetches_once_and_caches() {
        let repository = Arc::new(MockValuesRepository::new());
        let notifier = Arc::new(ManualNotifier::new());
        let handle = start(repository.clone(), notifier.clone());
        let mut snapshots = handle.subscribe();

        let first = handle.set_viewport(viewport()).await.unwrap();
        assert!(first.fetching);

        let settled = snapshots.wait_for(|s| !s.fetching).await.unwrap().clone();
        assert_eq!(settled.blocks.len(), 1);
        assert_eq!((settled.blocks[0].from_ts, settled.blocks[0].to_ts), (-1000, 2000));

        let second = handle.set_viewport(viewport()).await.unwrap();
        assert!(!second.fetching);
        assert_eq!(repository.requests().len(), 1);
        assert_eq!(notifier.topics(), vec!["host.cpu"]);
    }

    #[tokio::test]
    async fn test_repeated_viewport_while_in_flight_fetches_once() {
        let repository = Arc::new(MockValuesRepository::new());
        repository.hold();
        let handle = start(repository.clone(), Arc::new(ManualNotifier::new()));
        let mut snapshots = handle.subscribe();

        handle.set_viewport(viewport()).await.unwrap();
        handle.set_viewport(viewport()).await.unwrap();
        repository.release();

        snapshots.wait_for(|s| !s.fetching && !s.blocks.is_empty()).await.unwrap();
        assert_eq!(repository.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_retried_on_next_viewport() {
        let repository = Arc::new(MockValuesRepository::new());
        repository.fail_next(1);
        let handle = start(repository.clone(), Arc::new(ManualNotifier::new()));
        let mut snapshots = handle.subscribe();

        handle.set_viewport(viewport()).await.unwrap();
        let failed = snapshots.wait_for(|s| !s.fetching).await.unwrap().clone();
        assert!(failed.blocks.is_empty());
        assert_eq!(failed.last_error.as_ref().unwrap().kind, ErrorKind::NetworkError);

        handle.set_viewport(viewport()).await.unwrap();
        let recovered = snapshots.wait_for(|s| !s.fetching).await.unwrap().clone();
        assert_eq!(recovered.blocks.len(), 1);
        assert!(recovered.last_error.is_none());
        assert_eq!(repository.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_change_signal_refetches_visible_range() {
        let repository = Arc::new(MockValuesRepository::new());
        let notifier = Arc::new(ManualNotifier::new());
        let handle = start(repository.clone(), notifier.clone());
        let mut snapshots = handle.subscribe();

        handle.set_viewport(viewport()).await.unwrap();
        snapshots.wait_for(|s| !s.fetching).await.unwrap();

        repository.hold();
        notifier.fire();
        let refetching = snapshots.wait_for(|s| s.fetching).await.unwrap().clone();
        assert!(refetching.blocks.is_empty());
        assert_eq!(refetching.y_axes_count, 1);

        repository.release();
        let refreshed = snapshots.wait_for(|s| !s.fetching).await.unwrap().clone();
        assert_eq!(refreshed.blocks.len(), 1);

        let requests = repository.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!((requests[1].from_ts, requests[1].to_ts), (-1000, 2000));
    }

    #[tokio::test]
    async fn test_lost_subscription_is_reported() {
        let notifier = Arc::new(ManualNotifier::new());
        let handle = start(Arc::new(MockValuesRepository::new()), notifier.clone());
        let mut snapshots = handle.subscribe();

        // once the viewport is acknowledged the subscription is attached
        handle.set_viewport(viewport()).await.unwrap();
        notifier.disconnect();

        let degraded = snapshots
            .wait_for(|s| {
                s.last_error
                    .as_ref()
                    .is_some_and(|e| e.kind == ErrorKind::SubscriptionError)
            })
            .await
            .unwrap()
            .clone();
        assert_eq!(degraded.last_error.as_ref().unwrap().kind, ErrorKind::SubscriptionError);
    }

    #[tokio::test]
    async fn test_dropping_handle_aborts_in_flight_fetches() {
        let repository = Arc::new(MockValuesRepository::new());
        repository.hold();
        let handle = start(repository.clone(), Arc::new(ManualNotifier::new()));
        let mut snapshots = handle.subscribe();

        let snapshot = handle.set_viewport(viewport()).await.unwrap();
        assert!(snapshot.fetching);
        drop(handle);

        let last = snapshots.wait_for(|s| !s.fetching).await.unwrap().clone();
        assert!(last.blocks.is_empty());
        assert_eq!(last.last_error.as_ref().unwrap().kind, ErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn test_nearest_query_goes_through_session() {
        let repository = Arc::new(MockValuesRepository::new());
        let handle = start(repository, Arc::new(ManualNotifier::new()));
        let mut snapshots = handle.subscribe();

        let viewport = Viewport::new(0, 1000, 1000.0, 100.0);
        handle.set_viewport(viewport).await.unwrap();
        snapshots.wait_for(|s| !s.fetching).await.unwrap();

        // the mock returns one point with v = 1.0 at the middle of [-1000, 2000)
        let hit = handle
            .nearest(NearestQuery {
                viewport,
                x: 500.0,
                y: 50.0,
                radius_px: 10.0,
                visible: None,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.series.id, "cpu");
        assert_eq!(hit.point.t, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_push_channel_does_not_block_viewports() {
        let repository = Arc::new(MockValuesRepository::new());
        let handle = ChartSession::spawn(
            "test".to_string(),
            series(),
            AggregationPolicy::default(),
            repository.clone(),
            LiveUpdateNotifier::new(Arc::new(StalledNotifier), DEFAULT_POLL_INTERVAL),
        );
        let mut snapshots = handle.subscribe();
        let started = tokio::time::Instant::now();

        let first = handle.set_viewport(viewport()).await.unwrap();
        assert!(first.fetching);
        assert!(started.elapsed() < SUBSCRIBE_TIMEOUT);

        let fetched = snapshots.wait_for(|s| !s.fetching).await.unwrap().clone();
        assert_eq!(fetched.blocks.len(), 1);
        assert_eq!(repository.requests().len(), 1);

        let degraded = snapshots
            .wait_for(|s| {
                s.last_error
                    .as_ref()
                    .is_some_and(|e| e.kind == ErrorKind::SubscriptionError)
            })
            .await
            .unwrap()
            .clone();
        assert_eq!(degraded.blocks.len(), 1);
        assert!(started.elapsed() >= SUBSCRIBE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_extreme_viewport_keeps_session_alive() {
        let repository = Arc::new(MockValuesRepository::new());
        let handle = start(repository.clone(), Arc::new(ManualNotifier::new()));
        let mut snapshots = handle.subscribe();

        let extreme = handle
            .set_viewport(Viewport::new(0, i64::MAX, 500.0, 200.0))
            .await
            .unwrap();
        assert_eq!(extreme.aggregation_level, AggregationLevel::Level(6));
        snapshots.wait_for(|s| !s.fetching).await.unwrap();

        let requests = repository.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].from_ts < 0);
        assert!(requests[0].to_ts >= i64::MAX - 3600 * 729);

        let normal = handle.set_viewport(viewport()).await.unwrap();
        assert_eq!(normal.aggregation_level, AggregationLevel::Raw);
        snapshots.wait_for(|s| !s.fetching).await.unwrap();
        assert_eq!(repository.requests().len(), 2);
    }
}
