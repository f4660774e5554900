// Live updates - Change notification port, polling backend and fallback
use crate::domain::error::ChartError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Longest wait for the primary backend before polling takes over.
pub const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Stream of opaque "resource changed" signals. Dropping it stops the
/// backing task.
pub struct ChangeSubscription {
    signals: mpsc::Receiver<()>,
    task: Option<JoinHandle<()>>,
}

impl ChangeSubscription {
    pub fn new(signals: mpsc::Receiver<()>, task: Option<JoinHandle<()>>) -> Self {
        Self { signals, task }
    }

    /// Wait for the next signal. `false` once the channel has closed.
    pub async fn changed(&mut self) -> bool {
        self.signals.recv().await.is_some()
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Forward a signal without blocking; bursts collapse into one.
/// Returns `false` once the subscriber is gone.
pub fn notify(tx: &mpsc::Sender<()>) -> bool {
    !matches!(tx.try_send(()), Err(TrySendError::Closed(_)))
}

#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Subscribe to change signals for all `topics`.
    async fn subscribe(&self, topics: &[String]) -> Result<ChangeSubscription, ChartError>;

    fn name(&self) -> &'static str;
}

/// Fires at a fixed interval, regardless of topics.
#[derive(Debug, Clone, Copy)]
pub struct PollingNotifier {
    interval: Duration,
}

impl PollingNotifier {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The first signal arrives one full interval after starting.
    pub fn start(&self) -> ChangeSubscription {
        let (tx, rx) = mpsc::channel(1);
        let period = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !notify(&tx) {
                    break;
                }
            }
        });
        ChangeSubscription::new(rx, Some(task))
    }
}

#[async_trait]
impl ChangeNotifier for PollingNotifier {
    async fn subscribe(&self, _topics: &[String]) -> Result<ChangeSubscription, ChartError> {
        Ok(self.start())
    }

    fn name(&self) -> &'static str {
        "polling"
    }
}

/// Push notifications when available, polling otherwise.
#[derive(Clone)]
pub struct LiveUpdateNotifier {
    primary: Arc<dyn ChangeNotifier>,
    fallback: PollingNotifier,
}

impl LiveUpdateNotifier {
    pub fn new(primary: Arc<dyn ChangeNotifier>, poll_interval: Duration) -> Self {
        Self {
            primary,
            fallback: PollingNotifier::new(poll_interval),
        }
    }

    pub fn polling(poll_interval: Duration) -> Self {
        let fallback = PollingNotifier::new(poll_interval);
        Self {
            primary: Arc::new(fallback),
            fallback,
        }
    }

    /// Subscribe through the primary backend, degrading to polling when it
    /// fails or does not answer within `SUBSCRIBE_TIMEOUT`. The error, if
    /// any, is returned alongside the subscription.
    pub async fn attach(&self, topics: &[String]) -> (ChangeSubscription, Option<ChartError>) {
        let attempt = tokio::time::timeout(SUBSCRIBE_TIMEOUT, self.primary.subscribe(topics))
            .await
            .unwrap_or_else(|_| {
                Err(ChartError::Subscription(format!(
                    "no answer within {}s",
                    SUBSCRIBE_TIMEOUT.as_secs()
                )))
            });
        match attempt {
            Ok(subscription) => {
                tracing::debug!(backend = self.primary.name(), "Subscribed to change notifications");
                (subscription, None)
            }
            Err(error) => {
                tracing::warn!(
                    backend = self.primary.name(),
                    "Falling back to polling: {}",
                    error
                );
                (self.fallback.start(), Some(error))
            }
        }
    }

    pub fn fallback(&self) -> ChangeSubscription {
        self.fallback.start()
    }
}
