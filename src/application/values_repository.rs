// Repository trait for time series values access
use crate::domain::aggregation::AggregationLevel;
use crate::domain::error::ChartError;
use crate::domain::time_series::{TimeSeriesPoint, Timestamp};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// One fetch against the metrics store.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesRequest {
    pub paths: Vec<String>,
    pub from_ts: Timestamp,
    pub to_ts: Timestamp,
    pub level: AggregationLevel,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathValues {
    #[serde(default)]
    pub data: Vec<TimeSeriesPoint>,
}

/// `{ "paths": { <path>: { "data": [...] } } }`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValuesResponse {
    #[serde(default)]
    pub paths: HashMap<String, PathValues>,
}

#[async_trait]
pub trait ValuesRepository: Send + Sync {
    /// Fetch values of all `paths` for `[from_ts, to_ts)` at one level.
    async fn fetch_values(&self, request: &ValuesRequest) -> Result<ValuesResponse, ChartError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// In-memory repository recording every request.
    ///
    /// Each response holds one raw point per path in the middle of the
    /// requested range. With `hold()` every fetch waits until `release()`.
    #[derive(Default)]
    pub struct MockValuesRepository {
        requests: Mutex<Vec<ValuesRequest>>,
        failures: Mutex<u32>,
        held: Mutex<bool>,
        gate: Notify,
    }

    impl MockValuesRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn requests(&self) -> Vec<ValuesRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Fail the next `count` fetches with a network error.
        pub fn fail_next(&self, count: u32) {
            *self.failures.lock().unwrap() = count;
        }

        pub fn hold(&self) {
            *self.held.lock().unwrap() = true;
        }

        pub fn release(&self) {
            *self.held.lock().unwrap() = false;
            self.gate.notify_waiters();
        }

        fn is_held(&self) -> bool {
            *self.held.lock().unwrap()
        }
    }

    #[async_trait]
    impl ValuesRepository for MockValuesRepository {
        async fn fetch_values(&self, request: &ValuesRequest) -> Result<ValuesResponse, ChartError> {
            self.requests.lock().unwrap().push(request.clone());

            while self.is_held() {
                let released = self.gate.notified();
                if !self.is_held() {
                    break;
                }
                released.await;
            }

            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(ChartError::Network("connection refused".to_string()));
                }
            }

            let middle = request.from_ts / 2 + request.to_ts / 2;
            let paths = request
                .paths
                .iter()
                .map(|p| {
                    let data = vec![TimeSeriesPoint::raw(middle, 1.0)];
                    (p.clone(), PathValues { data })
                })
                .collect();
            Ok(ValuesResponse { paths })
        }
    }
}
