// Session registry - One running chart session per configured chart
use crate::application::chart_session::{ChartHandle, ChartSession};
use crate::application::live_updates::LiveUpdateNotifier;
use crate::application::values_repository::ValuesRepository;
use crate::domain::aggregation::AggregationPolicy;
use crate::domain::time_series::ChartSeries;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartDefinition {
    pub id: String,
    pub title: String,
    pub series: Vec<ChartSeries>,
}

pub struct SessionRegistry {
    charts: Vec<ChartDefinition>,
    sessions: HashMap<String, ChartHandle>,
}

impl SessionRegistry {
    /// Spawn a session for every chart. Later duplicates of an id are skipped.
    pub fn start(
        charts: Vec<ChartDefinition>,
        policy: AggregationPolicy,
        repository: Arc<dyn ValuesRepository>,
        notifier: LiveUpdateNotifier,
    ) -> Self {
        let mut kept = Vec::with_capacity(charts.len());
        let mut sessions = HashMap::with_capacity(charts.len());

        for chart in charts {
            if sessions.contains_key(&chart.id) {
                tracing::warn!(chart = %chart.id, "Duplicate chart id, skipping");
                continue;
            }
            let handle = ChartSession::spawn(
                chart.id.clone(),
                chart.series.clone(),
                policy,
                repository.clone(),
                notifier.clone(),
            );
            sessions.insert(chart.id.clone(), handle);
            kept.push(chart);
        }

        tracing::info!(charts = kept.len(), "Chart sessions started");
        Self {
            charts: kept,
            sessions,
        }
    }

    pub fn charts(&self) -> &[ChartDefinition] {
        &self.charts
    }

    pub fn session(&self, id: &str) -> Option<&ChartHandle> {
        self.sessions.get(id)
    }
}
