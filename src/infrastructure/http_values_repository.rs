// HTTP values store repository implementation
use crate::application::values_repository::{ValuesRepository, ValuesRequest, ValuesResponse};
use crate::domain::error::ChartError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpValuesRepository {
    client: reqwest::Client,
    host: String,
    authorization: Option<String>,
}

impl HttpValuesRepository {
    pub fn new(host: String, authorization: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    fn build_query_url(&self, request: &ValuesRequest) -> String {
        let paths: Vec<String> = request
            .paths
            .iter()
            .map(|p| urlencoding::encode(p).into_owned())
            .collect();
        format!(
            "{}/api/values?p={}&t0={}&t1={}&a={}",
            self.host,
            paths.join(","),
            request.from_ts,
            request.to_ts,
            request.level.query_value()
        )
    }

    async fn execute_query(&self, url: &str) -> Result<ValuesResponse> {
        let mut builder = self.client.get(url).header("Accept", "application/json");
        if let Some(authorization) = &self.authorization {
            builder = builder.header("Authorization", authorization);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send request to values store")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Values query failed with status {}: {}", status, body);
        }

        response
            .json::<ValuesResponse>()
            .await
            .context("Failed to parse values response")
    }
}

#[async_trait]
impl ValuesRepository for HttpValuesRepository {
    async fn fetch_values(&self, request: &ValuesRequest) -> Result<ValuesResponse, ChartError> {
        let url = self.build_query_url(request);
        tracing::debug!("Executing values query: {}", url);

        self.execute_query(&url)
            .await
            .map_err(|e| ChartError::Network(format!("{:#}", e)))
    }
}
