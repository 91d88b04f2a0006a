//! Redash connector for saved BI queries

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use stairwell_core::config::{BiQueryInclude, NETWORK_TIMEOUT_DEFAULT};

use crate::adapter::{ConnectorError, QueryCatalog, SavedQuery};

const PAGE_SIZE: usize = 100;

/// Redash API client
pub struct RedashClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DataSource {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct QueryPage {
    count: usize,
    results: Vec<SavedQuery>,
}

impl RedashClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Create a client for a configured include entry
    pub fn from_include(include: &BiQueryInclude) -> Result<Self, ConnectorError> {
        let mut client = Self::new(
            include.base_url.clone(),
            include.options.timeout_or(NETWORK_TIMEOUT_DEFAULT),
        )?;

        if let Some(var) = &include.api_key_env {
            let key = std::env::var(var).map_err(|_| {
                ConnectorError::AuthenticationError(format!(
                    "environment variable {} is not set",
                    var
                ))
            })?;
            client = client.with_api_key(key);
        }

        Ok(client)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ConnectorError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Key {}", key));
        }

        let response = request.send()?;
        match response.status() {
            status if status.is_success() => Ok(response.json()?),
            StatusCode::NOT_FOUND => Err(ConnectorError::NotFound(url)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                ConnectorError::AuthenticationError(format!("access to {} denied", url)),
            ),
            status => Err(ConnectorError::Status {
                status: status.as_u16(),
                url,
            }),
        }
    }

    /// Resolve a data source given by name or numeric id
    fn data_source_id(&self, data_source: &str) -> Result<u64, ConnectorError> {
        let sources: Vec<DataSource> = self.get_json("/api/data_sources", &[])?;
        find_data_source(&sources, data_source)
            .ok_or_else(|| ConnectorError::NotFound(format!("data source '{}'", data_source)))
    }
}

fn find_data_source(sources: &[DataSource], data_source: &str) -> Option<u64> {
    sources
        .iter()
        .find(|s| s.name == data_source || s.id.to_string() == data_source)
        .map(|s| s.id)
}

impl QueryCatalog for RedashClient {
    fn name(&self) -> &'static str {
        "Redash"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn list_queries(&self, data_source: &str) -> Result<Vec<SavedQuery>, ConnectorError> {
        let source_id = self.data_source_id(data_source)?;
        let mut queries = Vec::new();
        let mut seen = 0;
        let mut page = 1;

        loop {
            let result: QueryPage = self.get_json(
                "/api/queries",
                &[("page", page.to_string()), ("page_size", PAGE_SIZE.to_string())],
            )?;

            if result.results.is_empty() {
                break;
            }
            seen += result.results.len();
            queries.extend(
                result
                    .results
                    .into_iter()
                    .filter(|q| q.data_source_id == source_id),
            );

            if seen >= result.count {
                break;
            }
            page += 1;
        }

        tracing::debug!("Found {} saved queries for data source {}", queries.len(), data_source);
        Ok(queries)
    }
}
