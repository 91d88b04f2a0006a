//! Google Cloud Storage connector
//!
//! Talks to the storage JSON API with a blocking client. Authentication is an
//! optional OAuth bearer token read from the environment.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

use stairwell_core::config::{ObjectStorageInclude, NETWORK_TIMEOUT_DEFAULT};

use crate::adapter::{ConnectorError, ObjectStore};

/// Public storage API endpoint
pub const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// uri prefix of objects
pub const GCS_URI_PREFIX: &str = "gs://";

/// Variable read by [`GcsObjectStore::from_env`]
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Split `gs://bucket/key` into bucket and key
pub fn parse_gcs_uri(uri: &str) -> Option<(&str, &str)> {
    let (bucket, key) = uri.strip_prefix(GCS_URI_PREFIX)?.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some((bucket, key))
}

/// Cloud storage object store
pub struct GcsObjectStore {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,

    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

impl GcsObjectStore {
    /// Create a store with the given request timeout
    pub fn new(timeout: Duration) -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: GCS_ENDPOINT.to_string(),
            access_token: None,
        })
    }

    /// Create a store for a configured include entry
    pub fn from_include(include: &ObjectStorageInclude) -> Result<Self, ConnectorError> {
        let mut store = Self::new(include.options.timeout_or(NETWORK_TIMEOUT_DEFAULT))?;

        if let Some(endpoint) = &include.endpoint {
            store = store.with_endpoint(endpoint.clone());
        }

        if let Some(var) = &include.access_token_env {
            let token = std::env::var(var).map_err(|_| {
                ConnectorError::AuthenticationError(format!(
                    "environment variable {} is not set",
                    var
                ))
            })?;
            store = store.with_access_token(token);
        }

        Ok(store)
    }

    /// Create a store outside any include entry, e.g. for saved maps.
    /// The bearer token is taken from `GOOGLE_OAUTH_ACCESS_TOKEN` when set.
    pub fn from_env(timeout: Duration) -> Result<Self, ConnectorError> {
        let store = Self::new(timeout)?;
        Ok(match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => store.with_access_token(token),
            _ => store,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o[/{object}]` with each segment escaped
    fn objects_url(&self, bucket: &str, object: Option<&str>) -> Result<Url, ConnectorError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ConnectorError::InvalidResponse(format!("Invalid endpoint {}: {}", self.endpoint, e)))?;

        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ConnectorError::InvalidResponse(format!("Endpoint {} cannot hold a path", self.endpoint))
            })?;
            segments.pop_if_empty().extend(["storage", "v1", "b", bucket, "o"]);
            if let Some(object) = object {
                segments.push(object);
            }
        }

        Ok(url)
    }

    /// `{endpoint}/upload/storage/v1/b/{bucket}/o`
    fn upload_url(&self, bucket: &str) -> Result<Url, ConnectorError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ConnectorError::InvalidResponse(format!("Invalid endpoint {}: {}", self.endpoint, e)))?;

        url.path_segments_mut()
            .map_err(|_| {
                ConnectorError::InvalidResponse(format!("Endpoint {} cannot hold a path", self.endpoint))
            })?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);

        Ok(url)
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, ConnectorError> {
        let request = match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send()?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ConnectorError::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                ConnectorError::AuthenticationError(format!("access to {} denied", what)),
            ),
            status => Err(ConnectorError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            }),
        }
    }
}

impl ObjectStore for GcsObjectStore {
    fn name(&self) -> &'static str {
        "GCS"
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ConnectorError> {
        let url = self.objects_url(bucket, None)?;
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("fields", "items(name),nextPageToken".to_string())];
            if !prefix.is_empty() {
                query.push(("prefix", prefix.to_string()));
            }
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let page: ObjectList = self
                .send(self.client.get(url.clone()).query(&query), bucket)?
                .json()?;

            names.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!("Listed {} objects in {}{}/{}", names.len(), GCS_URI_PREFIX, bucket, prefix);
        Ok(names)
    }

    fn get_object(&self, bucket: &str, name: &str) -> Result<String, ConnectorError> {
        let url = self.objects_url(bucket, Some(name))?;
        let what = format!("{}{}/{}", GCS_URI_PREFIX, bucket, name);

        let bytes = self
            .send(self.client.get(url).query(&[("alt", "media")]), &what)?
            .bytes()?;

        String::from_utf8(bytes.to_vec())
            .map_err(|e| ConnectorError::InvalidResponse(format!("{} is not UTF-8: {}", what, e)))
    }

    fn put_object(&self, bucket: &str, name: &str, content: &str) -> Result<(), ConnectorError> {
        let url = self.upload_url(bucket)?;
        let what = format!("{}{}/{}", GCS_URI_PREFIX, bucket, name);
        let content_type = if name.ends_with(".json") {
            "application/json"
        } else {
            "text/plain; charset=utf-8"
        };

        let request = self
            .client
            .post(url)
            .query(&[("uploadType", "media"), ("name", name)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(content.to_string());
        self.send(request, &what)?;

        tracing::debug!("Uploaded {} bytes to {}", content.len(), what);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_are_escaped_in_urls() {
        let store = GcsObjectStore::new(Duration::from_secs(1)).unwrap();
        let url = store.objects_url("bucket-a", Some("queries/daily orders.sql")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/bucket-a/o/queries%2Fdaily%20orders.sql"
        );
    }

    #[test]
    fn custom_endpoint() {
        let store = GcsObjectStore::new(Duration::from_secs(1))
            .unwrap()
            .with_endpoint("http://localhost:4443/");
        let url = store.objects_url("b", None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4443/storage/v1/b/b/o");
    }

    #[test]
    fn upload_url_and_uri_parsing() {
        let store = GcsObjectStore::new(Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.upload_url("bucket-a").unwrap().as_str(),
            "https://storage.googleapis.com/upload/storage/v1/b/bucket-a/o"
        );

        assert_eq!(
            parse_gcs_uri("gs://bucket-a/maps/lineage.json"),
            Some(("bucket-a", "maps/lineage.json"))
        );
        assert_eq!(parse_gcs_uri("gs://bucket-a/"), None);
        assert_eq!(parse_gcs_uri("gs://bucket-a"), None);
        assert_eq!(parse_gcs_uri("maps/lineage.json"), None);
    }

    #[test]
    fn missing_token_variable_is_authentication_error() {
        let include = ObjectStorageInclude {
            bucket: "b".to_string(),
            prefix: String::new(),
            project: None,
            regex: ".*".to_string(),
            endpoint: None,
            access_token_env: Some("STAIRWELL_TEST_UNSET_TOKEN_VAR".to_string()),
            options: Default::default(),
        };

        let result = GcsObjectStore::from_include(&include);
        assert!(matches!(result, Err(ConnectorError::AuthenticationError(_))));
    }
}
