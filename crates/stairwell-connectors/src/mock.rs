//! In-memory connectors for testing
//!
//! These return predefined objects and queries without any network access.
//! Failures can be simulated per bucket or per data source.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stairwell_connectors::{MemoryObjectStore, ObjectStore};
//!
//! let store = MemoryObjectStore::new();
//! store.put("bucket-a", "queries/orders.sql", "select * from {{ params.customers }}");
//!
//! let names = store.list_objects("bucket-a", "queries/")?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::adapter::{ConnectorError, ObjectStore, QueryCatalog, SavedQuery};

/// Object store backed by a map
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    /// bucket -> object name -> content
    objects: Arc<RwLock<BTreeMap<String, BTreeMap<String, String>>>>,

    /// Errors to return for specific buckets
    errors: Arc<RwLock<HashMap<String, ConnectorError>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an object
    pub fn put(&self, bucket: &str, name: &str, content: &str) {
        if let Ok(mut objects) = self.objects.write() {
            objects
                .entry(bucket.to_string())
                .or_default()
                .insert(name.to_string(), content.to_string());
        }
    }

    /// Make every call for `bucket` fail with `error`
    pub fn fail_bucket(&self, bucket: &str, error: ConnectorError) {
        if let Ok(mut errors) = self.errors.write() {
            errors.insert(bucket.to_string(), error);
        }
    }

    fn check(&self, bucket: &str) -> Result<(), ConnectorError> {
        match self.errors.read() {
            Ok(errors) => match errors.get(bucket) {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            },
            Err(_) => Err(ConnectorError::IoError("memory store lock poisoned".to_string())),
        }
    }
}

impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &'static str {
        "Memory"
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ConnectorError> {
        self.check(bucket)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| ConnectorError::IoError("memory store lock poisoned".to_string()))?;

        let bucket_objects = objects
            .get(bucket)
            .ok_or_else(|| ConnectorError::NotFound(format!("bucket {}", bucket)))?;

        Ok(bucket_objects
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn get_object(&self, bucket: &str, name: &str) -> Result<String, ConnectorError> {
        self.check(bucket)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| ConnectorError::IoError("memory store lock poisoned".to_string()))?;

        objects
            .get(bucket)
            .and_then(|b| b.get(name))
            .cloned()
            .ok_or_else(|| ConnectorError::NotFound(format!("gs://{}/{}", bucket, name)))
    }

    fn put_object(&self, bucket: &str, name: &str, content: &str) -> Result<(), ConnectorError> {
        self.check(bucket)?;
        let mut objects = self
            .objects
            .write()
            .map_err(|_| ConnectorError::IoError("memory store lock poisoned".to_string()))?;

        objects
            .entry(bucket.to_string())
            .or_default()
            .insert(name.to_string(), content.to_string());
        Ok(())
    }
}

/// Query catalog backed by a list
#[derive(Clone)]
pub struct MemoryQueryCatalog {
    base_url: String,

    /// data source name -> id
    data_sources: BTreeMap<String, u64>,

    queries: Vec<SavedQuery>,

    /// Simulate an unreachable catalog
    error: Option<ConnectorError>,
}

impl MemoryQueryCatalog {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            data_sources: BTreeMap::new(),
            queries: Vec::new(),
            error: None,
        }
    }

    pub fn with_data_source(mut self, name: impl Into<String>, id: u64) -> Self {
        self.data_sources.insert(name.into(), id);
        self
    }

    pub fn with_query(mut self, query: SavedQuery) -> Self {
        self.queries.push(query);
        self
    }

    pub fn with_failure(mut self, error: ConnectorError) -> Self {
        self.error = Some(error);
        self
    }
}

impl QueryCatalog for MemoryQueryCatalog {
    fn name(&self) -> &'static str {
        "Memory"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn list_queries(&self, data_source: &str) -> Result<Vec<SavedQuery>, ConnectorError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let id = self
            .data_sources
            .get(data_source)
            .copied()
            .ok_or_else(|| ConnectorError::NotFound(format!("data source '{}'", data_source)))?;

        Ok(self
            .queries
            .iter()
            .filter(|q| q.data_source_id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_by_prefix_sorted() {
        let store = MemoryObjectStore::new();
        store.put("b", "queries/z.sql", "select 1");
        store.put("b", "queries/a.sql", "select 2");
        store.put("b", "other/c.sql", "select 3");

        assert_eq!(
            store.list_objects("b", "queries/").unwrap(),
            vec!["queries/a.sql", "queries/z.sql"]
        );
        assert_eq!(store.get_object("b", "other/c.sql").unwrap(), "select 3");
    }

    #[test]
    fn put_object_creates_and_overwrites() {
        let store = MemoryObjectStore::new();
        store.put_object("b", "maps/lineage.json", "{}").unwrap();
        store.put_object("b", "maps/lineage.json", "{\"a\": {}}").unwrap();

        assert_eq!(store.get_object("b", "maps/lineage.json").unwrap(), "{\"a\": {}}");

        store.fail_bucket("down", ConnectorError::Timeout("down".to_string()));
        assert!(matches!(
            store.put_object("down", "x.json", "{}"),
            Err(ConnectorError::Timeout(_))
        ));
    }

    #[test]
    fn unknown_bucket_and_object() {
        let store = MemoryObjectStore::new();
        store.put("b", "a.sql", "select 1");

        assert!(matches!(store.list_objects("nope", ""), Err(ConnectorError::NotFound(_))));
        assert!(matches!(store.get_object("b", "missing.sql"), Err(ConnectorError::NotFound(_))));
    }

    #[test]
    fn simulated_bucket_failure() {
        let store = MemoryObjectStore::new();
        store.put("b", "a.sql", "select 1");
        store.fail_bucket("b", ConnectorError::Timeout("gs://b".to_string()));

        assert!(matches!(store.list_objects("b", ""), Err(ConnectorError::Timeout(_))));
    }

    #[test]
    fn queries_filtered_by_data_source() {
        let catalog = MemoryQueryCatalog::new("https://bi.example.com")
            .with_data_source("warehouse", 1)
            .with_data_source("crm", 2)
            .with_query(SavedQuery {
                id: 10,
                name: "orders".to_string(),
                query: "select 1".to_string(),
                data_source_id: 1,
            })
            .with_query(SavedQuery {
                id: 11,
                name: "leads".to_string(),
                query: "select 2".to_string(),
                data_source_id: 2,
            });

        let queries = catalog.list_queries("warehouse").unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].id, 10);
        assert!(catalog.list_queries("unknown").is_err());
    }
}
