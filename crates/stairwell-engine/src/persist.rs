//! Saved dependency maps
//!
//! A map can live on the local filesystem or in object storage at
//! `gs://bucket/key`. Loading gives back a map that can be queried without
//! rebuilding.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use stairwell_connectors::{parse_gcs_uri, GcsObjectStore, ObjectStore, GCS_URI_PREFIX};
use stairwell_core::config::NETWORK_TIMEOUT_DEFAULT;
use stairwell_core::ConfigError;

use crate::error::Error;
use crate::graph::DependencyMap;

/// Where a map is saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapLocation {
    File(PathBuf),
    Object { bucket: String, key: String },
}

impl MapLocation {
    /// `gs://bucket/key` is an object, anything else a local path
    pub fn parse(location: &str) -> Result<Self, Error> {
        if !location.starts_with(GCS_URI_PREFIX) {
            return Ok(Self::File(PathBuf::from(location)));
        }

        match parse_gcs_uri(location) {
            Some((bucket, key)) => Ok(Self::Object {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            None => Err(ConfigError::Invalid(format!(
                "'{}' must be written as {}bucket/key",
                location, GCS_URI_PREFIX
            ))
            .into()),
        }
    }
}

impl fmt::Display for MapLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Object { bucket, key } => write!(f, "{}{}/{}", GCS_URI_PREFIX, bucket, key),
        }
    }
}

/// Saves and loads maps at a [`MapLocation`]
#[derive(Clone, Default)]
pub struct MapStorage {
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl MapStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this store for `gs://` locations instead of the storage API
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    fn object_store(&self) -> Result<Arc<dyn ObjectStore>, Error> {
        match &self.object_store {
            Some(store) => Ok(Arc::clone(store)),
            None => Ok(Arc::new(GcsObjectStore::from_env(NETWORK_TIMEOUT_DEFAULT)?)),
        }
    }

    pub fn save(&self, map: &DependencyMap, location: &MapLocation) -> Result<(), Error> {
        match location {
            MapLocation::File(path) => map.save_to_file(path)?,
            MapLocation::Object { bucket, key } => {
                let json = map.to_json()?;
                self.object_store()?.put_object(bucket, key, &json)?;
            }
        }

        tracing::info!("Saved dependency map to {}", location);
        Ok(())
    }

    pub fn load(&self, location: &MapLocation) -> Result<DependencyMap, Error> {
        let map = match location {
            MapLocation::File(path) => DependencyMap::load_from_file(path)?,
            MapLocation::Object { bucket, key } => {
                let json = self.object_store()?.get_object(bucket, key)?;
                DependencyMap::from_json(&json)?
            }
        };

        tracing::debug!("Loaded {} tables from {}", map.len(), location);
        Ok(map)
    }
}
