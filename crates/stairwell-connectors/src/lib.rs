//! Remote template source connectors
//!
//! This module provides clients that list and fetch SQL templates from
//! remote systems:
//! - Cloud object storage (GCS JSON API)
//! - BI tool saved queries (Redash API)
//! - In-memory stores for tests and demos
//!
//! ## Example
//!
//! ```rust,ignore
//! use stairwell_connectors::{GcsObjectStore, ObjectStore};
//!
//! let store = GcsObjectStore::new(std::time::Duration::from_secs(60))?
//!     .with_access_token(std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN")?);
//! for name in store.list_objects("my-bucket", "queries/")? {
//!     let sql = store.get_object("my-bucket", &name)?;
//! }
//! ```

pub mod adapter;
pub mod gcs;
pub mod redash;
pub mod mock;

pub use adapter::{ConnectorError, ObjectStore, QueryCatalog, SavedQuery};
pub use gcs::{parse_gcs_uri, GcsObjectStore, ACCESS_TOKEN_ENV, GCS_ENDPOINT, GCS_URI_PREFIX};
pub use redash::RedashClient;
pub use mock::{MemoryObjectStore, MemoryQueryCatalog};
