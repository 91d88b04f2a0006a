//! Stairwell engine
//!
//! Discovers templates from configured sources, resolves them against the
//! mapping and builds the table dependency graph:
//!
//! ```rust,ignore
//! use stairwell_engine::{load_mapping, DependencyMapBuilder, SearchOptions};
//!
//! let config = stairwell_core::Config::from_file("stairwell.toml".as_ref())?;
//! let mapping = load_mapping(&config)?;
//! let result = DependencyMapBuilder::new(config, mapping).build()?;
//!
//! let upstream = result.graph.upstream("orders", SearchOptions::default());
//! ```

pub mod error;
pub mod template;
pub mod source;
pub mod resolver;
pub mod graph;
pub mod store;
pub mod persist;
pub mod undefined;
pub mod builder;

pub use error::Error;
pub use template::{Template, TemplateOrigin, TemplateRef};
pub use source::{describe_include, Connectors, TemplateSource, Templates};
pub use resolver::MappingResolver;
pub use graph::{
    DependencyEdge, DependencyGraph, DependencyMap, Direction, Lineage, ResponseType,
    SearchOptions,
};
pub use store::GraphStore;
pub use persist::{MapLocation, MapStorage};
pub use undefined::{to_mapping_stub, UndefinedTemplate};
pub use builder::{load_mapping, BuildResult, DependencyMapBuilder};
