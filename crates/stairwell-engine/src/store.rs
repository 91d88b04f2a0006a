//! Shared, swappable graph snapshot

use std::sync::{Arc, RwLock};

use crate::graph::DependencyGraph;

/// Holds the current graph. Readers take an `Arc` snapshot, so a rebuild
/// swapping in a new graph never disturbs queries already running.
#[derive(Debug, Default)]
pub struct GraphStore {
    current: RwLock<Arc<DependencyGraph>>,
}

impl GraphStore {
    pub fn new(graph: DependencyGraph) -> Self {
        Self {
            current: RwLock::new(Arc::new(graph)),
        }
    }

    /// Current graph
    pub fn snapshot(&self) -> Arc<DependencyGraph> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Install a freshly built graph, returning the previous one
    pub fn replace(&self, graph: DependencyGraph) -> Arc<DependencyGraph> {
        let next = Arc::new(graph);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}
