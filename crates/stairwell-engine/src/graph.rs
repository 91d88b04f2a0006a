//! Dependency map and lineage queries
//!
//! The map is keyed downstream table -> upstream table -> edge metadata.
//! A frozen [`DependencyGraph`] adds the reverse index for downstream lookups.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use stairwell_core::Labels;
use stairwell_template::params::deep_merge;
use stairwell_template::TemplateLine;

use crate::error::Error;
use crate::template::TemplateRef;

/// Metadata of one (downstream, upstream) edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Template defining the downstream table
    #[serde(flatten)]
    pub template: TemplateRef,

    /// Placeholder token naming the upstream (absent for SQL-scanned references)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,

    /// Raw `{{ ... }}` block the token appeared in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    /// Value the token was bound to, before prefix completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,

    #[serde(default)]
    pub lines: Vec<TemplateLine>,
}

impl DependencyEdge {
    pub fn new(template: TemplateRef) -> Self {
        Self {
            template,
            parameter: None,
            expression: None,
            binding: None,
            labels: Labels::new(),
            lines: Vec::new(),
        }
    }
}

/// downstream table -> upstream table -> edge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyMap {
    tables: BTreeMap<String, BTreeMap<String, DependencyEdge>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a downstream table, even if it never gains an upstream
    pub fn add_table(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    /// Record an edge. A second edge for the same pair keeps the first
    /// edge's metadata and adds the lines it has not seen yet.
    pub fn add_edge(&mut self, downstream: &str, upstream: &str, edge: DependencyEdge) {
        let upstreams = self.tables.entry(downstream.to_string()).or_default();
        match upstreams.get_mut(upstream) {
            Some(existing) => {
                for line in edge.lines {
                    if !existing.lines.contains(&line) {
                        existing.lines.push(line);
                    }
                }
                existing.lines.sort_by_key(|l| l.line_number);
            }
            None => {
                upstreams.insert(upstream.to_string(), edge);
            }
        }
    }

    pub fn get(&self, downstream: &str) -> Option<&BTreeMap<String, DependencyEdge>> {
        self.tables.get(downstream)
    }

    pub fn edge(&self, downstream: &str, upstream: &str) -> Option<&DependencyEdge> {
        self.tables.get(downstream)?.get(upstream)
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Downstream tables, sorted
    pub fn tables(&self) -> impl Iterator<Item = &String> {
        self.tables.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, DependencyEdge>)> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Save as pretty JSON
    pub fn save_to_file(&self, path: &Path) -> Result<(), Error> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))
    }

    /// Load a map saved by [`DependencyMap::save_to_file`]
    pub fn load_from_file(path: &Path) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

/// Lineage direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upstream,
    Downstream,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What flat results list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Table names
    #[default]
    Table,

    /// Uris of the templates defining the traversed edges
    File,
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "file" => Ok(Self::File),
            other => Err(format!("unknown response type '{}' (expected table or file)", other)),
        }
    }
}

/// Options of a lineage query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub recursive: bool,
    pub verbose: bool,
    pub response_type: ResponseType,
}

/// Result of a lineage query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Lineage {
    /// Sorted, deduplicated table names or uris
    Flat(Vec<String>),

    /// `{table: {direction: {relative: edge, ...}}}`
    Verbose(Value),
}

impl Lineage {
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Frozen dependency map with a reverse index.
///
/// Queries only read, so a graph can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    map: DependencyMap,

    /// upstream table -> downstream tables
    downstreams: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new(map: DependencyMap) -> Self {
        let mut downstreams: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (downstream, upstreams) in map.iter() {
            for upstream in upstreams.keys() {
                downstreams
                    .entry(upstream.clone())
                    .or_default()
                    .insert(downstream.clone());
            }
        }

        Self { map, downstreams }
    }

    pub fn map(&self) -> &DependencyMap {
        &self.map
    }

    pub fn into_map(self) -> DependencyMap {
        self.map
    }

    /// Immediate upstream tables of `table`
    pub fn parents(&self, table: &str) -> Vec<&String> {
        self.map
            .get(table)
            .map(|upstreams| upstreams.keys().collect())
            .unwrap_or_default()
    }

    /// Immediate downstream tables of `table`
    pub fn children(&self, table: &str) -> Vec<&String> {
        self.downstreams
            .get(table)
            .map(|downstreams| downstreams.iter().collect())
            .unwrap_or_default()
    }

    /// Whether `table` appears in the graph at all
    pub fn contains(&self, table: &str) -> bool {
        self.map.contains_table(table) || self.downstreams.contains_key(table)
    }

    pub fn upstream(&self, table: &str, options: SearchOptions) -> Lineage {
        self.search(table, Direction::Upstream, options)
    }

    pub fn downstream(&self, table: &str, options: SearchOptions) -> Lineage {
        self.search(table, Direction::Downstream, options)
    }

    /// Run a lineage query. Unknown tables give empty results, never errors.
    pub fn search(&self, table: &str, direction: Direction, options: SearchOptions) -> Lineage {
        if options.verbose {
            Lineage::Verbose(self.verbose(table, direction, options.recursive))
        } else {
            Lineage::Flat(self.flat(table, direction, options.recursive, options.response_type))
        }
    }

    fn relatives(&self, table: &str, direction: Direction) -> Vec<&String> {
        match direction {
            Direction::Upstream => self.parents(table),
            Direction::Downstream => self.children(table),
        }
    }

    /// Edge between `table` and its relative in `direction`
    fn edge_to(&self, table: &str, relative: &str, direction: Direction) -> Option<&DependencyEdge> {
        match direction {
            Direction::Upstream => self.map.edge(table, relative),
            Direction::Downstream => self.map.edge(relative, table),
        }
    }

    fn is_known(&self, table: &str, direction: Direction) -> bool {
        match direction {
            Direction::Upstream => self.map.contains_table(table),
            Direction::Downstream => self.contains(table),
        }
    }

    fn flat(
        &self,
        table: &str,
        direction: Direction,
        recursive: bool,
        response_type: ResponseType,
    ) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        let mut tables = BTreeSet::new();
        let mut uris = BTreeSet::new();

        queue.push_back(table.to_string());

        // BFS over relatives; the starting table is reported if a cycle reaches it
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }

            for relative in self.relatives(&current, direction) {
                if let Some(edge) = self.edge_to(&current, relative, direction) {
                    uris.insert(edge.template.uri.clone());
                }
                tables.insert(relative.clone());

                if recursive && !visited.contains(relative) {
                    queue.push_back(relative.clone());
                } else if recursive && relative == table {
                    tracing::warn!("Cycle detected: {} reaches itself", table);
                }
            }

            if !recursive {
                break;
            }
        }

        match response_type {
            ResponseType::Table => tables.into_iter().collect(),
            ResponseType::File => uris.into_iter().collect(),
        }
    }

    fn verbose(&self, table: &str, direction: Direction, recursive: bool) -> Value {
        let relatives = if self.is_known(table, direction) {
            let mut path = vec![table.to_string()];
            Value::Object(self.expand(table, direction, recursive, &mut path))
        } else {
            Value::Null
        };

        json!({ table: { direction.as_str(): relatives } })
    }

    /// Relatives of `table` keyed by name, each carrying its edge metadata
    /// and, when recursing, its own relatives under `direction`.
    fn expand(
        &self,
        table: &str,
        direction: Direction,
        recursive: bool,
        path: &mut Vec<String>,
    ) -> Map<String, Value> {
        let mut result = Map::new();

        for relative in self.relatives(table, direction) {
            let mut node = self
                .edge_to(table, relative, direction)
                .and_then(|edge| serde_json::to_value(edge).ok())
                .unwrap_or_else(|| Value::Object(Map::new()));

            if recursive {
                if path.contains(relative) {
                    tracing::warn!(
                        "Cycle detected: {} is already on the path {}",
                        relative,
                        path.join(" -> ")
                    );
                } else {
                    path.push(relative.clone());
                    let nested = self.expand(relative, direction, recursive, path);
                    path.pop();

                    if !nested.is_empty() {
                        deep_merge(&mut node, json!({ direction.as_str(): nested }));
                    }
                }
            }

            result.insert(relative.clone(), node);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stairwell_core::SourceType;

    fn edge(key: &str) -> DependencyEdge {
        DependencyEdge::new(TemplateRef {
            source_type: SourceType::File,
            key: key.to_string(),
            uri: format!("/repo/{}", key),
            bucket: None,
            project: None,
            data_source: None,
        })
    }

    /// report <- orders <- customers, report <- items
    fn chain() -> DependencyGraph {
        let mut map = DependencyMap::new();
        map.add_edge("report", "orders", edge("report.sql"));
        map.add_edge("report", "items", edge("report.sql"));
        map.add_edge("orders", "customers", edge("orders.sql"));
        DependencyGraph::new(map)
    }

    fn flat(lineage: Lineage) -> Vec<String> {
        match lineage {
            Lineage::Flat(tables) => tables,
            Lineage::Verbose(v) => panic!("expected flat result, got {}", v),
        }
    }

    fn verbose(lineage: Lineage) -> Value {
        match lineage {
            Lineage::Verbose(v) => v,
            Lineage::Flat(t) => panic!("expected verbose result, got {:?}", t),
        }
    }

    fn opts(recursive: bool, verbose: bool) -> SearchOptions {
        SearchOptions {
            recursive,
            verbose,
            response_type: ResponseType::Table,
        }
    }

    #[test]
    fn immediate_and_recursive_upstream() {
        let graph = chain();
        assert_eq!(flat(graph.upstream("report", opts(false, false))), vec!["items", "orders"]);
        assert_eq!(
            flat(graph.upstream("report", opts(true, false))),
            vec!["customers", "items", "orders"]
        );
    }

    #[test]
    fn recursive_downstream_uses_reverse_index() {
        let graph = chain();
        assert_eq!(flat(graph.downstream("customers", opts(false, false))), vec!["orders"]);
        assert_eq!(
            flat(graph.downstream("customers", opts(true, false))),
            vec!["orders", "report"]
        );
    }

    #[test]
    fn unknown_and_leaf_tables() {
        let graph = chain();
        assert!(flat(graph.upstream("nope", opts(true, false))).is_empty());
        assert_eq!(
            verbose(graph.upstream("nope", opts(false, true))),
            json!({ "nope": { "upstream": null } })
        );

        // customers only appears as an upstream
        assert_eq!(
            verbose(graph.upstream("customers", opts(false, true))),
            json!({ "customers": { "upstream": null } })
        );
        assert_eq!(
            verbose(graph.downstream("report", opts(false, true))),
            json!({ "report": { "downstream": {} } })
        );
    }

    #[test]
    fn registered_table_without_upstream_is_known() {
        let mut map = DependencyMap::new();
        map.add_table("static_table");
        let graph = DependencyGraph::new(map);

        assert_eq!(
            verbose(graph.upstream("static_table", opts(true, true))),
            json!({ "static_table": { "upstream": {} } })
        );
    }

    #[test]
    fn verbose_recursive_nests_relatives() {
        let graph = chain();
        let result = verbose(graph.upstream("report", opts(true, true)));

        let orders = &result["report"]["upstream"]["orders"];
        assert_eq!(orders["key"], json!("report.sql"));
        assert_eq!(orders["upstream"]["customers"]["key"], json!("orders.sql"));

        // leaves carry only their edge metadata
        assert!(result["report"]["upstream"]["items"].get("upstream").is_none());
        assert!(orders["upstream"]["customers"].get("upstream").is_none());
    }

    #[test]
    fn cycles_terminate() {
        let mut map = DependencyMap::new();
        map.add_edge("a", "b", edge("a.sql"));
        map.add_edge("b", "a", edge("b.sql"));
        let graph = DependencyGraph::new(map);

        assert_eq!(flat(graph.upstream("a", opts(true, false))), vec!["a", "b"]);
        assert_eq!(flat(graph.downstream("a", opts(true, false))), vec!["a", "b"]);

        let result = verbose(graph.upstream("a", opts(true, true)));
        let b = &result["a"]["upstream"]["b"];
        assert_eq!(b["key"], json!("a.sql"));
        // a is reported under b but not expanded again
        assert_eq!(b["upstream"]["a"]["key"], json!("b.sql"));
        assert!(b["upstream"]["a"].get("upstream").is_none());
    }

    #[test]
    fn file_response_lists_template_uris() {
        let graph = chain();
        let options = SearchOptions {
            recursive: true,
            verbose: false,
            response_type: ResponseType::File,
        };

        assert_eq!(
            flat(graph.upstream("report", options)),
            vec!["/repo/orders.sql", "/repo/report.sql"]
        );
    }

    #[test]
    fn duplicate_edges_merge_lines() {
        let mut map = DependencyMap::new();
        let mut first = edge("a.sql");
        first.lines.push(TemplateLine { line_number: 3, line_str: "join b".to_string() });
        let mut second = edge("a.sql");
        second.lines.push(TemplateLine { line_number: 1, line_str: "from b".to_string() });
        second.lines.push(TemplateLine { line_number: 3, line_str: "join b".to_string() });

        map.add_edge("a", "b", first);
        map.add_edge("a", "b", second);

        let lines: Vec<usize> = map.edge("a", "b").unwrap().lines.iter().map(|l| l.line_number).collect();
        assert_eq!(lines, vec![1, 3]);
        assert_eq!(map.edge_count(), 1);
    }

    #[test]
    fn response_type_from_str() {
        assert_eq!("file".parse::<ResponseType>().unwrap(), ResponseType::File);
        assert_eq!("TABLE".parse::<ResponseType>().unwrap(), ResponseType::Table);
        assert!("tables".parse::<ResponseType>().is_err());
    }
}
