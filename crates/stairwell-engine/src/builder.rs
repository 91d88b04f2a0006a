//! Dependency map construction
//!
//! Drives every configured source, renders each mapped template with its
//! parameters and records the (downstream, upstream) edges it implies.

use std::sync::Arc;

use stairwell_connectors::{ObjectStore, QueryCatalog};
use stairwell_core::{
    BuildIssue, BuildReport, Config, ExcludeRules, IncludeSource, IssueCode, IssueLocation,
    Labels, MappingConfig, Severity, TableDeclaration,
};
use stairwell_sql::{extract_table_references, SqlParser};
use stairwell_template::{
    is_bound, lines_containing, merge_parameters, qualify_table_name, scan_blocks,
    table_binding, token_lines, PlaceholderBlock,
};

use crate::error::Error;
use crate::graph::{DependencyEdge, DependencyGraph, DependencyMap};
use crate::resolver::MappingResolver;
use crate::source::{describe_include, Connectors, TemplateSource};
use crate::template::Template;
use crate::undefined::UndefinedTemplate;

/// Everything a build produces
#[derive(Debug)]
pub struct BuildResult {
    pub graph: DependencyGraph,

    /// Templates with placeholders no mapping resolves
    pub undefined: Vec<UndefinedTemplate>,

    pub report: BuildReport,
}

/// Load the mapping next to `config`. A missing mapping file is an empty mapping.
pub fn load_mapping(config: &Config) -> Result<MappingConfig, Error> {
    let path = config.mapping_path();
    if !path.exists() {
        tracing::debug!("No mapping file at {}, every template is undefined", path.display());
        return Ok(MappingConfig::default());
    }
    Ok(MappingConfig::from_file(&path)?)
}

/// Accumulated while one build runs
#[derive(Default)]
struct BuildState {
    map: DependencyMap,
    undefined: Vec<UndefinedTemplate>,
    report: BuildReport,
}

/// Builds a [`DependencyGraph`] from configured sources and a mapping
pub struct DependencyMapBuilder {
    config: Config,
    mapping: MappingConfig,
    connectors: Connectors,
}

impl DependencyMapBuilder {
    pub fn new(config: Config, mapping: MappingConfig) -> Self {
        Self {
            config,
            mapping,
            connectors: Connectors::default(),
        }
    }

    /// Serve object storage sources from `store` instead of the network
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.connectors.object_store = Some(store);
        self
    }

    /// Serve BI query sources from `catalog` instead of the network
    pub fn with_query_catalog(mut self, catalog: Arc<dyn QueryCatalog>) -> Self {
        self.connectors.query_catalog = Some(catalog);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mapping(&self) -> &MappingConfig {
        &self.mapping
    }

    /// Scan every source and freeze the result.
    ///
    /// Failing sources become issues in the report, unless marked `required`.
    pub fn build(&self) -> Result<BuildResult, Error> {
        let excludes = self.config.exclude_rules()?;
        let parser = SqlParser::from_dialect(&self.config.settings.dialect);
        let mut state = BuildState::default();

        for include in &self.config.include {
            state.report.summary.sources_scanned += 1;

            if let Err(e) = self.scan_source(include, &excludes, &parser, &mut state) {
                if include.options().required {
                    tracing::error!("Required source {} failed: {}", describe_include(include), e);
                    return Err(e);
                }

                tracing::warn!("Source {} failed: {}", describe_include(include), e);
                state
                    .report
                    .add_issue(e.to_issue(include.source_type(), &describe_include(include)));
            }
        }

        state.report.summary.edges = state.map.edge_count();
        tracing::info!(
            "Built dependency map: {} tables, {} edges, {} undefined templates, {} issues",
            state.map.len(),
            state.report.summary.edges,
            state.undefined.len(),
            state.report.summary.total
        );

        Ok(BuildResult {
            graph: DependencyGraph::new(state.map),
            undefined: state.undefined,
            report: state.report,
        })
    }

    fn scan_source(
        &self,
        include: &IncludeSource,
        excludes: &ExcludeRules,
        parser: &SqlParser,
        state: &mut BuildState,
    ) -> Result<(), Error> {
        let source = TemplateSource::from_include(include, &self.connectors, excludes.clone())?;
        tracing::info!("Scanning {} source {}", source.source_type(), source.describe());

        let required = include.options().required;
        for template in source.templates()? {
            let template = match template {
                Ok(template) => template,
                Err(e) if required => return Err(e),
                Err(e) => {
                    state
                        .report
                        .add_issue(e.to_issue(source.source_type(), source.describe()));
                    continue;
                }
            };

            state.report.summary.templates_scanned += 1;
            if let Err(e) = self.scan_template(&template, include.scan_sql(), parser, state) {
                if required {
                    return Err(e);
                }
                tracing::warn!("{}: {}", template.key(), e);
                state
                    .report
                    .add_issue(e.to_issue(template.source_type(), template.key()));
            }
        }

        Ok(())
    }

    fn scan_template(
        &self,
        template: &Template,
        scan_sql: bool,
        parser: &SqlParser,
        state: &mut BuildState,
    ) -> Result<(), Error> {
        let text = template.template_str()?;
        let blocks = scan_blocks(text)?;
        let tokens: Vec<String> = blocks.iter().flat_map(PlaceholderBlock::tokens).collect();
        let reference = template.to_ref();

        let tables: Vec<&TableDeclaration> = MappingResolver::new(&self.mapping)
            .mapped_tables(template)
            .collect();

        if tables.is_empty() {
            tracing::debug!("{} is not mapped", template.key());
            state.report.add_issue(
                BuildIssue::new(
                    IssueCode::UndefinedTemplate,
                    Severity::Info,
                    format!("No mapping entry for {}", template.uri()),
                )
                .with_location(IssueLocation::new(template.source_type(), template.key())),
            );
            state.undefined.push(UndefinedTemplate {
                template: reference,
                table_name: None,
                params: tokens,
            });
            return Ok(());
        }

        for table in tables {
            state.map.add_table(&table.table_name);
            let combined = merge_parameters(&self.mapping.global.parameters, &table.parameters);

            let rendered = match template.render(&combined, &table.ignore_parameters) {
                Ok(sql) => Some(sql),
                Err(e) => {
                    tracing::warn!("Failed to render {} for {}: {}", template.key(), table.table_name, e);
                    state
                        .report
                        .add_issue(e.to_issue(template.source_type(), template.key()));
                    None
                }
            };

            let mut unresolved: Vec<String> = Vec::new();
            for token in &tokens {
                if !table.is_ignored(token) && !is_bound(&combined, token) && !unresolved.contains(token) {
                    unresolved.push(token.clone());
                }
            }
            if !unresolved.is_empty() {
                state.undefined.push(UndefinedTemplate {
                    template: reference.clone(),
                    table_name: Some(table.table_name.clone()),
                    params: unresolved,
                });
            }

            // Upstreams named by the table's own parameters
            for block in &blocks {
                for token in block.tokens() {
                    if table.is_ignored(&token) {
                        continue;
                    }
                    let Some(binding) = table_binding(&table.parameters, &token) else {
                        continue;
                    };

                    let upstream = qualify_table_name(binding, template.default_table_prefix());
                    let mut edge = DependencyEdge::new(reference.clone());
                    edge.expression = Some(text[block.start..block.end].to_string());
                    edge.binding = Some(binding.to_string());
                    edge.labels = self.edge_labels(table, &upstream);
                    edge.lines = token_lines(text, &blocks, &token);
                    edge.parameter = Some(token);

                    state.map.add_edge(&table.table_name, &upstream, edge);
                }
            }

            if !scan_sql {
                continue;
            }
            let Some(sql) = rendered else {
                continue;
            };

            match extract_table_references(parser, &sql) {
                Ok(references) => {
                    for name in references {
                        let upstream = qualify_table_name(&name, template.default_table_prefix());
                        let last_part = name.rsplit('.').next().unwrap_or(&name);

                        let mut edge = DependencyEdge::new(reference.clone());
                        edge.labels = self.edge_labels(table, &upstream);
                        edge.lines = lines_containing(text, last_part);

                        state.map.add_edge(&table.table_name, &upstream, edge);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse SQL of {}: {}", template.key(), e);
                    state
                        .report
                        .add_issue(e.to_issue(template.source_type(), template.key()));
                }
            }
        }

        Ok(())
    }

    /// Table labels overlaid by the upstream's metadata labels
    fn edge_labels(&self, table: &TableDeclaration, upstream: &str) -> Labels {
        let mut labels = table.labels.clone();
        labels.extend(self.mapping.metadata_labels(upstream));
        labels
    }
}
