use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stairwell_core::config::CONFIG_FILE_NAME;
use stairwell_core::{BuildReport, Config, MappingConfig, Severity};
use stairwell_engine::{
    load_mapping, to_mapping_stub, BuildResult, DependencyGraph, DependencyMapBuilder, Direction,
    Lineage, MapLocation, MapStorage, ResponseType, SearchOptions,
};

/// Stairwell - table lineage from templated SQL
#[derive(Parser)]
#[command(name = "stairwell")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding stairwell.toml and the mapping file
    #[arg(short, long, global = true, default_value = ".")]
    config_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a stairwell.toml skeleton
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Build the dependency map and print it as JSON
    Map {
        /// Save the map to this file or gs://bucket/key instead of printing it
        #[arg(short, long, value_parser = parse_map_location)]
        save: Option<MapLocation>,

        /// Read a saved map (file or gs://bucket/key) instead of scanning sources
        #[arg(short, long, value_parser = parse_map_location)]
        load: Option<MapLocation>,

        /// Also save the build report
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Write a mapping stub for templates no mapping covers
    Check {
        /// Output file (default: <mapping prefix>_<timestamp>.toml in the config directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show tables the given tables read from
    Up(LineageArgs),

    /// Show tables that read from the given tables
    Down(LineageArgs),
}

#[derive(Args)]
struct LineageArgs {
    /// Table names
    tables: Vec<String>,

    /// Follow relatives of relatives
    #[arg(short, long)]
    recursive: bool,

    /// Print edge metadata as nested JSON
    #[arg(long)]
    verbose_output: bool,

    /// List table names or template uris
    #[arg(long, default_value = "table")]
    response_type: ResponseType,

    /// Select tables by label (key:value, repeatable)
    #[arg(short, long = "label")]
    labels: Vec<String>,

    /// Query a saved map (file or gs://bucket/key) instead of scanning sources
    #[arg(long, value_parser = parse_map_location)]
    load: Option<MapLocation>,
}

fn parse_map_location(value: &str) -> Result<MapLocation, String> {
    MapLocation::parse(value).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    // Credentials for remote sources may live in .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config_dir.join(CONFIG_FILE_NAME);

    match cli.command {
        Commands::Init { force } => init_command(&config_path, force),
        Commands::Map { save, load, report } => {
            map_command(&config_path, save.as_ref(), load.as_ref(), report.as_deref(), cli.verbose)
        }
        Commands::Check { output } => check_command(&config_path, output, cli.verbose),
        Commands::Up(args) => lineage_command(&config_path, Direction::Upstream, &args, cli.verbose),
        Commands::Down(args) => lineage_command(&config_path, Direction::Downstream, &args, cli.verbose),
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn load_config(config_path: &Path) -> Result<Config> {
    let config = Config::from_file(config_path).with_context(|| {
        format!(
            "Failed to load {}. Run 'stairwell init' to create one.",
            config_path.display()
        )
    })?;

    tracing::debug!(
        "Loaded {} ({} sources, mapping {})",
        config_path.display(),
        config.include.len(),
        config.mapping_path().display()
    );
    Ok(config)
}

fn build(config_path: &Path, verbose: bool) -> Result<BuildResult> {
    let config = load_config(config_path)?;
    let mapping = load_mapping(&config)
        .with_context(|| format!("Failed to load {}", config.mapping_path().display()))?;

    if verbose {
        eprintln!(
            "{} {} sources, {} mapping entries",
            "Scanning".cyan(),
            config.include.len(),
            mapping.mapping.len()
        );
    }

    DependencyMapBuilder::new(config, mapping)
        .build()
        .context("Failed to build dependency map")
}

/// Init command - write a config skeleton
fn init_command(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    Config::skeleton()
        .save_to_file(config_path)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("{} {}", "Created".green(), config_path.display());
    Ok(())
}

/// Map command - build or load the dependency map
fn map_command(
    config_path: &Path,
    save: Option<&MapLocation>,
    load: Option<&MapLocation>,
    report_path: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let storage = MapStorage::new();
    let (map, report) = match load {
        Some(location) => {
            let map = storage
                .load(location)
                .with_context(|| format!("Failed to load map from {}", location))?;
            (map, None)
        }
        None => {
            let result = build(config_path, verbose)?;
            (result.graph.into_map(), Some(result.report))
        }
    };

    match save {
        Some(location) => {
            storage
                .save(&map, location)
                .with_context(|| format!("Failed to save map to {}", location))?;
            eprintln!("{} {}", "Map saved to:".green(), location);
        }
        None => println!("{}", map.to_json()?),
    }

    if let Some(report) = &report {
        if let Some(path) = report_path {
            report
                .save_to_file(path)
                .with_context(|| format!("Failed to save report to {}", path.display()))?;
            if verbose {
                eprintln!("{} {}", "Report saved to:".green(), path.display());
            }
        }

        print_report_summary(report, map.len());
        if report.has_errors() {
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Check command - write a mapping stub for undefined templates
fn check_command(config_path: &Path, output: Option<PathBuf>, verbose: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let result = build(config_path, verbose)?;

    if result.undefined.is_empty() {
        println!("{}", "✓ Every template is mapped".green().bold());
        return Ok(());
    }

    let output = output.unwrap_or_else(|| {
        config.config_dir.join(format!(
            "{}_{}.toml",
            config.settings.mapping_prefix,
            chrono::Local::now().format("%Y%m%d%H%M%S")
        ))
    });

    let stub: MappingConfig = to_mapping_stub(&result.undefined);
    stub.save_to_file(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} {} undefined templates",
        "Found".yellow(),
        stub.mapping.len()
    );
    for entry in &stub.mapping {
        for table in &entry.tables {
            println!("  - {} ({})", table.table_name.yellow(), entry.source_type);
        }
    }
    println!("{} {}", "Mapping stub written to:".green(), output.display());

    Ok(())
}

/// Up/down commands - query lineage
fn lineage_command(
    config_path: &Path,
    direction: Direction,
    args: &LineageArgs,
    verbose: bool,
) -> Result<()> {
    let mut tables = args.tables.clone();
    if !args.labels.is_empty() {
        let config = load_config(config_path)?;
        let mapping = load_mapping(&config)?;
        tables.extend(mapping.tables_by_labels(&args.labels)?);
    }
    tables.sort();
    tables.dedup();

    if tables.is_empty() {
        anyhow::bail!("No tables given. Pass table names or --label key:value.");
    }

    let graph = match &args.load {
        Some(location) => DependencyGraph::new(
            MapStorage::new()
                .load(location)
                .with_context(|| format!("Failed to load map from {}", location))?,
        ),
        None => build(config_path, verbose)?.graph,
    };

    let options = SearchOptions {
        recursive: args.recursive,
        verbose: args.verbose_output,
        response_type: args.response_type,
    };

    let results: Vec<(String, Lineage)> = tables
        .into_iter()
        .map(|table| {
            let lineage = graph.search(&table, direction, options);
            (table, lineage)
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&combine(results))?);
    Ok(())
}

/// One table prints its result as is; several are keyed by table
fn combine(mut results: Vec<(String, Lineage)>) -> Value {
    if results.len() == 1 {
        if let Some((_, lineage)) = results.pop() {
            return lineage_value(lineage);
        }
    }

    let mut combined = Map::new();
    for (table, lineage) in results {
        match lineage_value(lineage) {
            // verbose results are already keyed by table
            Value::Object(map) => combined.extend(map),
            flat => {
                combined.insert(table, flat);
            }
        }
    }
    Value::Object(combined)
}

fn lineage_value(lineage: Lineage) -> Value {
    match lineage {
        Lineage::Flat(names) => Value::from(names),
        Lineage::Verbose(value) => value,
    }
}

/// Print report summary to stderr
fn print_report_summary(report: &BuildReport, tables: usize) {
    eprintln!("\n{}", "=".repeat(60).bright_blue());
    eprintln!("{}", "Dependency Map Build Report".bold().bright_blue());
    eprintln!("{}", "=".repeat(60).bright_blue());
    eprintln!();

    eprintln!("{}", "Summary:".bold());
    eprintln!("  Sources:   {}", report.summary.sources_scanned);
    eprintln!("  Templates: {}", report.summary.templates_scanned);
    eprintln!("  Tables:    {}", tables);
    eprintln!("  Edges:     {}", report.summary.edges);

    if report.summary.errors > 0 {
        eprintln!("  Errors:    {}", format!("{}", report.summary.errors).red().bold());
    } else {
        eprintln!("  Errors:    {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        eprintln!("  Warnings:  {}", format!("{}", report.summary.warnings).yellow());
    } else {
        eprintln!("  Warnings:  {}", format!("{}", report.summary.warnings).green());
    }

    eprintln!("  Info:      {}", report.summary.info);
    eprintln!();

    let problems: Vec<_> = report
        .issues
        .iter()
        .filter(|issue| issue.severity != Severity::Info)
        .collect();

    if problems.is_empty() {
        eprintln!("{}", "✓ No issues found!".green().bold());
    } else {
        eprintln!("{}", "Issues:".bold());
        for issue in problems {
            let severity_str = match issue.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            eprintln!("  [{}] {}: {}", severity_str, issue.code, issue.message);
            if let Some(location) = &issue.location {
                eprintln!("    at {}", location);
            }
        }
    }

    if report.summary.info > 0 {
        eprintln!();
        eprintln!(
            "{} templates have no mapping; run 'stairwell check' to write a stub.",
            report.summary.info
        );
    }

    eprintln!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_lineage_flags() {
        let cli = Cli::try_parse_from([
            "stairwell",
            "--config-dir",
            "conf",
            "up",
            "orders",
            "--recursive",
            "--response-type",
            "file",
            "-l",
            "team:sales",
        ])
        .unwrap();

        assert_eq!(cli.config_dir, PathBuf::from("conf"));
        let Commands::Up(args) = cli.command else {
            panic!("expected up command");
        };
        assert_eq!(args.tables, vec!["orders"]);
        assert!(args.recursive);
        assert_eq!(args.response_type, ResponseType::File);
        assert_eq!(args.labels, vec!["team:sales"]);
    }

    #[test]
    fn map_locations_accept_object_storage_uris() {
        let cli = Cli::try_parse_from([
            "stairwell",
            "map",
            "--save",
            "gs://bucket-a/maps/lineage.json",
            "--load",
            "saved/lineage.json",
        ])
        .unwrap();

        let Commands::Map { save, load, .. } = cli.command else {
            panic!("expected map command");
        };
        assert_eq!(
            save,
            Some(MapLocation::Object {
                bucket: "bucket-a".to_string(),
                key: "maps/lineage.json".to_string(),
            })
        );
        assert_eq!(load, Some(MapLocation::File(PathBuf::from("saved/lineage.json"))));

        assert!(Cli::try_parse_from(["stairwell", "up", "t", "--load", "gs://no-key"]).is_err());
    }

    #[test]
    fn combine_keys_flat_results_by_table() {
        let combined = combine(vec![
            ("a".to_string(), Lineage::Flat(vec!["x".to_string()])),
            ("b".to_string(), Lineage::Flat(vec![])),
        ]);
        assert_eq!(combined, serde_json::json!({ "a": ["x"], "b": [] }));

        let single = combine(vec![("a".to_string(), Lineage::Flat(vec!["x".to_string()]))]);
        assert_eq!(single, serde_json::json!(["x"]));
    }

    #[test]
    fn init_writes_loadable_skeleton() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        init_command(&path, false).unwrap();
        assert!(init_command(&path, false).is_err());
        init_command(&path, true).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.include.len(), 1);
    }
}
