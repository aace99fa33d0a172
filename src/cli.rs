use crate::config::Settings;
use crate::contracts::load_contracts;
use crate::declaration::ContractCatalog;
use crate::routes::load_manifest;
use crate::schema_generator::SchemaGenerator;
use crate::serializer::{serialize_json, serialize_yaml, write_to_file};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;

/// Schema Assembler - Build an OpenAPI document from a route manifest and Rust contract types
#[derive(Parser, Debug)]
#[command(name = "schema-assembler")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Route manifest (YAML or JSON)
    #[arg(long = "routes", value_name = "FILE")]
    pub routes_path: PathBuf,

    /// Directory holding the Rust source of the contract types
    #[arg(long = "contracts", value_name = "DIR")]
    pub contracts_path: Option<PathBuf>,

    /// Settings file (YAML or JSON)
    #[arg(long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Abort on the first malformed route
    #[arg(long = "strict")]
    pub strict: bool,

    /// Mark the route list as filtered for a private audience
    #[arg(long = "private")]
    pub private: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.routes_path.is_file() {
        anyhow::bail!("Route manifest does not exist: {}", args.routes_path.display());
    }
    if let Some(contracts) = &args.contracts_path {
        if !contracts.is_dir() {
            anyhow::bail!("Contract path is not a directory: {}", contracts.display());
        }
    }
    if let Some(config) = &args.config_path {
        if !config.is_file() {
            anyhow::bail!("Settings file does not exist: {}", config.display());
        }
    }

    info!("Route manifest: {}", args.routes_path.display());
    match &args.contracts_path {
        Some(path) => info!("Contracts: {}", path.display()),
        None => info!("Contracts: none"),
    }
    info!("Output format: {:?}", args.output_format);
    match &args.output_path {
        Some(output) => info!("Output file: {}", output.display()),
        None => info!("Output: stdout"),
    }

    Ok(args)
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    info!("Starting schema generation...");

    let mut settings = match &args.config_path {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings: {}", path.display()))?,
        None => Settings::default(),
    };
    if args.strict {
        settings.strict = true;
    }
    let public = settings.serve_public && !args.private;

    let catalog = match &args.contracts_path {
        Some(path) => {
            info!("Collecting contract types...");
            load_contracts(path)?
        }
        None => ContractCatalog::new(),
    };
    info!("Found {} contract types", catalog.len());

    let routes = load_manifest(&args.routes_path)?;
    info!("Loaded {} routes", routes.len());
    if routes.is_empty() {
        warn!("The route manifest lists no routes");
    }

    let generator =
        SchemaGenerator::new(settings, catalog).context("Failed to initialize schema generator")?;
    let generated = generator
        .get_schema(&routes, public)
        .context("Schema generation failed")?;

    info!("Serializing to {:?} format...", args.output_format);
    let content = match args.output_format {
        OutputFormat::Yaml => serialize_yaml(&generated.document)?,
        OutputFormat::Json => serialize_json(&generated.document)?,
    };

    if let Some(output_path) = &args.output_path {
        info!("Writing output to: {}", output_path.display());
        write_to_file(&content, output_path)?;
    } else {
        println!("{}", content);
    }

    info!("Generation complete!");
    info!("Summary:");
    info!("  - Routes: {}", routes.len());
    info!("  - Paths: {}", generated.document.paths.len());
    info!(
        "  - Components: {}",
        generated.document.schemas().map_or(0, |s| s.len())
    );
    info!("  - Warnings: {}", generated.warnings.len());

    Ok(())
}
