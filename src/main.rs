//! Schema Assembler - command-line front end.
//!
//! Reads a route manifest and the Rust source of the contract types bound to each route,
//! then prints or writes the assembled OpenAPI 3.0.3 document.
//!
//! # Usage
//!
//! ```bash
//! schema-assembler --routes <FILE> [--contracts <DIR>] [--config <FILE>] [OPTIONS]
//! ```
//!
//! # Examples
//!
//! ```bash
//! schema-assembler --routes routes.yaml --contracts ./src -o openapi.yaml
//! schema-assembler --routes routes.yaml --contracts ./src --config schema.yaml -f json
//! schema-assembler --routes routes.yaml --strict -v
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use schema_assembler::cli;

fn main() -> Result<()> {
    // Parse once to read the verbose flag, then validate after the logger is up
    let args = cli::CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("Schema Assembler starting...");

    let args = cli::parse_args_from_parsed(args)?;
    cli::run(args)?;

    info!("Schema generation completed successfully");

    Ok(())
}
