//! Schema Assembler - OpenAPI documents from route descriptors and typed contracts.
//!
//! The engine receives an ordered list of routes, each bound to request, response and
//! parameter contracts, and produces one deduplicated, deterministic OpenAPI 3.0.3
//! document. It does not discover routes itself.
//!
//! # Architecture
//!
//! 1. [`scanner`], [`parser`] and [`contracts`] read contract types from Rust source into a
//!    [`declaration::ContractCatalog`]
//! 2. [`routes`] describes the operations to document, optionally loaded from a manifest
//! 3. [`type_resolver`] turns declarations into schema fragments, registering composite
//!    shapes in the [`registry`]
//! 4. [`operation_builder`] validates each route and resolves its contracts
//! 5. [`assembler`] combines operations, registry contents and settings into a document
//! 6. [`postprocess`] runs the configured stages over the finished document
//! 7. [`serializer`] writes YAML or JSON
//!
//! [`schema_generator::SchemaGenerator`] drives steps 3 to 6.
//!
//! # Example Usage
//!
//! ```no_run
//! use schema_assembler::{
//!     config::Settings,
//!     contracts::load_contracts,
//!     routes::load_manifest,
//!     schema_generator::SchemaGenerator,
//!     serializer::serialize_yaml,
//! };
//! use std::path::Path;
//!
//! let catalog = load_contracts(Path::new("./src")).unwrap();
//! let routes = load_manifest(Path::new("routes.yaml")).unwrap();
//!
//! let generator = SchemaGenerator::new(Settings::default(), catalog).unwrap();
//! let generated = generator.get_schema(&routes, true).unwrap();
//! for warning in &generated.warnings {
//!     eprintln!("warning: {}", warning);
//! }
//! println!("{}", serialize_yaml(&generated.document).unwrap());
//! ```

pub mod assembler;
pub mod cli;
pub mod config;
pub mod contracts;
pub mod declaration;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod fragment;
pub mod operation_builder;
pub mod parser;
pub mod postprocess;
pub mod registry;
pub mod routes;
pub mod scanner;
pub mod schema_generator;
pub mod serializer;
pub mod type_resolver;
