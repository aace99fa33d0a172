use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Thin wrapper around `syn` for contract source files and type expressions.
///
/// ```no_run
/// use schema_assembler::parser::AstParser;
/// use std::path::Path;
///
/// let parsed = AstParser::parse_file(Path::new("src/models.rs")).unwrap();
/// println!("{} top-level items", parsed.syntax_tree.items.len());
/// ```
pub struct AstParser;

/// A source file together with its syntax tree
#[derive(Debug)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub syntax_tree: syn::File,
}

impl AstParser {
    /// Read and parse one source file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid Rust.
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        Self::parse_source(&content, path)
    }

    /// Parse already-loaded source text; `path` is only used for reporting
    pub fn parse_source(content: &str, path: &Path) -> Result<ParsedFile> {
        let syntax_tree = syn::parse_file(content)
            .with_context(|| format!("Failed to parse Rust syntax in file: {}", path.display()))?;

        Ok(ParsedFile {
            path: path.to_path_buf(),
            syntax_tree,
        })
    }

    /// Parse every file, keeping going past failures.
    ///
    /// A file with syntax errors only costs the contracts it declares, so failures
    /// are logged and returned in place rather than aborting the batch.
    pub fn parse_files(paths: &[PathBuf]) -> Vec<Result<ParsedFile>> {
        debug!("Parsing {} files", paths.len());

        let results: Vec<Result<ParsedFile>> = paths
            .iter()
            .map(|path| {
                Self::parse_file(path).map_err(|e| {
                    warn!("Failed to parse {}: {:#}", path.display(), e);
                    e
                })
            })
            .collect();

        let parsed = results.iter().filter(|r| r.is_ok()).count();
        debug!(
            "Parsing complete: {} succeeded, {} failed",
            parsed,
            results.len() - parsed
        );

        results
    }

    /// Parse a standalone type expression such as `Vec<Item>` or `Option<Uuid>`
    pub fn parse_type(expr: &str) -> Result<syn::Type> {
        syn::parse_str::<syn::Type>(expr.trim())
            .with_context(|| format!("Invalid type expression: `{}`", expr))
    }
}
