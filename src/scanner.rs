use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::PathBuf;
use walkdir::WalkDir;

/// Directory names never searched for contract sources
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// Finds the `.rs` files that may declare request/response contracts.
///
/// Build output and hidden directories are skipped. Files come back sorted so the
/// "first definition wins" rule of the contract catalog does not depend on the
/// platform's directory iteration order.
pub struct FileScanner {
    root_path: PathBuf,
}

/// Files found by [`FileScanner::scan`]
pub struct ScanResult {
    pub rust_files: Vec<PathBuf>,
    /// Entries that could not be read
    pub warnings: Vec<String>,
}

impl FileScanner {
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Walk the tree below the root.
    ///
    /// # Errors
    ///
    /// Fails only if the root itself is missing; unreadable entries below it are
    /// reported in [`ScanResult::warnings`].
    pub fn scan(&self) -> Result<ScanResult> {
        std::fs::metadata(&self.root_path).with_context(|| {
            format!("Contract directory not found: {}", self.root_path.display())
        })?;

        let mut rust_files = Vec::new();
        let mut warnings = Vec::new();

        let walker = WalkDir::new(&self.root_path).into_iter().filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !(e.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()))
        });

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && path.extension().and_then(|s| s.to_str()) == Some("rs")
                    {
                        rust_files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        rust_files.sort();
        debug!(
            "Found {} source files under {}",
            rust_files.len(),
            self.root_path.display()
        );

        Ok(ScanResult {
            rust_files,
            warnings,
        })
    }
}
