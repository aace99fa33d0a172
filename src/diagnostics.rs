//! Non-fatal findings collected during one generation run.
//!
//! Partial success is a normal outcome: every recovered problem is recorded here,
//! logged at `warn` level, and handed back to the caller next to the document.

use log::warn;
use std::fmt;

/// A recovered problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A declaration could not be resolved precisely and was replaced by a permissive schema.
    Resolution { context: String, message: String },
    /// A component or operation id was renamed to avoid a collision.
    NamingConflict { candidate: String, assigned: String },
    /// A route descriptor was skipped.
    MalformedOperation { route: String, reason: String },
    /// An appended static fragment replaced generated content.
    Override { section: String, key: String },
    /// A postprocessing stage noticed something it could not fix on its own.
    Postprocess { stage: String, message: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Resolution { context, message } => {
                write!(f, "could not resolve {}: {}", context, message)
            }
            Warning::NamingConflict { candidate, assigned } => {
                write!(f, "name `{}` is taken, using `{}`", candidate, assigned)
            }
            Warning::MalformedOperation { route, reason } => {
                write!(f, "skipping {}: {}", route, reason)
            }
            Warning::Override { section, key } => {
                write!(f, "appended {} `{}` replaces generated content", section, key)
            }
            Warning::Postprocess { stage, message } => write!(f, "[{}] {}", stage, message),
        }
    }
}

/// Accumulates warnings for a single run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a warning
    pub fn push(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}
