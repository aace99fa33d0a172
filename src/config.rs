use crate::declaration::{EnumValue, Primitive};
use crate::document::{Components, Contact, ExternalDocs, License, PathItem, SecurityRequirement, Server, Tag};
use crate::error::{Error, Result};
use crate::postprocess::StageKind;
use crate::registry::CollisionOrder;
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Every option the engine reads. Loaded once and passed by reference; nothing global.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub title: String,
    pub description: String,
    pub version: String,
    pub terms_of_service: Option<String>,
    pub contact: Option<Contact>,
    pub license: Option<License>,
    pub servers: Vec<Server>,
    pub security: Option<Vec<SecurityRequirement>>,
    pub tags: Vec<Tag>,
    pub external_docs: Option<ExternalDocs>,

    /// Regex stripped from the start of paths before tags and operation ids are derived
    pub schema_path_prefix: String,
    /// Give request bodies their own `…Request` components
    pub component_split_request: bool,
    /// Give partial-update bodies their own `…Patch` components
    pub component_split_patch: bool,
    pub collision_order: CollisionOrder,
    /// Abort on the first malformed operation instead of skipping it
    pub strict: bool,

    /// Canonical enum name → member values
    pub enum_name_overrides: IndexMap<String, Vec<EnumValue>>,
    pub append_paths: IndexMap<String, PathItem>,
    pub append_components: Components,
    pub postprocessing_stages: Vec<StageKind>,
    /// Extra native type → primitive entries
    pub primitive_types: IndexMap<String, Primitive>,
    pub serve_public: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            version: "0.0.0".to_string(),
            terms_of_service: None,
            contact: None,
            license: None,
            servers: Vec::new(),
            security: None,
            tags: Vec::new(),
            external_docs: None,
            schema_path_prefix: String::new(),
            component_split_request: false,
            component_split_patch: true,
            collision_order: CollisionOrder::default(),
            strict: false,
            enum_name_overrides: IndexMap::new(),
            append_paths: IndexMap::new(),
            append_components: Components::default(),
            postprocessing_stages: vec![StageKind::EnumReconciliation],
            primitive_types: IndexMap::new(),
            serve_public: true,
        }
    }
}

impl Settings {
    /// Load settings from a YAML or JSON file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading settings from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse settings text; JSON is accepted since it is valid YAML
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// Checks that need more than deserialization
    pub fn validate(&self) -> Result<()> {
        if !self.schema_path_prefix.is_empty() {
            regex::Regex::new(&self.schema_path_prefix).map_err(|e| {
                Error::Config(format!("schema_path_prefix is not a valid regex: {}", e))
            })?;
        }

        let mut seen: Vec<(BTreeSet<&EnumValue>, &str)> = Vec::new();
        for (name, values) in &self.enum_name_overrides {
            let members: BTreeSet<&EnumValue> = values.iter().collect();
            if let Some((_, other)) = seen.iter().find(|(set, _)| *set == members) {
                return Err(Error::Config(format!(
                    "enum overrides `{}` and `{}` list the same members",
                    other, name
                )));
            }
            seen.push((members, name));
        }

        Ok(())
    }
}
