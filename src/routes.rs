//! Route descriptors: the interface to the route-discovery collaborator.
//!
//! The engine never crawls routes. Whatever discovers them (a framework integration,
//! a build script, a hand-written manifest) hands over an ordered list of
//! [`RouteDescriptor`]s. This module also loads such a list from a YAML/JSON manifest
//! whose contracts are written as Rust type expressions.
//!
//! # Manifest format
//!
//! ```yaml
//! routes:
//!   - path: /items/{id}
//!     method: GET
//!     parameters:
//!       - { name: id, in: path, type: Uuid }
//!     responses:
//!       "200": Item
//!   - path: /items
//!     method: POST
//!     request: Item
//!     security:
//!       - { bearer: [] }
//!     responses:
//!       "201": Item
//!       "400": null
//! ```

use crate::contracts::parse_type_expression;
use crate::declaration::TypeDecl;
use crate::document::SecurityRequirement;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// HTTP methods an operation can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "options")]
    Options,
    #[serde(alias = "head")]
    Head,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "trace")]
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
        }
    }
}

/// Where a parameter value travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

/// A non-body input of a route
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub location: ParameterLocation,
    pub contract: TypeDecl,
    /// Ignored for path parameters, which are always required
    pub required: bool,
    pub description: Option<String>,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, location: ParameterLocation, contract: TypeDecl) -> Self {
        Self {
            name: name.into(),
            location,
            contract,
            required: location == ParameterLocation::Path,
            description: None,
        }
    }
}

/// One declared response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDescriptor {
    /// `None` means the response has no body
    pub contract: Option<TypeDecl>,
    pub description: Option<String>,
}

impl ResponseDescriptor {
    pub fn body(contract: TypeDecl) -> Self {
        Self {
            contract: Some(contract),
            description: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            contract: None,
            description: None,
        }
    }
}

/// Everything the engine needs to know about one route+method pair
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDescriptor {
    /// Template as discovered; `:id`, `*rest` and `{id}` styles are accepted
    pub path: String,
    pub method: HttpMethod,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub parameters: Vec<ParameterDescriptor>,
    pub request: Option<TypeDecl>,
    pub request_media_type: Option<String>,
    /// Partial update of another operation's contract; defaults to `method == PATCH`
    pub partial: Option<bool>,
    /// Status code -> response, in declaration order
    pub responses: IndexMap<String, ResponseDescriptor>,
    pub deprecated: bool,
    /// Requirements of this operation alone; `None` inherits the document-level ones
    pub security: Option<Vec<SecurityRequirement>>,
}

impl RouteDescriptor {
    pub fn new(path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            path: path.into(),
            method,
            operation_id: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            parameters: Vec::new(),
            request: None,
            request_media_type: None,
            partial: None,
            responses: IndexMap::new(),
            deprecated: false,
            security: None,
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_request(mut self, contract: TypeDecl) -> Self {
        self.request = Some(contract);
        self
    }

    pub fn with_response(mut self, status: &str, response: ResponseDescriptor) -> Self {
        self.responses.insert(status.to_string(), response);
        self
    }

    pub fn with_security(mut self, requirement: SecurityRequirement) -> Self {
        self.security.get_or_insert_with(Vec::new).push(requirement);
        self
    }

    pub fn is_partial(&self) -> bool {
        self.partial.unwrap_or(self.method == HttpMethod::Patch)
    }

    /// Human-readable identity used in warnings and errors
    pub fn identity(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

#[derive(Debug, Deserialize)]
struct RouteManifest {
    #[serde(default)]
    routes: Vec<ManifestRoute>,
}

#[derive(Debug, Deserialize)]
struct ManifestRoute {
    path: String,
    method: HttpMethod,
    #[serde(default)]
    operation_id: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    parameters: Vec<ManifestParameter>,
    #[serde(default)]
    request: Option<String>,
    #[serde(default)]
    request_media_type: Option<String>,
    #[serde(default)]
    partial: Option<bool>,
    #[serde(default)]
    responses: IndexMap<String, Option<ManifestResponse>>,
    #[serde(default)]
    deprecated: bool,
    #[serde(default)]
    security: Option<Vec<SecurityRequirement>>,
}

#[derive(Debug, Deserialize)]
struct ManifestParameter {
    name: String,
    #[serde(rename = "in")]
    location: ParameterLocation,
    #[serde(rename = "type", default = "default_parameter_type")]
    type_expr: String,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    description: Option<String>,
}

fn default_parameter_type() -> String {
    "String".to_string()
}

/// Either a bare type expression or `{ type, description }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestResponse {
    Contract(String),
    Detailed {
        #[serde(rename = "type", default)]
        type_expr: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl ManifestRoute {
    fn into_descriptor(self) -> RouteDescriptor {
        let parameters = self
            .parameters
            .into_iter()
            .map(|p| {
                let required = match p.location {
                    ParameterLocation::Path => true,
                    _ => p.required.unwrap_or(false),
                };
                ParameterDescriptor {
                    name: p.name,
                    location: p.location,
                    contract: parse_type_expression(&p.type_expr),
                    required,
                    description: p.description,
                }
            })
            .collect();

        let responses = self
            .responses
            .into_iter()
            .map(|(status, response)| {
                let descriptor = match response {
                    None => ResponseDescriptor::empty(),
                    Some(ManifestResponse::Contract(expr)) => {
                        ResponseDescriptor::body(parse_type_expression(&expr))
                    }
                    Some(ManifestResponse::Detailed {
                        type_expr,
                        description,
                    }) => ResponseDescriptor {
                        contract: type_expr.as_deref().map(parse_type_expression),
                        description,
                    },
                };
                (status, descriptor)
            })
            .collect();

        RouteDescriptor {
            path: self.path,
            method: self.method,
            operation_id: self.operation_id,
            summary: self.summary,
            description: self.description,
            tags: self.tags,
            parameters,
            request: self.request.as_deref().map(parse_type_expression),
            request_media_type: self.request_media_type,
            partial: self.partial,
            responses,
            deprecated: self.deprecated,
            security: self.security,
        }
    }
}

/// Parse manifest text (YAML, or JSON which is valid YAML)
pub fn parse_manifest(content: &str) -> Result<Vec<RouteDescriptor>> {
    let manifest: RouteManifest =
        serde_yaml::from_str(content).context("Failed to parse route manifest")?;
    debug!("Route manifest lists {} routes", manifest.routes.len());
    Ok(manifest
        .routes
        .into_iter()
        .map(ManifestRoute::into_descriptor)
        .collect())
}

/// Load route descriptors from a manifest file
pub fn load_manifest(path: &Path) -> Result<Vec<RouteDescriptor>> {
    debug!("Loading route manifest: {}", path.display());
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read route manifest: {}", path.display()))?;
    parse_manifest(&content).with_context(|| format!("In {}", path.display()))
}
