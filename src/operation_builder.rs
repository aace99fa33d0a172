//! Builds one operation per route descriptor.
//!
//! A descriptor is validated completely before any of its contracts are resolved, so a
//! skipped route never leaves components behind in the registry.

use crate::config::Settings;
use crate::diagnostics::{Diagnostics, Warning};
use crate::document::SecurityRequirement;
use crate::error::{Error, Result};
use crate::fragment::{SchemaRef, VariantTag};
use crate::routes::{HttpMethod, ParameterLocation, RouteDescriptor};
use crate::type_resolver::{ResolveContext, TypeResolver};
use indexmap::IndexMap;
use log::debug;
use regex::Regex;
use std::collections::HashSet;

pub const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// A built operation; schemas are still registry references
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub method: HttpMethod,
    /// Normalized `{param}` template
    pub path: String,
    pub operation_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    pub responses: IndexMap<String, Response>,
    pub deprecated: bool,
    pub security: Option<Vec<SecurityRequirement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub description: Option<String>,
    pub schema: SchemaRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    pub schema: SchemaRef,
    pub required: bool,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub description: String,
    /// `None` for responses without a body
    pub schema: Option<SchemaRef>,
}

/// Convert `:param` and `*rest` segments to `{param}`, leaving `{param}` alone
pub fn convert_path_format(path: &str) -> String {
    path.split('/')
        .map(|part| match part.strip_prefix(':').or_else(|| part.strip_prefix('*')) {
            Some(name) if !name.is_empty() => format!("{{{}}}", name),
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn template_parameters(path: &str) -> Vec<&str> {
    path.split('/')
        .filter_map(|part| part.strip_prefix('{')?.strip_suffix('}'))
        .collect()
}

fn is_valid_status(status: &str) -> bool {
    if status == "default" {
        return true;
    }
    let bytes = status.as_bytes();
    bytes.len() == 3
        && (b'1'..=b'5').contains(&bytes[0])
        && (bytes[1..].iter().all(u8::is_ascii_digit) || &bytes[1..] == b"XX")
}

/// Per-run operation builder; remembers ids and routes already built
pub struct OperationBuilder {
    prefix: Option<Regex>,
    split_request: bool,
    split_patch: bool,
    seen_routes: HashSet<(String, HttpMethod)>,
    seen_ids: HashSet<String>,
}

impl OperationBuilder {
    pub fn new(settings: &Settings) -> Result<Self> {
        let prefix = if settings.schema_path_prefix.is_empty() {
            None
        } else {
            Some(Regex::new(&settings.schema_path_prefix).map_err(|e| {
                Error::Config(format!("schema_path_prefix is not a valid regex: {}", e))
            })?)
        };

        Ok(Self {
            prefix,
            split_request: settings.component_split_request,
            split_patch: settings.component_split_patch,
            seen_routes: HashSet::new(),
            seen_ids: HashSet::new(),
        })
    }

    /// Variant actually used for a role under the configured split policy
    pub fn effective_variant(&self, role: VariantTag) -> Option<VariantTag> {
        match role {
            VariantTag::Patch if self.split_patch => Some(VariantTag::Patch),
            VariantTag::Patch => self.effective_variant(VariantTag::Request),
            _ if self.split_request => Some(role),
            _ => None,
        }
    }

    /// Build one operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedOperation`] naming the route when the descriptor is
    /// inconsistent. The caller decides whether that is fatal.
    pub fn build(
        &mut self,
        route: &RouteDescriptor,
        resolver: &mut TypeResolver<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Operation> {
        let path = convert_path_format(&route.path);
        debug!("Building operation {} {}", route.method.as_str(), path);

        let malformed = |reason: String| Error::MalformedOperation {
            route: route.identity(),
            reason,
        };
        self.validate(route, &path).map_err(malformed)?;
        if let Some(id) = &route.operation_id {
            if self.seen_ids.contains(id) {
                return Err(malformed(format!("operation id `{}` is already used", id)));
            }
        }

        let operation_id = match &route.operation_id {
            Some(id) => id.clone(),
            None => self.unique_operation_id(&path, route.method, diagnostics),
        };
        self.seen_ids.insert(operation_id.clone());
        self.seen_routes.insert((path.clone(), route.method));

        let tags = if route.tags.is_empty() {
            self.tokenize(&path).into_iter().take(1).collect()
        } else {
            route.tags.clone()
        };

        let parameter_origin = format!("{} {} parameter", route.method.as_str(), path);
        let parameters = route
            .parameters
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                location: p.location,
                required: p.location == ParameterLocation::Path || p.required,
                description: p.description.clone(),
                schema: resolver.resolve(
                    &p.contract,
                    ResolveContext::new(self.effective_variant(VariantTag::Request), &parameter_origin),
                    diagnostics,
                ),
            })
            .collect();

        let partial = route.is_partial();
        let request_body = route.request.as_ref().map(|contract| {
            let role = if partial { VariantTag::Patch } else { VariantTag::Request };
            let origin = format!("{} {} request body", route.method.as_str(), path);
            RequestBody {
                schema: resolver.resolve(
                    contract,
                    ResolveContext::new(self.effective_variant(role), &origin),
                    diagnostics,
                ),
                required: !partial,
                media_type: route
                    .request_media_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string()),
            }
        });

        let response_variant = self.effective_variant(VariantTag::Response);
        let responses = route
            .responses
            .iter()
            .map(|(status, response)| {
                let origin = format!("{} {} response {}", route.method.as_str(), path, status);
                let schema = response.contract.as_ref().map(|contract| {
                    resolver.resolve(
                        contract,
                        ResolveContext::new(response_variant, &origin),
                        diagnostics,
                    )
                });
                let built = Response {
                    description: response.description.clone().unwrap_or_default(),
                    schema,
                };
                (status.clone(), built)
            })
            .collect();

        Ok(Operation {
            method: route.method,
            path,
            operation_id,
            summary: route.summary.clone(),
            description: route.description.clone(),
            tags,
            parameters,
            request_body,
            responses,
            deprecated: route.deprecated,
            security: route.security.clone(),
        })
    }

    fn validate(&self, route: &RouteDescriptor, path: &str) -> std::result::Result<(), String> {
        if !path.starts_with('/') {
            return Err(format!("path `{}` does not start with `/`", path));
        }

        let placeholders = template_parameters(path);
        let declared: Vec<&str> = route
            .parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Path)
            .map(|p| p.name.as_str())
            .collect();
        if let Some(missing) = placeholders.iter().find(|name| !declared.contains(*name)) {
            return Err(format!("path parameter `{}` is not declared", missing));
        }
        if let Some(extra) = declared.iter().find(|name| !placeholders.contains(*name)) {
            return Err(format!("path parameter `{}` is not in the template", extra));
        }

        let mut seen = HashSet::new();
        for parameter in &route.parameters {
            if !seen.insert((parameter.name.as_str(), parameter.location)) {
                return Err(format!(
                    "parameter `{}` is declared twice",
                    parameter.name
                ));
            }
        }

        if route.responses.is_empty() {
            return Err("no responses declared".to_string());
        }
        if let Some(status) = route.responses.keys().find(|s| !is_valid_status(s)) {
            return Err(format!("`{}` is not a response status", status));
        }

        if self.seen_routes.contains(&(path.to_string(), route.method)) {
            return Err("route is declared more than once".to_string());
        }
        Ok(())
    }

    /// Path tokens after prefix stripping, parameters removed
    fn tokenize(&self, path: &str) -> Vec<String> {
        let stripped = match &self.prefix {
            Some(prefix) => prefix.replace(path, "").into_owned(),
            None => path.to_string(),
        };
        stripped
            .split('/')
            .filter(|t| !t.is_empty() && !t.starts_with('{'))
            .map(|t| t.replace('-', "_"))
            .collect()
    }

    fn unique_operation_id(&self, path: &str, method: HttpMethod, diagnostics: &mut Diagnostics) -> String {
        let action = match method {
            HttpMethod::Get if path.trim_end_matches('/').ends_with('}') => "retrieve",
            HttpMethod::Get => "list",
            HttpMethod::Post => "create",
            HttpMethod::Put => "update",
            HttpMethod::Patch => "partial_update",
            HttpMethod::Delete => "destroy",
            other => return self.with_tokens(path, &other.as_str().to_ascii_lowercase(), diagnostics),
        };
        self.with_tokens(path, action, diagnostics)
    }

    fn with_tokens(&self, path: &str, action: &str, diagnostics: &mut Diagnostics) -> String {
        let mut tokens = self.tokenize(path);
        tokens.push(action.to_string());
        let candidate = tokens.join("_");

        if !self.seen_ids.contains(&candidate) {
            return candidate;
        }
        let assigned = (2..)
            .map(|n| format!("{}_{}", candidate, n))
            .find(|id| !self.seen_ids.contains(id))
            .unwrap_or_default();
        diagnostics.push(Warning::NamingConflict {
            candidate,
            assigned: assigned.clone(),
        });
        assigned
    }
}
