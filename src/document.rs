//! Serializable OpenAPI 3.0.3 object model.
//!
//! Only the subset the engine produces is modeled with typed fields. Every object that
//! users can append statically also carries a flattened `extensions` map, so unknown
//! keys in appended fragments survive a round trip.

use crate::routes::{HttpMethod, ParameterLocation};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Version of the output format
pub const OPENAPI_VERSION: &str = "3.0.3";

/// Prefix of every component schema reference
pub const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

fn is_false(value: &bool) -> bool {
    !*value
}

/// OpenAPI Schema object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(rename = "x-enum-varnames", default, skip_serializing_if = "Option::is_none")]
    pub enum_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(rename = "allOf", default, skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<Schema>>,
    #[serde(rename = "readOnly", default, skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(rename = "writeOnly", default, skip_serializing_if = "is_false")]
    pub write_only: bool,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl Schema {
    /// `{"$ref": "#/components/schemas/<name>"}`
    pub fn reference(name: &str) -> Self {
        Self {
            reference: Some(format!("{}{}", SCHEMA_REF_PREFIX, name)),
            ..Self::default()
        }
    }

    /// Name of the component this schema points at, if it is a component reference
    pub fn ref_name(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|r| r.strip_prefix(SCHEMA_REF_PREFIX))
    }

    pub fn is_enum(&self) -> bool {
        self.enum_values.is_some() && self.properties.is_none() && self.reference.is_none()
    }

    /// Visit this schema and every nested schema, parents first
    pub fn walk(&self, f: &mut dyn FnMut(&Schema)) {
        f(self);
        if let Some(items) = &self.items {
            items.walk(f);
        }
        if let Some(properties) = &self.properties {
            for schema in properties.values() {
                schema.walk(f);
            }
        }
        if let Some(all_of) = &self.all_of {
            for schema in all_of {
                schema.walk(f);
            }
        }
    }

    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Schema)) {
        f(self);
        if let Some(items) = &mut self.items {
            items.walk_mut(f);
        }
        if let Some(properties) = &mut self.properties {
            for schema in properties.values_mut() {
                schema.walk_mut(f);
            }
        }
        if let Some(all_of) = &mut self.all_of {
            for schema in all_of {
                schema.walk_mut(f);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// OpenAPI Info object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "termsOfService", default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalDocs {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "externalDocs", default, skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<ExternalDocs>,
}

/// Scheme name -> required scopes
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

/// OpenAPI PathItem object - all operations of one path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Operation>,
    #[serde(flatten)]
    pub extensions: IndexMap<String, Value>,
}

impl PathItem {
    pub fn slot_mut(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Options => &mut self.options,
            HttpMethod::Head => &mut self.head,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Trace => &mut self.trace,
        }
    }

    pub fn operation(&self, method: HttpMethod) -> Option<&Operation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Options => self.options.as_ref(),
            HttpMethod::Head => self.head.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Trace => self.trace.as_ref(),
        }
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        [
            &self.get,
            &self.put,
            &self.post,
            &self.delete,
            &self.options,
            &self.head,
            &self.patch,
            &self.trace,
        ]
        .into_iter()
        .filter_map(Option::as_ref)
    }

    pub fn operations_mut(&mut self) -> impl Iterator<Item = &mut Operation> {
        [
            &mut self.get,
            &mut self.put,
            &mut self.post,
            &mut self.delete,
            &mut self.options,
            &mut self.head,
            &mut self.patch,
            &mut self.trace,
        ]
        .into_iter()
        .filter_map(Option::as_mut)
    }
}

/// OpenAPI Operation object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "operationId", default, skip_serializing_if = "String::is_empty")]
    pub operation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(rename = "requestBody", default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    #[serde(default)]
    pub responses: IndexMap<String, Response>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
    /// Overrides the document-level requirement; `Some(vec![])` makes the operation public
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
    #[serde(flatten)]
    pub extensions: IndexMap<String, Value>,
}

impl Operation {
    fn walk_schemas(&self, f: &mut dyn FnMut(&Schema)) {
        for parameter in &self.parameters {
            parameter.schema.walk(f);
        }
        if let Some(body) = &self.request_body {
            for media in body.content.values() {
                media.schema.walk(f);
            }
        }
        for response in self.responses.values() {
            for media in response.content.iter().flat_map(|c| c.values()) {
                media.schema.walk(f);
            }
        }
    }

    fn walk_schemas_mut(&mut self, f: &mut dyn FnMut(&mut Schema)) {
        for parameter in &mut self.parameters {
            parameter.schema.walk_mut(f);
        }
        if let Some(body) = &mut self.request_body {
            for media in body.content.values_mut() {
                media.schema.walk_mut(f);
            }
        }
        for response in self.responses.values_mut() {
            for media in response.content.iter_mut().flat_map(|c| c.values_mut()) {
                media.schema.walk_mut(f);
            }
        }
    }
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Schema,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    pub content: IndexMap<String, MediaType>,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: Schema,
}

/// OpenAPI Response object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<IndexMap<String, MediaType>>,
}

/// OpenAPI Components object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Components {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub schemas: BTreeMap<String, Schema>,
    #[serde(rename = "securitySchemes", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub security_schemes: BTreeMap<String, Value>,
    /// Any other section (`responses`, `parameters`, `examples`, ...)
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl Components {
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty() && self.security_schemes.is_empty() && self.extensions.is_empty()
    }
}

/// Complete OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    pub paths: IndexMap<String, PathItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(rename = "externalDocs", default, skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<ExternalDocs>,
}

impl OpenApiDocument {
    /// Component schemas, if the document has any
    pub fn schemas(&self) -> Option<&BTreeMap<String, Schema>> {
        self.components.as_ref().map(|c| &c.schemas)
    }

    /// Visit every schema node reachable from operations (not components)
    pub fn visit_operation_schemas(&self, f: &mut dyn FnMut(&Schema)) {
        for item in self.paths.values() {
            for operation in item.operations() {
                operation.walk_schemas(f);
            }
        }
    }

    /// Visit every schema node in the document, operations first, then components
    pub fn visit_schemas_mut(&mut self, f: &mut dyn FnMut(&mut Schema)) {
        for item in self.paths.values_mut() {
            for operation in item.operations_mut() {
                operation.walk_schemas_mut(f);
            }
        }
        if let Some(components) = &mut self.components {
            for schema in components.schemas.values_mut() {
                schema.walk_mut(f);
            }
        }
    }

    /// Visit the free-form values held by path items and their operations
    pub fn visit_path_extensions(&self, f: &mut dyn FnMut(&Value)) {
        for item in self.paths.values() {
            for value in item.extensions.values() {
                f(value);
            }
            for operation in item.operations() {
                for value in operation.extensions.values() {
                    f(value);
                }
            }
        }
    }

    /// Visit every free-form value outside schemas: path items, operations and the
    /// non-schema component sections
    pub fn visit_extensions_mut(&mut self, f: &mut dyn FnMut(&mut Value)) {
        for item in self.paths.values_mut() {
            for value in item.extensions.values_mut() {
                f(value);
            }
            for operation in item.operations_mut() {
                for value in operation.extensions.values_mut() {
                    f(value);
                }
            }
        }
        if let Some(components) = &mut self.components {
            for value in components.extensions.values_mut() {
                f(value);
            }
        }
    }
}
