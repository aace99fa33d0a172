use crate::config::Settings;
use crate::diagnostics::{Diagnostics, Warning};
use crate::document::{
    self, Components, Info, MediaType, OpenApiDocument, PathItem, RequestBody, OPENAPI_VERSION,
};
use crate::operation_builder::{Operation, DEFAULT_MEDIA_TYPE};
use crate::registry::RegistrySnapshot;
use indexmap::IndexMap;
use log::debug;

/// Aggregates built operations and registry contents into a document.
///
/// Metadata is copied from the settings as is. Appended paths and components are laid
/// over the generated ones; where a key exists on both sides the appended value wins
/// and a [`Warning::Override`] is recorded.
pub struct DocumentAssembler<'s> {
    settings: &'s Settings,
}

impl<'s> DocumentAssembler<'s> {
    pub fn new(settings: &'s Settings) -> Self {
        Self { settings }
    }

    pub fn assemble(
        &self,
        operations: &[Operation],
        snapshot: &RegistrySnapshot,
        diagnostics: &mut Diagnostics,
    ) -> OpenApiDocument {
        debug!("Assembling document from {} operations", operations.len());

        let mut paths: IndexMap<String, PathItem> = IndexMap::new();
        for operation in operations {
            let item = paths.entry(operation.path.clone()).or_default();
            *item.slot_mut(operation.method) = Some(render_operation(operation, snapshot));
        }

        for (path, item) in &self.settings.append_paths {
            if paths.insert(path.clone(), item.clone()).is_some() {
                diagnostics.push(Warning::Override {
                    section: "path".to_string(),
                    key: path.clone(),
                });
            }
        }

        let mut components = Components {
            schemas: snapshot.schemas().clone(),
            ..Components::default()
        };
        self.overlay_components(&mut components, diagnostics);

        OpenApiDocument {
            openapi: OPENAPI_VERSION.to_string(),
            info: self.info(),
            servers: self.settings.servers.clone(),
            paths,
            components: (!components.is_empty()).then_some(components),
            security: self.settings.security.clone(),
            tags: self.settings.tags.clone(),
            external_docs: self.settings.external_docs.clone(),
        }
    }

    fn info(&self) -> Info {
        let settings = self.settings;
        Info {
            title: settings.title.clone(),
            version: settings.version.clone(),
            description: (!settings.description.is_empty()).then(|| settings.description.clone()),
            terms_of_service: settings.terms_of_service.clone(),
            contact: settings.contact.clone(),
            license: settings.license.clone(),
        }
    }

    fn overlay_components(&self, components: &mut Components, diagnostics: &mut Diagnostics) {
        let appended = &self.settings.append_components;

        for (name, schema) in &appended.schemas {
            if components.schemas.insert(name.clone(), schema.clone()).is_some() {
                diagnostics.push(Warning::Override {
                    section: "schema".to_string(),
                    key: name.clone(),
                });
            }
        }
        for (name, scheme) in &appended.security_schemes {
            if components
                .security_schemes
                .insert(name.clone(), scheme.clone())
                .is_some()
            {
                diagnostics.push(Warning::Override {
                    section: "securityScheme".to_string(),
                    key: name.clone(),
                });
            }
        }
        for (section, value) in &appended.extensions {
            components.extensions.insert(section.clone(), value.clone());
        }
    }
}

fn render_operation(operation: &Operation, snapshot: &RegistrySnapshot) -> document::Operation {
    let parameters = operation
        .parameters
        .iter()
        .map(|p| document::Parameter {
            name: p.name.clone(),
            location: p.location,
            required: p.required,
            description: p.description.clone(),
            schema: snapshot.schema_for(&p.schema),
        })
        .collect();

    let request_body = operation.request_body.as_ref().map(|body| RequestBody {
        description: None,
        required: body.required,
        content: IndexMap::from([(
            body.media_type.clone(),
            MediaType {
                schema: snapshot.schema_for(&body.schema),
            },
        )]),
    });

    let responses = operation
        .responses
        .iter()
        .map(|(status, response)| {
            let content = response.schema.as_ref().map(|schema| {
                IndexMap::from([(
                    DEFAULT_MEDIA_TYPE.to_string(),
                    MediaType {
                        schema: snapshot.schema_for(schema),
                    },
                )])
            });
            (
                status.clone(),
                document::Response {
                    description: response.description.clone(),
                    content,
                },
            )
        })
        .collect();

    document::Operation {
        operation_id: operation.operation_id.clone(),
        summary: operation.summary.clone(),
        description: operation.description.clone(),
        tags: operation.tags.clone(),
        parameters,
        request_body,
        responses,
        deprecated: operation.deprecated,
        security: operation.security.clone(),
        extensions: IndexMap::new(),
    }
}
