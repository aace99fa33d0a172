//! Engine entry point.
//!
//! [`SchemaGenerator`] is constructed once from validated settings and a contract
//! catalog, then asked for a document as often as needed. Every call starts from an
//! empty registry, so two calls with the same routes produce identical documents.

use crate::assembler::DocumentAssembler;
use crate::config::Settings;
use crate::declaration::{ContractCatalog, PrimitiveTable};
use crate::diagnostics::{Diagnostics, Warning};
use crate::document::OpenApiDocument;
use crate::error::{Error, Result};
use crate::operation_builder::OperationBuilder;
use crate::postprocess::{Pipeline, StageContext};
use crate::registry::ComponentRegistry;
use crate::routes::RouteDescriptor;
use crate::type_resolver::TypeResolver;
use log::{debug, info};

/// A finished document and everything that went wrong on the way
#[derive(Debug, Clone)]
pub struct GeneratedSchema {
    pub document: OpenApiDocument,
    pub warnings: Vec<Warning>,
}

pub struct SchemaGenerator {
    settings: Settings,
    catalog: ContractCatalog,
    primitives: PrimitiveTable,
    pipeline: Pipeline,
}

impl SchemaGenerator {
    /// Validate the settings and prepare the lookup tables and stage pipeline
    pub fn new(settings: Settings, catalog: ContractCatalog) -> Result<Self> {
        settings.validate()?;

        let mut primitives = PrimitiveTable::default();
        for (name, primitive) in &settings.primitive_types {
            debug!("Registering primitive {} as {:?}", name, primitive);
            primitives.register(name.clone(), primitive.clone());
        }
        let pipeline = Pipeline::from_kinds(&settings.postprocessing_stages);

        Ok(Self {
            settings,
            catalog,
            primitives,
            pipeline,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Build the document for an ordered list of routes.
    ///
    /// `public` tells postprocessing stages whether the list is the complete route set or
    /// one already reduced by visibility filtering.
    ///
    /// # Errors
    ///
    /// A malformed route in strict mode, or a failing postprocessing stage. In non-strict
    /// mode malformed routes are skipped and reported in [`GeneratedSchema::warnings`].
    pub fn get_schema(&self, routes: &[RouteDescriptor], public: bool) -> Result<GeneratedSchema> {
        info!("Generating schema for {} routes", routes.len());
        let mut diagnostics = Diagnostics::new();

        let mut builder = OperationBuilder::new(&self.settings)?;
        let mut resolver = TypeResolver::new(
            &self.catalog,
            &self.primitives,
            ComponentRegistry::new(self.settings.collision_order),
        );

        let mut operations = Vec::with_capacity(routes.len());
        for route in routes {
            match builder.build(route, &mut resolver, &mut diagnostics) {
                Ok(operation) => operations.push(operation),
                Err(Error::MalformedOperation { route, reason }) if !self.settings.strict => {
                    diagnostics.push(Warning::MalformedOperation { route, reason });
                }
                Err(err) => return Err(err),
            }
        }
        debug!(
            "Built {} operations, {} registry entries",
            operations.len(),
            resolver.registry().len()
        );

        let snapshot = resolver.registry().snapshot();
        let document = DocumentAssembler::new(&self.settings).assemble(
            &operations,
            &snapshot,
            &mut diagnostics,
        );

        let document = {
            let mut ctx = StageContext {
                settings: &self.settings,
                public,
                diagnostics: &mut diagnostics,
            };
            self.pipeline.run(document, &mut ctx)?
        };

        Ok(GeneratedSchema {
            document,
            warnings: diagnostics.into_warnings(),
        })
    }
}
