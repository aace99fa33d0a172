//! Postprocessing pipeline run over the assembled document.
//!
//! Stages are selected by identifier in the settings and applied left to right, each one
//! receiving the previous stage's output. Every stage must be idempotent.

use crate::config::Settings;
use crate::diagnostics::{Diagnostics, Warning};
use crate::document::{OpenApiDocument, Schema, SCHEMA_REF_PREFIX};
use crate::error::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What a stage sees besides the document
pub struct StageContext<'a> {
    pub settings: &'a Settings,
    /// The operation list was not reduced by visibility filtering
    pub public: bool,
    pub diagnostics: &'a mut Diagnostics,
}

/// A transform of the whole document
pub trait PostprocessStage {
    fn name(&self) -> &'static str;

    fn apply(&self, document: OpenApiDocument, ctx: &mut StageContext<'_>) -> Result<OpenApiDocument>;
}

/// Identifiers of the built-in stages, as written in the settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    EnumReconciliation,
    PruneUnusedComponents,
}

impl StageKind {
    pub fn stage(&self) -> Box<dyn PostprocessStage> {
        match self {
            StageKind::EnumReconciliation => Box::new(EnumReconciliation),
            StageKind::PruneUnusedComponents => Box::new(PruneUnusedComponents),
        }
    }
}

/// Ordered list of stages
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn PostprocessStage>>,
}

impl Pipeline {
    pub fn from_kinds(kinds: &[StageKind]) -> Self {
        Self {
            stages: kinds.iter().map(StageKind::stage).collect(),
        }
    }

    pub fn with_stage(mut self, stage: Box<dyn PostprocessStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn run(&self, mut document: OpenApiDocument, ctx: &mut StageContext<'_>) -> Result<OpenApiDocument> {
        for stage in &self.stages {
            debug!("Running postprocessing stage {} (public: {})", stage.name(), ctx.public);
            document = stage.apply(document, ctx)?;
        }
        Ok(document)
    }
}

/// Canonical text of each enum value, so sets compare independent of order
fn member_set<'v>(values: impl IntoIterator<Item = &'v Value>) -> BTreeSet<String> {
    values.into_iter().map(Value::to_string).collect()
}

/// Point every `$ref` at a renamed component to its new name, typed schemas and
/// free-form values alike
fn rewrite_refs(document: &mut OpenApiDocument, renames: &HashMap<String, String>) {
    document.visit_schemas_mut(&mut |schema: &mut Schema| {
        if let Some(target) = schema.ref_name().and_then(|name| renames.get(name)) {
            schema.reference = Some(format!("{}{}", SCHEMA_REF_PREFIX, target));
        }
        for value in schema.extensions.values_mut() {
            rewrite_json_refs(value, renames);
        }
    });
    document.visit_extensions_mut(&mut |value| rewrite_json_refs(value, renames));
}

fn rewrite_json_refs(value: &mut Value, renames: &HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                match (key.as_str(), inner) {
                    ("$ref", Value::String(reference)) => {
                        let target = reference
                            .strip_prefix(SCHEMA_REF_PREFIX)
                            .and_then(|name| renames.get(name));
                        if let Some(target) = target {
                            *reference = format!("{}{}", SCHEMA_REF_PREFIX, target);
                        }
                    }
                    (_, inner) => rewrite_json_refs(inner, renames),
                }
            }
        }
        Value::Array(items) => {
            for inner in items {
                rewrite_json_refs(inner, renames);
            }
        }
        _ => {}
    }
}

/// Merges enum components that carry the same member set.
///
/// Resolution works per operation, so two enums declared under different names but with
/// identical members end up as separate components. Groups named in
/// `enum_name_overrides` are merged under the override name; other groups with more than
/// one name are reported so an override can be added.
pub struct EnumReconciliation;

impl PostprocessStage for EnumReconciliation {
    fn name(&self) -> &'static str {
        "enum_reconciliation"
    }

    fn apply(&self, mut document: OpenApiDocument, ctx: &mut StageContext<'_>) -> Result<OpenApiDocument> {
        let Some(components) = document.components.as_mut() else {
            return Ok(document);
        };

        let mut groups: BTreeMap<BTreeSet<String>, Vec<String>> = BTreeMap::new();
        for (name, schema) in &components.schemas {
            if let (true, Some(values)) = (schema.is_enum(), &schema.enum_values) {
                groups.entry(member_set(values)).or_default().push(name.clone());
            }
        }

        let settings = ctx.settings;
        let overrides: HashMap<BTreeSet<String>, &String> = settings
            .enum_name_overrides
            .iter()
            .map(|(name, values)| {
                let json: Vec<Value> = values.iter().map(Value::from).collect();
                (member_set(&json), name)
            })
            .collect();

        let mut renames = HashMap::new();
        for (members, names) in &groups {
            let Some(&target) = overrides.get(members) else {
                if names.len() > 1 {
                    ctx.diagnostics.push(Warning::Postprocess {
                        stage: self.name().to_string(),
                        message: format!(
                            "enums {} share the same members; add an enum_name_overrides entry to merge them",
                            names.join(", ")
                        ),
                    });
                }
                continue;
            };

            if components.schemas.contains_key(target) && !names.contains(target) {
                return Err(Error::Postprocess {
                    stage: self.name().to_string(),
                    component: target.clone(),
                    message: "override name is already used by a different component".to_string(),
                });
            }

            let keeper = if names.contains(target) { target } else { &names[0] };
            let Some(canonical) = components.schemas.get(keeper).cloned() else {
                continue;
            };
            for name in names.iter().filter(|n| *n != target) {
                debug!("Merging enum {} into {}", name, target);
                components.schemas.remove(name);
                renames.insert(name.clone(), target.clone());
            }
            components.schemas.insert(target.clone(), canonical);
        }

        if !renames.is_empty() {
            rewrite_refs(&mut document, &renames);
        }
        Ok(document)
    }
}

/// Removes component schemas nothing points at.
///
/// Roots are the schemas used by operations (including `$ref`s in their free-form
/// keys), references inside non-schema component sections, and every appended schema.
/// Anything reachable from a root is kept.
pub struct PruneUnusedComponents;

fn collect_json_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                match (key.as_str(), inner) {
                    ("$ref", Value::String(reference)) => {
                        if let Some(name) = reference.strip_prefix(SCHEMA_REF_PREFIX) {
                            out.push(name.to_string());
                        }
                    }
                    _ => collect_json_refs(inner, out),
                }
            }
        }
        Value::Array(items) => {
            for inner in items {
                collect_json_refs(inner, out);
            }
        }
        _ => {}
    }
}

impl PostprocessStage for PruneUnusedComponents {
    fn name(&self) -> &'static str {
        "prune_unused_components"
    }

    fn apply(&self, mut document: OpenApiDocument, ctx: &mut StageContext<'_>) -> Result<OpenApiDocument> {
        let mut pending: Vec<String> = Vec::new();
        document.visit_operation_schemas(&mut |schema| {
            pending.extend(schema.ref_name().map(str::to_string));
            for value in schema.extensions.values() {
                collect_json_refs(value, &mut pending);
            }
        });
        document.visit_path_extensions(&mut |value| collect_json_refs(value, &mut pending));
        pending.extend(ctx.settings.append_components.schemas.keys().cloned());

        let Some(components) = document.components.as_mut() else {
            return Ok(document);
        };
        for value in components.extensions.values() {
            collect_json_refs(value, &mut pending);
        }

        let mut reachable = BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !reachable.insert(name.clone()) {
                continue;
            }
            if let Some(schema) = components.schemas.get(&name) {
                schema.walk(&mut |nested| {
                    pending.extend(nested.ref_name().map(str::to_string));
                });
                for value in schema.extensions.values() {
                    collect_json_refs(value, &mut pending);
                }
            }
        }

        let before = components.schemas.len();
        components.schemas.retain(|name, _| reachable.contains(name));
        debug!(
            "Pruned {} unused component schemas",
            before - components.schemas.len()
        );

        if components.is_empty() {
            document.components = None;
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::EnumValue;
    use crate::document::{Components, Info, MediaType, Operation, PathItem, Response};
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn enum_schema(values: &[&str]) -> Schema {
        Schema {
            schema_type: Some("string".to_string()),
            enum_values: Some(values.iter().map(|v| Value::from(*v)).collect()),
            ..Schema::default()
        }
    }

    fn object_with(props: &[(&str, Schema)]) -> Schema {
        Schema {
            schema_type: Some("object".to_string()),
            properties: Some(
                props
                    .iter()
                    .map(|(name, schema)| (name.to_string(), schema.clone()))
                    .collect(),
            ),
            ..Schema::default()
        }
    }

    fn document_with(schemas: &[(&str, Schema)], response_ref: &str) -> OpenApiDocument {
        let operation = Operation {
            operation_id: "things_list".to_string(),
            responses: IndexMap::from([(
                "200".to_string(),
                Response {
                    description: String::new(),
                    content: Some(IndexMap::from([(
                        "application/json".to_string(),
                        MediaType {
                            schema: Schema::reference(response_ref),
                        },
                    )])),
                },
            )]),
            ..Operation::default()
        };

        OpenApiDocument {
            openapi: "3.0.3".to_string(),
            info: Info {
                title: String::new(),
                version: "0.0.0".to_string(),
                description: None,
                terms_of_service: None,
                contact: None,
                license: None,
            },
            servers: Vec::new(),
            paths: IndexMap::from([(
                "/things".to_string(),
                PathItem {
                    get: Some(operation),
                    ..PathItem::default()
                },
            )]),
            components: Some(Components {
                schemas: schemas
                    .iter()
                    .map(|(name, schema)| (name.to_string(), schema.clone()))
                    .collect(),
                ..Components::default()
            }),
            security: None,
            tags: Vec::new(),
            external_docs: None,
        }
    }

    fn run(
        kinds: &[StageKind],
        settings: &Settings,
        document: OpenApiDocument,
    ) -> (Result<OpenApiDocument>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let result = {
            let mut ctx = StageContext {
                settings,
                public: true,
                diagnostics: &mut diagnostics,
            };
            Pipeline::from_kinds(kinds).run(document, &mut ctx)
        };
        (result, diagnostics)
    }

    fn schema_names(document: &OpenApiDocument) -> Vec<String> {
        document
            .schemas()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn two_status_enums() -> OpenApiDocument {
        document_with(
            &[
                ("OrderState", enum_schema(&["open", "closed"])),
                ("TicketStatus", enum_schema(&["closed", "open"])),
                (
                    "Thing",
                    object_with(&[
                        ("order", Schema::reference("OrderState")),
                        ("ticket", Schema::reference("TicketStatus")),
                    ]),
                ),
            ],
            "Thing",
        )
    }

    #[test]
    fn test_override_merges_equal_enums() {
        let mut settings = Settings::default();
        settings.enum_name_overrides.insert(
            "Status".to_string(),
            vec![EnumValue::String("open".into()), EnumValue::String("closed".into())],
        );

        let (result, diagnostics) =
            run(&[StageKind::EnumReconciliation], &settings, two_status_enums());
        let document = result.unwrap();

        assert_eq!(schema_names(&document), vec!["Status", "Thing"]);
        let thing = &document.schemas().unwrap()["Thing"];
        let properties = thing.properties.as_ref().unwrap();
        assert_eq!(properties["order"].ref_name(), Some("Status"));
        assert_eq!(properties["ticket"].ref_name(), Some("Status"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_unresolved_group_is_reported() {
        let (result, diagnostics) = run(
            &[StageKind::EnumReconciliation],
            &Settings::default(),
            two_status_enums(),
        );

        assert_eq!(schema_names(&result.unwrap()).len(), 3);
        assert_eq!(diagnostics.warnings().len(), 1);
        assert!(diagnostics.warnings()[0]
            .to_string()
            .contains("OrderState, TicketStatus"));
    }

    #[test]
    fn test_override_renames_single_enum() {
        let mut settings = Settings::default();
        settings.enum_name_overrides.insert(
            "Color".to_string(),
            vec![EnumValue::String("red".into()), EnumValue::String("blue".into())],
        );
        let document = document_with(
            &[("Colour", enum_schema(&["red", "blue"]))],
            "Colour",
        );

        let (result, _) = run(&[StageKind::EnumReconciliation], &settings, document);
        let document = result.unwrap();

        assert_eq!(schema_names(&document), vec!["Color"]);
        let operation = document.paths["/things"].get.as_ref().unwrap();
        let content = operation.responses["200"].content.as_ref().unwrap();
        assert_eq!(content["application/json"].schema.ref_name(), Some("Color"));
    }

    #[test]
    fn test_override_name_taken_by_other_component_is_fatal() {
        let mut settings = Settings::default();
        settings.enum_name_overrides.insert(
            "Thing".to_string(),
            vec![EnumValue::String("open".into()), EnumValue::String("closed".into())],
        );

        let (result, _) = run(&[StageKind::EnumReconciliation], &settings, two_status_enums());
        match result {
            Err(Error::Postprocess { stage, component, .. }) => {
                assert_eq!(stage, "enum_reconciliation");
                assert_eq!(component, "Thing");
            }
            other => panic!("expected stage failure, got {:?}", other.map(|d| d.openapi)),
        }
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let mut settings = Settings::default();
        settings.enum_name_overrides.insert(
            "Status".to_string(),
            vec![EnumValue::String("open".into()), EnumValue::String("closed".into())],
        );
        let kinds = [StageKind::EnumReconciliation, StageKind::PruneUnusedComponents];

        let (once, _) = run(&kinds, &settings, two_status_enums());
        let once = once.unwrap();
        let (twice, _) = run(&kinds, &settings, once.clone());

        assert_eq!(twice.unwrap(), once);
    }

    #[test]
    fn test_prune_keeps_reachable_and_appended() {
        let mut settings = Settings::default();
        settings
            .append_components
            .schemas
            .insert("Problem".to_string(), object_with(&[("detail", Schema::default())]));

        let document = document_with(
            &[
                ("Thing", object_with(&[("owner", Schema::reference("Owner"))])),
                ("Owner", object_with(&[("name", Schema::default())])),
                ("Orphan", object_with(&[])),
                ("Problem", object_with(&[("code", Schema::reference("ErrorCode"))])),
                ("ErrorCode", enum_schema(&["E1", "E2"])),
            ],
            "Thing",
        );

        let (result, _) = run(&[StageKind::PruneUnusedComponents], &settings, document);
        assert_eq!(
            schema_names(&result.unwrap()),
            vec!["ErrorCode", "Owner", "Problem", "Thing"]
        );
    }

    #[test]
    fn test_prune_follows_refs_in_other_sections() {
        let mut document = document_with(
            &[("Thing", object_with(&[])), ("Error", object_with(&[]))],
            "Thing",
        );
        document.components.as_mut().unwrap().extensions.insert(
            "responses".to_string(),
            serde_json::json!({
                "NotFound": {
                    "description": "missing",
                    "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Error"}}}
                }
            }),
        );

        let (result, _) = run(&[StageKind::PruneUnusedComponents], &Settings::default(), document);
        assert_eq!(schema_names(&result.unwrap()), vec!["Error", "Thing"]);
    }

    #[test]
    fn test_override_rewrites_refs_in_free_form_values() {
        let mut settings = Settings::default();
        settings.enum_name_overrides.insert(
            "Status".to_string(),
            vec![EnumValue::String("open".into()), EnumValue::String("closed".into())],
        );

        let mut document = two_status_enums();
        let any_state: Schema = serde_json::from_value(serde_json::json!({
            "oneOf": [
                {"$ref": "#/components/schemas/OrderState"},
                {"$ref": "#/components/schemas/TicketStatus"}
            ]
        }))
        .unwrap();
        let components = document.components.as_mut().unwrap();
        components.schemas.insert("AnyState".to_string(), any_state);
        components.extensions.insert(
            "responses".to_string(),
            serde_json::json!({
                "Conflict": {
                    "description": "state changed",
                    "content": {"application/json": {"schema": {"$ref": "#/components/schemas/TicketStatus"}}}
                }
            }),
        );
        let operation = document.paths["/things"].get.as_mut().unwrap();
        operation.extensions.insert(
            "x-states".to_string(),
            serde_json::json!([{"$ref": "#/components/schemas/OrderState"}]),
        );

        let (result, _) = run(&[StageKind::EnumReconciliation], &settings, document);
        let document = result.unwrap();

        assert_eq!(schema_names(&document), vec!["AnyState", "Status", "Thing"]);
        let mut refs = Vec::new();
        collect_json_refs(&serde_json::to_value(&document).unwrap(), &mut refs);
        refs.sort();
        refs.dedup();
        assert_eq!(refs, vec!["Status".to_string(), "Thing".to_string()]);
    }

    #[test]
    fn test_prune_follows_refs_in_operation_free_form_values() {
        let mut document = document_with(
            &[
                ("Thing", object_with(&[])),
                ("Item", object_with(&[("owner", Schema::reference("Owner"))])),
                ("Owner", object_with(&[])),
                ("Audit", object_with(&[])),
                ("Orphan", object_with(&[])),
            ],
            "Thing",
        );
        let operation = document.paths["/things"].get.as_mut().unwrap();
        let content = operation.responses["200"].content.as_mut().unwrap();
        content["application/json"].schema = serde_json::from_value(serde_json::json!({
            "oneOf": [{"$ref": "#/components/schemas/Thing"}, {"$ref": "#/components/schemas/Item"}]
        }))
        .unwrap();
        operation.extensions.insert(
            "callbacks".to_string(),
            serde_json::json!({
                "audited": {"{$request.body#/url}": {"post": {
                    "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Audit"}}}},
                    "responses": {"200": {"description": "ok"}}
                }}}
            }),
        );

        let (result, _) = run(&[StageKind::PruneUnusedComponents], &Settings::default(), document);
        assert_eq!(
            schema_names(&result.unwrap()),
            vec!["Audit", "Item", "Owner", "Thing"]
        );
    }

    #[test]
    fn test_custom_stage_runs_after_builtins() {
        struct Retitle;
        impl PostprocessStage for Retitle {
            fn name(&self) -> &'static str {
                "retitle"
            }
            fn apply(&self, mut document: OpenApiDocument, _: &mut StageContext<'_>) -> Result<OpenApiDocument> {
                document.info.title = format!("{} ({} schemas)", document.info.title, schema_names(&document).len());
                Ok(document)
            }
        }

        let pipeline = Pipeline::from_kinds(&[StageKind::PruneUnusedComponents]).with_stage(Box::new(Retitle));
        assert_eq!(pipeline.len(), 2);

        let settings = Settings::default();
        let mut diagnostics = Diagnostics::new();
        let mut ctx = StageContext {
            settings: &settings,
            public: false,
            diagnostics: &mut diagnostics,
        };
        let document = document_with(&[("Thing", object_with(&[])), ("Orphan", object_with(&[]))], "Thing");
        let document = pipeline.run(document, &mut ctx).unwrap();

        assert_eq!(document.info.title, " (1 schemas)");
    }
}
