use crate::declaration::{
    ContractCatalog, EnumDecl, FieldDecl, ObjectDecl, Primitive, PrimitiveTable, TypeDecl,
};
use crate::diagnostics::{Diagnostics, Warning};
use crate::fragment::{
    EnumFragment, ObjectFragment, PropertyFragment, SchemaFragment, SchemaRef, SlotId, VariantTag,
};
use crate::registry::ComponentRegistry;
use log::debug;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Where a declaration is being resolved
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Role of the enclosing shape; `None` means request and response share one component
    pub variant: Option<VariantTag>,
    /// Human-readable location used in warnings, e.g. `GET /items/{id} response 200`
    pub origin: &'a str,
}

impl<'a> ResolveContext<'a> {
    pub fn new(variant: Option<VariantTag>, origin: &'a str) -> Self {
        Self { variant, origin }
    }
}

type ShapeKey = (String, Option<VariantTag>);

/// Turns declarations into schema references, registering composite shapes.
///
/// Object declarations are registered two-phase: a slot is reserved before the fields
/// are resolved, and a field that leads back to an object still on the resolution stack
/// gets a reference to that reserved slot. Self-referencing contracts therefore resolve
/// to one component that points at itself.
pub struct TypeResolver<'a> {
    catalog: &'a ContractCatalog,
    primitives: &'a PrimitiveTable,
    registry: ComponentRegistry,
    /// Finished catalog objects per variant
    resolved: HashMap<ShapeKey, SlotId>,
    /// Catalog objects on the resolution stack
    in_progress: HashMap<ShapeKey, SlotId>,
    /// Type aliases being followed, to stop `type A = B; type B = A;`
    following: HashSet<String>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(
        catalog: &'a ContractCatalog,
        primitives: &'a PrimitiveTable,
        registry: ComponentRegistry,
    ) -> Self {
        debug!("Initializing TypeResolver with {} contracts", catalog.len());
        Self {
            catalog,
            primitives,
            registry,
            resolved: HashMap::new(),
            in_progress: HashMap::new(),
            following: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> ComponentRegistry {
        self.registry
    }

    /// Resolve one declaration. Never fails: anything unresolvable becomes a
    /// permissive schema plus a warning.
    pub fn resolve(
        &mut self,
        decl: &TypeDecl,
        ctx: ResolveContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> SchemaRef {
        match decl {
            TypeDecl::Primitive(primitive) => SchemaRef::primitive(primitive.clone()),
            TypeDecl::Array(inner) => {
                let item = self.resolve(inner, ctx, diagnostics);
                SchemaRef::inline(SchemaFragment::Array(item))
            }
            TypeDecl::Enum(enumeration) => self.resolve_enum(enumeration, diagnostics),
            TypeDecl::Object(object) => self.resolve_object(object, None, ctx, diagnostics),
            TypeDecl::Named(name) => self.resolve_named(name, ctx, diagnostics),
            TypeDecl::Unsupported(reason) => fallback(ctx, reason.clone(), diagnostics),
        }
    }

    fn resolve_named(
        &mut self,
        name: &str,
        ctx: ResolveContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> SchemaRef {
        if let Some(primitive) = self.primitives.lookup(name) {
            return SchemaRef::primitive(primitive.clone());
        }

        let key = (name.to_string(), ctx.variant);
        if let Some(slot) = self.resolved.get(&key).or_else(|| self.in_progress.get(&key)) {
            debug!("Reusing slot for {}", name);
            return SchemaRef::Component(*slot);
        }

        let catalog = self.catalog;
        let Some(decl) = catalog.get(name) else {
            return fallback(ctx, format!("unknown type `{}`", name), diagnostics);
        };

        match decl {
            TypeDecl::Object(object) => self.resolve_object(object, Some(key), ctx, diagnostics),
            TypeDecl::Enum(enumeration) => self.resolve_enum(enumeration, diagnostics),
            alias => {
                if !self.following.insert(name.to_string()) {
                    return fallback(ctx, format!("type alias `{}` refers to itself", name), diagnostics);
                }
                let resolved = self.resolve(alias, ctx, diagnostics);
                self.following.remove(name);
                resolved
            }
        }
    }

    /// Enums do not depend on the variant; equal enums collapse in the registry
    fn resolve_enum(&mut self, decl: &EnumDecl, diagnostics: &mut Diagnostics) -> SchemaRef {
        let fragment = SchemaFragment::Enum(EnumFragment {
            members: decl.members.clone(),
            description: decl.description.clone(),
        });
        SchemaRef::Component(self.registry.intern(fragment, &decl.name, None, diagnostics))
    }

    fn resolve_object(
        &mut self,
        decl: &ObjectDecl,
        key: Option<ShapeKey>,
        ctx: ResolveContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> SchemaRef {
        let candidate = match ctx.variant {
            Some(VariantTag::Request) => format!("{}Request", decl.name),
            Some(VariantTag::Patch) => format!("{}Patch", decl.name),
            Some(VariantTag::Response) | None => decl.name.clone(),
        };

        let slot = self.registry.reserve(&candidate);
        if let Some(key) = &key {
            self.in_progress.insert(key.clone(), slot);
        }

        let fragment = self.object_fragment(decl, ctx, diagnostics);

        if let Some(key) = &key {
            self.in_progress.remove(key);
        }
        let slot = self
            .registry
            .finalize(slot, SchemaFragment::Object(fragment), ctx.variant, diagnostics);
        if let Some(key) = key {
            self.resolved.insert(key, slot);
        }
        SchemaRef::Component(slot)
    }

    fn object_fragment(
        &mut self,
        decl: &ObjectDecl,
        ctx: ResolveContext<'_>,
        diagnostics: &mut Diagnostics,
    ) -> ObjectFragment {
        let mut fields = Vec::new();
        let mut flattening = HashSet::from([decl.name.clone()]);
        self.expand_fields(&decl.fields, &mut fields, &mut flattening, ctx, diagnostics);

        let mut properties: Vec<PropertyFragment> = Vec::new();
        let mut required = BTreeSet::new();

        for field in fields {
            let visible = match ctx.variant {
                Some(VariantTag::Response) => !field.write_only,
                Some(VariantTag::Request) | Some(VariantTag::Patch) => !field.read_only,
                None => true,
            };
            if !visible {
                continue;
            }
            if properties.iter().any(|p| p.name == field.name) {
                diagnostics.push(Warning::Resolution {
                    context: ctx.origin.to_string(),
                    message: format!(
                        "property `{}` of `{}` is declared twice, keeping the first",
                        field.name, decl.name
                    ),
                });
                continue;
            }

            let is_required = match ctx.variant {
                Some(VariantTag::Patch) => false,
                Some(_) => field.required,
                None => field.required && !field.read_only && !field.write_only,
            };
            if is_required {
                required.insert(field.name.clone());
            }

            let merged = ctx.variant.is_none();
            properties.push(PropertyFragment {
                name: field.name.clone(),
                schema: self.resolve(&field.decl, ctx, diagnostics),
                read_only: merged && field.read_only,
                write_only: merged && field.write_only,
                description: field.description.clone(),
            });
        }

        ObjectFragment {
            properties,
            required,
            description: decl.description.clone(),
        }
    }

    /// Copy fields into `out`, splicing in the fields of flattened objects
    fn expand_fields(
        &self,
        fields: &[FieldDecl],
        out: &mut Vec<FieldDecl>,
        flattening: &mut HashSet<String>,
        ctx: ResolveContext<'_>,
        diagnostics: &mut Diagnostics,
    ) {
        for field in fields {
            if !field.flatten {
                out.push(field.clone());
                continue;
            }

            match self.flattened_object(&field.decl) {
                Some(object) if flattening.insert(object.name.clone()) => {
                    let start = out.len();
                    self.expand_fields(&object.fields, out, flattening, ctx, diagnostics);
                    // An optional flattened block makes all of its fields optional
                    if !field.required {
                        for spliced in &mut out[start..] {
                            spliced.required = false;
                        }
                    }
                    flattening.remove(&object.name);
                }
                Some(object) => diagnostics.push(Warning::Resolution {
                    context: ctx.origin.to_string(),
                    message: format!("`{}` flattens into itself", object.name),
                }),
                None => {
                    diagnostics.push(Warning::Resolution {
                        context: ctx.origin.to_string(),
                        message: format!(
                            "flattened field `{}` is not an object, keeping it as a property",
                            field.name
                        ),
                    });
                    out.push(FieldDecl {
                        flatten: false,
                        ..field.clone()
                    });
                }
            }
        }
    }

    fn flattened_object<'d>(&'d self, decl: &'d TypeDecl) -> Option<&'d ObjectDecl> {
        let mut current = decl;
        // Bounded walk through aliases
        for _ in 0..16 {
            match current {
                TypeDecl::Object(object) => return Some(object),
                TypeDecl::Named(name) if self.primitives.lookup(name).is_none() => {
                    current = self.catalog.get(name)?;
                }
                _ => return None,
            }
        }
        None
    }
}

fn fallback(ctx: ResolveContext<'_>, message: String, diagnostics: &mut Diagnostics) -> SchemaRef {
    diagnostics.push(Warning::Resolution {
        context: ctx.origin.to_string(),
        message,
    });
    SchemaRef::primitive(Primitive::any())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::collect_contracts;
    use crate::declaration::{EnumMember, EnumValue};
    use crate::document::Schema;
    use crate::parser::AstParser;
    use crate::registry::{CollisionOrder, RegistrySnapshot};
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn catalog_from(code: &str) -> ContractCatalog {
        let parsed = AstParser::parse_source(code, Path::new("contracts.rs")).unwrap();
        collect_contracts(&[parsed])
    }

    fn resolve_all(
        catalog: &ContractCatalog,
        requests: &[(&str, Option<VariantTag>)],
    ) -> (Vec<SchemaRef>, RegistrySnapshot, Diagnostics) {
        let primitives = PrimitiveTable::default();
        let mut resolver = TypeResolver::new(
            catalog,
            &primitives,
            ComponentRegistry::new(CollisionOrder::default()),
        );
        let mut diagnostics = Diagnostics::new();
        let refs = requests
            .iter()
            .map(|(name, variant)| {
                resolver.resolve(
                    &TypeDecl::named(*name),
                    ResolveContext::new(*variant, "test"),
                    &mut diagnostics,
                )
            })
            .collect();
        (refs, resolver.into_registry().snapshot(), diagnostics)
    }

    fn property_names(schema: &Schema) -> Vec<String> {
        schema
            .properties
            .as_ref()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    const ITEM: &str = r#"
        pub struct Item {
            #[serde(skip_deserializing)]
            pub id: Uuid,
            pub name: String,
            #[serde(skip_serializing)]
            pub secret: Option<String>,
        }
    "#;

    #[test]
    fn test_primitives_resolve_inline() {
        let catalog = ContractCatalog::new();
        let (refs, snapshot, diagnostics) =
            resolve_all(&catalog, &[("i64", None), ("DateTime", None), ("bool", None)]);

        let rendered: Vec<(Option<String>, Option<String>)> = refs
            .iter()
            .map(|r| {
                let s = snapshot.schema_for(r);
                (s.schema_type, s.format)
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                (Some("integer".into()), Some("int64".into())),
                (Some("string".into()), Some("date-time".into())),
                (Some("boolean".into()), None),
            ]
        );
        assert!(snapshot.schemas().is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_split_variants_filter_fields() {
        let catalog = catalog_from(ITEM);
        let (refs, snapshot, _) = resolve_all(
            &catalog,
            &[
                ("Item", Some(VariantTag::Response)),
                ("Item", Some(VariantTag::Request)),
                ("Item", Some(VariantTag::Patch)),
            ],
        );

        let names: Vec<Option<String>> = refs
            .iter()
            .map(|r| snapshot.schema_for(r).ref_name().map(str::to_string))
            .collect();
        assert_eq!(
            names,
            vec![
                Some("Item".to_string()),
                Some("ItemRequest".to_string()),
                Some("ItemPatch".to_string())
            ]
        );

        let schemas = snapshot.schemas();
        assert_eq!(property_names(&schemas["Item"]), vec!["id", "name"]);
        assert_eq!(
            schemas["Item"].required,
            Some(vec!["id".to_string(), "name".to_string()])
        );
        assert_eq!(property_names(&schemas["ItemRequest"]), vec!["name", "secret"]);
        assert_eq!(schemas["ItemRequest"].required, Some(vec!["name".to_string()]));
        assert_eq!(property_names(&schemas["ItemPatch"]), vec!["name", "secret"]);
        assert_eq!(schemas["ItemPatch"].required, None);
    }

    #[test]
    fn test_merged_variant_flags_visibility() {
        let catalog = catalog_from(ITEM);
        let (_, snapshot, _) = resolve_all(&catalog, &[("Item", None)]);

        let item = &snapshot.schemas()["Item"];
        let properties = item.properties.as_ref().unwrap();
        assert!(properties["id"].read_only);
        assert!(properties["secret"].write_only);
        assert_eq!(item.required, Some(vec!["name".to_string()]));
    }

    #[test]
    fn test_same_contract_resolves_to_one_component() {
        let catalog = catalog_from(ITEM);
        let (refs, snapshot, diagnostics) =
            resolve_all(&catalog, &[("Item", None), ("Item", None)]);

        assert_eq!(refs[0], refs[1]);
        assert_eq!(snapshot.schemas().len(), 1);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_self_reference_resolves_to_single_component() {
        let catalog = catalog_from(
            r#"
            pub struct TreeNode {
                pub label: String,
                pub children: Vec<TreeNode>,
                pub parent: Option<Box<TreeNode>>,
            }
            "#,
        );
        let (refs, snapshot, diagnostics) = resolve_all(&catalog, &[("TreeNode", None)]);

        assert_eq!(snapshot.schemas().len(), 1);
        assert!(diagnostics.is_empty());

        let node = &snapshot.schemas()["TreeNode"];
        let properties = node.properties.as_ref().unwrap();
        assert_eq!(
            properties["children"].items.as_ref().unwrap().ref_name(),
            Some("TreeNode")
        );
        assert_eq!(properties["parent"].ref_name(), Some("TreeNode"));
        assert_eq!(snapshot.schema_for(&refs[0]).ref_name(), Some("TreeNode"));
    }

    #[test]
    fn test_mutual_recursion() {
        let catalog = catalog_from(
            r#"
            pub struct Author { pub name: String, pub books: Vec<Book> }
            pub struct Book { pub title: String, pub author: Author }
            "#,
        );
        let (_, snapshot, _) = resolve_all(&catalog, &[("Author", None)]);

        let schemas = snapshot.schemas();
        assert_eq!(schemas.len(), 2);
        assert_eq!(
            schemas["Book"].properties.as_ref().unwrap()["author"].ref_name(),
            Some("Author")
        );
    }

    #[test]
    fn test_enums_are_promoted_and_variant_independent() {
        let catalog = catalog_from(
            r#"
            #[serde(rename_all = "lowercase")]
            pub enum Status { Open, Closed }
            pub struct Ticket { pub status: Status }
            "#,
        );
        let (_, snapshot, _) = resolve_all(
            &catalog,
            &[
                ("Ticket", Some(VariantTag::Response)),
                ("Ticket", Some(VariantTag::Request)),
            ],
        );

        let schemas = snapshot.schemas();
        let names: Vec<&String> = schemas.keys().collect();
        assert_eq!(names, vec!["Status", "Ticket", "TicketRequest"]);
        assert_eq!(
            schemas["Status"].enum_values,
            Some(vec![serde_json::json!("open"), serde_json::json!("closed")])
        );
        assert_eq!(
            schemas["Status"].enum_names,
            Some(vec!["Open".to_string(), "Closed".to_string()])
        );
    }

    #[test]
    fn test_unknown_type_falls_back_with_warning() {
        let catalog = catalog_from("pub struct Wrapper { pub inner: Mystery }");
        let (_, snapshot, diagnostics) = resolve_all(&catalog, &[("Wrapper", None)]);

        let inner = &snapshot.schemas()["Wrapper"].properties.as_ref().unwrap()["inner"];
        assert_eq!(inner, &Schema::default());
        assert_eq!(diagnostics.warnings().len(), 1);
        assert!(diagnostics.warnings()[0].to_string().contains("unknown type `Mystery`"));
    }

    #[test]
    fn test_unsupported_declaration_falls_back() {
        let catalog = catalog_from("pub enum Shape { Circle(f64) }");
        let (refs, snapshot, diagnostics) = resolve_all(&catalog, &[("Shape", None)]);

        assert_eq!(snapshot.schema_for(&refs[0]), Schema::default());
        assert!(matches!(
            diagnostics.warnings()[0],
            Warning::Resolution { .. }
        ));
    }

    #[test]
    fn test_alias_cycle_is_reported() {
        let catalog = catalog_from("pub type A = B; pub type B = A;");
        let (_, _, diagnostics) = resolve_all(&catalog, &[("A", None)]);

        assert!(diagnostics.warnings()[0].to_string().contains("refers to itself"));
    }

    #[test]
    fn test_flatten_splices_properties() {
        let catalog = catalog_from(
            r#"
            pub struct Audit { pub created_by: String, pub note: Option<String> }
            pub struct Order {
                pub number: u32,
                #[serde(flatten)]
                pub audit: Audit,
            }
            "#,
        );
        let (_, snapshot, _) = resolve_all(&catalog, &[("Order", None)]);

        let order = &snapshot.schemas()["Order"];
        assert_eq!(property_names(order), vec!["number", "created_by", "note"]);
        assert_eq!(
            order.required,
            Some(vec!["number".to_string(), "created_by".to_string()])
        );
        assert!(!snapshot.schemas().contains_key("Audit"));
    }

    #[test]
    fn test_integer_enum_declared_programmatically() {
        let catalog = ContractCatalog::new();
        let primitives = PrimitiveTable::default();
        let mut resolver = TypeResolver::new(&catalog, &primitives, ComponentRegistry::default());
        let mut diagnostics = Diagnostics::new();

        let priority = TypeDecl::Enum(EnumDecl {
            name: "Priority".into(),
            members: vec![
                EnumMember { value: EnumValue::Integer(1), name: "1".into() },
                EnumMember { value: EnumValue::Integer(2), name: "2".into() },
            ],
            description: None,
        });
        let schema_ref = resolver.resolve(&priority, ResolveContext::new(None, "test"), &mut diagnostics);
        let snapshot = resolver.into_registry().snapshot();

        assert_eq!(snapshot.schema_for(&schema_ref).ref_name(), Some("Priority"));
        let schema = &snapshot.schemas()["Priority"];
        assert_eq!(schema.schema_type.as_deref(), Some("integer"));
        assert_eq!(schema.enum_names, None);
    }
}
