//! Component registry: the deduplicating name → fragment table.
//!
//! Entries live in a flat arena addressed by [`SlotId`]. Registration is two-phase:
//! [`ComponentRegistry::reserve`] hands out a slot before the shape is known, so a
//! cyclic contract can point at itself, and [`ComponentRegistry::finalize`] stores the
//! resolved fragment and allocates the public name.
//!
//! Names are claimed only at finalize time. A finalized slot whose fragment and variant
//! equal an entry already holding one of its candidate names becomes an alias of that
//! entry, which is how two operations using the same contract end up sharing one
//! component.

use crate::diagnostics::{Diagnostics, Warning};
use crate::document::Schema;
use crate::fragment::{ObjectFragment, SchemaFragment, SchemaRef, SlotId, VariantTag};
use crate::declaration::EnumValue;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Order in which alternative names are tried when a candidate is taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionOrder {
    /// `Item` → `ItemPatch` → `Item2` → `Item3` ...
    #[default]
    VariantThenNumeric,
    /// `Item` → `Item2` → `Item3` ...
    NumericOnly,
}

#[derive(Debug)]
enum SlotState {
    Reserved,
    Finalized {
        name: String,
        fragment: SchemaFragment,
    },
    /// Deduplicated into another slot
    Alias(SlotId),
}

#[derive(Debug)]
struct Entry {
    candidate: String,
    variant: Option<VariantTag>,
    state: SlotState,
}

/// Registry for one generation run
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    entries: Vec<Entry>,
    by_name: HashMap<String, SlotId>,
    order: CollisionOrder,
}

impl ComponentRegistry {
    pub fn new(order: CollisionOrder) -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
            order,
        }
    }

    /// Phase 1: allocate a slot for a shape that is still being resolved
    pub fn reserve(&mut self, candidate: &str) -> SlotId {
        let slot = SlotId(self.entries.len());
        self.entries.push(Entry {
            candidate: candidate.to_string(),
            variant: None,
            state: SlotState::Reserved,
        });
        debug!("Reserved slot {} for `{}`", slot.0, candidate);
        slot
    }

    /// Phase 2: store the resolved fragment and allocate a name.
    ///
    /// Returns the slot that now represents the shape. That is `slot` itself unless an
    /// equal fragment with the same variant already holds one of the candidate names,
    /// in which case `slot` becomes an alias and the existing slot is returned.
    pub fn finalize(
        &mut self,
        slot: SlotId,
        mut fragment: SchemaFragment,
        variant: Option<VariantTag>,
        diagnostics: &mut Diagnostics,
    ) -> SlotId {
        fragment.map_slots(&|child| self.canonical(child));
        let candidate = self.entries[slot.0].candidate.clone();

        let mut attempt = 0;
        loop {
            let name = self.name_attempt(&candidate, variant, attempt);
            attempt += 1;

            match self.by_name.get(&name).copied() {
                Some(existing) => {
                    if self.is_equal(existing, &candidate, &fragment, variant) {
                        debug!("Slot {} deduplicated into `{}`", slot.0, name);
                        self.entries[slot.0].state = SlotState::Alias(existing);
                        return existing;
                    }
                }
                None => {
                    if name != candidate {
                        diagnostics.push(Warning::NamingConflict {
                            candidate: candidate.clone(),
                            assigned: name.clone(),
                        });
                    }
                    self.by_name.insert(name.clone(), slot);
                    let entry = &mut self.entries[slot.0];
                    entry.variant = variant;
                    entry.state = SlotState::Finalized { name, fragment };
                    return slot;
                }
            }
        }
    }

    /// Reserve and finalize in one step, for shapes that cannot be cyclic
    pub fn intern(
        &mut self,
        fragment: SchemaFragment,
        candidate: &str,
        variant: Option<VariantTag>,
        diagnostics: &mut Diagnostics,
    ) -> SlotId {
        let slot = self.reserve(candidate);
        self.finalize(slot, fragment, variant, diagnostics)
    }

    /// Follow aliases to the slot that owns the name
    pub fn canonical(&self, mut slot: SlotId) -> SlotId {
        while let Some(Entry {
            state: SlotState::Alias(target),
            ..
        }) = self.entries.get(slot.0)
        {
            slot = *target;
        }
        slot
    }

    pub fn name(&self, slot: SlotId) -> Option<&str> {
        match &self.entries.get(self.canonical(slot).0)?.state {
            SlotState::Finalized { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn fragment(&self, slot: SlotId) -> Option<&SchemaFragment> {
        match &self.entries.get(self.canonical(slot).0)?.state {
            SlotState::Finalized { fragment, .. } => Some(fragment),
            _ => None,
        }
    }

    /// Number of named components
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Same shape from the same type; a type literally named like another one's
    /// suffixed name never merges with it
    fn is_equal(
        &self,
        existing: SlotId,
        candidate: &str,
        fragment: &SchemaFragment,
        variant: Option<VariantTag>,
    ) -> bool {
        let entry = &self.entries[existing.0];
        match &entry.state {
            SlotState::Finalized { fragment: other, .. } => {
                entry.candidate == candidate && entry.variant == variant && other == fragment
            }
            _ => false,
        }
    }

    /// The `attempt`-th name tried for `candidate`
    fn name_attempt(&self, candidate: &str, variant: Option<VariantTag>, attempt: usize) -> String {
        let tagged = match (self.order, variant) {
            (CollisionOrder::VariantThenNumeric, Some(tag)) if !candidate.ends_with(tag.suffix()) => {
                Some(tag.suffix())
            }
            _ => None,
        };
        match (attempt, tagged) {
            (0, _) => candidate.to_string(),
            (1, Some(suffix)) => format!("{}{}", candidate, suffix),
            (n, Some(_)) => format!("{}{}", candidate, n),
            (n, None) => format!("{}{}", candidate, n + 1),
        }
    }

    /// Freeze the registry into the schemas of the components section
    pub fn snapshot(&self) -> RegistrySnapshot {
        let names = (0..self.entries.len())
            .map(|i| self.name(SlotId(i)).map(str::to_string))
            .collect();
        let mut snapshot = RegistrySnapshot {
            names,
            schemas: BTreeMap::new(),
        };

        let rendered: Vec<(String, Schema)> = self
            .entries
            .iter()
            .filter_map(|entry| match &entry.state {
                SlotState::Finalized { name, fragment } => {
                    Some((name.clone(), snapshot.render(fragment)))
                }
                _ => None,
            })
            .collect();
        snapshot.schemas.extend(rendered);
        snapshot
    }
}

/// Read-only view of the registry handed to the document assembler
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    names: Vec<Option<String>>,
    schemas: BTreeMap<String, Schema>,
}

impl RegistrySnapshot {
    /// Component schemas, sorted by name
    pub fn schemas(&self) -> &BTreeMap<String, Schema> {
        &self.schemas
    }

    pub fn into_schemas(self) -> BTreeMap<String, Schema> {
        self.schemas
    }

    /// Render a reference: components become `$ref`, inline shapes are expanded
    pub fn schema_for(&self, schema_ref: &SchemaRef) -> Schema {
        match schema_ref {
            SchemaRef::Component(slot) => match self.names.get(slot.0).and_then(Option::as_ref) {
                Some(name) => Schema::reference(name),
                None => Schema::default(),
            },
            SchemaRef::Inline(fragment) => self.render(fragment),
        }
    }

    fn render(&self, fragment: &SchemaFragment) -> Schema {
        match fragment {
            SchemaFragment::Primitive(primitive) => Schema {
                schema_type: primitive.kind.type_name().map(str::to_string),
                format: primitive.format.clone(),
                ..Schema::default()
            },
            SchemaFragment::Enum(enumeration) => {
                let values: Vec<&EnumValue> = enumeration.members.iter().map(|m| &m.value).collect();
                let schema_type = if values.iter().all(|v| matches!(v, EnumValue::String(_))) {
                    Some("string")
                } else if values.iter().all(|v| matches!(v, EnumValue::Integer(_))) {
                    Some("integer")
                } else {
                    None
                };
                let renamed = enumeration
                    .members
                    .iter()
                    .any(|m| m.name != m.value.label());

                Schema {
                    schema_type: schema_type.map(str::to_string),
                    description: enumeration.description.clone(),
                    enum_values: Some(values.into_iter().map(serde_json::Value::from).collect()),
                    enum_names: renamed
                        .then(|| enumeration.members.iter().map(|m| m.name.clone()).collect()),
                    ..Schema::default()
                }
            }
            SchemaFragment::Array(item) => Schema {
                schema_type: Some("array".to_string()),
                items: Some(Box::new(self.schema_for(item))),
                ..Schema::default()
            },
            SchemaFragment::Object(object) => self.render_object(object),
        }
    }

    fn render_object(&self, object: &ObjectFragment) -> Schema {
        let properties: IndexMap<String, Schema> = object
            .properties
            .iter()
            .map(|property| {
                let base = self.schema_for(&property.schema);
                let decorated = property.read_only || property.write_only || property.description.is_some();
                let schema = if base.reference.is_some() && decorated {
                    Schema {
                        all_of: Some(vec![base]),
                        read_only: property.read_only,
                        write_only: property.write_only,
                        description: property.description.clone(),
                        ..Schema::default()
                    }
                } else {
                    Schema {
                        read_only: property.read_only,
                        write_only: property.write_only,
                        description: property.description.clone().or(base.description.clone()),
                        ..base
                    }
                };
                (property.name.clone(), schema)
            })
            .collect();

        let required: Vec<String> = object
            .properties
            .iter()
            .filter(|p| object.required.contains(&p.name))
            .map(|p| p.name.clone())
            .collect();

        Schema {
            schema_type: Some("object".to_string()),
            description: object.description.clone(),
            properties: Some(properties),
            required: (!required.is_empty()).then_some(required),
            ..Schema::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{EnumMember, Primitive, PrimitiveKind};
    use crate::fragment::{EnumFragment, PropertyFragment};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn string() -> SchemaRef {
        SchemaRef::primitive(Primitive::new(PrimitiveKind::String))
    }

    fn object(props: &[(&str, SchemaRef, bool)]) -> SchemaFragment {
        SchemaFragment::Object(ObjectFragment {
            properties: props
                .iter()
                .map(|(name, schema, _)| PropertyFragment {
                    name: name.to_string(),
                    schema: schema.clone(),
                    read_only: false,
                    write_only: false,
                    description: None,
                })
                .collect(),
            required: props
                .iter()
                .filter(|(_, _, required)| *required)
                .map(|(name, _, _)| name.to_string())
                .collect::<BTreeSet<_>>(),
            description: None,
        })
    }

    #[test]
    fn test_equal_fragments_share_one_component() {
        let mut registry = ComponentRegistry::default();
        let mut diagnostics = Diagnostics::new();

        let first = registry.intern(object(&[("name", string(), true)]), "Item", None, &mut diagnostics);
        let second = registry.intern(object(&[("name", string(), true)]), "Item", None, &mut diagnostics);

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_same_fragment_different_variant_is_split() {
        let mut registry = ComponentRegistry::default();
        let mut diagnostics = Diagnostics::new();

        let response = registry.intern(
            object(&[("name", string(), true)]),
            "Item",
            Some(VariantTag::Response),
            &mut diagnostics,
        );
        let patch = registry.intern(
            object(&[("name", string(), true)]),
            "Item",
            Some(VariantTag::Patch),
            &mut diagnostics,
        );

        assert_ne!(response, patch);
        assert_eq!(registry.name(response), Some("Item"));
        assert_eq!(registry.name(patch), Some("ItemPatch"));
        assert_eq!(diagnostics.warnings().len(), 1);
    }

    #[test]
    fn test_collision_falls_back_to_numeric_suffix() {
        let mut registry = ComponentRegistry::default();
        let mut diagnostics = Diagnostics::new();

        let a = registry.intern(object(&[("a", string(), true)]), "Item", Some(VariantTag::Request), &mut diagnostics);
        let b = registry.intern(object(&[("b", string(), true)]), "Item", Some(VariantTag::Request), &mut diagnostics);
        let c = registry.intern(object(&[("c", string(), true)]), "Item", Some(VariantTag::Request), &mut diagnostics);

        assert_eq!(registry.name(a), Some("Item"));
        assert_eq!(registry.name(b), Some("ItemRequest"));
        assert_eq!(registry.name(c), Some("Item2"));

        let assigned: Vec<String> = diagnostics
            .warnings()
            .iter()
            .map(|w| w.to_string())
            .collect();
        assert_eq!(
            assigned,
            vec![
                "name `Item` is taken, using `ItemRequest`",
                "name `Item` is taken, using `Item2`"
            ]
        );
    }

    #[test]
    fn test_suffixed_name_is_not_shared_with_other_type() {
        let mut registry = ComponentRegistry::default();
        let mut diagnostics = Diagnostics::new();

        registry.intern(object(&[("a", string(), true)]), "Item", None, &mut diagnostics);
        let renamed = registry.intern(object(&[("b", string(), true)]), "Item", None, &mut diagnostics);
        let literal = registry.intern(object(&[("b", string(), true)]), "Item2", None, &mut diagnostics);
        let again = registry.intern(object(&[("b", string(), true)]), "Item", None, &mut diagnostics);

        assert_eq!(registry.name(renamed), Some("Item2"));
        assert_ne!(literal, renamed);
        assert_eq!(registry.name(literal), Some("Item22"));
        assert_eq!(again, renamed);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_numeric_only_order() {
        let mut registry = ComponentRegistry::new(CollisionOrder::NumericOnly);
        let mut diagnostics = Diagnostics::new();

        registry.intern(object(&[("a", string(), true)]), "Item", Some(VariantTag::Patch), &mut diagnostics);
        let b = registry.intern(object(&[("b", string(), true)]), "Item", Some(VariantTag::Patch), &mut diagnostics);

        assert_eq!(registry.name(b), Some("Item2"));
    }

    #[test]
    fn test_variant_suffix_not_doubled() {
        let mut registry = ComponentRegistry::default();
        let mut diagnostics = Diagnostics::new();

        registry.intern(object(&[("a", string(), true)]), "ItemRequest", Some(VariantTag::Request), &mut diagnostics);
        let b = registry.intern(object(&[("b", string(), true)]), "ItemRequest", Some(VariantTag::Request), &mut diagnostics);

        assert_eq!(registry.name(b), Some("ItemRequest2"));
    }

    #[test]
    fn test_reserved_slot_supports_self_reference() {
        let mut registry = ComponentRegistry::default();
        let mut diagnostics = Diagnostics::new();

        let slot = registry.reserve("TreeNode");
        let children = SchemaRef::inline(SchemaFragment::Array(SchemaRef::Component(slot)));
        let node = registry.finalize(
            slot,
            object(&[("label", string(), true), ("children", children, true)]),
            None,
            &mut diagnostics,
        );

        assert_eq!(node, slot);
        let snapshot = registry.snapshot();
        let tree = &snapshot.schemas()["TreeNode"];
        let items = tree.properties.as_ref().unwrap()["children"].items.as_ref().unwrap();
        assert_eq!(items.ref_name(), Some("TreeNode"));
        assert_eq!(tree.required, Some(vec!["label".to_string(), "children".to_string()]));
    }

    #[test]
    fn test_alias_children_are_canonicalized() {
        let mut registry = ComponentRegistry::default();
        let mut diagnostics = Diagnostics::new();

        let tag = registry.intern(object(&[("label", string(), true)]), "Tag", None, &mut diagnostics);
        let duplicate = registry.intern(object(&[("label", string(), true)]), "Tag", None, &mut diagnostics);
        assert_eq!(tag, duplicate);

        let holder = registry.reserve("Post");
        let alias_slot = SlotId(1);
        assert_eq!(registry.canonical(alias_slot), tag);
        let post = registry.finalize(
            holder,
            object(&[("tag", SchemaRef::Component(alias_slot), true)]),
            None,
            &mut diagnostics,
        );
        let SchemaFragment::Object(fragment) = registry.fragment(post).unwrap() else {
            panic!("expected object");
        };
        assert_eq!(fragment.properties[0].schema, SchemaRef::Component(tag));
    }

    #[test]
    fn test_snapshot_renders_enum_and_decorated_refs() {
        let mut registry = ComponentRegistry::default();
        let mut diagnostics = Diagnostics::new();

        let status = registry.intern(
            SchemaFragment::Enum(EnumFragment {
                members: vec![
                    EnumMember { value: EnumValue::String("open".into()), name: "Open".into() },
                    EnumMember { value: EnumValue::String("closed".into()), name: "Closed".into() },
                ],
                description: None,
            }),
            "Status",
            None,
            &mut diagnostics,
        );
        let ticket = registry.intern(
            SchemaFragment::Object(ObjectFragment {
                properties: vec![PropertyFragment {
                    name: "status".into(),
                    schema: SchemaRef::Component(status),
                    read_only: true,
                    write_only: false,
                    description: None,
                }],
                required: BTreeSet::new(),
                description: Some("A ticket".into()),
            }),
            "Ticket",
            None,
            &mut diagnostics,
        );

        let snapshot = registry.snapshot();
        let value = serde_json::to_value(snapshot.schemas()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "Status": {
                    "type": "string",
                    "enum": ["open", "closed"],
                    "x-enum-varnames": ["Open", "Closed"]
                },
                "Ticket": {
                    "type": "object",
                    "description": "A ticket",
                    "properties": {
                        "status": {
                            "allOf": [{"$ref": "#/components/schemas/Status"}],
                            "readOnly": true
                        }
                    }
                }
            })
        );
        assert_eq!(
            snapshot.schema_for(&SchemaRef::Component(ticket)).ref_name(),
            Some("Ticket")
        );
    }
}
