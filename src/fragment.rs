//! Resolved shapes: the normalized schema-object graph the engine works on.
//!
//! Fragments are value objects compared structurally. Composite shapes never own each
//! other; they point at registry slots through [`SchemaRef::Component`], which keeps
//! cyclic contracts representable without ownership cycles.

use crate::declaration::{EnumMember, Primitive};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Index of an entry in the [`crate::registry::ComponentRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) usize);

/// Role a shape plays, used to keep create/patch/response variants of one type apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantTag {
    Request,
    Response,
    Patch,
}

impl VariantTag {
    pub fn suffix(&self) -> &'static str {
        match self {
            VariantTag::Request => "Request",
            VariantTag::Response => "Response",
            VariantTag::Patch => "Patch",
        }
    }
}

/// Either an inline shape or a pointer to a registry slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaRef {
    Inline(Box<SchemaFragment>),
    Component(SlotId),
}

impl SchemaRef {
    pub fn inline(fragment: SchemaFragment) -> Self {
        SchemaRef::Inline(Box::new(fragment))
    }

    pub fn primitive(primitive: Primitive) -> Self {
        Self::inline(SchemaFragment::Primitive(primitive))
    }

    pub fn component(&self) -> Option<SlotId> {
        match self {
            SchemaRef::Component(slot) => Some(*slot),
            SchemaRef::Inline(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumFragment {
    pub members: Vec<EnumMember>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyFragment {
    pub name: String,
    pub schema: SchemaRef,
    pub read_only: bool,
    pub write_only: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFragment {
    /// Declaration order is kept for output
    pub properties: Vec<PropertyFragment>,
    pub required: BTreeSet<String>,
    pub description: Option<String>,
}

impl ObjectFragment {
    pub fn property(&self, name: &str) -> Option<&PropertyFragment> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// A resolved, self-contained shape description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaFragment {
    Primitive(Primitive),
    Enum(EnumFragment),
    Array(SchemaRef),
    Object(ObjectFragment),
}

impl SchemaFragment {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SchemaFragment::Primitive(_) => "primitive",
            SchemaFragment::Enum(_) => "enum",
            SchemaFragment::Array(_) => "array",
            SchemaFragment::Object(_) => "object",
        }
    }

    /// Rewrite every slot this fragment points at
    pub(crate) fn map_slots(&mut self, f: &dyn Fn(SlotId) -> SlotId) {
        match self {
            SchemaFragment::Primitive(_) | SchemaFragment::Enum(_) => {}
            SchemaFragment::Array(item) => item.map_slots(f),
            SchemaFragment::Object(object) => {
                for property in &mut object.properties {
                    property.schema.map_slots(f);
                }
            }
        }
    }
}

impl SchemaRef {
    pub(crate) fn map_slots(&mut self, f: &dyn Fn(SlotId) -> SlotId) {
        match self {
            SchemaRef::Component(slot) => *slot = f(*slot),
            SchemaRef::Inline(fragment) => fragment.map_slots(f),
        }
    }
}
