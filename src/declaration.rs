//! Typed contract declarations: the input side of the Type Resolver.
//!
//! A declaration describes a contract the way the application declares it (a struct,
//! a unit enum, a list of something, a named reference to another contract). The
//! resolver turns declarations into [`crate::fragment::SchemaFragment`]s.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema-level kind of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    String,
    Integer,
    Number,
    Boolean,
    /// Free-form object (maps)
    Object,
    /// No constraint at all
    Any,
}

impl PrimitiveKind {
    /// The `type` keyword emitted for this kind, if any
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            PrimitiveKind::String => Some("string"),
            PrimitiveKind::Integer => Some("integer"),
            PrimitiveKind::Number => Some("number"),
            PrimitiveKind::Boolean => Some("boolean"),
            PrimitiveKind::Object => Some("object"),
            PrimitiveKind::Any => None,
        }
    }
}

/// A `(kind, format)` pair such as `integer/int64` or `string/date-time`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Primitive {
    #[serde(rename = "type")]
    pub kind: PrimitiveKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Primitive {
    pub fn new(kind: PrimitiveKind) -> Self {
        Self { kind, format: None }
    }

    pub fn with_format(kind: PrimitiveKind, format: &str) -> Self {
        Self {
            kind,
            format: Some(format.to_string()),
        }
    }

    /// The permissive schema used for anything that cannot be resolved
    pub fn any() -> Self {
        Self::new(PrimitiveKind::Any)
    }
}

/// One serialized enum member value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumValue {
    Integer(i64),
    String(String),
}

impl From<&EnumValue> for serde_json::Value {
    fn from(value: &EnumValue) -> Self {
        match value {
            EnumValue::Integer(n) => serde_json::Value::from(*n),
            EnumValue::String(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl EnumValue {
    /// Textual form, used to compare a value against its member name
    pub fn label(&self) -> String {
        match self {
            EnumValue::Integer(n) => n.to_string(),
            EnumValue::String(s) => s.clone(),
        }
    }
}

/// An enum member: the serialized value plus the declared name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub value: EnumValue,
    pub name: String,
}

/// Enumerated choice set, member order preserved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<EnumMember>,
    pub description: Option<String>,
}

impl EnumDecl {
    /// Enum whose member names equal their string values
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            members: values
                .iter()
                .map(|v| EnumMember {
                    value: EnumValue::String(v.to_string()),
                    name: v.to_string(),
                })
                .collect(),
            description: None,
        }
    }
}

/// A property of an object-like contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Serialized property name
    pub name: String,
    pub decl: TypeDecl,
    /// Declared mandatory
    pub required: bool,
    /// Present in responses only
    pub read_only: bool,
    /// Present in requests only
    pub write_only: bool,
    /// Splice the target object's properties into the parent
    pub flatten: bool,
    pub description: Option<String>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, decl: TypeDecl) -> Self {
        Self {
            name: name.into(),
            decl,
            required: true,
            read_only: false,
            write_only: false,
            flatten: false,
            description: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }
}

/// Object-like contract with named properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub description: Option<String>,
}

impl ObjectDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            description: None,
        }
    }

    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }
}

/// A typed field or contract declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDecl {
    Primitive(Primitive),
    Enum(EnumDecl),
    Array(Box<TypeDecl>),
    Object(ObjectDecl),
    /// Reference by name, looked up in the primitive table and then the catalog
    Named(String),
    /// Something the declaration source could not express; carries the reason
    Unsupported(String),
}

impl TypeDecl {
    pub fn named(name: impl Into<String>) -> Self {
        TypeDecl::Named(name.into())
    }

    pub fn array(inner: TypeDecl) -> Self {
        TypeDecl::Array(Box::new(inner))
    }
}

/// Native type name -> primitive lookup. Extensible through configuration.
#[derive(Debug, Clone)]
pub struct PrimitiveTable {
    entries: HashMap<String, Primitive>,
}

impl Default for PrimitiveTable {
    fn default() -> Self {
        use PrimitiveKind as K;

        let builtins: &[(&[&str], PrimitiveKind, Option<&str>)] = &[
            (&["String", "str", "char"], K::String, None),
            (&["i8", "i16", "i32", "u8", "u16", "u32"], K::Integer, Some("int32")),
            (&["i64", "u64", "i128", "u128", "isize", "usize"], K::Integer, Some("int64")),
            (&["f32"], K::Number, Some("float")),
            (&["f64"], K::Number, Some("double")),
            (&["bool"], K::Boolean, None),
            (&["Uuid"], K::String, Some("uuid")),
            (
                &["DateTime", "NaiveDateTime", "OffsetDateTime", "SystemTime"],
                K::String,
                Some("date-time"),
            ),
            (&["NaiveDate", "Date"], K::String, Some("date")),
            (&["NaiveTime", "Time"], K::String, Some("time")),
            (&["Duration"], K::String, Some("duration")),
            (&["Url"], K::String, Some("uri")),
            (&["Ipv4Addr"], K::String, Some("ipv4")),
            (&["Ipv6Addr"], K::String, Some("ipv6")),
            (&["IpAddr"], K::String, None),
            (&["Decimal"], K::String, Some("decimal")),
            (&["Bytes"], K::String, Some("binary")),
            (&["HashMap", "BTreeMap", "IndexMap"], K::Object, None),
            (&["Value"], K::Any, None),
        ];

        let mut entries = HashMap::new();
        for (names, kind, format) in builtins {
            for name in *names {
                let primitive = match format {
                    Some(format) => Primitive::with_format(*kind, format),
                    None => Primitive::new(*kind),
                };
                entries.insert(name.to_string(), primitive);
            }
        }
        Self { entries }
    }
}

impl PrimitiveTable {
    pub fn lookup(&self, name: &str) -> Option<&Primitive> {
        self.entries.get(name)
    }

    /// Add or replace an entry
    pub fn register(&mut self, name: impl Into<String>, primitive: Primitive) {
        self.entries.insert(name.into(), primitive);
    }
}

/// Named contract declarations available to `TypeDecl::Named` lookups
#[derive(Debug, Clone, Default)]
pub struct ContractCatalog {
    definitions: HashMap<String, TypeDecl>,
}

impl ContractCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Returns false (and keeps the first) if the name is taken.
    pub fn insert(&mut self, name: impl Into<String>, decl: TypeDecl) -> bool {
        let name = name.into();
        if self.definitions.contains_key(&name) {
            return false;
        }
        self.definitions.insert(name, decl);
        true
    }

    pub fn get(&self, name: &str) -> Option<&TypeDecl> {
        self.definitions.get(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
