//! Contract declarations read from Rust source.
//!
//! Structs, unit enums, newtypes and type aliases are turned into [`TypeDecl`]s and
//! registered in a [`ContractCatalog`] under their Rust identifier. Serde attributes
//! decide property names, optionality and read/write visibility.

use crate::declaration::{
    ContractCatalog, EnumDecl, EnumMember, EnumValue, FieldDecl, ObjectDecl, TypeDecl,
};
use crate::parser::{AstParser, ParsedFile};
use crate::scanner::FileScanner;
use anyhow::Result;
use heck::{
    ToKebabCase, ToLowerCamelCase, ToShoutyKebabCase, ToShoutySnakeCase, ToSnakeCase,
    ToUpperCamelCase,
};
use log::{debug, info, warn};
use std::path::Path;
use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;

/// Wrappers that serialize exactly like their contents
const TRANSPARENT_WRAPPERS: &[&str] = &["Box", "Arc", "Rc", "Cow", "Cell", "RefCell", "Mutex", "RwLock"];

/// Collections that serialize as JSON arrays
const SEQUENCE_TYPES: &[&str] = &["Vec", "VecDeque", "LinkedList", "HashSet", "BTreeSet", "IndexSet"];

/// Scan a directory tree and collect every contract it declares
pub fn load_contracts(root: &Path) -> Result<ContractCatalog> {
    let scan = FileScanner::new(root.to_path_buf()).scan()?;
    let parsed: Vec<ParsedFile> = AstParser::parse_files(&scan.rust_files)
        .into_iter()
        .filter_map(Result::ok)
        .collect();

    let catalog = collect_contracts(&parsed);
    info!(
        "Collected {} contracts from {} files",
        catalog.len(),
        parsed.len()
    );
    Ok(catalog)
}

/// Build a catalog from already-parsed files. The first definition of a name wins.
pub fn collect_contracts(files: &[ParsedFile]) -> ContractCatalog {
    let mut catalog = ContractCatalog::new();
    for file in files {
        debug!("Collecting contracts from {}", file.path.display());
        collect_items(&file.syntax_tree.items, &mut catalog);
    }
    catalog
}

fn collect_items(items: &[syn::Item], catalog: &mut ContractCatalog) {
    for item in items {
        let (ident, decl) = match item {
            syn::Item::Struct(item) => (item.ident.to_string(), struct_decl(item)),
            syn::Item::Enum(item) => (item.ident.to_string(), enum_decl(item)),
            syn::Item::Type(item) => (item.ident.to_string(), type_decl(&item.ty)),
            syn::Item::Mod(item) => {
                if let Some((_, nested)) = &item.content {
                    collect_items(nested, catalog);
                }
                continue;
            }
            _ => continue,
        };

        if !catalog.insert(ident.clone(), decl) {
            warn!("Contract `{}` is declared more than once, keeping the first", ident);
        }
    }
}

/// Convert a type expression (as written in a route manifest) into a declaration.
///
/// Unparsable expressions become [`TypeDecl::Unsupported`] so the resolver can fall
/// back and report them instead of failing the whole manifest.
pub fn parse_type_expression(expr: &str) -> TypeDecl {
    match AstParser::parse_type(expr) {
        Ok(ty) => type_decl(&ty),
        Err(e) => TypeDecl::Unsupported(format!("{:#}", e)),
    }
}

/// Convert a `syn` type into a declaration. `Option<T>` converts to `T`.
pub fn type_decl(ty: &syn::Type) -> TypeDecl {
    match ty {
        syn::Type::Path(type_path) if type_path.qself.is_none() => path_decl(&type_path.path),
        syn::Type::Reference(reference) => type_decl(&reference.elem),
        syn::Type::Paren(paren) => type_decl(&paren.elem),
        syn::Type::Group(group) => type_decl(&group.elem),
        syn::Type::Slice(slice) => TypeDecl::array(type_decl(&slice.elem)),
        syn::Type::Array(array) => TypeDecl::array(type_decl(&array.elem)),
        syn::Type::Tuple(tuple) if tuple.elems.is_empty() => {
            TypeDecl::Unsupported("unit type has no schema".to_string())
        }
        syn::Type::Tuple(_) => TypeDecl::Unsupported("tuple types are not supported".to_string()),
        syn::Type::TraitObject(_) | syn::Type::ImplTrait(_) => {
            TypeDecl::Unsupported("trait types are not supported".to_string())
        }
        _ => TypeDecl::Unsupported("unrecognized type form".to_string()),
    }
}

fn path_decl(path: &syn::Path) -> TypeDecl {
    let Some(segment) = path.segments.last() else {
        return TypeDecl::Unsupported("empty type path".to_string());
    };
    let name = segment.ident.to_string();

    if name == "Option" || TRANSPARENT_WRAPPERS.contains(&name.as_str()) {
        return match first_type_argument(segment) {
            Some(inner) => type_decl(inner),
            None => TypeDecl::Unsupported(format!("`{}` without a type argument", name)),
        };
    }

    if SEQUENCE_TYPES.contains(&name.as_str()) {
        return match first_type_argument(segment) {
            Some(inner) => TypeDecl::array(type_decl(inner)),
            None => TypeDecl::Unsupported(format!("`{}` without a type argument", name)),
        };
    }

    // Maps and user generics resolve by their base name
    TypeDecl::Named(name)
}

fn first_type_argument(segment: &syn::PathSegment) -> Option<&syn::Type> {
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            syn::GenericArgument::Type(ty) => Some(ty),
            _ => None,
        }),
        _ => None,
    }
}

fn is_option(ty: &syn::Type) -> bool {
    match ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|s| s.ident == "Option")
            .unwrap_or(false),
        syn::Type::Group(group) => is_option(&group.elem),
        _ => false,
    }
}

fn struct_decl(item: &syn::ItemStruct) -> TypeDecl {
    let container = SerdeAttributes::parse(&item.attrs);
    let description = doc_comment(&item.attrs);

    match &item.fields {
        syn::Fields::Named(named) => {
            let name = container
                .rename
                .clone()
                .unwrap_or_else(|| item.ident.to_string());
            let mut object = ObjectDecl::new(name);
            object.description = description;

            for field in &named.named {
                let attrs = SerdeAttributes::parse(&field.attrs);
                if attrs.skip || (attrs.skip_serializing && attrs.skip_deserializing) {
                    continue;
                }
                let Some(ident) = &field.ident else { continue };
                let rust_name = ident.unraw().to_string();
                let name = attrs.rename.clone().unwrap_or_else(|| {
                    apply_rename_rule(container.rename_all.as_deref(), &rust_name)
                });

                object.fields.push(FieldDecl {
                    name,
                    decl: type_decl(&field.ty),
                    required: !is_option(&field.ty) && !attrs.default && !container.default,
                    read_only: attrs.skip_deserializing,
                    write_only: attrs.skip_serializing,
                    flatten: attrs.flatten,
                    description: doc_comment(&field.attrs),
                });
            }
            debug!("Struct {} has {} fields", item.ident, object.fields.len());
            TypeDecl::Object(object)
        }
        syn::Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
            type_decl(&unnamed.unnamed[0].ty)
        }
        _ => TypeDecl::Unsupported(format!(
            "struct `{}` has no named fields",
            item.ident
        )),
    }
}

fn enum_decl(item: &syn::ItemEnum) -> TypeDecl {
    let container = SerdeAttributes::parse(&item.attrs);

    if item
        .variants
        .iter()
        .any(|v| !matches!(v.fields, syn::Fields::Unit))
    {
        return TypeDecl::Unsupported(format!(
            "enum `{}` has data-carrying variants",
            item.ident
        ));
    }

    let members = item
        .variants
        .iter()
        .filter_map(|variant| {
            let attrs = SerdeAttributes::parse(&variant.attrs);
            if attrs.skip || attrs.skip_serializing {
                return None;
            }
            let ident = variant.ident.unraw().to_string();
            let value = attrs
                .rename
                .unwrap_or_else(|| apply_rename_rule(container.rename_all.as_deref(), &ident));
            Some(EnumMember {
                value: EnumValue::String(value),
                name: ident,
            })
        })
        .collect();

    TypeDecl::Enum(EnumDecl {
        name: container.rename.unwrap_or_else(|| item.ident.to_string()),
        members,
        description: doc_comment(&item.attrs),
    })
}

/// Join `///` lines into one description
fn doc_comment(attrs: &[syn::Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            syn::Meta::NameValue(nv) => match &nv.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(s),
                    ..
                }) => Some(s.value().trim().to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect();

    let text = lines.join("\n").trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn apply_rename_rule(rule: Option<&str>, name: &str) -> String {
    match rule {
        Some("lowercase") => name.to_ascii_lowercase(),
        Some("UPPERCASE") => name.to_ascii_uppercase(),
        Some("PascalCase") => name.to_upper_camel_case(),
        Some("camelCase") => name.to_lower_camel_case(),
        Some("snake_case") => name.to_snake_case(),
        Some("SCREAMING_SNAKE_CASE") => name.to_shouty_snake_case(),
        Some("kebab-case") => name.to_kebab_case(),
        Some("SCREAMING-KEBAB-CASE") => name.to_shouty_kebab_case(),
        Some(other) => {
            warn!("Unknown rename_all rule `{}`, keeping `{}`", other, name);
            name.to_string()
        }
        None => name.to_string(),
    }
}

/// The serde attributes that change the serialized shape
#[derive(Debug, Default)]
struct SerdeAttributes {
    rename: Option<String>,
    rename_all: Option<String>,
    skip: bool,
    skip_serializing: bool,
    skip_deserializing: bool,
    default: bool,
    flatten: bool,
}

impl SerdeAttributes {
    fn parse(attrs: &[syn::Attribute]) -> Self {
        let mut parsed = Self::default();

        for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
            let result = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    parsed.rename = Some(serialize_name(&meta)?);
                } else if meta.path.is_ident("rename_all") {
                    parsed.rename_all = Some(serialize_name(&meta)?);
                } else if meta.path.is_ident("skip") {
                    parsed.skip = true;
                } else if meta.path.is_ident("skip_serializing") {
                    parsed.skip_serializing = true;
                } else if meta.path.is_ident("skip_deserializing") {
                    parsed.skip_deserializing = true;
                } else if meta.path.is_ident("flatten") {
                    parsed.flatten = true;
                } else if meta.path.is_ident("default") {
                    parsed.default = true;
                    skip_meta(&meta)?;
                } else {
                    skip_meta(&meta)?;
                }
                Ok(())
            });

            if let Err(e) = result {
                debug!("Ignoring unparsable serde attribute: {}", e);
            }
        }

        parsed
    }
}

/// Value of `rename = "x"` or the `serialize` half of `rename(serialize = "x", ...)`
fn serialize_name(meta: &ParseNestedMeta) -> syn::Result<String> {
    if meta.input.peek(syn::Token![=]) {
        let lit: syn::LitStr = meta.value()?.parse()?;
        return Ok(lit.value());
    }

    let mut name = None;
    meta.parse_nested_meta(|inner| {
        let lit: syn::LitStr = inner.value()?.parse()?;
        if inner.path.is_ident("serialize") {
            name = Some(lit.value());
        }
        Ok(())
    })?;
    name.ok_or_else(|| meta.error("missing `serialize` name"))
}

/// Consume whatever follows a key we do not interpret
fn skip_meta(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta(&inner))?;
    }
    Ok(())
}
