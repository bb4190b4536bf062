//! Declared fields of a class or method: decorators (PHP attributes), typed
//! properties and doc-block `@property` tags.
//!
//! Nothing here builds schema nodes for declared types; that needs the
//! orchestrator (a field's type may be another class). The extractor only
//! collects what the source states, tagged with where it came from.
use std::sync::Arc;

use ordered_float::OrderedFloat;
use serde_json::{Map, Value};

use crate::heuristics::naming::snake_case;
use crate::ir::{Format, Scalar};
use crate::source::ast::{Attribute, ClassDecl, Expr, MethodDecl, Visibility};
use crate::source::resolver::short_name;
use crate::source::types::TypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Decorator,
    TypedField,
    DocComment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredField {
    /// Name as it appears in the payload (after renaming).
    pub name: String,
    pub source: FieldSource,
    pub ty: Option<TypeRef>,
    pub format: Option<Format>,
    pub required: bool,
    pub nullable: bool,
    pub deprecated: bool,
    pub example: Option<Value>,
    pub description: Option<String>,
    pub enum_values: Vec<Scalar>,
}

impl DeclaredField {
    fn new(name: String, source: FieldSource, ty: Option<TypeRef>) -> Self {
        let nullable = ty.as_ref().is_some_and(TypeRef::admits_null);
        Self {
            name,
            source,
            ty,
            format: None,
            required: false,
            nullable,
            deprecated: false,
            example: None,
            description: None,
            enum_values: Vec::new(),
        }
    }
}

// ------------------------------ Decorators -------------------------------- //

const INPUT_DECORATORS: &[&str] = &["BodyParam", "QueryParam", "UrlParam", "RequestBody"];
const OUTPUT_DECORATORS: &[&str] = &["ResponseField", "Property", "SchemaProperty", "ApiProperty"];

fn is_decorator(attr: &Attribute, direction: Direction) -> bool {
    let names = match direction {
        Direction::Input => INPUT_DECORATORS,
        Direction::Output => OUTPUT_DECORATORS,
    };
    let short = short_name(&attr.name);
    names.iter().any(|n| n.eq_ignore_ascii_case(short))
}

/// `#[ResponseField('id', 'integer', 'The id', required: true)]`
fn decorator_field(attr: &Attribute) -> Option<DeclaredField> {
    let name = attr.arg("name", 0).or_else(|| attr.arg("property", 0))?.as_str()?.to_string();
    let ty = attr.arg("type", 1).and_then(Expr::as_str).and_then(TypeRef::parse);
    let mut field = DeclaredField::new(name, FieldSource::Decorator, ty);
    field.description = attr.arg("description", 2).and_then(Expr::as_str).map(str::to_string);
    field.required = matches!(attr.arg("required", 3), Some(Expr::Bool(true)));
    if let Some(Expr::Bool(b)) = attr.arg("nullable", usize::MAX) {
        field.nullable |= *b;
    }
    field.deprecated = matches!(attr.arg("deprecated", usize::MAX), Some(Expr::Bool(true)));
    field.format = attr
        .arg("format", usize::MAX)
        .and_then(Expr::as_str)
        .and_then(|f| serde_json::from_value::<Format>(Value::from(f)).ok());
    field.example = attr.arg("example", 4).and_then(expr_to_json);
    if let Some(Expr::Array(items)) = attr.arg("enum", usize::MAX) {
        field.enum_values = items.iter().filter_map(|i| expr_to_scalar(&i.value)).collect();
    }
    Some(field)
}

/// Decorator fields attached to a method (`#[BodyParam(...)]` on `store`).
pub fn method_decorators(method: &MethodDecl, direction: Direction) -> Vec<DeclaredField> {
    method
        .attributes
        .iter()
        .filter(|a| is_decorator(a, direction))
        .filter_map(decorator_field)
        .collect()
}

/// Literal attribute argument → JSON.
pub fn expr_to_json(expr: &Expr) -> Option<Value> {
    Some(match expr {
        Expr::String(s) => Value::from(s.as_str()),
        Expr::Int(i) => Value::from(*i),
        Expr::Float(f) => Value::from(*f),
        Expr::Bool(b) => Value::from(*b),
        Expr::Null => Value::Null,
        Expr::Array(items) if items.iter().all(|i| i.key.is_none()) => {
            Value::Array(items.iter().filter_map(|i| expr_to_json(&i.value)).collect())
        }
        Expr::Array(items) => {
            let mut map = Map::new();
            for item in items {
                if let (Some(k), Some(v)) = (item.key.as_ref().and_then(Expr::as_key), expr_to_json(&item.value)) {
                    map.insert(k, v);
                }
            }
            Value::Object(map)
        }
        _ => return None,
    })
}

pub fn expr_to_scalar(expr: &Expr) -> Option<Scalar> {
    Some(match expr {
        Expr::String(s) => Scalar::String(s.clone()),
        Expr::Int(i) => Scalar::Integer(*i),
        Expr::Float(f) => Scalar::Number(OrderedFloat(*f)),
        Expr::Bool(b) => Scalar::Boolean(*b),
        Expr::Null => Scalar::Null,
        _ => return None,
    })
}

// -------------------------------- Renaming -------------------------------- //

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMapper {
    Snake,
    Camel,
    Studly,
    Lower,
}

impl NameMapper {
    /// `SnakeCaseMapper::class` or `'snake_case'`.
    fn from_expr(expr: &Expr) -> Option<NameMapper> {
        let raw = expr.as_class_ref().or_else(|| expr.as_str())?;
        let key = short_name(raw).to_ascii_lowercase().replace(['_', '-'], "");
        Some(match key.trim_end_matches("mapper") {
            "snakecase" | "snake" => NameMapper::Snake,
            "camelcase" | "camel" => NameMapper::Camel,
            "studlycase" | "studly" | "pascalcase" | "pascal" => NameMapper::Studly,
            "lowercase" | "lower" => NameMapper::Lower,
            _ => return None,
        })
    }

    pub fn apply(&self, name: &str) -> String {
        match self {
            NameMapper::Snake => snake_case(name),
            NameMapper::Lower => name.to_lowercase(),
            NameMapper::Camel | NameMapper::Studly => {
                let mut out = String::with_capacity(name.len());
                let mut upper = *self == NameMapper::Studly;
                for c in name.chars() {
                    if c == '_' || c == '-' || c == ' ' {
                        upper = true;
                    } else if upper {
                        out.extend(c.to_uppercase());
                        upper = false;
                    } else {
                        out.push(c);
                    }
                }
                if *self == NameMapper::Camel {
                    let mut chars = out.chars();
                    if let Some(first) = chars.next() {
                        return first.to_lowercase().chain(chars).collect();
                    }
                }
                out
            }
        }
    }
}

/// Rename attribute for the direction: `MapName` plus `MapInputName`/`MapOutputName`.
/// `MapName($input, $output)` takes the second argument for output.
fn rename_arg(attrs: &[Attribute], direction: Direction) -> Option<&Expr> {
    let specific = match direction {
        Direction::Input => "MapInputName",
        Direction::Output => "MapOutputName",
    };
    for attr in attrs {
        let short = short_name(&attr.name);
        if short.eq_ignore_ascii_case(specific) || short.eq_ignore_ascii_case("SerializedName") {
            return attr.arg("name", 0);
        }
        if short.eq_ignore_ascii_case("MapName") {
            return match direction {
                Direction::Output => attr.arg("output", 1).or_else(|| attr.arg("input", 0)),
                Direction::Input => attr.arg("input", 0),
            };
        }
    }
    None
}

/// Class-level mapper of the nearest class in the lineage that declares one.
fn class_mapper(lineage: &[Arc<ClassDecl>], direction: Direction) -> Option<NameMapper> {
    lineage
        .iter()
        .find_map(|c| rename_arg(&c.attributes, direction))
        .and_then(NameMapper::from_expr)
}

/// Field-level override wins over the class mapper.
fn payload_name(name: &str, attrs: &[Attribute], class: Option<NameMapper>, direction: Direction) -> String {
    match rename_arg(attrs, direction) {
        Some(Expr::String(explicit)) => explicit.clone(),
        Some(other) => match NameMapper::from_expr(other) {
            Some(mapper) => mapper.apply(name),
            None => name.to_string(),
        },
        None => match class {
            Some(mapper) => mapper.apply(name),
            None => name.to_string(),
        },
    }
}

fn is_deprecated_attr(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|a| short_name(&a.name).eq_ignore_ascii_case("Deprecated"))
}

// ------------------------------- Extraction ------------------------------- //

/// Public properties the framework reads as resource configuration.
const FRAMEWORK_PROPERTIES: &[&str] = &["collects", "preserveKeys", "wrap", "additional", "with"];

/// Declared fields over `lineage` (the class first, then traits and
/// ancestors). A nearer declaration of the same field hides a farther one.
///
/// Decorators come first, then typed properties; doc-block `@property` tags
/// are read only when neither yields anything.
pub fn declared_fields(lineage: &[Arc<ClassDecl>], direction: Direction) -> Vec<DeclaredField> {
    let mapper = class_mapper(lineage, direction);
    let mut out: Vec<DeclaredField> = Vec::new();
    fn push(field: DeclaredField, out: &mut Vec<DeclaredField>) {
        if !out.iter().any(|f| f.name == field.name) {
            out.push(field);
        }
    }

    for class in lineage {
        for attr in class.attributes.iter().filter(|a| is_decorator(a, direction)) {
            if let Some(field) = decorator_field(attr) {
                push(field, &mut out);
            }
        }
    }

    for class in lineage {
        for prop in &class.properties {
            if prop.visibility != Visibility::Public || prop.is_static || FRAMEWORK_PROPERTIES.contains(&prop.name.as_str()) {
                continue;
            }
            let doc_ty = prop.doc.as_ref().and_then(|d| d.var_type(Some(&prop.name))).cloned();
            let (source, ty) = match (&prop.ty, doc_ty) {
                (Some(ty), _) => (FieldSource::TypedField, Some(ty.clone())),
                (None, Some(ty)) => (FieldSource::DocComment, Some(ty)),
                (None, None) => continue,
            };
            let name = payload_name(&prop.name, &prop.attributes, mapper, direction);
            let mut field = DeclaredField::new(name, source, ty);
            field.required = match direction {
                Direction::Output => true,
                Direction::Input => !prop.has_default && !field.nullable,
            };
            field.deprecated = is_deprecated_attr(&prop.attributes) || prop.doc.as_ref().is_some_and(|d| d.is_deprecated());
            field.description = prop.doc.as_ref().and_then(|d| d.summary.clone());
            push(field, &mut out);
        }
        for param in class.promoted_params() {
            if param.promoted != Some(Visibility::Public) {
                continue;
            }
            let name = payload_name(&param.name, &param.attributes, mapper, direction);
            let mut field = DeclaredField::new(name, FieldSource::TypedField, param.ty.clone());
            field.required = match direction {
                Direction::Output => true,
                Direction::Input => !param.has_default && !field.nullable,
            };
            field.deprecated = is_deprecated_attr(&param.attributes);
            push(field, &mut out);
        }
    }

    if !out.is_empty() {
        return out;
    }

    for class in lineage {
        let Some(doc) = class.doc.as_ref() else { continue };
        for (name, ty, description) in doc.properties() {
            let name = payload_name(name, &[], mapper, direction);
            let mut field = DeclaredField::new(name, FieldSource::DocComment, ty.cloned());
            field.description = description.map(str::to_string);
            field.required = direction == Direction::Output && !field.nullable;
            push(field, &mut out);
        }
    }
    out
}
