// Strongly-typed schema IR. Every inference stage produces and consumes these.
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Properties = IndexMap<String, SchemaNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Union,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Integer => "integer",
            Kind::Number => "number",
            Kind::Boolean => "boolean",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::Union => "union",
        }
    }
}

/// Payload per kind. Only the composite arms carry children, so a node can
/// never hold `properties` and `items` at the same time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Ty {
    String,
    Integer,
    Number,
    Boolean,
    Array { items: Box<SchemaNode> },
    Object { properties: Properties },
    Union { variants: Vec<SchemaNode> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    DateTime,
    Date,
    Time,
    Email,
    Uri,
    Uuid,
    Password,
    Binary,
    Int32,
    Int64,
    Float,
    Double,
    Ipv4,
    Ipv6,
    Hostname,
    Json,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::DateTime => "date-time",
            Format::Date => "date",
            Format::Time => "time",
            Format::Email => "email",
            Format::Uri => "uri",
            Format::Uuid => "uuid",
            Format::Password => "password",
            Format::Binary => "binary",
            Format::Int32 => "int32",
            Format::Int64 => "int64",
            Format::Float => "float",
            Format::Double => "double",
            Format::Ipv4 => "ipv4",
            Format::Ipv6 => "ipv6",
            Format::Hostname => "hostname",
            Format::Json => "json",
        }
    }

    /// The kind this format refines.
    pub fn kind(&self) -> Kind {
        match self {
            Format::Int32 | Format::Int64 => Kind::Integer,
            Format::Float | Format::Double => Kind::Number,
            _ => Kind::String,
        }
    }
}

/// Literal scalar used for enum values. Floats are wrapped so the set stays hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(OrderedFloat<f64>),
    String(String),
}

impl Scalar {
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Boolean(b) => Value::from(*b),
            Scalar::Integer(i) => Value::from(*i),
            Scalar::Number(f) => Value::from(f.0),
            Scalar::String(s) => Value::from(s.clone()),
        }
    }

    /// Best-effort typing of a raw rule parameter (`in:1,2,3` stays integral).
    pub fn parse_loose(raw: &str) -> Scalar {
        if let Ok(i) = raw.parse::<i64>() {
            return Scalar::Integer(i);
        }
        if raw.contains('.') {
            if let Ok(f) = raw.parse::<f64>() {
                return Scalar::Number(OrderedFloat(f));
            }
        }
        Scalar::String(raw.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    RequiredIf,
    RequiredUnless,
    RequiredWith,
    RequiredWithAll,
    RequiredWithout,
    RequiredWithoutAll,
    RequiredIfAccepted,
}

/// Side-car note for `required_*` rules; the document layer renders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRequirement {
    pub kind: ConditionKind,
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
    #[serde(flatten)]
    pub ty: Ty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub conditional: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Originating type name, when the node was produced from a named type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional_requirements: Vec<ConditionalRequirement>,
}

// ------------------------------ Constructors ------------------------------ //

impl SchemaNode {
    pub fn new(ty: Ty) -> Self {
        Self {
            ty,
            format: None,
            nullable: false,
            required: false,
            deprecated: false,
            conditional: false,
            enum_values: Vec::new(),
            example: None,
            description: None,
            title: None,
            constraints: Constraints::default(),
            conditional_requirements: Vec::new(),
        }
    }

    pub fn string() -> Self { Self::new(Ty::String) }
    pub fn integer() -> Self { Self::new(Ty::Integer) }
    pub fn number() -> Self { Self::new(Ty::Number) }
    pub fn boolean() -> Self { Self::new(Ty::Boolean) }

    pub fn array(items: SchemaNode) -> Self {
        Self::new(Ty::Array { items: Box::new(items) })
    }

    pub fn object(properties: Properties) -> Self {
        Self::new(Ty::Object { properties })
    }

    pub fn empty_object() -> Self {
        Self::object(Properties::new())
    }

    pub fn union(variants: Vec<SchemaNode>) -> Self {
        Self::new(Ty::Union { variants })
    }

    /// Scalar node for a kind; composite kinds get empty children.
    pub fn of_kind(kind: Kind) -> Self {
        match kind {
            Kind::String => Self::string(),
            Kind::Integer => Self::integer(),
            Kind::Number => Self::number(),
            Kind::Boolean => Self::boolean(),
            Kind::Array => Self::array(Self::string()),
            Kind::Object => Self::empty_object(),
            Kind::Union => Self::union(Vec::new()),
        }
    }

    /// Terminal node standing in for a type that is already being expanded.
    pub fn circular(type_name: &str) -> Self {
        Self::empty_object()
            .with_title(type_name)
            .with_description(format!("circular reference to {type_name}"))
    }

    pub fn is_circular_placeholder(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| d.starts_with("circular reference to "))
    }
}

// ------------------------------- Builders --------------------------------- //

impl SchemaNode {
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    pub fn with_conditional(mut self, conditional: bool) -> Self {
        self.conditional = conditional;
        self
    }

    pub fn with_enum(mut self, values: Vec<Scalar>) -> Self {
        self.enum_values = values;
        self
    }

    pub fn with_example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }
}

// ------------------------------- Accessors -------------------------------- //

impl SchemaNode {
    pub fn kind(&self) -> Kind {
        match &self.ty {
            Ty::String => Kind::String,
            Ty::Integer => Kind::Integer,
            Ty::Number => Kind::Number,
            Ty::Boolean => Kind::Boolean,
            Ty::Array { .. } => Kind::Array,
            Ty::Object { .. } => Kind::Object,
            Ty::Union { .. } => Kind::Union,
        }
    }

    pub fn properties(&self) -> Option<&Properties> {
        match &self.ty {
            Ty::Object { properties } => Some(properties),
            _ => None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        self.properties().and_then(|p| p.get(name))
    }

    pub fn items(&self) -> Option<&SchemaNode> {
        match &self.ty {
            Ty::Array { items } => Some(items),
            _ => None,
        }
    }

    pub fn variants(&self) -> Option<&[SchemaNode]> {
        match &self.ty {
            Ty::Union { variants } => Some(variants),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.ty, Ty::String | Ty::Integer | Ty::Number | Ty::Boolean)
    }

    /// A plain string with nothing learned about it: the analyzers' "don't know".
    pub fn is_bare_string(&self) -> bool {
        matches!(self.ty, Ty::String)
            && self.format.is_none()
            && self.enum_values.is_empty()
            && self.constraints.is_empty()
            && self.example.is_none()
            && self.title.is_none()
    }

    /// Counts nodes matching `pred` in the whole tree.
    pub fn count_where(&self, pred: &dyn Fn(&SchemaNode) -> bool) -> usize {
        let own = usize::from(pred(self));
        own + match &self.ty {
            Ty::Array { items } => items.count_where(pred),
            Ty::Object { properties } => properties.values().map(|p| p.count_where(pred)).sum(),
            Ty::Union { variants } => variants.iter().map(|v| v.count_where(pred)).sum(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_kinds_carry_their_children() {
        let arr = SchemaNode::array(SchemaNode::integer());
        assert_eq!(arr.kind(), Kind::Array);
        assert_eq!(arr.items().map(|i| i.kind()), Some(Kind::Integer));
        assert!(arr.properties().is_none());

        let obj = SchemaNode::of_kind(Kind::Object);
        assert_eq!(obj.properties().map(|p| p.len()), Some(0));
    }

    #[test]
    fn serializes_flat_with_type_tag() {
        let mut props = Properties::new();
        props.insert("email".into(), SchemaNode::string().with_format(Format::Email).with_required(true));
        let node = SchemaNode::object(props);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["email"]["format"], "email");
        assert_eq!(json["properties"]["email"]["required"], true);
        assert!(json["properties"]["email"].get("nullable").is_none());

        let back: SchemaNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn loose_scalars_keep_integers_integral() {
        assert_eq!(Scalar::parse_loose("12"), Scalar::Integer(12));
        assert_eq!(Scalar::parse_loose("1.5"), Scalar::Number(OrderedFloat(1.5)));
        assert_eq!(Scalar::parse_loose("draft"), Scalar::String("draft".into()));
    }

    #[test]
    fn circular_placeholder_is_recognisable() {
        let node = SchemaNode::circular("App\\Models\\User");
        assert_eq!(node.kind(), Kind::Object);
        assert!(node.is_circular_placeholder());
        assert_eq!(node.title.as_deref(), Some("App\\Models\\User"));
    }
}
