//! Helper-call tables: what a well-known method or function call returns,
//! which calls iterate-and-map, and which calls are conditional wrappers.
use crate::ir::{Format, Kind, SchemaNode};

/// Runtime condition a wrapper helper depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperCondition {
    /// `when($predicate, $value)`
    Predicate,
    /// `whenLoaded('relation')`
    RelationLoaded,
    /// `whenCounted('relation')`
    RelationCounted,
    /// `whenPivotLoaded('table', $value)`
    PivotLoaded,
    /// `whenNotNull($value)`
    NotNull,
    /// `whenHas('attribute')`
    AttributePresent,
    /// `whenAppended('attribute')`
    Appended,
}

impl WrapperCondition {
    pub fn describe(&self, subject: Option<&str>) -> String {
        let subject = subject.unwrap_or("value");
        match self {
            WrapperCondition::Predicate => "Only present when a runtime condition holds.".to_string(),
            WrapperCondition::RelationLoaded => format!("Only present when the `{subject}` relation is loaded."),
            WrapperCondition::RelationCounted => format!("Only present when `{subject}` has been counted."),
            WrapperCondition::PivotLoaded => format!("Only present when the `{subject}` pivot is loaded."),
            WrapperCondition::NotNull => "Only present when the value is not null.".to_string(),
            WrapperCondition::AttributePresent => format!("Only present when the `{subject}` attribute is set."),
            WrapperCondition::Appended => format!("Only present when `{subject}` is appended."),
        }
    }
}

/// One conditional-inclusion helper.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalHelper {
    pub name: &'static str,
    pub condition: WrapperCondition,
    /// Position of the wrapped value argument.
    pub value_arg: usize,
    /// Position of the argument naming the relation/attribute, if any.
    pub subject_arg: Option<usize>,
    /// Whether the wrapped value is a map merged into the enclosing object.
    pub merges: bool,
}

#[derive(Debug, Clone)]
pub struct HelperTable {
    /// Method or function name (lower-cased) → produced kind/format.
    pub returns: Vec<(&'static str, Kind, Option<Format>)>,
    /// Calls whose closure argument is applied to every element.
    pub iterate_map: Vec<&'static str>,
    pub conditional: Vec<ConditionalHelper>,
    /// Calls that hand their first argument straight through (`response()->json($x)`).
    pub passthrough: Vec<&'static str>,
    /// Receivers chained after a produced value that leave it unchanged.
    pub transparent_chain: Vec<&'static str>,
}

impl HelperTable {
    pub fn standard() -> Self {
        use Format::*;
        use Kind::*;
        let returns = vec![
            ("toiso8601string", String, Some(DateTime)),
            ("toiso8601zulustring", String, Some(DateTime)),
            ("todatetimestring", String, Some(DateTime)),
            ("toatomstring", String, Some(DateTime)),
            ("torfc3339string", String, Some(DateTime)),
            ("tojson", String, Some(Json)),
            ("json_encode", String, Some(Json)),
            ("todatestring", String, Some(Date)),
            ("now", String, Some(DateTime)),
            ("today", String, Some(DateTime)),
            ("totimestring", String, Some(Time)),
            ("count", Integer, None),
            ("intval", Integer, None),
            ("getkey", Integer, None),
            ("sum", Number, None),
            ("avg", Number, None),
            ("floatval", Number, None),
            ("round", Number, None),
            ("boolval", Boolean, None),
            ("exists", Boolean, None),
            ("isempty", Boolean, None),
            ("isnotempty", Boolean, None),
            ("contains", Boolean, None),
            ("toarray", Array, None),
            ("all", Array, None),
            ("values", Array, None),
            ("keys", Array, None),
            ("pluck", Array, None),
            ("strval", String, None),
            ("ucfirst", String, None),
            ("strtoupper", String, None),
            ("strtolower", String, None),
            ("trans", String, None),
            ("__", String, None),
            ("route", String, Some(Uri)),
            ("url", String, Some(Uri)),
            ("asset", String, Some(Uri)),
            ("secure_url", String, Some(Uri)),
            ("temporaryurl", String, Some(Uri)),
            ("geturl", String, Some(Uri)),
        ];
        let conditional = vec![
            ConditionalHelper { name: "when", condition: WrapperCondition::Predicate, value_arg: 1, subject_arg: None, merges: false },
            ConditionalHelper { name: "unless", condition: WrapperCondition::Predicate, value_arg: 1, subject_arg: None, merges: false },
            ConditionalHelper { name: "whenloaded", condition: WrapperCondition::RelationLoaded, value_arg: 1, subject_arg: Some(0), merges: false },
            ConditionalHelper { name: "whencounted", condition: WrapperCondition::RelationCounted, value_arg: 1, subject_arg: Some(0), merges: false },
            ConditionalHelper { name: "whenpivotloaded", condition: WrapperCondition::PivotLoaded, value_arg: 1, subject_arg: Some(0), merges: false },
            ConditionalHelper { name: "whenpivotloadedas", condition: WrapperCondition::PivotLoaded, value_arg: 2, subject_arg: Some(0), merges: false },
            ConditionalHelper { name: "whennotnull", condition: WrapperCondition::NotNull, value_arg: 0, subject_arg: None, merges: false },
            ConditionalHelper { name: "whenhas", condition: WrapperCondition::AttributePresent, value_arg: 1, subject_arg: Some(0), merges: false },
            ConditionalHelper { name: "whenappended", condition: WrapperCondition::Appended, value_arg: 1, subject_arg: Some(0), merges: false },
            ConditionalHelper { name: "mergewhen", condition: WrapperCondition::Predicate, value_arg: 1, subject_arg: None, merges: true },
            ConditionalHelper { name: "mergeunless", condition: WrapperCondition::Predicate, value_arg: 1, subject_arg: None, merges: true },
        ];
        Self {
            returns,
            iterate_map: vec!["map", "transform", "flatmap", "array_map", "mapinto"],
            conditional,
            passthrough: vec!["json", "response"],
            transparent_chain: vec!["response", "setstatuscode", "header", "withheaders", "setencodingoptions", "additional"],
        }
    }

    pub fn returns_of(&self, name: &str) -> Option<SchemaNode> {
        let name = name.to_ascii_lowercase();
        self.returns.iter().find(|(n, _, _)| *n == name).map(|(_, kind, format)| {
            let node = match kind {
                Kind::Array => SchemaNode::array(SchemaNode::string()),
                other => SchemaNode::of_kind(*other),
            };
            match format {
                Some(f) => node.with_format(*f),
                None => node,
            }
        })
    }

    pub fn is_iterate_map(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.iterate_map.iter().any(|n| *n == name)
    }

    pub fn conditional(&self, name: &str) -> Option<&ConditionalHelper> {
        let name = name.to_ascii_lowercase();
        self.conditional.iter().find(|c| c.name == name)
    }

    pub fn is_passthrough(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.passthrough.iter().any(|n| *n == name)
    }

    pub fn is_transparent_chain(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.transparent_chain.iter().any(|n| *n == name)
    }
}
