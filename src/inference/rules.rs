//! Validation rule tokens → one schema fragment per field.
//!
//! Tokens apply left to right. Scalar facets (kind, format, enum, bounds)
//! are last-wins; `required`/`nullable`/`deprecated` only ever turn on.
use std::collections::HashMap;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::num::{RawBounds, parse_param};
use super::str::{date_format_example, example_from_pattern, strip_delimiters};
use crate::error::Result;
use crate::ir::{ConditionKind, ConditionalRequirement, Constraints, Format, Kind, Scalar, SchemaNode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleToken {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
}

/// Field path (`items.*.name`) → tokens in declaration order.
pub type RuleSet = IndexMap<String, Vec<RuleToken>>;

impl RuleToken {
    pub fn new(name: &str, params: &[&str]) -> Self {
        Self { name: name.to_string(), params: params.iter().map(|p| p.to_string()).collect() }
    }

    /// `max:255`, `in:a,b`, `regex:/^a,b$/`.
    pub fn parse(raw: &str) -> Option<RuleToken> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let (name, rest) = match raw.split_once(':') {
            Some((n, r)) => (n.trim().to_ascii_lowercase(), Some(r)),
            None => (raw.to_ascii_lowercase(), None),
        };
        let params = match rest {
            None => Vec::new(),
            // the whole remainder is one parameter
            Some(r) if matches!(name.as_str(), "regex" | "not_regex" | "date_format") => vec![r.to_string()],
            Some(r) => r.split(',').map(|p| p.trim().to_string()).collect(),
        };
        Some(RuleToken { name, params })
    }
}

/// Splits a pipe string, keeping `|` inside a `regex:` pattern.
pub fn parse_pipe(rules: &str) -> Vec<RuleToken> {
    let mut out: Vec<String> = Vec::new();
    let mut open_regex = false;
    for piece in rules.split('|') {
        if open_regex {
            if let Some(last) = out.last_mut() {
                last.push('|');
                last.push_str(piece);
            }
        } else {
            out.push(piece.to_string());
        }
        let current = out.last().map(String::as_str).unwrap_or_default();
        open_regex = regex_unterminated(current);
    }
    out.iter().filter_map(|r| RuleToken::parse(r)).collect()
}

fn regex_unterminated(token: &str) -> bool {
    let Some(body) = token.strip_prefix("regex:").or_else(|| token.strip_prefix("not_regex:")) else {
        return false;
    };
    let mut chars = body.chars();
    let Some(delim) = chars.next() else { return false };
    if delim.is_alphanumeric() {
        return false;
    }
    // closed when the delimiter appears again (unescaped) followed only by flags
    let rest: String = chars.collect();
    let mut escaped = false;
    let mut close = None;
    for (i, c) in rest.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == delim {
            close = Some(i);
        }
    }
    match close {
        Some(i) => !rest[i + delim.len_utf8()..].chars().all(|c| c.is_ascii_alphabetic()),
        None => true,
    }
}

/// JSON rule file: `{"path": "required|string"}` or `{"path": ["required", "string"]}`.
pub fn rule_set_from_json_str(src: &str) -> Result<RuleSet> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawRules {
        Pipe(String),
        List(Vec<String>),
    }
    let raw: IndexMap<String, RawRules> = crate::path_de::from_str_with_path(src)?;
    Ok(raw
        .into_iter()
        .map(|(path, rules)| {
            let tokens = match rules {
                RawRules::Pipe(s) => parse_pipe(&s),
                RawRules::List(items) => items.iter().flat_map(|s| parse_pipe(s)).collect(),
            };
            (path, tokens)
        })
        .collect())
}

// ------------------------------ Lookup table ------------------------------ //

/// Tokens that only set kind (and maybe format).
static TYPE_TOKENS: Lazy<HashMap<&'static str, (Kind, Option<Format>)>> = Lazy::new(|| {
    use Format as F;
    HashMap::from([
        ("string", (Kind::String, None)),
        ("integer", (Kind::Integer, None)),
        ("int", (Kind::Integer, None)),
        ("numeric", (Kind::Number, None)),
        ("decimal", (Kind::Number, None)),
        ("boolean", (Kind::Boolean, None)),
        ("bool", (Kind::Boolean, None)),
        ("accepted", (Kind::Boolean, None)),
        ("declined", (Kind::Boolean, None)),
        ("array", (Kind::Array, None)),
        ("list", (Kind::Array, None)),
        ("json", (Kind::String, Some(F::Json))),
        ("file", (Kind::String, Some(F::Binary))),
        ("image", (Kind::String, Some(F::Binary))),
        ("mimes", (Kind::String, Some(F::Binary))),
        ("mimetypes", (Kind::String, Some(F::Binary))),
        ("date", (Kind::String, Some(F::Date))),
        ("email", (Kind::String, Some(F::Email))),
        ("url", (Kind::String, Some(F::Uri))),
        ("active_url", (Kind::String, Some(F::Uri))),
        ("uuid", (Kind::String, Some(F::Uuid))),
        ("ip", (Kind::String, Some(F::Ipv4))),
        ("ipv4", (Kind::String, Some(F::Ipv4))),
        ("ipv6", (Kind::String, Some(F::Ipv6))),
        ("password", (Kind::String, Some(F::Password))),
        ("current_password", (Kind::String, Some(F::Password))),
    ])
});

/// String tokens that constrain the alphabet.
static PATTERN_TOKENS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("alpha", "^[a-zA-Z]+$"),
        ("alpha_num", "^[a-zA-Z0-9]+$"),
        ("alpha_dash", "^[a-zA-Z0-9_-]+$"),
        ("ulid", "^[0-9A-HJKMNP-TV-Z]{26}$"),
        ("lowercase", "^[^A-Z]*$"),
        ("uppercase", "^[^a-z]*$"),
    ])
});

/// Recognised tokens with no schema effect.
const NO_EFFECT: &[&str] = &[
    "sometimes", "bail", "present", "filled", "exists", "unique", "distinct", "not_in",
    "not_regex", "prohibited", "prohibited_if", "prohibited_unless", "prohibits", "exclude",
    "exclude_if", "exclude_unless", "exclude_with", "exclude_without", "same", "different",
    "missing", "missing_if", "missing_unless", "starts_with", "ends_with", "doesnt_start_with",
    "doesnt_end_with", "ascii", "dimensions", "multiple_of", "accepted_if", "declined_if",
    "before", "after", "before_or_equal", "after_or_equal", "date_equals", "in_array", "enum",
];

// ------------------------------ Interpreter ------------------------------- //

#[derive(Debug, Clone, PartialEq)]
pub struct Interpreted {
    pub node: SchemaNode,
    /// `confirmed`: a `<field>_confirmation` sibling is expected.
    pub confirmed: bool,
}

#[derive(Default)]
struct Acc {
    kind: Option<Kind>,
    format: Option<Format>,
    enum_values: Vec<Scalar>,
    pattern: Option<String>,
    example: Option<Value>,
    bounds: RawBounds,
    required: bool,
    nullable: bool,
    deprecated: bool,
    conditions: Vec<ConditionalRequirement>,
    confirmed: bool,
    /// `digits`/`digits_between` lengths, read once the kind is final.
    digits: Option<(u32, u32)>,
}

impl Acc {
    /// A type token keeps the current format only when the kind is unchanged.
    fn set_type(&mut self, kind: Kind, format: Option<Format>) {
        if self.kind != Some(kind) {
            self.format = format;
        } else if format.is_some() {
            self.format = format;
        }
        self.kind = Some(kind);
    }

    fn set_pattern(&mut self, pattern: String) {
        self.example = example_from_pattern(&pattern).map(Value::from);
        self.pattern = Some(pattern);
    }

    fn apply(&mut self, token: &RuleToken) {
        let name = token.name.as_str();
        let p = &token.params;
        let num = |i: usize| p.get(i).and_then(|v| parse_param(v));

        if let Some((kind, format)) = TYPE_TOKENS.get(name) {
            self.set_type(*kind, *format);
            return;
        }
        if let Some(pattern) = PATTERN_TOKENS.get(name) {
            if self.kind != Some(Kind::String) {
                self.set_type(Kind::String, None);
            }
            self.set_pattern(pattern.to_string());
            return;
        }
        match name {
            "required" => self.required = true,
            "nullable" => self.nullable = true,
            "deprecated" => self.deprecated = true,
            "confirmed" => self.confirmed = true,
            "in" => self.enum_values = p.iter().map(|v| Scalar::parse_loose(v.trim_matches('"'))).collect(),
            "regex" => {
                if let Some(raw) = p.first() {
                    self.set_pattern(strip_delimiters(raw));
                }
            }
            "date_format" => {
                let fmt = p.first().map(String::as_str).unwrap_or_default();
                match date_format_example(fmt) {
                    Some((format, example)) => {
                        self.set_type(Kind::String, Some(format));
                        self.example = Some(Value::from(example));
                    }
                    None => self.set_type(Kind::String, Some(Format::DateTime)),
                }
            }
            "timezone" => {
                self.set_type(Kind::String, None);
                self.example = Some(Value::from("UTC"));
            }
            "digits" | "digits_between" => self.digits(name, num(0), num(1)),
            "min" | "gte" => {
                if let Some(v) = num(0) {
                    self.bounds.set_lower(v, false);
                }
            }
            "max" | "lte" => {
                if let Some(v) = num(0) {
                    self.bounds.set_upper(v, false);
                }
            }
            "gt" => {
                if let Some(v) = num(0) {
                    self.bounds.set_lower(v, true);
                }
            }
            "lt" => {
                if let Some(v) = num(0) {
                    self.bounds.set_upper(v, true);
                }
            }
            "size" => {
                if let Some(v) = num(0) {
                    self.bounds.set_lower(v, false);
                    self.bounds.set_upper(v, false);
                }
            }
            "between" => {
                if let (Some(lo), Some(hi)) = (num(0), num(1)) {
                    self.bounds.set_lower(lo, false);
                    self.bounds.set_upper(hi, false);
                }
            }
            "required_if" => self.condition(ConditionKind::RequiredIf, p, 1),
            "required_unless" => self.condition(ConditionKind::RequiredUnless, p, 1),
            "required_with" => self.condition(ConditionKind::RequiredWith, p, p.len()),
            "required_with_all" => self.condition(ConditionKind::RequiredWithAll, p, p.len()),
            "required_without" => self.condition(ConditionKind::RequiredWithout, p, p.len()),
            "required_without_all" => self.condition(ConditionKind::RequiredWithoutAll, p, p.len()),
            "required_if_accepted" => self.condition(ConditionKind::RequiredIfAccepted, p, 1),
            other if NO_EFFECT.contains(&other) => {}
            other => debug!(rule = other, "ignoring unknown rule token"),
        }
    }

    fn digits(&mut self, name: &str, a: Option<f64>, b: Option<f64>) {
        let Some(lo) = a.map(|v| v as u32) else { return };
        let hi = if name == "digits" { lo } else { b.map(|v| v as u32).unwrap_or(lo) };
        self.digits = Some((lo, hi));
    }

    /// `digits:4` on a number is a value range; otherwise a digit string.
    fn apply_digits(&mut self, lo: u32, hi: u32) {
        if matches!(self.kind, Some(Kind::Integer | Kind::Number)) && lo >= 1 && hi < 16 {
            self.bounds.set_lower(if lo == 1 { 0.0 } else { 10f64.powi(lo as i32 - 1) }, false);
            self.bounds.set_upper(10f64.powi(hi as i32) - 1.0, false);
            return;
        }
        self.set_type(Kind::String, None);
        if self.pattern.is_none() {
            let pattern = if lo == hi { format!("^[0-9]{{{lo}}}$") } else { format!("^[0-9]{{{lo},{hi}}}$") };
            self.set_pattern(pattern);
        }
    }

    /// Leading `fields` params name fields; the rest are values.
    fn condition(&mut self, kind: ConditionKind, params: &[String], fields: usize) {
        let split = fields.min(params.len());
        let (fields, values) = params.split_at(split);
        if fields.is_empty() {
            return;
        }
        self.conditions.push(ConditionalRequirement {
            kind,
            fields: fields.to_vec(),
            values: values.to_vec(),
            explanation: explain(kind, fields, values),
        });
    }

    fn finish(mut self) -> Interpreted {
        if let Some((lo, hi)) = self.digits.take() {
            self.apply_digits(lo, hi);
        }
        let kind = self.kind.unwrap_or(Kind::String);
        let mut constraints = Constraints::default();
        self.bounds.apply(kind, self.format, &mut constraints);
        if kind == Kind::String {
            constraints.pattern = self.pattern;
        }

        let mut node = SchemaNode::of_kind(kind)
            .with_nullable(self.nullable)
            .with_required(self.required)
            .with_deprecated(self.deprecated)
            .with_enum(self.enum_values)
            .with_constraints(constraints);
        node.format = self.format.filter(|f| f.kind() == kind);
        if kind == Kind::String {
            node.example = self.example;
        }
        node.conditional_requirements = self.conditions;
        Interpreted { node, confirmed: self.confirmed }
    }
}

fn quoted(items: &[String]) -> String {
    items.iter().map(|i| format!("`{i}`")).collect::<Vec<_>>().join(", ")
}

fn explain(kind: ConditionKind, fields: &[String], values: &[String]) -> String {
    let f = quoted(fields);
    let alternatives = values.iter().map(|v| format!("`{v}`")).collect::<Vec<_>>().join(" or ");
    match kind {
        ConditionKind::RequiredIf if values.is_empty() => format!("Required when {f} is set."),
        ConditionKind::RequiredIf => format!("Required when {f} is {alternatives}."),
        ConditionKind::RequiredUnless => format!("Required unless {f} is {alternatives}."),
        ConditionKind::RequiredWith => format!("Required when any of {f} is present."),
        ConditionKind::RequiredWithAll => format!("Required when all of {f} are present."),
        ConditionKind::RequiredWithout => format!("Required when any of {f} is missing."),
        ConditionKind::RequiredWithoutAll => format!("Required when all of {f} are missing."),
        ConditionKind::RequiredIfAccepted => format!("Required when {f} is accepted."),
    }
}

pub fn interpret(tokens: &[RuleToken]) -> Interpreted {
    let mut acc = Acc::default();
    for token in tokens {
        acc.apply(token);
    }
    acc.finish()
}
