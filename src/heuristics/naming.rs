//! Field name → likely kind and format.
use serde::{Deserialize, Serialize};

use crate::ir::{Format, Kind, SchemaNode};

/// How a rule's `value` is compared against the snake_cased field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatch {
    Exact,
    Prefix,
    Suffix,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamingRule {
    #[serde(rename = "match")]
    pub mode: NameMatch,
    pub value: String,
    pub kind: Kind,
    #[serde(default)]
    pub format: Option<Format>,
}

impl NamingRule {
    pub fn new(mode: NameMatch, value: &str, kind: Kind, format: Option<Format>) -> Self {
        Self { mode, value: value.to_string(), kind, format }
    }

    pub fn matches(&self, name: &str) -> bool {
        let v = self.value.as_str();
        match self.mode {
            NameMatch::Exact => name == v,
            NameMatch::Prefix => name.starts_with(v),
            NameMatch::Suffix => name.ends_with(v),
            NameMatch::Contains => name.contains(v),
        }
    }
}

/// Ordered rules; first match wins.
#[derive(Debug, Clone, Default)]
pub struct NamingTable {
    rules: Vec<NamingRule>,
}

impl NamingTable {
    pub fn new(rules: Vec<NamingRule>) -> Self {
        Self { rules }
    }

    pub fn standard() -> Self {
        use Format::*;
        use Kind::{Boolean, Integer, Number, String};
        use NameMatch::*;
        let rules = vec![
            NamingRule::new(Exact, "id", Integer, None),
            NamingRule::new(Exact, "uuid", String, Some(Uuid)),
            NamingRule::new(Suffix, "_uuid", String, Some(Uuid)),
            NamingRule::new(Suffix, "_id", Integer, None),
            NamingRule::new(Contains, "email", String, Some(Email)),
            NamingRule::new(Contains, "password", String, Some(Password)),
            NamingRule::new(Contains, "url", String, Some(Uri)),
            NamingRule::new(Suffix, "_link", String, Some(Uri)),
            NamingRule::new(Exact, "link", String, Some(Uri)),
            NamingRule::new(Exact, "website", String, Some(Uri)),
            NamingRule::new(Suffix, "_at", String, Some(DateTime)),
            NamingRule::new(Exact, "timestamp", String, Some(DateTime)),
            NamingRule::new(Exact, "date", String, Some(Date)),
            NamingRule::new(Suffix, "_date", String, Some(Date)),
            NamingRule::new(Exact, "birthday", String, Some(Date)),
            NamingRule::new(Prefix, "is_", Boolean, None),
            NamingRule::new(Prefix, "has_", Boolean, None),
            NamingRule::new(Prefix, "can_", Boolean, None),
            NamingRule::new(Exact, "active", Boolean, None),
            NamingRule::new(Exact, "enabled", Boolean, None),
            NamingRule::new(Exact, "count", Integer, None),
            NamingRule::new(Suffix, "_count", Integer, None),
            NamingRule::new(Exact, "total", Integer, None),
            NamingRule::new(Exact, "quantity", Integer, None),
            NamingRule::new(Exact, "age", Integer, None),
            NamingRule::new(Exact, "page", Integer, None),
            NamingRule::new(Exact, "per_page", Integer, None),
            NamingRule::new(Contains, "price", Number, Some(Float)),
            NamingRule::new(Contains, "amount", Number, Some(Float)),
            NamingRule::new(Exact, "balance", Number, Some(Float)),
            NamingRule::new(Exact, "latitude", Number, Some(Double)),
            NamingRule::new(Exact, "longitude", Number, Some(Double)),
            NamingRule::new(Exact, "lat", Number, Some(Double)),
            NamingRule::new(Exact, "lng", Number, Some(Double)),
            NamingRule::new(Exact, "ip", String, Some(Ipv4)),
            NamingRule::new(Suffix, "_ip", String, Some(Ipv4)),
            NamingRule::new(Exact, "ip_address", String, Some(Ipv4)),
        ];
        Self { rules }
    }

    pub fn with_prepended(mut self, mut extra: Vec<NamingRule>) -> Self {
        extra.append(&mut self.rules);
        self.rules = extra;
        self
    }

    pub fn rules(&self) -> &[NamingRule] {
        &self.rules
    }

    /// Schema for a field called `name`, or `None` when no rule matches.
    pub fn lookup(&self, name: &str) -> Option<SchemaNode> {
        let key = snake_case(name);
        self.rules.iter().find(|r| r.matches(&key)).map(|r| {
            let node = SchemaNode::of_kind(r.kind);
            match r.format {
                Some(format) => node.with_format(format),
                None => node,
            }
        })
    }
}

/// `createdAt` / `CreatedAt` / `created-at` → `created_at`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '-' || c == ' ' {
            out.push('_');
            prev_lower = false;
        } else if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}
