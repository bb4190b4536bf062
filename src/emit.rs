//! JSON-Schema-ish view of a [`SchemaNode`] tree.
//!
//! The tree's own serde form (`--raw`) keeps every flag on every node. This
//! view is what a document assembler wants instead: `required` lifted onto
//! the parent object, nullability as `oneOf [T, null]`, and the engine's
//! extra facets under `x-` keys.
use serde_json::{Map, Value, json};

use crate::ir::{SchemaNode, Ty};

pub fn schema(node: &SchemaNode) -> Value {
    let core = core_schema(node);
    if node.nullable {
        nullable(core)
    } else {
        core
    }
}

fn nullable(inner: Value) -> Value {
    json!({ "oneOf": [inner, { "type": "null" }] })
}

fn core_schema(node: &SchemaNode) -> Value {
    let mut o = match &node.ty {
        Ty::Object { properties } => {
            let mut props = Map::new();
            let mut required = Vec::new();
            for (name, child) in properties {
                props.insert(name.clone(), schema(child));
                if child.required && !child.conditional {
                    required.push(Value::from(name.as_str()));
                }
            }
            let mut o = json!({ "type": "object", "properties": Value::Object(props) });
            if !required.is_empty() {
                o["required"] = Value::Array(required);
            }
            o
        }
        Ty::Array { items } => json!({ "type": "array", "items": schema(items) }),
        // Emit oneOf over the variants as given; the engine already flattened them.
        Ty::Union { variants } => json!({ "oneOf": variants.iter().map(schema).collect::<Vec<_>>() }),
        _ => json!({ "type": node.kind().as_str() }),
    };

    let c = &node.constraints;
    if let Some(f) = node.format { o["format"] = Value::from(f.as_str()); }
    if !node.enum_values.is_empty() {
        o["enum"] = Value::Array(node.enum_values.iter().map(|s| s.to_json()).collect());
    }
    if let Some(rx) = &c.pattern { o["pattern"] = Value::from(rx.clone()); }
    if let Some(n) = c.min_length { o["minLength"] = Value::from(n); }
    if let Some(n) = c.max_length { o["maxLength"] = Value::from(n); }
    if let Some(n) = c.minimum { o["minimum"] = number(n); }
    if let Some(n) = c.maximum { o["maximum"] = number(n); }
    if let Some(n) = c.min_items { o["minItems"] = Value::from(n); }
    if let Some(n) = c.max_items { o["maxItems"] = Value::from(n); }
    if let Some(t) = &node.title { o["title"] = Value::from(t.clone()); }
    if let Some(d) = &node.description { o["description"] = Value::from(d.clone()); }
    if node.deprecated { o["deprecated"] = Value::Bool(true); }
    if let Some(ex) = &node.example { o["example"] = ex.clone(); }
    if node.conditional { o["x-conditional"] = Value::Bool(true); }
    if !node.conditional_requirements.is_empty() {
        o["x-conditional-requirements"] = serde_json::to_value(&node.conditional_requirements).unwrap_or(Value::Null);
    }
    o
}

/// `5.0` prints as `5`.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Constraints, Format, Properties};
    use pretty_assertions::assert_eq;

    #[test]
    fn required_is_lifted_and_nullable_wraps() {
        let mut props = Properties::new();
        props.insert("id".into(), SchemaNode::integer().with_required(true));
        props.insert("email".into(), SchemaNode::string().with_format(Format::Email).with_nullable(true));
        props.insert(
            "secret".into(),
            SchemaNode::string().with_required(true).with_conditional(true),
        );
        let out = schema(&SchemaNode::object(props));
        assert_eq!(
            out,
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer" },
                    "email": { "oneOf": [{ "type": "string", "format": "email" }, { "type": "null" }] },
                    "secret": { "type": "string", "x-conditional": true }
                },
                "required": ["id"]
            })
        );
    }

    #[test]
    fn bounds_print_as_integers_when_whole() {
        let node = SchemaNode::integer().with_constraints(Constraints {
            minimum: Some(1.0),
            maximum: Some(10.0),
            ..Constraints::default()
        });
        assert_eq!(schema(&node), json!({ "type": "integer", "minimum": 1, "maximum": 10 }));
    }
}
