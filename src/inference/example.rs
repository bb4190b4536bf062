//! Bottom-up example synthesis. Explicit examples are kept; every other node
//! gets a value derived from its enum, format, pattern or kind.
use serde_json::{Map, Value, json};

use super::str::example_from_pattern;
use crate::ir::{Format, SchemaNode, Ty};

/// Fills `example` on `node` and every descendant; returns the root example.
pub fn synthesize(node: &mut SchemaNode) -> Value {
    let derived = if node.is_scalar() {
        scalar_example(node)
    } else {
        match &mut node.ty {
            Ty::Object { properties } => {
                let mut map = Map::new();
                for (name, child) in properties.iter_mut() {
                    map.insert(name.clone(), synthesize(child));
                }
                Value::Object(map)
            }
            Ty::Array { items } => Value::Array(vec![synthesize(items)]),
            Ty::Union { variants } => {
                let mut first = None;
                for variant in variants.iter_mut() {
                    let value = synthesize(variant);
                    first.get_or_insert(value);
                }
                first.unwrap_or(Value::Null)
            }
            _ => Value::Null,
        }
    };
    node.example.get_or_insert(derived).clone()
}

fn scalar_example(node: &SchemaNode) -> Value {
    if let Some(first) = node.enum_values.first() {
        return first.to_json();
    }
    let c = &node.constraints;
    match node.ty {
        Ty::Integer => {
            let n = c.minimum.map(|m| m.ceil() as i64).unwrap_or(1);
            match c.maximum.map(|m| m.floor() as i64) {
                Some(max) if n > max => json!(max),
                _ => json!(n),
            }
        }
        Ty::Number => {
            let n = c.minimum.map(|m| m + 0.5).unwrap_or(1.5);
            match (c.minimum, c.maximum) {
                (Some(min), Some(max)) if n > max => json!((min + max) / 2.0),
                (None, Some(max)) if n > max => json!(max),
                _ => json!(n),
            }
        }
        Ty::Boolean => json!(true),
        _ => Value::String(string_example(node)),
    }
}

fn string_example(node: &SchemaNode) -> String {
    if let Some(pattern) = &node.constraints.pattern {
        if let Some(example) = example_from_pattern(pattern) {
            return example;
        }
    }
    let text = match node.format {
        Some(Format::Email) => "user@example.com",
        Some(Format::Uri) => "https://example.com",
        Some(Format::Uuid) => "123e4567-e89b-12d3-a456-426614174000",
        Some(Format::DateTime) => "2024-01-01T00:00:00Z",
        Some(Format::Date) => "2024-01-01",
        Some(Format::Time) => "12:00:00",
        Some(Format::Password) => "secret-password",
        Some(Format::Binary) => "file.bin",
        Some(Format::Hostname) => "example.com",
        Some(Format::Json) => "{}",
        Some(Format::Ipv4) => "192.168.0.1",
        Some(Format::Ipv6) => "2001:db8::1",
        _ => "string",
    };
    let mut out = text.to_string();
    if node.format.is_none() {
        if let Some(min) = node.constraints.min_length {
            while (out.len() as u64) < min {
                out.push('a');
            }
        }
        if let Some(max) = node.constraints.max_length {
            out.truncate(max as usize);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Constraints, Properties, Scalar};
    use pretty_assertions::assert_eq;

    #[test]
    fn objects_compose_child_examples() {
        let mut props = Properties::new();
        props.insert("email".into(), SchemaNode::string().with_format(Format::Email));
        props.insert("age".into(), SchemaNode::integer().with_constraints(Constraints {
            minimum: Some(18.0),
            ..Constraints::default()
        }));
        props.insert("role".into(), SchemaNode::string().with_enum(vec![Scalar::String("admin".into())]));
        props.insert("tags".into(), SchemaNode::array(SchemaNode::string()));
        props.insert("nick".into(), SchemaNode::string().with_example(json!("neo")));
        let mut node = SchemaNode::object(props);

        let example = synthesize(&mut node);
        assert_eq!(
            example,
            json!({
                "email": "user@example.com",
                "age": 18,
                "role": "admin",
                "tags": ["string"],
                "nick": "neo"
            })
        );
        assert_eq!(node.property("age").and_then(|a| a.example.clone()), Some(json!(18)));
    }

    #[test]
    fn length_bounds_shape_plain_strings() {
        let mut code = SchemaNode::string().with_constraints(Constraints {
            min_length: Some(8),
            ..Constraints::default()
        });
        assert_eq!(synthesize(&mut code), json!("stringaa"));
        let mut short = SchemaNode::string().with_constraints(Constraints {
            max_length: Some(3),
            ..Constraints::default()
        });
        assert_eq!(synthesize(&mut short), json!("str"));
    }

    #[test]
    fn numeric_examples_stay_within_bounds() {
        let bounded = |ty: SchemaNode, minimum: Option<f64>, maximum: Option<f64>| {
            ty.with_constraints(Constraints { minimum, maximum, ..Constraints::default() })
        };
        assert_eq!(synthesize(&mut bounded(SchemaNode::integer(), None, Some(-1.0))), json!(-1));
        assert_eq!(synthesize(&mut bounded(SchemaNode::integer(), Some(3.0), Some(10.0))), json!(3));
        assert_eq!(synthesize(&mut bounded(SchemaNode::number(), Some(0.0), Some(0.1))), json!(0.05));
        assert_eq!(synthesize(&mut bounded(SchemaNode::number(), None, Some(0.25))), json!(0.25));
        assert_eq!(synthesize(&mut bounded(SchemaNode::number(), Some(2.0), None)), json!(2.5));
    }

    #[test]
    fn placeholders_become_empty_objects() {
        let mut node = SchemaNode::circular("User");
        assert_eq!(synthesize(&mut node), json!({}));
    }
}
