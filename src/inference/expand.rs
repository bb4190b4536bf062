//! Dotted field paths → nested schema.
//!
//! `items.*.name` is an object with an `items` array whose elements are
//! objects with a `name`. Paths are applied in order; a node created by an
//! earlier path is refined (merged), never replaced.
use super::arr::is_placeholder_items;
use super::merge;
use super::rules::{RuleSet, interpret};
use crate::ir::{Properties, SchemaNode, Ty};

fn build(segments: &[&str], leaf: SchemaNode) -> SchemaNode {
    match segments.split_first() {
        None => leaf,
        Some((&"*", rest)) => SchemaNode::array(build(rest, leaf)),
        Some((name, rest)) => {
            let mut props = Properties::new();
            props.insert(name.to_string(), build(rest, leaf));
            SchemaNode::object(props)
        }
    }
}

/// Turns `node` into an array, keeping its flags and any known element shape.
fn ensure_array(node: &mut SchemaNode) {
    if !matches!(node.ty, Ty::Array { .. }) {
        node.ty = Ty::Array { items: Box::new(SchemaNode::string()) };
        node.format = None;
        node.enum_values.clear();
    }
}

fn ensure_object(node: &mut SchemaNode) {
    if !matches!(node.ty, Ty::Object { .. }) {
        node.ty = Ty::Object { properties: Properties::new() };
        node.format = None;
        node.enum_values.clear();
        node.example = None;
    }
}

fn insert(node: &mut SchemaNode, segments: &[&str], leaf: SchemaNode) {
    let Some((head, rest)) = segments.split_first() else {
        *node = merge(node, &leaf);
        return;
    };
    if *head == "*" {
        ensure_array(node);
        if let Ty::Array { items } = &mut node.ty {
            if is_placeholder_items(items) {
                **items = build(rest, leaf);
            } else {
                insert(items, rest, leaf);
            }
        }
        return;
    }
    // `tags.name` on a structured list addresses the element
    if let Ty::Array { items } = &mut node.ty {
        if matches!(items.ty, Ty::Object { .. }) {
            insert(items, segments, leaf);
            return;
        }
    }
    ensure_object(node);
    if let Ty::Object { properties } = &mut node.ty {
        match properties.get_mut(*head) {
            Some(child) => insert(child, rest, leaf),
            None => {
                properties.insert(head.to_string(), build(rest, leaf));
            }
        }
    }
}

/// Folds `(path, fragment)` pairs into one object schema.
pub fn expand<I, S>(fragments: I) -> SchemaNode
where
    I: IntoIterator<Item = (S, SchemaNode)>,
    S: AsRef<str>,
{
    let mut root = SchemaNode::empty_object();
    for (path, fragment) in fragments {
        let segments: Vec<&str> = path.as_ref().split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            continue;
        }
        insert(&mut root, &segments, fragment);
    }
    root
}

/// Interprets every field's tokens, then expands the paths. `confirmed` adds
/// a required `<leaf>_confirmation` sibling of the same shape.
pub fn expand_rule_set(rules: &RuleSet) -> SchemaNode {
    let mut fragments: Vec<(String, SchemaNode)> = Vec::with_capacity(rules.len());
    for (path, tokens) in rules {
        let out = interpret(tokens);
        if out.confirmed {
            let mut twin = out.node.clone();
            twin.required = true;
            twin.conditional_requirements.clear();
            fragments.push((path.clone(), out.node));
            fragments.push((format!("{path}_confirmation"), twin));
        } else {
            fragments.push((path.clone(), out.node));
        }
    }
    expand(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::rules::parse_pipe;
    use crate::ir::{Format, Kind};
    use pretty_assertions::assert_eq;

    fn rules(pairs: &[(&str, &str)]) -> RuleSet {
        pairs.iter().map(|(k, v)| (k.to_string(), parse_pipe(v))).collect()
    }

    #[test]
    fn wildcard_paths_build_arrays_of_objects() {
        let out = expand_rule_set(&rules(&[
            ("items", "required|array|min:1"),
            ("items.*.name", "required|string"),
            ("items.*.qty", "integer|min:1"),
        ]));
        let items = out.property("items").expect("items");
        assert_eq!(items.kind(), Kind::Array);
        assert!(items.required);
        assert_eq!(items.constraints.min_items, Some(1));
        let element = items.items().expect("element");
        assert_eq!(element.property("name"), Some(&SchemaNode::string().with_required(true)));
        assert_eq!(element.property("qty").map(|q| q.kind()), Some(Kind::Integer));
    }

    #[test]
    fn children_before_parents_still_nest() {
        let out = expand_rule_set(&rules(&[("meta.title", "string"), ("meta", "required|array")]));
        let meta = out.property("meta").expect("meta");
        assert!(meta.required);
        assert_eq!(meta.kind(), Kind::Object);
        assert!(meta.property("title").is_some());
    }

    #[test]
    fn scalar_element_lists() {
        let out = expand_rule_set(&rules(&[("tags", "array"), ("tags.*", "string|max:20")]));
        let tags = out.property("tags").expect("tags");
        assert_eq!(tags.items().and_then(|i| i.constraints.max_length), Some(20));
    }

    #[test]
    fn nested_wildcards() {
        let out = expand_rule_set(&rules(&[("matrix.*.*", "integer")]));
        let inner = out
            .property("matrix")
            .and_then(|m| m.items())
            .and_then(|m| m.items())
            .map(|i| i.kind());
        assert_eq!(inner, Some(Kind::Integer));
    }

    #[test]
    fn confirmed_adds_a_sibling() {
        let out = expand_rule_set(&rules(&[("password", "required|string|min:8|confirmed")]));
        let twin = out.property("password_confirmation").expect("confirmation");
        assert!(twin.required);
        assert_eq!(twin.constraints.min_length, Some(8));
    }

    #[test]
    fn later_paths_refine_earlier_ones() {
        let out = expand(vec![
            ("contact", SchemaNode::empty_object()),
            ("contact.email", SchemaNode::string().with_format(Format::Email)),
            ("contact", SchemaNode::string().with_required(true)),
        ]);
        let contact = out.property("contact").expect("contact");
        assert_eq!(contact.kind(), Kind::Object);
        assert!(contact.required);
        assert!(contact.property("email").is_some());
    }
}
