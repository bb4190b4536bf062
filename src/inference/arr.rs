use crate::ir::{SchemaNode, Ty};

/// An `array` we know nothing about beyond being a list: `items` is a bare string.
pub fn is_placeholder_array(node: &SchemaNode) -> bool {
    match &node.ty {
        Ty::Array { items } => is_placeholder_items(items),
        _ => false,
    }
}

/// Element schema nothing has been learned about yet.
pub fn is_placeholder_items(items: &SchemaNode) -> bool {
    items.is_bare_string() && !items.required && !items.nullable && items.description.is_none()
}

pub(super) fn merge_items(a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
    super::merge(a, b)
}

/// Flattens nested unions and drops exact duplicates; one variant collapses.
pub fn union_of(variants: Vec<SchemaNode>) -> SchemaNode {
    let mut flat: Vec<SchemaNode> = Vec::with_capacity(variants.len());
    for v in variants {
        let members = match v.ty {
            Ty::Union { variants } => variants,
            _ => vec![v],
        };
        for m in members {
            if !flat.contains(&m) {
                flat.push(m);
            }
        }
    }
    match flat.len() {
        1 => flat.remove(0),
        _ => SchemaNode::union(flat),
    }
}
