use crate::ir::{Properties, SchemaNode};

/// Keys of `a` in their order, then keys only `b` has; shared keys merge.
pub(super) fn merge_properties(a: &Properties, b: &Properties) -> Properties {
    let mut out = Properties::with_capacity(a.len() + b.len());
    for (k, va) in a {
        let merged = match b.get(k) {
            Some(vb) => super::merge(va, vb),
            None => va.clone(),
        };
        out.insert(k.clone(), merged);
    }
    for (k, vb) in b {
        if !out.contains_key(k) {
            out.insert(k.clone(), vb.clone());
        }
    }
    out
}

/// Folds `extra` into `target`, merging shared keys.
pub fn extend_properties(target: &mut Properties, extra: Properties) {
    for (k, v) in extra {
        let merged = match target.get(&k) {
            Some(existing) => super::merge(existing, &v),
            None => v,
        };
        target.insert(k, merged);
    }
}

/// Same node with every property marked conditional and not required.
pub fn mark_conditional(properties: Properties, description: &str) -> Properties {
    properties
        .into_iter()
        .map(|(k, v)| {
            let v = SchemaNode {
                conditional: true,
                required: false,
                description: v.description.clone().or_else(|| Some(description.to_string())),
                ..v
            };
            (k, v)
        })
        .collect()
}
