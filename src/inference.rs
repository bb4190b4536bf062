//! Schema inference engine.
//!
//! Point it at a [`SourceIndex`], name a subject (a class, or a method on
//! one) and ask for its input or output schema. Inference never fails: every
//! component that gives up hands over to the next fallback tier, and the last
//! tier always answers.
//!
//! Layout:
//! - `rules`, `rule_extract`, `expand`: validation rules → input schema.
//! - `shape`: literal arrays in method bodies → output schema.
//! - `metadata`: decorators, typed fields and doc-blocks.
//! - `compose`: tier ordering, cycle guard, memoization.
//! - `obj`, `arr`: structural merges used by all of the above.
pub mod arr;
pub mod cache;
mod compose;
pub mod example;
pub mod expand;
pub mod metadata;
pub mod num;
pub mod obj;
pub mod rule_extract;
pub mod rules;
pub mod shape;
pub mod str;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{InferError, Result};
use crate::heuristics::Heuristics;
use crate::ir::{ConditionalRequirement, Constraints, SchemaNode, Ty};
use crate::source::ast::{ClassDecl, MethodDecl};
use crate::source::resolver::short_name;
use crate::source::{FileContext, SourceIndex, SymbolResolver};

pub use crate::config::InferConfig;
pub use cache::{CacheStats, SchemaCache};
pub use expand::{expand, expand_rule_set};
pub use rules::{RuleSet, RuleToken, interpret};

use compose::Composer;

// -------------------------------- Merge (⊔) -------------------------------- //

/// Refines `existing` with what `incoming` knows.
///
/// Flags only ever turn on. Composites of the same kind merge child-wise; a
/// scalar never flattens a known structure; otherwise the incoming kind wins
/// and keeps whatever facets it does not set itself.
pub fn merge(existing: &SchemaNode, incoming: &SchemaNode) -> SchemaNode {
    let mut out = match (&existing.ty, &incoming.ty) {
        (Ty::Object { properties: a }, Ty::Object { properties: b }) => {
            overlay(existing, incoming, Ty::Object { properties: obj::merge_properties(a, b) })
        }
        (Ty::Array { items: a }, Ty::Array { items: b }) => {
            let items = if arr::is_placeholder_items(b) {
                (**a).clone()
            } else if arr::is_placeholder_items(a) {
                (**b).clone()
            } else {
                arr::merge_items(a, b)
            };
            overlay(existing, incoming, Ty::Array { items: Box::new(items) })
        }
        (Ty::Union { variants: a }, Ty::Union { variants: b }) => {
            let joined = arr::union_of(a.iter().chain(b).cloned().collect());
            overlay(existing, incoming, joined.ty)
        }
        (Ty::Object { .. }, Ty::Array { .. }) if arr::is_placeholder_array(incoming) => keep_structure(existing, incoming),
        (Ty::Array { .. }, Ty::Object { .. }) if arr::is_placeholder_array(existing) => {
            overlay(existing, incoming, incoming.ty.clone())
        }
        _ if !existing.is_scalar() && incoming.is_scalar() => keep_structure(existing, incoming),
        _ => overlay(existing, incoming, incoming.ty.clone()),
    };
    out.required = existing.required || incoming.required;
    out.nullable = existing.nullable || incoming.nullable;
    out.deprecated = existing.deprecated || incoming.deprecated;
    out.conditional = existing.conditional || incoming.conditional;
    out.conditional_requirements = join_requirements(&existing.conditional_requirements, &incoming.conditional_requirements);
    out
}

/// Node of type `ty`, incoming facets first.
fn overlay(existing: &SchemaNode, incoming: &SchemaNode, ty: Ty) -> SchemaNode {
    let same_kind = existing.kind() == incoming.kind();
    SchemaNode {
        format: if same_kind { incoming.format.or(existing.format) } else { incoming.format },
        enum_values: match (incoming.enum_values.is_empty(), same_kind) {
            (false, _) => incoming.enum_values.clone(),
            (true, true) => existing.enum_values.clone(),
            (true, false) => Vec::new(),
        },
        example: if same_kind { incoming.example.clone().or_else(|| existing.example.clone()) } else { incoming.example.clone() },
        description: incoming.description.clone().or_else(|| existing.description.clone()),
        title: incoming.title.clone().or_else(|| existing.title.clone()),
        constraints: join_constraints(&existing.constraints, &incoming.constraints),
        ..SchemaNode::new(ty)
    }
}

/// `existing`'s structure with `incoming`'s annotations.
fn keep_structure(existing: &SchemaNode, incoming: &SchemaNode) -> SchemaNode {
    SchemaNode {
        description: incoming.description.clone().or_else(|| existing.description.clone()),
        constraints: join_constraints(&existing.constraints, &incoming.constraints),
        ..existing.clone()
    }
}

fn join_constraints(a: &Constraints, b: &Constraints) -> Constraints {
    Constraints {
        min_length: b.min_length.or(a.min_length),
        max_length: b.max_length.or(a.max_length),
        minimum: b.minimum.or(a.minimum),
        maximum: b.maximum.or(a.maximum),
        min_items: b.min_items.or(a.min_items),
        max_items: b.max_items.or(a.max_items),
        pattern: b.pattern.clone().or_else(|| a.pattern.clone()),
    }
}

fn join_requirements(a: &[ConditionalRequirement], b: &[ConditionalRequirement]) -> Vec<ConditionalRequirement> {
    let mut out = a.to_vec();
    for r in b {
        if !out.contains(r) {
            out.push(r.clone());
        }
    }
    out
}

// --------------------------- Resolution context ---------------------------- //

/// Where a recursive call runs: whose imports, which `$this`, and which
/// subjects are already being expanded above it.
///
/// Never mutated in place; [`descend`](Self::descend) returns an extended
/// copy so sibling branches never see each other's guard entries.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    pub file: Arc<FileContext>,
    /// FQN `$this` refers to.
    pub class: Option<String>,
    /// FQN of the class whose code is being read (differs from `class` for
    /// inherited methods); `parent::` and `self` resolve against it.
    pub scope: Option<String>,
    pub guard: im::Vector<String>,
}

impl ResolutionContext {
    /// No file, no class, empty guard.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn for_class(class: &ClassDecl) -> Self {
        Self {
            file: class.file.clone(),
            class: Some(class.fqn.clone()),
            scope: Some(class.fqn.clone()),
            guard: im::Vector::new(),
        }
    }

    pub fn guard_position(&self, key: &str) -> Option<usize> {
        self.guard.iter().position(|k| k == key)
    }

    pub fn depth(&self) -> usize {
        self.guard.len()
    }

    /// One level deeper, inside `class`, with `key` guarded.
    pub fn descend(&self, key: &str, class: &ClassDecl) -> Self {
        let mut guard = self.guard.clone();
        guard.push_back(key.to_string());
        Self {
            file: class.file.clone(),
            class: Some(class.fqn.clone()),
            scope: Some(class.fqn.clone()),
            guard,
        }
    }

    /// Same `$this` and guard, reading code declared on `owner`.
    pub fn within(&self, owner: &ClassDecl) -> Self {
        Self {
            file: owner.file.clone(),
            scope: Some(owner.fqn.clone()),
            ..self.clone()
        }
    }

    pub fn resolver(&self) -> SymbolResolver<'_> {
        let resolver = self.file.resolver();
        match self.scope.as_deref() {
            Some(scope) => resolver.with_class(scope),
            None => resolver,
        }
    }
}

// --------------------------------- Engine ---------------------------------- //

/// A class, or one method of it.
#[derive(Debug, Clone)]
pub enum Subject {
    Class(Arc<ClassDecl>),
    Method { class: Arc<ClassDecl>, method: String },
}

impl Subject {
    pub fn class(&self) -> &Arc<ClassDecl> {
        match self {
            Subject::Class(class) | Subject::Method { class, .. } => class,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Subject::Class(class) => class.fqn.clone(),
            Subject::Method { class, method } => format!("{}@{}", class.fqn, method),
        }
    }
}

pub struct Inference {
    index: Arc<SourceIndex>,
    heuristics: Arc<Heuristics>,
    config: InferConfig,
    cache: SchemaCache,
}

impl Inference {
    pub fn new(index: Arc<SourceIndex>) -> Self {
        Self::with_config(index, InferConfig::default())
    }

    pub fn with_config(index: Arc<SourceIndex>, config: InferConfig) -> Self {
        let heuristics = if config.naming.is_empty() {
            Heuristics::standard().clone()
        } else {
            Heuristics::with_naming_rules(config.naming.clone())
        };
        Self { index, heuristics: Arc::new(heuristics), config, cache: SchemaCache::new() }
    }

    /// Swaps the lookup tables; cached results built with the old ones go.
    pub fn with_heuristics(mut self, heuristics: Arc<Heuristics>) -> Self {
        self.heuristics = heuristics;
        self.cache.clear();
        self
    }

    pub fn index(&self) -> &Arc<SourceIndex> {
        &self.index
    }

    pub fn config(&self) -> &InferConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn composer(&self) -> Composer<'_> {
        Composer::new(&self.index, &self.heuristics, &self.config, &self.cache)
    }

    /// `App\Http\UserController@show`, `UserController::show` or a bare class.
    /// Short names are accepted when exactly one indexed class carries them.
    pub fn subject(&self, target: &str) -> Result<Subject> {
        let target = target.trim();
        let (class_name, method) = match target.split_once('@').or_else(|| target.split_once("::")) {
            Some((c, m)) => (c, Some(m)),
            None => (target, None),
        };
        let class = self.find_class(class_name)?;
        match method {
            None => Ok(Subject::Class(class)),
            Some(m) => {
                let known = self.index.lineage(&class).iter().any(|c| c.method(m).is_some());
                if !known {
                    return Err(InferError::unresolved(format!("{}::{}", class.fqn, m)));
                }
                Ok(Subject::Method { class, method: m.to_string() })
            }
        }
    }

    fn find_class(&self, name: &str) -> Result<Arc<ClassDecl>> {
        let name = name.trim_start_matches('\\');
        if let Some(class) = self.index.class(name) {
            return Ok(class);
        }
        let mut candidates = self
            .index
            .classes()
            .into_iter()
            .filter(|c| c.name.eq_ignore_ascii_case(short_name(name)));
        match (candidates.next(), candidates.next()) {
            (Some(class), None) => Ok(class),
            _ => Err(InferError::unresolved(name)),
        }
    }

    fn method_of(&self, class: &Arc<ClassDecl>, name: &str) -> Option<(Arc<ClassDecl>, MethodDecl)> {
        self.index
            .lineage(class)
            .into_iter()
            .find_map(|c| c.method(name).cloned().map(|m| (c, m)))
    }

    /// Response schema of a class or method.
    pub fn infer_output_schema(&self, subject: &Subject) -> SchemaNode {
        debug!(subject = %subject.label(), "inferring output");
        let composer = self.composer();
        let class = subject.class();
        let ctx = ResolutionContext::for_class(class);
        let node = match subject {
            Subject::Class(_) => composer.class_output(class, &ctx),
            Subject::Method { method, .. } => match self.method_of(class, method) {
                Some((owner, decl)) => composer.method_output(class, &owner, &decl, &ctx),
                None => self.heuristics.defaults.method_output(method),
            },
        };
        self.finish(node)
    }

    /// Request schema of a method (or of a data/form-request class). A
    /// supplied rule set takes priority over everything found in source.
    pub fn infer_input_schema(&self, subject: &Subject, rules: Option<&RuleSet>) -> SchemaNode {
        debug!(subject = %subject.label(), explicit_rules = rules.is_some(), "inferring input");
        let composer = self.composer();
        let class = subject.class();
        let ctx = ResolutionContext::for_class(class);
        let node = match subject {
            Subject::Class(_) => composer.class_input_schema(class, rules, &ctx),
            Subject::Method { method, .. } => match self.method_of(class, method) {
                Some((_, decl)) => composer.method_input(class, &decl, rules, &ctx),
                None => match rules {
                    Some(rules) => expand_rule_set(rules),
                    None => self.heuristics.defaults.method_input(method),
                },
            },
        };
        self.finish(node)
    }

    fn finish(&self, mut node: SchemaNode) -> SchemaNode {
        if self.config.synthesize_examples {
            example::synthesize(&mut node);
        }
        node
    }

    /// Fully-qualified name `short` refers to in `ctx`, spelled the way the
    /// declaring file spells it when the class is indexed.
    pub fn resolve_type(&self, short: &str, ctx: &ResolutionContext) -> String {
        let fqn = ctx.resolver().resolve_or_keep(short);
        self.index.class(&fqn).map(|c| c.fqn.clone()).unwrap_or(fqn)
    }

    /// Drops `path` from the index. Cached schemas may depend on it
    /// transitively, so the whole schema cache goes with it.
    pub fn invalidate(&self, path: &Path) {
        self.index.invalidate(path);
        self.cache.clear();
    }

    pub fn clear(&self) {
        self.index.clear();
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Format, Kind, Properties};
    use pretty_assertions::assert_eq;

    fn obj(pairs: Vec<(&str, SchemaNode)>) -> SchemaNode {
        SchemaNode::object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect::<Properties>())
    }

    #[test]
    fn objects_merge_key_wise_in_order() {
        let a = obj(vec![("id", SchemaNode::integer()), ("name", SchemaNode::string())]);
        let b = obj(vec![("name", SchemaNode::string().with_required(true)), ("email", SchemaNode::string())]);
        let out = merge(&a, &b);
        let keys: Vec<&str> = out.properties().map(|p| p.keys().map(String::as_str).collect()).unwrap_or_default();
        assert_eq!(keys, vec!["id", "name", "email"]);
        assert!(out.property("name").is_some_and(|n| n.required));
    }

    #[test]
    fn scalars_never_flatten_structure() {
        let a = obj(vec![("id", SchemaNode::integer())]);
        let out = merge(&a, &SchemaNode::string().with_required(true).with_description("the thing"));
        assert_eq!(out.kind(), Kind::Object);
        assert!(out.required);
        assert_eq!(out.description.as_deref(), Some("the thing"));
    }

    #[test]
    fn known_items_survive_placeholder_lists() {
        let a = SchemaNode::array(SchemaNode::integer());
        let out = merge(&a, &SchemaNode::array(SchemaNode::string()).with_nullable(true));
        assert_eq!(out.items().map(|i| i.kind()), Some(Kind::Integer));
        assert!(out.nullable);
    }

    #[test]
    fn scalar_refinement_keeps_format_of_same_kind() {
        let a = SchemaNode::string().with_format(Format::Email);
        let out = merge(&a, &SchemaNode::string().with_required(true));
        assert_eq!(out, SchemaNode::string().with_format(Format::Email).with_required(true));
        let out = merge(&a, &SchemaNode::integer());
        assert_eq!(out, SchemaNode::integer());
    }

    #[test]
    fn guard_is_per_branch() {
        let root = ResolutionContext::detached();
        let class = crate::source::parse_source(Path::new("a.php"), "<?php\nnamespace App;\nclass A {}\n")
            .expect("fixture parses")
            .classes[0]
            .clone();
        let left = root.descend("out:app\\a", &class);
        assert_eq!(left.guard_position("out:app\\a"), Some(0));
        assert_eq!(root.guard_position("out:app\\a"), None);
        assert_eq!(left.class.as_deref(), Some("App\\A"));
    }
}
