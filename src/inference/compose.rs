//! Tiered orchestration: declarative → shape-from-body → name default.
//!
//! One `Composer` lives for one public inference call. Every recursion into
//! another class or method goes through [`Composer::guarded`], which owns
//! the cycle guard, the depth limit and the memo cache.
//!
//! Memoization rule: a result whose computation hit no guard entry and no
//! depth limit is the same in every context and is shared under its key. A
//! result that did hit one is only reused as a top-level answer, under a
//! separate `root:` key, since nested callers would expand it differently.
use std::cell::Cell;
use std::sync::Arc;

use tracing::{debug, trace};

use super::arr::union_of;
use super::cache::SchemaCache;
use super::expand::expand_rule_set;
use super::metadata::{DeclaredField, Direction, declared_fields, method_decorators};
use super::rule_extract::RuleExtractor;
use super::rules::RuleSet;
use super::shape::{ShapeAnalyzer, ShapeResolver};
use super::{InferConfig, ResolutionContext};
use crate::error::{InferError, Result};
use crate::heuristics::Heuristics;
use crate::ir::{Format, Kind, Properties, Scalar, SchemaNode};
use crate::source::SourceIndex;
use crate::source::ast::{ClassDecl, ClassKind, Expr, MethodDecl};
use crate::source::resolver::short_name;
use crate::source::types::TypeRef;

const DATE_TYPES: &[&str] = &[
    "carbon", "carbonimmutable", "carboninterface", "datetime", "datetimeimmutable", "datetimeinterface",
];
const FILE_TYPES: &[&str] = &["uploadedfile", "file", "splfileinfo"];
const COLLECTION_TYPES: &[&str] = &[
    "collection", "enumerable", "lazycollection", "lengthawarepaginator", "paginator", "cursorpaginator",
    "anonymousresourcecollection", "resourcecollection", "arrayobject", "traversable", "iterator", "generator",
];
/// Declared return types that say nothing about the payload.
const OPAQUE_RETURNS: &[&str] = &[
    "mixed", "void", "never", "null", "jsonresponse", "response", "responsable", "redirectresponse",
    "view", "jsonresource", "static", "self", "object", "callable",
];

pub(crate) struct Composer<'e> {
    index: &'e SourceIndex,
    heuristics: &'e Heuristics,
    config: &'e InferConfig,
    cache: &'e SchemaCache,
    /// Lowest guard index hit by the computation currently in progress.
    min_hit: Cell<usize>,
    /// Deepest guard level entered so far.
    reach: Cell<usize>,
}

impl<'e> Composer<'e> {
    pub fn new(index: &'e SourceIndex, heuristics: &'e Heuristics, config: &'e InferConfig, cache: &'e SchemaCache) -> Self {
        Self { index, heuristics, config, cache, min_hit: Cell::new(usize::MAX), reach: Cell::new(0) }
    }

    /// Cached result for `key` when reusing it at `depth` stays within the
    /// depth limit. Top-level calls also see `root:` entries.
    fn cached(&self, key: &str, root_key: Option<&str>, depth: usize) -> Option<SchemaNode> {
        let entry = self.cache.get(key).or_else(|| root_key.and_then(|k| self.cache.get(k)))?;
        if depth + entry.height >= self.config.max_depth {
            return None;
        }
        self.reach.set(self.reach.get().max(depth + entry.height));
        Some((*entry.node).clone())
    }

    fn note_hit(&self, position: usize) {
        self.min_hit.set(self.min_hit.get().min(position));
    }

    /// Runs `compute` one level deeper under `key`, or returns the terminal
    /// node when `key` is already being expanded or the depth limit is hit.
    fn guarded(
        &self,
        key: String,
        label: &str,
        class: &ClassDecl,
        ctx: &ResolutionContext,
        compute: impl FnOnce(&ResolutionContext) -> Option<SchemaNode>,
    ) -> Option<SchemaNode> {
        let key = key.to_ascii_lowercase();
        if let Some(position) = ctx.guard_position(&key) {
            debug!(%key, position, "cycle detected, emitting placeholder");
            self.note_hit(position);
            return Some(SchemaNode::circular(label));
        }
        let depth = ctx.depth();
        if depth >= self.config.max_depth {
            debug!(%key, depth, "depth limit reached");
            self.note_hit(0);
            return Some(
                SchemaNode::empty_object()
                    .with_title(label)
                    .with_description(format!("depth limit reached at {label}")),
            );
        }
        let root_key = (depth == 0).then(|| format!("root:{key}"));
        if let Some(hit) = self.cached(&key, root_key.as_deref(), depth) {
            trace!(%key, "cache hit");
            return Some(hit);
        }

        let inner = ctx.descend(&key, class);
        let outer_hit = self.min_hit.replace(usize::MAX);
        let outer_reach = self.reach.replace(depth);
        let out = compute(&inner);
        let hit = self.min_hit.get();
        let height = self.reach.get() - depth;
        self.min_hit.set(outer_hit.min(hit));
        self.reach.set(outer_reach.max(depth + height));

        if let Some(node) = &out {
            match (hit, root_key) {
                (usize::MAX, _) => self.cache.insert(key, node.clone(), height),
                (_, Some(root_key)) => self.cache.insert(root_key, node.clone(), height),
                _ => {}
            }
        }
        out
    }

    // -------------------------------- Output -------------------------------- //

    pub fn class_output(&self, class: &Arc<ClassDecl>, ctx: &ResolutionContext) -> SchemaNode {
        let key = format!("out:{}", class.fqn);
        self.guarded(key, &class.name, class, ctx, |ctx| Some(self.class_output_tiers(class, ctx)))
            .unwrap_or_else(|| self.heuristics.defaults.class_output(&class.name))
    }

    fn class_output_tiers(&self, class: &Arc<ClassDecl>, ctx: &ResolutionContext) -> SchemaNode {
        if class.kind == ClassKind::Enum {
            return enum_schema(class);
        }
        let lineage = self.index.lineage(class);

        if let Some(node) = self.declarative(&lineage, Direction::Output, ctx) {
            debug!(class = %class.fqn, tier = "declarative", "class output");
            return node.with_title(&class.name);
        }

        for owner in &lineage {
            for name in &self.config.shape_methods {
                let Some(method) = owner.method(name) else { continue };
                let scoped = ctx.within(owner);
                match ShapeAnalyzer::new(self.heuristics, self, &scoped).analyze_body(&method.body) {
                    Ok(node) => {
                        debug!(class = %class.fqn, method = %method.name, tier = "shape", "class output");
                        return titled(node, &class.name);
                    }
                    Err(error) => debug!(class = %class.fqn, %error, "shape tier gave up"),
                }
            }
        }

        if let Some(node) = self.guess_collection(class, ctx) {
            debug!(class = %class.fqn, tier = "collection guess", "class output");
            return node;
        }
        debug!(class = %class.fqn, tier = "default", "class output");
        self.heuristics.defaults.class_output(&class.name)
    }

    /// `UserCollection` with no shape of its own: a list of `UserResource` or `User`.
    fn guess_collection(&self, class: &ClassDecl, ctx: &ResolutionContext) -> Option<SchemaNode> {
        let stem = class.name.strip_suffix("Collection").filter(|s| !s.is_empty())?;
        let resolver = class.file.resolver();
        [format!("{stem}Resource"), stem.to_string()]
            .iter()
            .find_map(|candidate| self.index.class(&resolver.resolve_or_keep(candidate)))
            .map(|element| SchemaNode::array(self.class_output(&element, ctx)))
    }

    /// Output of `method` (declared on `owner`) called on `this`, falling
    /// back to the name default.
    pub fn method_output(
        &self,
        this: &Arc<ClassDecl>,
        owner: &Arc<ClassDecl>,
        method: &MethodDecl,
        ctx: &ResolutionContext,
    ) -> SchemaNode {
        self.method_output_known(this, owner, method, ctx).unwrap_or_else(|| {
            debug!(class = %this.fqn, method = %method.name, tier = "default", "method output");
            self.heuristics.defaults.method_output(&method.name)
        })
    }

    /// Tiers 1 and 2 for `method` declared on `owner`, called on `this`.
    fn method_output_known(
        &self,
        this: &Arc<ClassDecl>,
        owner: &Arc<ClassDecl>,
        method: &MethodDecl,
        ctx: &ResolutionContext,
    ) -> Option<SchemaNode> {
        let key = format!("out:{}@{}", owner.fqn, method.name);
        let label = format!("{}::{}", owner.name, method.name);
        self.guarded(key, &label, this, ctx, |ctx| {
            let ctx = ctx.within(owner);
            let decorated = method_decorators(method, Direction::Output);
            if !decorated.is_empty() {
                debug!(method = %label, tier = "declarative", "method output");
                return Some(self.fields_object(&decorated, Direction::Output, &ctx));
            }
            if let Some(ty) = declared_return(method).filter(|t| informative(t)) {
                debug!(method = %label, ty = %ty.display(), tier = "declarative", "method output");
                return Some(self.type_ref(&ty, Direction::Output, &ctx));
            }
            match ShapeAnalyzer::new(self.heuristics, self, &ctx).analyze_body(&method.body) {
                Ok(node) => {
                    debug!(method = %label, tier = "shape", "method output");
                    Some(node)
                }
                Err(error) => {
                    debug!(method = %label, %error, "shape tier gave up");
                    None
                }
            }
        })
    }

    // -------------------------------- Input --------------------------------- //

    pub fn method_input(
        &self,
        class: &Arc<ClassDecl>,
        method: &MethodDecl,
        explicit: Option<&RuleSet>,
        ctx: &ResolutionContext,
    ) -> SchemaNode {
        let label = format!("{}::{}", class.name, method.name);
        if let Some(rules) = explicit {
            debug!(method = %label, fields = rules.len(), "input from supplied rules");
            return expand_rule_set(rules);
        }
        if let Some(rules) = RuleExtractor::new(self.index).for_method(class, method) {
            debug!(method = %label, fields = rules.len(), "input from discovered rules");
            return expand_rule_set(&rules);
        }
        let decorated = method_decorators(method, Direction::Input);
        if !decorated.is_empty() {
            debug!(method = %label, tier = "declarative", "method input");
            return self.fields_object(&decorated, Direction::Input, ctx);
        }
        let resolver = ctx.resolver();
        for param in &method.params {
            let Some(name) = param.ty.as_ref().and_then(TypeRef::without_null).and_then(|t| t.base_name()) else {
                continue;
            };
            if is_builtin(&name) {
                continue;
            }
            let Some(dto) = self.index.class(&resolver.resolve_or_keep(&name)) else { continue };
            if let Some(node) = self.class_input(&dto, ctx) {
                debug!(method = %label, dto = %dto.fqn, tier = "declarative", "method input");
                return node;
            }
        }
        debug!(method = %label, tier = "default", "method input");
        self.heuristics.defaults.method_input(&method.name)
    }

    /// Input of a class used as a request payload: supplied rules, its own
    /// `rules()`, then its declared fields.
    pub fn class_input_schema(&self, class: &Arc<ClassDecl>, explicit: Option<&RuleSet>, ctx: &ResolutionContext) -> SchemaNode {
        if let Some(rules) = explicit {
            return expand_rule_set(rules);
        }
        if let Some(rules) = RuleExtractor::new(self.index).from_rules_method(class, 0) {
            debug!(class = %class.fqn, fields = rules.len(), "input from rules()");
            return expand_rule_set(&rules);
        }
        self.class_input(class, ctx)
            .unwrap_or_else(|| SchemaNode::empty_object().with_title(&class.name))
    }

    /// Declared input fields of a data class, if it declares any.
    fn class_input(&self, class: &Arc<ClassDecl>, ctx: &ResolutionContext) -> Option<SchemaNode> {
        let key = format!("in:{}", class.fqn);
        self.guarded(key, &class.name, class, ctx, |ctx| {
            if class.kind == ClassKind::Enum {
                return Some(enum_schema(class));
            }
            let lineage = self.index.lineage(class);
            self.declarative(&lineage, Direction::Input, ctx).map(|n| n.with_title(&class.name))
        })
    }

    // ----------------------------- Declarations ----------------------------- //

    fn declarative(&self, lineage: &[Arc<ClassDecl>], direction: Direction, ctx: &ResolutionContext) -> Option<SchemaNode> {
        let fields = declared_fields(lineage, direction);
        (!fields.is_empty()).then(|| self.fields_object(&fields, direction, ctx))
    }

    fn fields_object(&self, fields: &[DeclaredField], direction: Direction, ctx: &ResolutionContext) -> SchemaNode {
        let props: Properties = fields
            .iter()
            .map(|f| (f.name.clone(), self.field_node(f, direction, ctx)))
            .collect();
        SchemaNode::object(props)
    }

    fn field_node(&self, field: &DeclaredField, direction: Direction, ctx: &ResolutionContext) -> SchemaNode {
        let by_name = self.heuristics.naming.lookup(&field.name);
        let mut node = match &field.ty {
            Some(ty) => self.type_ref(ty, direction, ctx),
            None => by_name.clone().unwrap_or_else(SchemaNode::string),
        };
        // `string $email` is still an email
        if node.kind() == Kind::String && node.format.is_none() && node.enum_values.is_empty() {
            if let Some(hint) = by_name.filter(|n| n.kind() == Kind::String) {
                node.format = hint.format;
            }
        }
        if let Some(format) = field.format {
            node.format = Some(format);
        }
        node.required = field.required;
        node.nullable |= field.nullable;
        node.deprecated |= field.deprecated;
        if field.example.is_some() {
            node.example = field.example.clone();
        }
        if field.description.is_some() {
            node.description = field.description.clone();
        }
        if !field.enum_values.is_empty() {
            node.enum_values = field.enum_values.clone();
        }
        node
    }

    // --------------------------------- Types -------------------------------- //

    /// Schema of a declared type. Class types recurse under the guard.
    pub fn type_ref(&self, ty: &TypeRef, direction: Direction, ctx: &ResolutionContext) -> SchemaNode {
        match ty {
            TypeRef::Nullable(inner) => self.type_ref(inner, direction, ctx).with_nullable(true),
            TypeRef::Union(members) => {
                let nullable = members.iter().any(TypeRef::is_null);
                let rest: Vec<&TypeRef> = members.iter().filter(|m| !m.is_null()).collect();
                let node = if !rest.is_empty() && rest.iter().all(|m| matches!(m, TypeRef::Literal(_))) {
                    literal_enum(&rest)
                } else {
                    let variants: Vec<SchemaNode> = rest.iter().map(|m| self.type_ref(m, direction, ctx)).collect();
                    match variants.len() {
                        0 => SchemaNode::string(),
                        _ => union_of(variants),
                    }
                };
                if nullable { node.with_nullable(true) } else { node }
            }
            TypeRef::Intersection(members) => match members.first() {
                Some(first) => self.type_ref(first, direction, ctx),
                None => SchemaNode::empty_object(),
            },
            TypeRef::List(inner) => SchemaNode::array(self.type_ref(inner, direction, ctx)),
            TypeRef::Shape(entries) => {
                let props: Properties = entries
                    .iter()
                    .map(|e| (e.key.clone(), self.type_ref(&e.ty, direction, ctx).with_required(!e.optional)))
                    .collect();
                SchemaNode::object(props)
            }
            TypeRef::Literal(value) => literal_enum(&[ty]).with_nullable(matches!(value, Scalar::Null)),
            TypeRef::Named { name, args } => self.named_type(name, args, direction, ctx),
        }
    }

    fn named_type(&self, name: &str, args: &[TypeRef], direction: Direction, ctx: &ResolutionContext) -> SchemaNode {
        let lower = name.trim_start_matches('\\').to_ascii_lowercase();
        let element = |ctx: &ResolutionContext| match args.last() {
            Some(arg) => self.type_ref(arg, direction, ctx),
            None => SchemaNode::string(),
        };
        match lower.as_str() {
            "int" | "integer" | "positive-int" | "negative-int" | "non-negative-int" | "non-positive-int" => {
                return SchemaNode::integer();
            }
            "float" | "double" => return SchemaNode::number().with_format(Format::Float),
            "numeric" => return SchemaNode::number(),
            "string" | "non-empty-string" | "numeric-string" | "class-string" | "lowercase-string" | "callable-string" => {
                return SchemaNode::string();
            }
            "bool" | "boolean" | "true" | "false" => return SchemaNode::boolean(),
            "array" | "list" | "iterable" | "non-empty-array" | "non-empty-list" => {
                return SchemaNode::array(element(ctx));
            }
            "object" | "stdclass" => return SchemaNode::empty_object(),
            "mixed" | "callable" | "closure" | "resource" => return SchemaNode::string(),
            "null" | "void" | "never" => return SchemaNode::string().with_nullable(true),
            _ => {}
        }
        let short = short_name(&lower);
        if DATE_TYPES.contains(&short) {
            return SchemaNode::string().with_format(Format::DateTime);
        }
        if FILE_TYPES.contains(&short) {
            return SchemaNode::string().with_format(Format::Binary);
        }
        if COLLECTION_TYPES.contains(&short) {
            return SchemaNode::array(element(ctx));
        }

        match self.resolve_class(name, ctx) {
            Ok(class) => match direction {
                Direction::Output => self.class_output(&class, ctx),
                Direction::Input => self
                    .class_input(&class, ctx)
                    .unwrap_or_else(|| SchemaNode::empty_object().with_title(&class.name)),
            },
            Err(error) => {
                debug!(%error, "falling back to name default");
                let short = short_name(name.trim_start_matches('\\'));
                match direction {
                    Direction::Output => titled(self.heuristics.defaults.class_output(short), short),
                    Direction::Input => SchemaNode::empty_object().with_title(short),
                }
            }
        }
    }

    fn resolve_class(&self, name: &str, ctx: &ResolutionContext) -> Result<Arc<ClassDecl>> {
        let resolved = ctx.resolver().resolve(name)?;
        self.index
            .class(&resolved.fqn)
            .ok_or_else(|| InferError::unresolved(resolved.fqn))
    }

    fn class_in_scope(&self, fqn: Option<&str>) -> Option<Arc<ClassDecl>> {
        self.index.class(fqn?)
    }
}

// ---------------------------- Resolver callbacks ---------------------------- //

impl ShapeResolver for Composer<'_> {
    fn class_output(&self, class_ref: &str, ctx: &ResolutionContext) -> Option<SchemaNode> {
        let class = self.resolve_class(class_ref, ctx).ok()?;
        Some(Composer::class_output(self, &class, ctx))
    }

    fn sibling_method(&self, name: &str, ctx: &ResolutionContext) -> Option<SchemaNode> {
        let this = self.class_in_scope(ctx.class.as_deref())?;
        let (owner, method) = self
            .index
            .lineage(&this)
            .into_iter()
            .find_map(|c| c.method(name).cloned().map(|m| (c, m)))?;
        self.method_output_known(&this, &owner, &method, ctx)
    }

    fn parent_method(&self, name: &str, ctx: &ResolutionContext) -> Option<SchemaNode> {
        let this = self.class_in_scope(ctx.class.as_deref())?;
        let scope = self.class_in_scope(ctx.scope.as_deref())?;
        let parent = self.class_in_scope(scope.parent.as_deref())?;
        let (owner, method) = self
            .index
            .lineage(&parent)
            .into_iter()
            .find_map(|c| c.method(name).cloned().map(|m| (c, m)))?;
        self.method_output_known(&this, &owner, &method, ctx)
    }

    fn this_property(&self, name: &str, ctx: &ResolutionContext) -> Option<SchemaNode> {
        let this = self.class_in_scope(ctx.class.as_deref())?;
        for owner in self.index.lineage(&this) {
            let scoped = ctx.within(&owner);
            if let Some(prop) = owner.property(name) {
                let ty = prop.ty.clone().or_else(|| prop.doc.as_ref().and_then(|d| d.var_type(Some(name))).cloned());
                if let Some(ty) = ty {
                    return Some(self.type_ref(&ty, Direction::Output, &scoped));
                }
            }
            let documented = owner
                .doc
                .as_ref()
                .and_then(|d| d.properties().find(|(n, _, _)| *n == name).and_then(|(_, ty, _)| ty.cloned()));
            if let Some(ty) = documented {
                return Some(self.type_ref(&ty, Direction::Output, &scoped));
            }
        }
        None
    }
}

// --------------------------------- Helpers ---------------------------------- //

fn titled(node: SchemaNode, title: &str) -> SchemaNode {
    if node.kind() == Kind::Object && node.title.is_none() {
        node.with_title(title)
    } else {
        node
    }
}

/// `@return` wins over the signature: it is usually the more precise one.
fn declared_return(method: &MethodDecl) -> Option<TypeRef> {
    method
        .doc
        .as_ref()
        .and_then(|d| d.return_type())
        .cloned()
        .or_else(|| method.return_type.clone())
}

fn informative(ty: &TypeRef) -> bool {
    match ty {
        TypeRef::Nullable(inner) => informative(inner),
        TypeRef::Union(members) => {
            let rest: Vec<&TypeRef> = members.iter().filter(|m| !m.is_null()).collect();
            !rest.is_empty() && rest.iter().all(|m| informative(m))
        }
        TypeRef::Intersection(members) => members.iter().any(informative),
        TypeRef::List(_) | TypeRef::Shape(_) | TypeRef::Literal(_) => true,
        TypeRef::Named { name, args } => {
            let lower = name.trim_start_matches('\\').to_ascii_lowercase();
            let short = short_name(&lower);
            if OPAQUE_RETURNS.contains(&short) {
                return false;
            }
            let bare_container = matches!(short, "array" | "iterable") || COLLECTION_TYPES.contains(&short);
            !(bare_container && args.is_empty())
        }
    }
}

fn is_builtin(lower: &str) -> bool {
    matches!(
        lower,
        "int" | "integer" | "float" | "string" | "bool" | "array" | "mixed" | "object" | "callable" | "iterable" | "request"
    ) || lower.ends_with("\\request")
}

fn literal_enum(members: &[&TypeRef]) -> SchemaNode {
    let values: Vec<Scalar> = members
        .iter()
        .filter_map(|m| match m {
            TypeRef::Literal(s) if *s != Scalar::Null => Some(s.clone()),
            _ => None,
        })
        .collect();
    let kind = match values.first() {
        Some(Scalar::Integer(_)) => Kind::Integer,
        Some(Scalar::Number(_)) => Kind::Number,
        Some(Scalar::Boolean(_)) => Kind::Boolean,
        _ => Kind::String,
    };
    SchemaNode::of_kind(kind).with_enum(values)
}

/// Backed enums list their values; pure enums their case names.
fn enum_schema(class: &ClassDecl) -> SchemaNode {
    let integral = class.enum_backing.as_deref() == Some("int");
    let values: Vec<Scalar> = class
        .cases
        .iter()
        .map(|case| match &case.value {
            Some(Expr::Int(i)) => Scalar::Integer(*i),
            Some(Expr::String(s)) => Scalar::String(s.clone()),
            _ => Scalar::String(case.name.clone()),
        })
        .collect();
    let node = if integral { SchemaNode::integer() } else { SchemaNode::string() };
    node.with_enum(values).with_title(&class.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_return_types_are_not_informative() {
        for raw in ["mixed", "array", "JsonResponse", "?\\Illuminate\\Http\\JsonResponse", "Collection", "void"] {
            let ty = TypeRef::parse(raw).expect(raw);
            assert!(!informative(&ty), "{raw}");
        }
        for raw in ["UserResource", "array<int, User>", "User[]", "bool", "array{id: int}", "Collection<int, User>"] {
            let ty = TypeRef::parse(raw).expect(raw);
            assert!(informative(&ty), "{raw}");
        }
    }

    #[test]
    fn literal_unions_become_enums() {
        let a = TypeRef::Literal(Scalar::String("draft".into()));
        let b = TypeRef::Literal(Scalar::String("live".into()));
        let node = literal_enum(&[&a, &b]);
        assert_eq!(node.kind(), Kind::String);
        assert_eq!(node.enum_values.len(), 2);
    }
}
