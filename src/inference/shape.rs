//! Output shape from a method body.
//!
//! The analyzer walks the body's `return` statements in source order and
//! pattern-matches each returned expression (literal arrays, response
//! wrappers, resource constructors, iterate-and-map calls). The first
//! return that yields a structure wins. Values inside a literal map are
//! typed from their expression, then from the key's name, then default to
//! `string`.
//!
//! Anything that needs another class (nested resources, sibling methods,
//! declared property types) goes through [`ShapeResolver`], which the
//! orchestrator implements under its cycle guard.
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use tracing::trace;

use super::ResolutionContext;
use super::merge;
use super::obj::{extend_properties, mark_conditional};
use super::str::date_format_example;
use crate::error::{InferError, Result};
use crate::heuristics::{ConditionalHelper, Heuristics, WrapperCondition};
use crate::ir::{Properties, SchemaNode};
use crate::source::ast::{Arg, ArrayItem, ClosureBody, Expr, Stmt};
use crate::source::resolver::short_name;

/// Callbacks into the orchestrator. `None` means "nothing known".
pub trait ShapeResolver {
    /// Output of the class written as `class_ref` in the current file.
    fn class_output(&self, class_ref: &str, ctx: &ResolutionContext) -> Option<SchemaNode>;
    /// Output of `$this->name()` on the current class.
    fn sibling_method(&self, name: &str, ctx: &ResolutionContext) -> Option<SchemaNode>;
    /// Output of `parent::name()`.
    fn parent_method(&self, name: &str, ctx: &ResolutionContext) -> Option<SchemaNode>;
    /// Declared type of `$this->name`.
    fn this_property(&self, name: &str, ctx: &ResolutionContext) -> Option<SchemaNode>;
}

/// Variables in scope: last assignment, extended by index assignments.
type Env = HashMap<String, Expr>;

/// Variable indirections followed before giving up.
const MAX_INDIRECTION: u32 = 32;

/// Larger substituted bindings are stored as unknown.
const MAX_BINDING_SIZE: usize = 256;

pub struct ShapeAnalyzer<'a> {
    heuristics: &'a Heuristics,
    resolver: &'a dyn ShapeResolver,
    ctx: &'a ResolutionContext,
    indirection: Cell<u32>,
    /// Variables currently being followed.
    resolving: RefCell<Vec<String>>,
}

impl<'a> ShapeAnalyzer<'a> {
    pub fn new(heuristics: &'a Heuristics, resolver: &'a dyn ShapeResolver, ctx: &'a ResolutionContext) -> Self {
        Self { heuristics, resolver, ctx, indirection: Cell::new(0), resolving: RefCell::new(Vec::new()) }
    }

    /// Shape of the first return statement that produces a structure.
    pub fn analyze_body(&self, body: &[Stmt]) -> Result<SchemaNode> {
        let mut returns = Vec::new();
        collect_returns(body, &mut Env::new(), &mut returns);
        for (expr, env) in &returns {
            if let Some(node) = self.produce(expr, env) {
                return Ok(node);
            }
            trace!(expr = %expr.describe(), "return statement yields no structure");
        }
        let first = returns
            .first()
            .map(|(e, _)| e.describe())
            .unwrap_or_else(|| "no return statement".to_string());
        Err(InferError::unsupported(first))
    }

    /// Follows `$var` unless it is already being followed further up.
    fn indirect<T>(&self, var: &str, f: impl FnOnce() -> Option<T>) -> Option<T> {
        let depth = self.indirection.get();
        if depth >= MAX_INDIRECTION || self.resolving.borrow().iter().any(|v| v == var) {
            return None;
        }
        self.indirection.set(depth + 1);
        self.resolving.borrow_mut().push(var.to_string());
        let out = f();
        self.resolving.borrow_mut().pop();
        self.indirection.set(depth);
        out
    }

    fn by_name(&self, key: Option<&str>) -> SchemaNode {
        key.and_then(|k| self.heuristics.naming.lookup(k))
            .unwrap_or_else(SchemaNode::string)
    }

    // ------------------------------- Produce -------------------------------- //

    /// Structure a returned expression produces, if it is one we recognise.
    fn produce(&self, expr: &Expr, env: &Env) -> Option<SchemaNode> {
        let helpers = &self.heuristics.helpers;
        match expr {
            Expr::Array(items) if items.is_empty() => Some(SchemaNode::empty_object()),
            Expr::Array(items) => Some(self.literal(items, env)),
            Expr::Var(name) => {
                let bound = env.get(name)?;
                self.indirect(name, || self.produce(bound, env))
            }
            Expr::Call { name, args } if helpers.is_iterate_map(name) => {
                Some(SchemaNode::array(self.map_element(args, env)))
            }
            Expr::Call { name, args } if helpers.is_passthrough(name) => {
                self.produce(&args.first()?.value, env)
            }
            Expr::MethodCall { object, name, args } => self.produce_chain(object, name, args, env),
            Expr::StaticCall { class, name, args } => self.produce_static(class, name, args, env),
            Expr::New { class, args } => self.produce_new(class, args, env),
            Expr::Ternary { cond, then, otherwise } => {
                let a = self.produce(then.as_deref().unwrap_or(cond), env);
                let b = self.produce(otherwise, env);
                match (a, b) {
                    (Some(a), Some(b)) => Some(merge(&a, &b)),
                    (a, b) => a.or(b),
                }
            }
            _ => None,
        }
    }

    fn produce_chain(&self, object: &Expr, name: &str, args: &[Arg], env: &Env) -> Option<SchemaNode> {
        let helpers = &self.heuristics.helpers;
        if helpers.is_iterate_map(name) {
            return Some(SchemaNode::array(self.map_element(args, env)));
        }
        if name.eq_ignore_ascii_case("additional") {
            let base = self.produce(object, env)?;
            let extra = args.first().and_then(|a| self.produce(&a.value, env));
            return Some(match extra {
                Some(extra) if base.properties().is_some() => merge(&base, &extra),
                _ => base,
            });
        }
        if helpers.is_passthrough(name) {
            if let Some(first) = args.first() {
                return self.produce(&first.value, env);
            }
        }
        if helpers.is_transparent_chain(name) {
            return self.produce(object, env);
        }
        if object.is_this() {
            return self.resolver.sibling_method(name, self.ctx);
        }
        None
    }

    fn produce_static(&self, class: &str, name: &str, args: &[Arg], env: &Env) -> Option<SchemaNode> {
        match class.to_ascii_lowercase().as_str() {
            "parent" => return self.resolver.parent_method(name, self.ctx),
            "self" | "static" if !name.eq_ignore_ascii_case("make") && !name.eq_ignore_ascii_case("collection") => {
                return self.resolver.sibling_method(name, self.ctx);
            }
            _ => {}
        }
        match name.to_ascii_lowercase().as_str() {
            "collection" => self.resolver.class_output(class, self.ctx).map(SchemaNode::array),
            "make" => self.resolver.class_output(class, self.ctx),
            "json" if short_name(class).eq_ignore_ascii_case("response") => self.produce(&args.first()?.value, env),
            _ => None,
        }
    }

    fn produce_new(&self, class: &str, args: &[Arg], env: &Env) -> Option<SchemaNode> {
        let short = short_name(class);
        if short.eq_ignore_ascii_case("JsonResponse") || short.eq_ignore_ascii_case("Response") {
            return self.produce(&args.first()?.value, env);
        }
        self.resolver.class_output(class, self.ctx)
    }

    // ------------------------------- Literals ------------------------------- //

    /// A literal array: a map of fields, or a list when no entry has a key.
    fn literal(&self, items: &[ArrayItem], env: &Env) -> SchemaNode {
        let is_list = items
            .iter()
            .all(|i| i.key.is_none() && !i.spread && !self.is_merge_call(&i.value));
        if is_list {
            let element = items
                .iter()
                .map(|i| self.value(&i.value, None, env))
                .reduce(|a, b| merge(&a, &b))
                .unwrap_or_else(SchemaNode::string);
            return SchemaNode::array(element);
        }

        let mut props = Properties::new();
        for item in items {
            if item.spread {
                let spread = self.produce(&item.value, env).or_else(|| self.value_info(&item.value, None, env));
                if let Some(p) = spread.as_ref().and_then(|n| n.properties()) {
                    extend_properties(&mut props, p.clone());
                }
                continue;
            }
            let Some(key) = item.key.as_ref() else {
                if let Some(merged) = self.merge_entry(&item.value, env) {
                    extend_properties(&mut props, merged);
                }
                continue;
            };
            // dynamic keys carry no name
            let Some(key) = key.as_key() else { continue };
            let mut node = self.value(&item.value, Some(&key), env);
            if !node.conditional {
                node.required = true;
            }
            props.insert(key, node);
        }
        SchemaNode::object(props)
    }

    fn is_merge_call(&self, expr: &Expr) -> bool {
        match expr {
            Expr::MethodCall { object, name, .. } if object.is_this() => {
                name.eq_ignore_ascii_case("merge")
                    || self.heuristics.helpers.conditional(name).is_some_and(|h| h.merges)
            }
            _ => false,
        }
    }

    /// `$this->merge([...])` / `$this->mergeWhen($p, [...])` as an unkeyed entry.
    fn merge_entry(&self, expr: &Expr, env: &Env) -> Option<Properties> {
        let Expr::MethodCall { object, name, args } = expr else { return None };
        if !object.is_this() {
            return None;
        }
        if name.eq_ignore_ascii_case("merge") {
            let node = self.produce_value_arg(positional(args, 0)?, env)?;
            return node.properties().cloned();
        }
        let helper = self.heuristics.helpers.conditional(name).filter(|h| h.merges)?;
        let node = self.produce_value_arg(positional(args, helper.value_arg)?, env)?;
        let props = node.properties()?.clone();
        Some(mark_conditional(props, &helper.condition.describe(None)))
    }

    fn produce_value_arg(&self, expr: &Expr, env: &Env) -> Option<SchemaNode> {
        match expr {
            Expr::Closure { body: ClosureBody::Expr(e), .. } => self.produce(e, env),
            Expr::Closure { body: ClosureBody::Block(stmts), .. } => self.first_produced(stmts, env),
            other => self.produce(other, env),
        }
    }

    fn first_produced(&self, stmts: &[Stmt], env: &Env) -> Option<SchemaNode> {
        let mut returns = Vec::new();
        collect_returns(stmts, &mut env.clone(), &mut returns);
        returns.iter().find_map(|(e, env)| self.produce(e, env))
    }

    // -------------------------------- Values -------------------------------- //

    /// Schema of one value; never fails.
    fn value(&self, expr: &Expr, key: Option<&str>, env: &Env) -> SchemaNode {
        if matches!(expr, Expr::Null) {
            return self.by_name(key).with_nullable(true);
        }
        match self.value_info(expr, key, env) {
            Some(node) => node,
            None => self.by_name(key),
        }
    }

    /// Schema of a value when the expression itself says something.
    fn value_info(&self, expr: &Expr, key: Option<&str>, env: &Env) -> Option<SchemaNode> {
        let helpers = &self.heuristics.helpers;
        match expr {
            Expr::String(_) => Some(SchemaNode::string()),
            Expr::Int(_) => Some(SchemaNode::integer()),
            Expr::Float(_) => Some(SchemaNode::number()),
            Expr::Bool(_) | Expr::Not(_) => Some(SchemaNode::boolean()),
            Expr::Null => None,
            Expr::Array(items) if items.is_empty() => Some(SchemaNode::array(SchemaNode::string())),
            Expr::Array(items) => Some(self.literal(items, env)),
            Expr::Var(name) => {
                let bound = env.get(name)?;
                self.indirect(name, || self.value_info(bound, key, env))
            }
            Expr::Prop { object, name } => {
                let declared = if object.is_this() { self.resolver.this_property(name, self.ctx) } else { None };
                declared.or_else(|| self.heuristics.naming.lookup(name))
            }
            Expr::MethodCall { object, name, args } => self.call_value(object, name, args, key, env),
            Expr::Call { name, args } => {
                if helpers.is_iterate_map(name) {
                    return Some(SchemaNode::array(self.map_element(args, env)));
                }
                helpers.returns_of(name)
            }
            Expr::StaticCall { class, name, args } => self
                .produce_static(class, name, args, env)
                .map(|node| self.propagate_conditional(args, node))
                .or_else(|| helpers.returns_of(name)),
            Expr::New { class, args } => self
                .produce_new(class, args, env)
                .map(|node| self.propagate_conditional(args, node)),
            Expr::ClassConst { class, name } => {
                if name == "class" {
                    return Some(SchemaNode::string());
                }
                self.resolver.class_output(class, self.ctx).filter(|n| !n.enum_values.is_empty())
            }
            Expr::Ternary { cond, then, otherwise } => {
                let then = then.as_deref().unwrap_or(cond);
                match (then, otherwise.as_ref()) {
                    (Expr::Null, other) | (other, Expr::Null) => {
                        Some(self.value(other, key, env).with_nullable(true))
                    }
                    (a, b) => match (self.value_info(a, key, env), self.value_info(b, key, env)) {
                        (Some(a), Some(b)) => Some(merge(&a, &b)),
                        (a, b) => a.or(b),
                    },
                }
            }
            Expr::Cast { ty, .. } => cast(ty),
            Expr::Binary { op, left, right } => self.binary(op, left, right, key, env),
            Expr::Closure { body, .. } => Some(self.closure_value(body, key, env)),
            Expr::Index { .. } | Expr::Unknown(_) => None,
        }
    }

    fn call_value(&self, object: &Expr, name: &str, args: &[Arg], key: Option<&str>, env: &Env) -> Option<SchemaNode> {
        let helpers = &self.heuristics.helpers;
        if object.is_this() {
            if let Some(helper) = helpers.conditional(name).filter(|h| !h.merges) {
                return Some(self.conditional_value(helper, args, key, env));
            }
        }
        if name.eq_ignore_ascii_case("format") {
            let format = args.first().and_then(|a| a.value.as_str()).and_then(date_format_example);
            return Some(match format {
                Some((format, example)) => SchemaNode::string().with_format(format).with_example(example.into()),
                None => SchemaNode::string(),
            });
        }
        if let Some(node) = helpers.returns_of(name) {
            return Some(node);
        }
        if helpers.is_iterate_map(name) {
            return Some(SchemaNode::array(self.map_element(args, env)));
        }
        if object.is_this() {
            return self.resolver.sibling_method(name, self.ctx);
        }
        self.produce_chain(object, name, args, env)
            .map(|node| self.propagate_conditional(args, node))
    }

    /// `$this->whenLoaded('posts', ...)` and friends: the wrapped value, marked
    /// conditional, never required.
    fn conditional_value(&self, helper: &ConditionalHelper, args: &[Arg], key: Option<&str>, env: &Env) -> SchemaNode {
        let subject = helper
            .subject_arg
            .and_then(|i| positional(args, i))
            .and_then(Expr::as_str);
        let node = match positional(args, helper.value_arg) {
            Some(Expr::Closure { body, .. }) => self.closure_value(body, key, env),
            Some(value) => self.value(value, key, env),
            None => self.implicit_value(helper.condition, subject, key),
        };
        let description = node.description.clone().unwrap_or_else(|| helper.condition.describe(subject));
        SchemaNode { conditional: true, required: false, description: Some(description), ..node }
    }

    /// Value of a wrapper called without an explicit value argument.
    fn implicit_value(&self, condition: WrapperCondition, subject: Option<&str>, key: Option<&str>) -> SchemaNode {
        match condition {
            WrapperCondition::RelationLoaded | WrapperCondition::PivotLoaded => {
                let related = SchemaNode::empty_object();
                if subject.or(key).is_some_and(|s| s.ends_with('s')) {
                    SchemaNode::array(related)
                } else {
                    related
                }
            }
            WrapperCondition::RelationCounted => SchemaNode::integer(),
            WrapperCondition::AttributePresent | WrapperCondition::Appended => self.by_name(subject.or(key)),
            WrapperCondition::Predicate | WrapperCondition::NotNull => self.by_name(key),
        }
    }

    /// A resource built from a conditional value is itself conditional.
    fn propagate_conditional(&self, args: &[Arg], node: SchemaNode) -> SchemaNode {
        let helpers = &self.heuristics.helpers;
        let mut found: Option<String> = None;
        for arg in args {
            arg.value.walk(&mut |e| {
                if found.is_some() {
                    return;
                }
                if let Expr::MethodCall { object, name, args } = e {
                    if let Some(h) = helpers.conditional(name).filter(|_| object.is_this()) {
                        let subject = h.subject_arg.and_then(|i| positional(args, i)).and_then(Expr::as_str);
                        found = Some(h.condition.describe(subject));
                    }
                }
            });
        }
        match found {
            Some(description) => SchemaNode {
                conditional: true,
                required: false,
                description: node.description.clone().or(Some(description)),
                ..node
            },
            None => node,
        }
    }

    fn closure_value(&self, body: &ClosureBody, key: Option<&str>, env: &Env) -> SchemaNode {
        match body {
            ClosureBody::Expr(e) => self.produce(e, env).unwrap_or_else(|| self.value(e, key, env)),
            ClosureBody::Block(stmts) => {
                let mut returns = Vec::new();
                collect_returns(stmts, &mut env.clone(), &mut returns);
                if let Some(node) = returns.iter().find_map(|(e, env)| self.produce(e, env)) {
                    return node;
                }
                match returns.first() {
                    Some((e, env)) => self.value(e, key, env),
                    None => self.by_name(key),
                }
            }
        }
    }

    /// Element of `->map(fn ($x) => ...)`, `array_map(fn, $xs)`, `->mapInto(R::class)`.
    fn map_element(&self, args: &[Arg], env: &Env) -> SchemaNode {
        for arg in args {
            match &arg.value {
                Expr::Closure { body, .. } => return self.closure_value(body, None, env),
                Expr::ClassConst { class, name } if name == "class" => {
                    if let Some(node) = self.resolver.class_output(class, self.ctx) {
                        return node;
                    }
                }
                _ => {}
            }
        }
        SchemaNode::string()
    }

    fn binary(&self, op: &str, left: &Expr, right: &Expr, key: Option<&str>, env: &Env) -> Option<SchemaNode> {
        match op {
            "." => Some(SchemaNode::string()),
            "??" | "?:" => self.value_info(left, key, env).or_else(|| self.value_info(right, key, env)),
            "==" | "===" | "!=" | "!==" | "<>" | "<" | ">" | "<=" | ">=" | "&&" | "||" | "and" | "or" | "xor"
            | "instanceof" => Some(SchemaNode::boolean()),
            "<=>" => Some(SchemaNode::integer()),
            "/" | "**" => Some(SchemaNode::number()),
            "+" | "-" | "*" | "%" => {
                let l = self.value_info(left, None, env).map(|n| n.kind());
                let r = self.value_info(right, None, env).map(|n| n.kind());
                let integral = |k: Option<crate::ir::Kind>| k == Some(crate::ir::Kind::Integer);
                if op == "%" || (integral(l) && integral(r)) {
                    Some(SchemaNode::integer())
                } else {
                    Some(SchemaNode::number())
                }
            }
            _ => None,
        }
    }
}

fn cast(ty: &str) -> Option<SchemaNode> {
    Some(match ty.to_ascii_lowercase().as_str() {
        "int" | "integer" => SchemaNode::integer(),
        "float" | "double" | "real" => SchemaNode::number(),
        "bool" | "boolean" => SchemaNode::boolean(),
        "string" | "binary" => SchemaNode::string(),
        "array" => SchemaNode::array(SchemaNode::string()),
        "object" => SchemaNode::empty_object(),
        _ => return None,
    })
}

fn positional(args: &[Arg], index: usize) -> Option<&Expr> {
    args.iter().filter(|a| a.name.is_none()).nth(index).map(|a| &a.value)
}

/// `value` with every bound variable replaced by its binding, so no
/// binding ever refers to itself. Closure bodies are left alone.
fn bind(value: &Expr, env: &Env) -> Expr {
    let mut out = value.clone();
    substitute(&mut out, env);
    let mut size = 0usize;
    out.walk(&mut |_| size += 1);
    if size > MAX_BINDING_SIZE {
        return Expr::Unknown(value.describe());
    }
    out
}

fn substitute(expr: &mut Expr, env: &Env) {
    let args = |args: &mut Vec<Arg>| args.iter_mut().for_each(|a| substitute(&mut a.value, env));
    match expr {
        Expr::Var(name) => {
            if let Some(bound) = env.get(name.as_str()) {
                *expr = bound.clone();
            }
        }
        Expr::Array(items) => {
            for item in items {
                if let Some(key) = &mut item.key {
                    substitute(key, env);
                }
                substitute(&mut item.value, env);
            }
        }
        Expr::Prop { object, .. } => substitute(object, env),
        Expr::MethodCall { object, args: call_args, .. } => {
            substitute(object, env);
            args(call_args);
        }
        Expr::StaticCall { args: call_args, .. } | Expr::Call { args: call_args, .. } | Expr::New { args: call_args, .. } => {
            args(call_args)
        }
        Expr::Ternary { cond, then, otherwise } => {
            substitute(cond, env);
            if let Some(t) = then {
                substitute(t, env);
            }
            substitute(otherwise, env);
        }
        Expr::Cast { value, .. } | Expr::Not(value) => substitute(value, env),
        Expr::Binary { left, right, .. } => {
            substitute(left, env);
            substitute(right, env);
        }
        Expr::Index { object, key } => {
            substitute(object, env);
            if let Some(k) = key {
                substitute(k, env);
            }
        }
        Expr::Closure { .. }
        | Expr::String(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::Bool(_)
        | Expr::Null
        | Expr::ClassConst { .. }
        | Expr::Unknown(_) => {}
    }
}

/// Return statements in source order with the variables visible at each.
fn collect_returns(stmts: &[Stmt], env: &mut Env, out: &mut Vec<(Expr, Env)>) {
    for stmt in stmts {
        match stmt {
            Stmt::Return(Some(e)) => out.push((e.clone(), env.clone())),
            Stmt::Return(None) | Stmt::Expr(_) => {}
            Stmt::Assign { var, value } => {
                let value = bind(value, env);
                env.insert(var.clone(), value);
            }
            Stmt::AssignIndex { var, key, value } => {
                let item = ArrayItem { key: key.clone().map(Expr::String), value: bind(value, env), spread: false };
                match env.get_mut(var) {
                    Some(Expr::Array(items)) => items.push(item),
                    _ => {
                        env.insert(var.clone(), Expr::Array(vec![item]));
                    }
                }
            }
            Stmt::Block(inner) => collect_returns(inner, env, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Format, Kind};
    use crate::source::parse_source;
    use crate::source::ast::MethodDecl;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    /// Resolver with a fixed answer per class name and no sibling methods.
    struct Fixed(Vec<(&'static str, SchemaNode)>);

    impl ShapeResolver for Fixed {
        fn class_output(&self, class_ref: &str, _: &ResolutionContext) -> Option<SchemaNode> {
            self.0.iter().find(|(n, _)| *n == short_name(class_ref)).map(|(_, s)| s.clone())
        }
        fn sibling_method(&self, _: &str, _: &ResolutionContext) -> Option<SchemaNode> {
            None
        }
        fn parent_method(&self, _: &str, _: &ResolutionContext) -> Option<SchemaNode> {
            None
        }
        fn this_property(&self, name: &str, _: &ResolutionContext) -> Option<SchemaNode> {
            (name == "score").then(SchemaNode::number)
        }
    }

    fn method(body: &str) -> MethodDecl {
        let src = format!("<?php\nclass T {{\n    public function run($request) {{\n{body}\n    }}\n}}\n");
        let file = parse_source(Path::new("t.php"), &src).expect("fixture parses");
        file.classes[0].methods[0].clone()
    }

    fn analyze(body: &str, resolver: &Fixed) -> Result<SchemaNode> {
        let m = method(body);
        let ctx = ResolutionContext::detached();
        ShapeAnalyzer::new(Heuristics::standard(), resolver, &ctx).analyze_body(&m.body)
    }

    fn shape(body: &str) -> SchemaNode {
        analyze(body, &Fixed(Vec::new())).expect("shape")
    }

    #[test]
    fn literal_map_with_iterate_map() {
        let out = shape(
            "return ['id' => $this->id, 'items' => $this->tags->map(fn ($t) => $t->name)];",
        );
        let mut props = Properties::new();
        props.insert("id".into(), SchemaNode::integer().with_required(true));
        props.insert("items".into(), SchemaNode::array(SchemaNode::string()).with_required(true));
        assert_eq!(out, SchemaNode::object(props));
    }

    #[test]
    fn conditional_email_is_never_required() {
        let out = shape("return ['email' => $this->when($request->user()->isAdmin(), $this->email)];");
        let email = out.property("email").expect("email");
        assert!(email.conditional);
        assert!(!email.required);
        assert_eq!(email.format, Some(Format::Email));
        assert!(email.description.is_some());
    }

    #[test]
    fn when_loaded_relations() {
        let out = shape("return ['posts' => $this->whenLoaded('posts'), 'owner' => $this->whenLoaded('owner'), 'posts_count' => $this->whenCounted('posts')];");
        let posts = out.property("posts").expect("posts");
        assert_eq!(posts.kind(), Kind::Array);
        assert_eq!(
            posts.description.as_deref(),
            Some("Only present when the `posts` relation is loaded.")
        );
        assert_eq!(out.property("owner").map(|o| o.kind()), Some(Kind::Object));
        assert_eq!(out.property("posts_count").map(|o| o.kind()), Some(Kind::Integer));
    }

    #[test]
    fn merge_when_folds_into_the_parent() {
        let out = shape(
            "return ['id' => 1, $this->mergeWhen($this->isAdmin(), ['secret' => 'x', 'token_count' => 2])];",
        );
        let secret = out.property("secret").expect("secret");
        assert!(secret.conditional && !secret.required);
        assert_eq!(out.property("token_count").map(|n| n.kind()), Some(Kind::Integer));
    }

    #[test]
    fn response_wrappers_are_transparent() {
        let out = shape("return response()->json(['ok' => true, 'data' => null], 201);");
        assert_eq!(out.property("ok").map(|n| n.kind()), Some(Kind::Boolean));
        assert!(out.property("data").is_some_and(|d| d.nullable));

        let out = shape("return new JsonResponse(['total' => count($xs)]);");
        assert_eq!(out.property("total").map(|n| n.kind()), Some(Kind::Integer));
    }

    #[test]
    fn returned_variable_collects_index_assignments() {
        let out = shape("$data = ['id' => 1];\n$data['created_at'] = $this->created_at->toIso8601String();\nreturn $data;");
        let created = out.property("created_at").expect("created_at");
        assert_eq!(created.format, Some(Format::DateTime));
    }

    #[test]
    fn first_structural_return_wins() {
        let out = shape("if ($x) {\n return ['error' => 'nope'];\n}\nreturn ['id' => 1];");
        assert!(out.property("error").is_some());
        assert!(out.property("id").is_none());
    }

    #[test]
    fn nested_resources_and_collections() {
        let user = SchemaNode::object(Properties::from_iter([("name".to_string(), SchemaNode::string())]));
        let resolver = Fixed(vec![("UserResource", user.clone())]);
        let out = analyze(
            "return ['author' => new UserResource($this->whenLoaded('author')), 'team' => UserResource::collection($this->members)];",
            &resolver,
        )
        .expect("shape");
        let author = out.property("author").expect("author");
        assert!(author.conditional && !author.required);
        assert_eq!(author.property("name"), user.property("name"));
        let team = out.property("team").expect("team");
        assert_eq!(team.items().and_then(|i| i.property("name")).map(|n| n.kind()), Some(Kind::String));
        assert!(team.required);
    }

    #[test]
    fn values_fall_back_to_key_names() {
        let out = shape("return ['user_id' => $x, 'website' => $this->meta['site'], 'score' => $this->score, 'label' => $a . $b, 'ok' => $a === $b];");
        assert_eq!(out.property("user_id").map(|n| n.kind()), Some(Kind::Integer));
        assert_eq!(out.property("website").and_then(|n| n.format), Some(Format::Uri));
        assert_eq!(out.property("score").map(|n| n.kind()), Some(Kind::Number));
        assert_eq!(out.property("label").map(|n| n.kind()), Some(Kind::String));
        assert_eq!(out.property("ok").map(|n| n.kind()), Some(Kind::Boolean));
    }

    #[test]
    fn date_formats_and_casts() {
        let out = shape("return ['day' => $this->starts_at->format('Y-m-d'), 'n' => (int) $x, 'f' => (float) $y];");
        let day = out.property("day").expect("day");
        assert_eq!(day.format, Some(Format::Date));
        assert_eq!(day.example, Some("2024-01-15".into()));
        assert_eq!(out.property("n").map(|n| n.kind()), Some(Kind::Integer));
        assert_eq!(out.property("f").map(|n| n.kind()), Some(Kind::Number));
    }

    #[test]
    fn bodies_without_structure_are_unsupported() {
        assert!(matches!(analyze("return $this->name;", &Fixed(Vec::new())), Err(InferError::UnsupportedShape { .. })));
        assert!(matches!(analyze("$x = 1;", &Fixed(Vec::new())), Err(InferError::UnsupportedShape { .. })));
    }

    #[test]
    fn self_referencing_assignments_terminate() {
        let out = shape("$n = $request->n;\n$n = $n + $n;\n$n = $n * $n;\nreturn ['n' => $n];");
        assert_eq!(out.property("n").map(|n| n.kind()), Some(Kind::Number));

        let out = shape("$x = $this->count;\n$x = $c ? $x : $x;\nreturn ['x' => $x];");
        assert!(out.property("x").is_some());

        let out = shape("$x = $this->items->map(fn ($t) => $x);\nreturn ['x' => $x];");
        assert_eq!(out.property("x").map(|n| n.kind()), Some(Kind::Array));
    }

    #[test]
    fn repeated_doubling_stays_small() {
        let doubling = "$n = $n + $n;\n".repeat(40);
        let out = shape(&format!("$n = 1;\n{doubling}return ['n' => $n];"));
        assert!(out.property("n").is_some());
    }

    #[test]
    fn list_literals_are_arrays() {
        let out = shape("return [1, 2, 3];");
        assert_eq!(out.items().map(|i| i.kind()), Some(Kind::Integer));
    }
}
