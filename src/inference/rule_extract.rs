//! Validation rules declared in source.
//!
//! Looks for, in order: a form-request parameter whose class (or an
//! ancestor) has a `rules()` method, then inline validation calls in the
//! method body (`$request->validate`, `request()->validate`,
//! `$this->validate($request, ...)`, `Validator::make($data, ...)`).
use std::sync::Arc;

use tracing::{debug, trace};

use super::rules::{RuleSet, RuleToken, parse_pipe};
use crate::source::SourceIndex;
use crate::source::ast::{Arg, ArrayItem, ClassDecl, ClassKind, Expr, MethodDecl, Stmt};
use crate::source::resolver::short_name;

/// Nesting of `parent::rules()` / `array_merge` / variable hops followed.
const MAX_HOPS: u32 = 16;

pub struct RuleExtractor<'a> {
    index: &'a SourceIndex,
}

impl<'a> RuleExtractor<'a> {
    pub fn new(index: &'a SourceIndex) -> Self {
        Self { index }
    }

    /// Rules for `method` of `class`, or `None` when the source declares none.
    pub fn for_method(&self, class: &Arc<ClassDecl>, method: &MethodDecl) -> Option<RuleSet> {
        let resolver = class.file.resolver().with_class(&class.fqn);
        for param in &method.params {
            let Some(name) = param.ty.as_ref().and_then(|t| t.without_null()).and_then(|t| t.base_name()) else {
                continue;
            };
            let fqn = resolver.resolve_or_keep(&name);
            let Some(request) = self.index.class(&fqn) else { continue };
            if let Some(rules) = self.from_rules_method(&request, 0) {
                debug!(class = %class.fqn, request = %request.fqn, "rules from form request");
                return Some(rules);
            }
        }

        let mut found = None;
        for stmt in &method.body {
            stmt.walk_exprs(&mut |e| {
                if found.is_none() {
                    found = validation_call(e);
                }
            });
            if found.is_some() {
                break;
            }
        }
        let rules_expr = found?;
        let rules = self.rules_from_expr(rules_expr, class, &method.body, 0, &mut Vec::new());
        (!rules.is_empty()).then_some(rules)
    }

    /// `rules()` of the nearest class in the lineage that defines one.
    pub fn from_rules_method(&self, class: &Arc<ClassDecl>, hops: u32) -> Option<RuleSet> {
        if hops > MAX_HOPS {
            return None;
        }
        let lineage = self.index.lineage(class);
        let (owner, method) = lineage
            .iter()
            .find_map(|c| c.method("rules").map(|m| (c.clone(), m.clone())))?;
        let returned = first_return(&method.body)?;
        Some(self.rules_from_expr(returned, &owner, &method.body, hops + 1, &mut Vec::new()))
    }

    /// `following` holds the variables being resolved; a variable met again
    /// inside its own value refers to its previous assignment.
    fn rules_from_expr(
        &self,
        expr: &Expr,
        owner: &Arc<ClassDecl>,
        body: &[Stmt],
        hops: u32,
        following: &mut Vec<String>,
    ) -> RuleSet {
        let mut out = RuleSet::new();
        if hops > MAX_HOPS {
            return out;
        }
        match expr {
            Expr::Array(items) => {
                for item in items {
                    self.add_entry(item, owner, &mut out);
                }
            }
            Expr::Var(name) => {
                let earlier = following.iter().filter(|v| *v == name).count();
                let mut values = Vec::new();
                assignments(body, name, &mut values);
                if let Some(bound) = values.into_iter().rev().nth(earlier) {
                    following.push(name.clone());
                    out = self.rules_from_expr(bound, owner, body, hops + 1, following);
                    following.pop();
                }
            }
            Expr::Call { name, args } if name.eq_ignore_ascii_case("array_merge") => {
                for arg in args {
                    out.extend(self.rules_from_expr(&arg.value, owner, body, hops + 1, following));
                }
            }
            Expr::StaticCall { class, name, .. } if class == "parent" && name.eq_ignore_ascii_case("rules") => {
                let parent = owner
                    .parent
                    .as_deref()
                    .and_then(|p| self.index.class(p));
                if let Some(rules) = parent.and_then(|p| self.from_rules_method(&p, hops + 1)) {
                    out = rules;
                }
            }
            other => trace!(expr = %other.describe(), "no rules in expression"),
        }
        out
    }

    fn add_entry(&self, item: &ArrayItem, owner: &Arc<ClassDecl>, out: &mut RuleSet) {
        let Some(path) = item.key.as_ref().and_then(Expr::as_key) else { return };
        let tokens = match &item.value {
            Expr::String(pipe) => parse_pipe(pipe),
            Expr::Array(list) => list.iter().flat_map(|i| self.rule_value(&i.value, owner)).collect(),
            other => self.rule_value(other, owner),
        };
        out.insert(path, tokens);
    }

    /// One element of a rule list: a string or a rule object.
    fn rule_value(&self, expr: &Expr, owner: &Arc<ClassDecl>) -> Vec<RuleToken> {
        match expr {
            Expr::String(s) => parse_pipe(s),
            Expr::StaticCall { class, name, args } if short_name(class).eq_ignore_ascii_case("Rule") => {
                match name.to_ascii_lowercase().as_str() {
                    "in" => vec![in_token(literal_list(args))],
                    "enum" => self.enum_token(args, owner).into_iter().collect(),
                    _ => Vec::new(),
                }
            }
            Expr::New { class, args } => match short_name(class).to_ascii_lowercase().as_str() {
                "in" => vec![in_token(literal_list(args))],
                "enum" => self.enum_token(args, owner).into_iter().collect(),
                "password" => password_tokens(args),
                _ => Vec::new(),
            },
            Expr::MethodCall { .. } | Expr::StaticCall { .. } => match expr.call_root() {
                Expr::StaticCall { class, name, args } if short_name(class).eq_ignore_ascii_case("Password") => {
                    match name.to_ascii_lowercase().as_str() {
                        "min" => password_tokens(args),
                        _ => vec![RuleToken::new("string", &[]), RuleToken::new("password", &[])],
                    }
                }
                root @ Expr::StaticCall { class, .. } if short_name(class).eq_ignore_ascii_case("Rule") => {
                    self.rule_value(root, owner)
                }
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// `Rule::enum(Status::class)` → `in:` with the enum's case values.
    fn enum_token(&self, args: &[Arg], owner: &Arc<ClassDecl>) -> Option<RuleToken> {
        let class_ref = args.first()?.value.as_class_ref()?;
        let fqn = owner.file.resolver().with_class(&owner.fqn).resolve_or_keep(class_ref);
        let decl = self.index.class(&fqn).filter(|c| c.kind == ClassKind::Enum)?;
        let values: Vec<String> = decl
            .cases
            .iter()
            .map(|case| match &case.value {
                Some(Expr::String(s)) => s.clone(),
                Some(Expr::Int(i)) => i.to_string(),
                _ => case.name.clone(),
            })
            .collect();
        Some(in_token(values))
    }
}

fn in_token(values: Vec<String>) -> RuleToken {
    RuleToken { name: "in".to_string(), params: values }
}

fn password_tokens(args: &[Arg]) -> Vec<RuleToken> {
    let mut out = vec![RuleToken::new("string", &[]), RuleToken::new("password", &[])];
    if let Some(Expr::Int(n)) = args.first().map(|a| &a.value) {
        out.push(RuleToken { name: "min".to_string(), params: vec![n.to_string()] });
    }
    out
}

/// `Rule::in(['a', 'b'])` or `Rule::in('a', 'b')`.
fn literal_list(args: &[Arg]) -> Vec<String> {
    let scalar = |e: &Expr| match e {
        Expr::String(s) => Some(s.clone()),
        Expr::Int(i) => Some(i.to_string()),
        Expr::Float(f) => Some(f.to_string()),
        _ => None,
    };
    match args.first().map(|a| &a.value) {
        Some(Expr::Array(items)) => items.iter().filter_map(|i| scalar(&i.value)).collect(),
        _ => args.iter().filter_map(|a| scalar(&a.value)).collect(),
    }
}

/// Rules argument of a validation call, if `e` is one.
fn validation_call(e: &Expr) -> Option<&Expr> {
    match e {
        Expr::MethodCall { object, name, args } if name.eq_ignore_ascii_case("validate") => {
            let rules_at = if object.is_this() { 1 } else { 0 };
            let is_request = match object.as_ref() {
                Expr::Var(_) => true,
                Expr::Call { name, .. } => name.eq_ignore_ascii_case("request"),
                _ => false,
            };
            is_request.then(|| args.get(rules_at).map(|a| &a.value)).flatten()
        }
        Expr::StaticCall { class, name, args }
            if short_name(class).eq_ignore_ascii_case("Validator") && name.eq_ignore_ascii_case("make") =>
        {
            args.get(1).map(|a| &a.value)
        }
        _ => None,
    }
}

fn first_return(body: &[Stmt]) -> Option<&Expr> {
    body.iter().find_map(|s| match s {
        Stmt::Return(Some(e)) => Some(e),
        Stmt::Block(inner) => first_return(inner),
        _ => None,
    })
}

/// Values assigned to `$name` anywhere in `body`, in source order.
fn assignments<'b>(body: &'b [Stmt], name: &str, out: &mut Vec<&'b Expr>) {
    for stmt in body {
        match stmt {
            Stmt::Assign { var, value } if var == name => out.push(value),
            Stmt::Block(inner) => assignments(inner, name, out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const SOURCE: &str = r#"<?php
namespace App\Http;

use Illuminate\Validation\Rule;
use Illuminate\Validation\Rules\Password;

enum Status: string {
    case Draft = 'draft';
    case Live = 'live';
}

class BaseRequest {
    public function rules(): array {
        return ['title' => 'required|string|max:255'];
    }
}

class StorePostRequest extends BaseRequest {
    public function rules(): array {
        return array_merge(parent::rules(), [
            'status' => ['required', Rule::enum(Status::class)],
            'kind' => [Rule::in(['a', 'b'])],
            'password' => ['required', Password::min(8)->mixedCase()],
            'slug' => ['string', Rule::unique('posts')],
        ]);
    }
}

class AccumulatingRequest {
    public function rules(): array {
        $rules = ['a' => 'string'];
        $rules = array_merge($rules, ['b' => 'integer'], $rules);
        $loop = array_merge($loop, $loop, $loop);
        return $rules;
    }
}

class PostController {
    public function store(StorePostRequest $request) {}

    public function update($request) {
        $rules = ['body' => 'nullable|string'];
        $data = $request->validate($rules);
        return $data;
    }

    public function legacy() {
        $v = Validator::make($input, ['age' => 'integer|min:18']);
    }

    public function show($id) {
        return ['id' => $id];
    }
}
"#;

    fn index() -> SourceIndex {
        let index = SourceIndex::new();
        index.add_source(Path::new("app.php"), SOURCE).expect("fixture parses");
        index
    }

    fn rules_for(index: &SourceIndex, method: &str) -> Option<RuleSet> {
        let controller = index.class("App\\Http\\PostController").expect("controller");
        let m = controller.method(method).expect("method").clone();
        RuleExtractor::new(index).for_method(&controller, &m)
    }

    #[test]
    fn form_request_rules_merge_parent_rules() {
        let index = index();
        let rules = rules_for(&index, "store").expect("rules");
        let keys: Vec<&str> = rules.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["title", "status", "kind", "password", "slug"]);
        assert_eq!(rules["status"][1], RuleToken::new("in", &["draft", "live"]));
        assert_eq!(rules["kind"][0], RuleToken::new("in", &["a", "b"]));
        assert!(rules["password"].contains(&RuleToken::new("min", &["8"])));
        assert_eq!(rules["slug"], vec![RuleToken::new("string", &[])]);
    }

    #[test]
    fn reassigned_variables_refer_to_their_previous_value() {
        let index = index();
        let class = index.class("App\\Http\\AccumulatingRequest").expect("request");
        let rules = RuleExtractor::new(&index).from_rules_method(&class, 0).expect("rules");
        let keys: Vec<&str> = rules.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn inline_validation_calls() {
        let index = index();
        let update = rules_for(&index, "update").expect("rules");
        assert_eq!(update["body"].len(), 2);
        let legacy = rules_for(&index, "legacy").expect("rules");
        assert_eq!(legacy["age"][1], RuleToken::new("min", &["18"]));
        assert!(rules_for(&index, "show").is_none());
    }
}
