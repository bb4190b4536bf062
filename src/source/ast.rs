// Owned AST lowered out of the tree-sitter CST. No tree-sitter types here.
use std::sync::Arc;

use super::FileContext;
use super::docblock::DocBlock;
use super::types::TypeRef;

// ------------------------------ Expressions ------------------------------- //

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Array(Vec<ArrayItem>),
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// `$name`, stored without the sigil.
    Var(String),
    Prop { object: Box<Expr>, name: String },
    MethodCall { object: Box<Expr>, name: String, args: Vec<Arg> },
    StaticCall { class: String, name: String, args: Vec<Arg> },
    Call { name: String, args: Vec<Arg> },
    New { class: String, args: Vec<Arg> },
    /// `Foo::BAR`, `Foo::class`.
    ClassConst { class: String, name: String },
    Closure { params: Vec<String>, body: ClosureBody },
    Ternary { cond: Box<Expr>, then: Option<Box<Expr>>, otherwise: Box<Expr> },
    Cast { ty: String, value: Box<Expr> },
    Binary { op: String, left: Box<Expr>, right: Box<Expr> },
    Not(Box<Expr>),
    Index { object: Box<Expr>, key: Option<Box<Expr>> },
    /// Anything we do not model; keeps the source text for diagnostics.
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    pub key: Option<Expr>,
    pub value: Expr,
    pub spread: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClosureBody {
    /// `fn ($x) => expr`
    Expr(Box<Expr>),
    /// `function ($x) { ... }`
    Block(Vec<Stmt>),
}

impl Expr {
    /// Literal string value, if this is a plain string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text used as an array key: strings verbatim, integers in decimal.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Expr::String(s) => Some(s.clone()),
            Expr::Int(i) => Some(i.to_string()),
            Expr::ClassConst { name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    /// `Foo::class` → `Foo`.
    pub fn as_class_ref(&self) -> Option<&str> {
        match self {
            Expr::ClassConst { class, name } if name == "class" => Some(class),
            Expr::String(s) if s.contains('\\') => Some(s),
            _ => None,
        }
    }

    pub fn is_this(&self) -> bool {
        matches!(self, Expr::Var(v) if v == "this")
    }

    /// Visits this expression and every nested one, closure bodies included.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Array(items) => {
                for item in items {
                    if let Some(key) = &item.key {
                        key.walk(f);
                    }
                    item.value.walk(f);
                }
            }
            Expr::Prop { object, .. } => object.walk(f),
            Expr::MethodCall { object, args, .. } => {
                object.walk(f);
                for arg in args {
                    arg.value.walk(f);
                }
            }
            Expr::StaticCall { args, .. } | Expr::Call { args, .. } | Expr::New { args, .. } => {
                for arg in args {
                    arg.value.walk(f);
                }
            }
            Expr::Closure { body: ClosureBody::Expr(e), .. } => e.walk(f),
            Expr::Closure { body: ClosureBody::Block(stmts), .. } => {
                stmts.iter().for_each(|s| s.walk_exprs(f));
            }
            Expr::Ternary { cond, then, otherwise } => {
                cond.walk(f);
                if let Some(t) = then {
                    t.walk(f);
                }
                otherwise.walk(f);
            }
            Expr::Cast { value, .. } | Expr::Not(value) => value.walk(f),
            Expr::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::Index { object, key } => {
                object.walk(f);
                if let Some(k) = key {
                    k.walk(f);
                }
            }
            Expr::String(_)
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Var(_)
            | Expr::ClassConst { .. }
            | Expr::Unknown(_) => {}
        }
    }

    /// Unwraps `a->b()->c()` down to the innermost receiver.
    pub fn call_root(&self) -> &Expr {
        let mut current = self;
        while let Expr::MethodCall { object, .. } = current {
            current = object;
        }
        current
    }

    /// Short rendering for log lines.
    pub fn describe(&self) -> String {
        match self {
            Expr::Array(items) => format!("[..{} items]", items.len()),
            Expr::String(s) => format!("'{s}'"),
            Expr::Int(i) => i.to_string(),
            Expr::Float(f) => f.to_string(),
            Expr::Bool(b) => b.to_string(),
            Expr::Null => "null".into(),
            Expr::Var(v) => format!("${v}"),
            Expr::Prop { object, name } => format!("{}->{name}", object.describe()),
            Expr::MethodCall { object, name, .. } => format!("{}->{name}()", object.describe()),
            Expr::StaticCall { class, name, .. } => format!("{class}::{name}()"),
            Expr::Call { name, .. } => format!("{name}()"),
            Expr::New { class, .. } => format!("new {class}()"),
            Expr::ClassConst { class, name } => format!("{class}::{name}"),
            Expr::Closure { .. } => "closure".into(),
            Expr::Ternary { .. } => "ternary".into(),
            Expr::Cast { ty, value } => format!("({ty}) {}", value.describe()),
            Expr::Binary { op, .. } => format!("binary {op}"),
            Expr::Not(inner) => format!("!{}", inner.describe()),
            Expr::Index { object, .. } => format!("{}[..]", object.describe()),
            Expr::Unknown(text) => text.chars().take(40).collect(),
        }
    }
}

// ------------------------------- Statements ------------------------------- //

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Return(Option<Expr>),
    /// `$var = value;`
    Assign { var: String, value: Expr },
    /// `$var['key'] = value;` (`key` is `None` for `$var[] = value`)
    AssignIndex { var: String, key: Option<String>, value: Expr },
    Expr(Expr),
    /// Bodies of `if`/`foreach`/`try`/... flattened in source order.
    Block(Vec<Stmt>),
}

impl Stmt {
    pub fn walk_exprs<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        match self {
            Stmt::Return(Some(e)) | Stmt::Expr(e) => e.walk(f),
            Stmt::Assign { value, .. } | Stmt::AssignIndex { value, .. } => value.walk(f),
            Stmt::Block(inner) => inner.iter().for_each(|s| s.walk_exprs(f)),
            Stmt::Return(None) => {}
        }
    }
}

// ------------------------------ Declarations ------------------------------ //

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Trait,
    Enum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

/// `#[Name(args)]`
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub args: Vec<Arg>,
}

impl Attribute {
    /// Named argument, or the positional one at `position`.
    pub fn arg(&self, name: &str, position: usize) -> Option<&Expr> {
        self.args
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
            .or_else(|| {
                self.args
                    .iter()
                    .filter(|a| a.name.is_none())
                    .nth(position)
            })
            .map(|a| &a.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub has_default: bool,
    pub attributes: Vec<Attribute>,
    pub doc: Option<DocBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub has_default: bool,
    /// Constructor promotion visibility (`public function __construct(public int $id)`).
    pub promoted: Option<Visibility>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub params: Vec<ParamDecl>,
    pub return_type: Option<TypeRef>,
    pub attributes: Vec<Attribute>,
    pub doc: Option<DocBlock>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumCase {
    pub name: String,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub kind: ClassKind,
    pub name: String,
    pub fqn: String,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub traits: Vec<String>,
    pub attributes: Vec<Attribute>,
    pub doc: Option<DocBlock>,
    pub properties: Vec<PropertyDecl>,
    pub methods: Vec<MethodDecl>,
    /// `enum Status: string` → `string`
    pub enum_backing: Option<String>,
    pub cases: Vec<EnumCase>,
    pub file: Arc<FileContext>,
}

impl ClassDecl {
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDecl> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Constructor parameters promoted to properties.
    pub fn promoted_params(&self) -> impl Iterator<Item = &ParamDecl> {
        self.method("__construct")
            .into_iter()
            .flat_map(|m| m.params.iter())
            .filter(|p| p.promoted.is_some())
    }
}
