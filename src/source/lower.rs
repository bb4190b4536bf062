// Lowering: tree-sitter CST → owned AST (`source::ast`).
//
// Only the constructs the analyzers look at are modelled; everything else
// becomes `Expr::Unknown` / an empty block and is ignored downstream.
use std::path::Path;
use std::sync::Arc;

use tree_sitter::Node;

use super::FileContext;
use super::ast::*;
use super::docblock::DocBlock;
use super::resolver::{ImportTable, SymbolResolver};
use super::types::TypeRef;

// ------------------------------- Node utils ------------------------------- //

fn text<'s>(node: Node, src: &'s str) -> &'s str {
    node.utf8_text(src.as_bytes()).unwrap_or("")
}

fn named(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

fn all_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn has_token(node: Node, token: &str) -> bool {
    all_children(node).iter().any(|c| !c.is_named() && c.kind() == token)
}

fn child_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    named(node).into_iter().find(|c| kinds.contains(&c.kind()))
}

fn field_text<'s>(node: Node, field: &str, src: &'s str) -> Option<&'s str> {
    node.child_by_field_name(field).map(|n| text(n, src))
}

fn strip_var(name: &str) -> String {
    name.trim_start_matches('&').trim_start_matches('$').to_string()
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    for q in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return raw[1..raw.len() - 1].replace("\\'", "'");
        }
    }
    raw.to_string()
}

fn doc_before(node: Node, src: &str) -> Option<DocBlock> {
    let prev = node.prev_named_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    DocBlock::parse(text(prev, src))
}

/// Position of the first syntax error, 1-indexed line.
pub(crate) fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    all_children(node).into_iter().find_map(first_error_line)
}

// --------------------------------- File ----------------------------------- //

struct Segment<'t> {
    namespace: String,
    imports: ImportTable,
    declarations: Vec<Node<'t>>,
}

const DECLARATION_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "trait_declaration",
    "enum_declaration",
];

pub(crate) fn lower_file(root: Node, src: &str, path: &Path) -> Vec<ClassDecl> {
    let mut segments = vec![Segment { namespace: String::new(), imports: ImportTable::default(), declarations: Vec::new() }];
    collect_segments(root, src, &mut segments);

    let mut out = Vec::new();
    for segment in segments {
        let ctx = Arc::new(FileContext {
            path: path.to_path_buf(),
            namespace: segment.namespace,
            imports: segment.imports,
        });
        for decl in segment.declarations {
            if let Some(class) = lower_class(decl, src, &ctx) {
                out.push(class);
            }
        }
    }
    out
}

fn collect_segments<'t>(node: Node<'t>, src: &str, segments: &mut Vec<Segment<'t>>) {
    for child in named(node) {
        match child.kind() {
            "namespace_definition" => {
                let namespace = field_text(child, "name", src)
                    .unwrap_or("")
                    .trim_start_matches('\\')
                    .to_string();
                segments.push(Segment { namespace, imports: ImportTable::default(), declarations: Vec::new() });
                if let Some(body) = child.child_by_field_name("body") {
                    collect_segments(body, src, segments);
                }
            }
            "namespace_use_declaration" => {
                if let Some(seg) = segments.last_mut() {
                    seg.imports.add_use_statement(text(child, src));
                }
            }
            kind if DECLARATION_KINDS.contains(&kind) => {
                if let Some(seg) = segments.last_mut() {
                    seg.declarations.push(child);
                }
            }
            // conditional declarations: `if (!class_exists(...)) { class ... }`
            "if_statement" | "compound_statement" => collect_segments(child, src, segments),
            _ => {}
        }
    }
}

// -------------------------------- Classes --------------------------------- //

fn lower_class(node: Node, src: &str, ctx: &Arc<FileContext>) -> Option<ClassDecl> {
    let kind = match node.kind() {
        "class_declaration" => ClassKind::Class,
        "interface_declaration" => ClassKind::Interface,
        "trait_declaration" => ClassKind::Trait,
        "enum_declaration" => ClassKind::Enum,
        _ => return None,
    };
    let name = field_text(node, "name", src)?.to_string();
    let fqn = if ctx.namespace.is_empty() { name.clone() } else { format!("{}\\{}", ctx.namespace, name) };
    let resolver = SymbolResolver::new(&ctx.namespace, &ctx.imports).with_class(&fqn);

    let names_in = |clause: Option<Node>| -> Vec<String> {
        clause
            .map(|c| {
                named(c)
                    .into_iter()
                    .filter(|n| matches!(n.kind(), "name" | "qualified_name"))
                    .map(|n| resolver.resolve_or_keep(text(n, src)))
                    .collect()
            })
            .unwrap_or_default()
    };
    let parent = names_in(child_of_kind(node, &["base_clause"])).into_iter().next();
    let interfaces = names_in(child_of_kind(node, &["class_interface_clause"]));

    let enum_backing = (kind == ClassKind::Enum)
        .then(|| {
            child_of_kind(node, &["primitive_type"])
                .map(|n| text(n, src).to_ascii_lowercase())
                .or_else(|| enum_backing_from_header(text(node, src)))
        })
        .flatten();

    let mut class = ClassDecl {
        kind,
        name,
        fqn: fqn.clone(),
        parent: if kind == ClassKind::Interface { None } else { parent },
        interfaces,
        traits: Vec::new(),
        attributes: lower_attributes(node, src),
        doc: doc_before(node, src),
        properties: Vec::new(),
        methods: Vec::new(),
        enum_backing,
        cases: Vec::new(),
        file: Arc::clone(ctx),
    };

    let Some(body) = node.child_by_field_name("body") else { return Some(class) };
    for member in named(body) {
        match member.kind() {
            "property_declaration" => class.properties.extend(lower_properties(member, src)),
            "method_declaration" => {
                if let Some(m) = lower_method(member, src) {
                    class.methods.push(m);
                }
            }
            "use_declaration" => class.traits.extend(names_in(Some(member))),
            "enum_case" => {
                if let Some(name) = field_text(member, "name", src) {
                    let value = member
                        .child_by_field_name("value")
                        .or_else(|| named(member).into_iter().nth(1))
                        .map(|v| lower_expr(v, src));
                    class.cases.push(EnumCase { name: name.to_string(), value });
                }
            }
            _ => {}
        }
    }
    Some(class)
}

/// `enum Status: string implements X {` → `string`
fn enum_backing_from_header(raw: &str) -> Option<String> {
    let header = raw.split('{').next()?;
    let (_, after) = header.split_once(':')?;
    let ty = after.split_whitespace().next()?.to_ascii_lowercase();
    matches!(ty.as_str(), "string" | "int").then_some(ty)
}

struct Modifiers {
    visibility: Visibility,
    is_static: bool,
}

fn modifiers(node: Node, src: &str) -> Modifiers {
    let mut out = Modifiers { visibility: Visibility::Public, is_static: false };
    for child in named(node) {
        match child.kind() {
            "visibility_modifier" => {
                out.visibility = match text(child, src).to_ascii_lowercase().as_str() {
                    "private" => Visibility::Private,
                    "protected" => Visibility::Protected,
                    _ => Visibility::Public,
                }
            }
            "static_modifier" => out.is_static = true,
            _ => {}
        }
    }
    out
}

fn lower_attributes(node: Node, src: &str) -> Vec<Attribute> {
    let Some(list) = node
        .child_by_field_name("attributes")
        .or_else(|| child_of_kind(node, &["attribute_list"]))
    else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for group in named(list) {
        for attr in named(group).into_iter().filter(|a| a.kind() == "attribute") {
            let Some(name) = child_of_kind(attr, &["name", "qualified_name"]) else { continue };
            let args = attr
                .child_by_field_name("parameters")
                .or_else(|| child_of_kind(attr, &["arguments"]))
                .map(|a| lower_args(a, src))
                .unwrap_or_default();
            out.push(Attribute { name: text(name, src).to_string(), args });
        }
    }
    out
}

fn parse_type(node: Option<Node>, src: &str) -> Option<TypeRef> {
    node.and_then(|n| TypeRef::parse(text(n, src)))
}

fn lower_properties(node: Node, src: &str) -> Vec<PropertyDecl> {
    let mods = modifiers(node, src);
    let ty = parse_type(node.child_by_field_name("type"), src);
    let attributes = lower_attributes(node, src);
    let doc = doc_before(node, src);
    named(node)
        .into_iter()
        .filter(|c| c.kind() == "property_element")
        .filter_map(|element| {
            let var = child_of_kind(element, &["variable_name"])?;
            Some(PropertyDecl {
                name: strip_var(text(var, src)),
                ty: ty.clone(),
                visibility: mods.visibility,
                is_static: mods.is_static,
                has_default: named(element).len() > 1 || has_token(element, "="),
                attributes: attributes.clone(),
                doc: doc.clone(),
            })
        })
        .collect()
}

fn lower_method(node: Node, src: &str) -> Option<MethodDecl> {
    let mods = modifiers(node, src);
    let name = field_text(node, "name", src)?.to_string();
    let params = node
        .child_by_field_name("parameters")
        .map(|p| lower_params(p, src))
        .unwrap_or_default();
    let body = node
        .child_by_field_name("body")
        .map(|b| lower_block(b, src))
        .unwrap_or_default();
    Some(MethodDecl {
        name,
        visibility: mods.visibility,
        is_static: mods.is_static,
        params,
        return_type: parse_type(node.child_by_field_name("return_type"), src),
        attributes: lower_attributes(node, src),
        doc: doc_before(node, src),
        body,
    })
}

fn lower_params(node: Node, src: &str) -> Vec<ParamDecl> {
    named(node)
        .into_iter()
        .filter(|p| p.kind().ends_with("parameter"))
        .filter_map(|p| {
            let name = p
                .child_by_field_name("name")
                .or_else(|| child_of_kind(p, &["variable_name"]))?;
            let promoted = (p.kind() == "property_promotion_parameter").then(|| {
                let visibility = p
                    .child_by_field_name("visibility")
                    .or_else(|| child_of_kind(p, &["visibility_modifier"]));
                match visibility.map(|v| text(v, src).to_ascii_lowercase()) {
                    Some(v) if v == "private" => Visibility::Private,
                    Some(v) if v == "protected" => Visibility::Protected,
                    _ => Visibility::Public,
                }
            });
            Some(ParamDecl {
                name: strip_var(text(name, src)),
                ty: parse_type(p.child_by_field_name("type"), src),
                has_default: p.child_by_field_name("default_value").is_some() || has_token(p, "="),
                promoted,
                attributes: lower_attributes(p, src),
            })
        })
        .collect()
}

// ------------------------------- Statements ------------------------------- //

const STATEMENT_CONTAINERS: &[&str] = &[
    "compound_statement",
    "else_clause",
    "else_if_clause",
    "colon_block",
    "catch_clause",
    "finally_clause",
    "switch_block",
    "case_statement",
    "default_statement",
];

fn lower_block(node: Node, src: &str) -> Vec<Stmt> {
    named(node).into_iter().filter_map(|c| lower_stmt(c, src)).collect()
}

fn lower_stmt(node: Node, src: &str) -> Option<Stmt> {
    match node.kind() {
        "return_statement" => Some(Stmt::Return(named(node).first().map(|e| lower_expr(*e, src)))),
        "expression_statement" => {
            let expr = *named(node).first()?;
            if expr.kind() == "assignment_expression" {
                if let Some(stmt) = lower_assignment(expr, src) {
                    return Some(stmt);
                }
            }
            Some(Stmt::Expr(lower_expr(expr, src)))
        }
        "function_definition" | "class_declaration" | "comment" => None,
        kind if kind.ends_with("_statement") || STATEMENT_CONTAINERS.contains(&kind) => {
            let nested: Vec<Stmt> = named(node)
                .into_iter()
                .filter(|c| c.kind().ends_with("_statement") || STATEMENT_CONTAINERS.contains(&c.kind()))
                .filter_map(|c| lower_stmt(c, src))
                .collect();
            Some(Stmt::Block(nested))
        }
        _ => None,
    }
}

fn lower_assignment(node: Node, src: &str) -> Option<Stmt> {
    let left = node.child_by_field_name("left")?;
    let right = node.child_by_field_name("right")?;
    let value = lower_expr(right, src);
    match left.kind() {
        "variable_name" => Some(Stmt::Assign { var: strip_var(text(left, src)), value }),
        "subscript_expression" => {
            let parts = named(left);
            let target = parts.first()?;
            if target.kind() != "variable_name" {
                return None;
            }
            let key = parts.get(1).and_then(|k| lower_expr(*k, src).as_key());
            Some(Stmt::AssignIndex { var: strip_var(text(*target, src)), key, value })
        }
        _ => None,
    }
}

// ------------------------------ Expressions ------------------------------- //

fn lower_args(node: Node, src: &str) -> Vec<Arg> {
    named(node)
        .into_iter()
        .map(|arg| {
            if arg.kind() != "argument" {
                return Arg { name: None, value: lower_expr(arg, src) };
            }
            let name = arg.child_by_field_name("name");
            let value = named(arg)
                .into_iter()
                .filter(|c| Some(c.id()) != name.map(|n| n.id()))
                .last()
                .map(|v| lower_expr(v, src))
                .unwrap_or(Expr::Null);
            Arg { name: name.map(|n| text(n, src).to_string()), value }
        })
        .collect()
}

fn lower_array(node: Node, src: &str) -> Expr {
    let mut items = Vec::new();
    for element in named(node).into_iter().filter(|e| e.kind() == "array_element_initializer") {
        if let Some(spread) = child_of_kind(element, &["variadic_unpacking"]) {
            let value = named(spread).first().map(|v| lower_expr(*v, src)).unwrap_or(Expr::Null);
            items.push(ArrayItem { key: None, value, spread: true });
            continue;
        }
        let parts: Vec<Node> = named(element).into_iter().filter(|p| p.kind() != "by_ref").collect();
        let item = if has_token(element, "=>") && parts.len() >= 2 {
            ArrayItem { key: Some(lower_expr(parts[0], src)), value: lower_expr(parts[1], src), spread: false }
        } else if let Some(v) = parts.first() {
            ArrayItem { key: None, value: lower_expr(*v, src), spread: false }
        } else {
            continue;
        };
        items.push(item);
    }
    Expr::Array(items)
}

fn closure_params(node: Node, src: &str) -> Vec<String> {
    node.child_by_field_name("parameters")
        .map(|p| lower_params(p, src).into_iter().map(|p| p.name).collect())
        .unwrap_or_default()
}

fn boxed(node: Option<Node>, src: &str) -> Box<Expr> {
    Box::new(node.map(|n| lower_expr(n, src)).unwrap_or(Expr::Null))
}

pub(crate) fn lower_expr(node: Node, src: &str) -> Expr {
    let raw = text(node, src);
    match node.kind() {
        "parenthesized_expression" => named(node)
            .first()
            .map(|inner| lower_expr(*inner, src))
            .unwrap_or(Expr::Null),
        "array_creation_expression" => lower_array(node, src),
        "string" | "encapsed_string" | "nowdoc" | "heredoc" => Expr::String(unquote(raw)),
        "integer" => raw
            .replace('_', "")
            .parse::<i64>()
            .map(Expr::Int)
            .unwrap_or_else(|_| Expr::Unknown(raw.to_string())),
        "float" => raw
            .replace('_', "")
            .parse::<f64>()
            .map(Expr::Float)
            .unwrap_or_else(|_| Expr::Unknown(raw.to_string())),
        "boolean" => Expr::Bool(raw.eq_ignore_ascii_case("true")),
        "null" => Expr::Null,
        "variable_name" => Expr::Var(strip_var(raw)),
        "member_access_expression" | "nullsafe_member_access_expression" => Expr::Prop {
            object: boxed(node.child_by_field_name("object"), src),
            name: field_text(node, "name", src).unwrap_or("").to_string(),
        },
        "member_call_expression" | "nullsafe_member_call_expression" => Expr::MethodCall {
            object: boxed(node.child_by_field_name("object"), src),
            name: field_text(node, "name", src).unwrap_or("").to_string(),
            args: node.child_by_field_name("arguments").map(|a| lower_args(a, src)).unwrap_or_default(),
        },
        "scoped_call_expression" => Expr::StaticCall {
            class: field_text(node, "scope", src).unwrap_or("").to_string(),
            name: field_text(node, "name", src).unwrap_or("").to_string(),
            args: node.child_by_field_name("arguments").map(|a| lower_args(a, src)).unwrap_or_default(),
        },
        "function_call_expression" => Expr::Call {
            name: field_text(node, "function", src).unwrap_or("").to_string(),
            args: node.child_by_field_name("arguments").map(|a| lower_args(a, src)).unwrap_or_default(),
        },
        "object_creation_expression" => {
            let parts = named(node);
            let class = parts
                .iter()
                .find(|p| matches!(p.kind(), "name" | "qualified_name"))
                .map(|p| text(*p, src).to_string())
                .unwrap_or_default();
            let args = parts
                .iter()
                .find(|p| p.kind() == "arguments")
                .map(|a| lower_args(*a, src))
                .unwrap_or_default();
            Expr::New { class, args }
        }
        "class_constant_access_expression" => match raw.rsplit_once("::") {
            Some((class, name)) => Expr::ClassConst { class: class.trim().to_string(), name: name.trim().to_string() },
            None => Expr::Unknown(raw.to_string()),
        },
        "anonymous_function" | "anonymous_function_creation_expression" => Expr::Closure {
            params: closure_params(node, src),
            body: ClosureBody::Block(
                node.child_by_field_name("body")
                    .map(|b| lower_block(b, src))
                    .unwrap_or_default(),
            ),
        },
        "arrow_function" => Expr::Closure {
            params: closure_params(node, src),
            body: ClosureBody::Expr(boxed(node.child_by_field_name("body"), src)),
        },
        "conditional_expression" => Expr::Ternary {
            cond: boxed(node.child_by_field_name("condition"), src),
            then: node.child_by_field_name("body").map(|b| Box::new(lower_expr(b, src))),
            otherwise: boxed(node.child_by_field_name("alternative"), src),
        },
        "cast_expression" => Expr::Cast {
            ty: field_text(node, "type", src).unwrap_or("").trim().to_ascii_lowercase(),
            value: boxed(node.child_by_field_name("value"), src),
        },
        "binary_expression" => Expr::Binary {
            op: field_text(node, "operator", src).unwrap_or("").to_string(),
            left: boxed(node.child_by_field_name("left"), src),
            right: boxed(node.child_by_field_name("right"), src),
        },
        "unary_op_expression" if raw.trim_start().starts_with('!') => {
            Expr::Not(boxed(named(node).last().copied(), src))
        }
        "subscript_expression" => {
            let parts = named(node);
            Expr::Index {
                object: boxed(parts.first().copied(), src),
                key: parts.get(1).map(|k| Box::new(lower_expr(*k, src))),
            }
        }
        "assignment_expression" => lower_expr_opt(node.child_by_field_name("right"), src),
        _ => Expr::Unknown(raw.to_string()),
    }
}

fn lower_expr_opt(node: Option<Node>, src: &str) -> Expr {
    node.map(|n| lower_expr(n, src)).unwrap_or(Expr::Null)
}
