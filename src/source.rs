//! Source layer: PHP text → owned declarations.
//!
//! `parse_source` runs tree-sitter once and immediately lowers the concrete
//! tree into [`ast`] types, so nothing downstream holds parser state. A file
//! with syntax errors is a [`InferError::Parse`]; callers treat that as "no
//! information available" for every class the file would have declared.
pub mod ast;
pub mod docblock;
pub mod index;
pub mod lower;
pub mod resolver;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tree_sitter::Parser;

use crate::error::{InferError, Result};
pub use ast::{ClassDecl, ClassKind, Expr, MethodDecl, Stmt};
pub use index::SourceIndex;
pub use resolver::{ImportTable, SymbolResolver};
pub use types::TypeRef;

/// Namespace + imports shared by every declaration of one namespace block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileContext {
    pub path: PathBuf,
    pub namespace: String,
    pub imports: ImportTable,
}

impl FileContext {
    pub fn resolver(&self) -> SymbolResolver<'_> {
        SymbolResolver::new(&self.namespace, &self.imports)
    }
}

#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub classes: Vec<Arc<ClassDecl>>,
}

pub fn parse_source(path: &Path, text: &str) -> Result<ParsedFile> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_php::LANGUAGE_PHP.into())
        .map_err(|e| InferError::parse(path, format!("failed to load PHP grammar: {e}")))?;

    let tree = parser
        .parse(text, None)
        .ok_or_else(|| InferError::parse(path, "parser produced no tree"))?;
    let root = tree.root_node();
    if root.has_error() {
        let line = lower::first_error_line(root).unwrap_or(0);
        return Err(InferError::parse(path, format!("syntax error near line {line}")));
    }

    let classes = lower::lower_file(root, text, path)
        .into_iter()
        .map(Arc::new)
        .collect();
    Ok(ParsedFile { path: path.to_path_buf(), classes })
}

#[cfg(test)]
mod tests {
    use super::ast::{ArrayItem, ClosureBody, Visibility};
    use super::*;

    fn parse(src: &str) -> ParsedFile {
        parse_source(Path::new("test.php"), src).expect("fixture parses")
    }

    const RESOURCE: &str = r#"<?php

namespace App\Http\Resources;

use App\Models\User;
use Illuminate\Http\Resources\Json\JsonResource;

/**
 * Public user representation.
 */
class UserResource extends JsonResource
{
    public function toArray($request): array
    {
        return [
            'id' => $this->id,
            'email' => $this->when($this->isAdmin(), $this->email),
            'tags' => $this->tags->map(fn ($t) => $t->name),
            'profile' => [
                'bio' => $this->bio,
            ],
        ];
    }
}
"#;

    #[test]
    fn lowers_namespace_imports_and_parent() {
        let file = parse(RESOURCE);
        assert_eq!(file.classes.len(), 1);
        let class = &file.classes[0];
        assert_eq!(class.fqn, "App\\Http\\Resources\\UserResource");
        assert_eq!(class.parent.as_deref(), Some("Illuminate\\Http\\Resources\\Json\\JsonResource"));
        assert_eq!(class.file.imports.get("User"), Some("App\\Models\\User"));
        assert_eq!(class.doc.as_ref().and_then(|d| d.summary.as_deref()), Some("Public user representation."));
    }

    #[test]
    fn lowers_return_array_literal() {
        let file = parse(RESOURCE);
        let method = file.classes[0].method("toArray").unwrap();
        assert_eq!(method.return_type, Some(TypeRef::named("array")));
        let Stmt::Return(Some(Expr::Array(items))) = &method.body[0] else {
            panic!("expected return of array literal, got {:?}", method.body);
        };
        let keys: Vec<_> = items.iter().filter_map(|i| i.key.as_ref().and_then(Expr::as_key)).collect();
        assert_eq!(keys, vec!["id", "email", "tags", "profile"]);

        match &items[0] {
            ArrayItem { value: Expr::Prop { object, name }, .. } => {
                assert!(object.is_this());
                assert_eq!(name, "id");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &items[1].value {
            Expr::MethodCall { name, args, .. } => {
                assert_eq!(name, "when");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &items[2].value {
            Expr::MethodCall { name, args, .. } => {
                assert_eq!(name, "map");
                assert!(matches!(&args[0].value, Expr::Closure { body: ClosureBody::Expr(_), .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&items[3].value, Expr::Array(inner) if inner.len() == 1));
    }

    #[test]
    fn lowers_typed_and_promoted_properties() {
        let file = parse(
            r#"<?php
namespace App\Data;

use Carbon\Carbon;

#[MapName(SnakeCaseMapper::class)]
final class UserData extends Data
{
    /** @var string[] */
    public array $roles = [];
    protected ?string $secret;

    public function __construct(
        public int $id,
        public ?Carbon $createdAt,
        private string $hidden = 'x',
    ) {}
}
"#,
        );
        let class = &file.classes[0];
        assert_eq!(class.attributes.len(), 1);
        assert_eq!(class.attributes[0].name, "MapName");
        assert_eq!(class.parent.as_deref(), Some("App\\Data\\Data"));

        let roles = class.property("roles").unwrap();
        assert_eq!(roles.ty, Some(TypeRef::named("array")));
        assert!(roles.has_default);
        assert!(roles.doc.as_ref().unwrap().var_type(None).is_some());

        let secret = class.property("secret").unwrap();
        assert_eq!(secret.visibility, Visibility::Protected);
        assert!(!secret.has_default);

        let promoted: Vec<_> = class.promoted_params().map(|p| p.name.as_str()).collect();
        assert_eq!(promoted, vec!["id", "createdAt", "hidden"]);
        let hidden = class.promoted_params().find(|p| p.name == "hidden").unwrap();
        assert_eq!(hidden.promoted, Some(Visibility::Private));
        assert!(hidden.has_default);
    }

    #[test]
    fn lowers_backed_enums() {
        let file = parse(
            "<?php\nnamespace App\\Enums;\n\nenum Status: string\n{\n    case Draft = 'draft';\n    case Live = 'live';\n}\n",
        );
        let class = &file.classes[0];
        assert_eq!(class.kind, ClassKind::Enum);
        assert_eq!(class.enum_backing.as_deref(), Some("string"));
        let values: Vec<_> = class.cases.iter().filter_map(|c| c.value.as_ref().and_then(Expr::as_str)).collect();
        assert_eq!(values, vec!["draft", "live"]);
    }

    #[test]
    fn nested_returns_and_index_assignments() {
        let file = parse(
            r#"<?php
class C {
    public function show() {
        $data = ['id' => 1];
        $data['name'] = 'x';
        if ($this->flag) {
            return $data;
        }
        return null;
    }
}
"#,
        );
        let body = &file.classes[0].method("show").unwrap().body;
        assert!(matches!(&body[0], Stmt::Assign { var, .. } if var == "data"));
        assert!(matches!(&body[1], Stmt::AssignIndex { var, key: Some(k), .. } if var == "data" && k == "name"));
        assert!(matches!(&body[2], Stmt::Block(inner) if inner.iter().any(|s| matches!(s, Stmt::Block(_) | Stmt::Return(_)))));
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        let err = parse_source(Path::new("broken.php"), "<?php class {").unwrap_err();
        assert!(matches!(err, InferError::Parse { .. }));
    }
}
