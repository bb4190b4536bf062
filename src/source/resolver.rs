//! Short name → fully-qualified name.
//!
//! Resolution is optimistic: it always produces *some* FQN. Whether that FQN
//! names anything we can analyze is for the next tier to find out.

use indexmap::IndexMap;

use crate::error::{InferError, Result};

/// `use` statements of one file: alias (as written or implied) → FQN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportTable {
    entries: IndexMap<String, String>,
}

impl ImportTable {
    pub fn insert(&mut self, alias: impl Into<String>, fqn: impl Into<String>) {
        self.entries.insert(alias.into(), fqn.into().trim_start_matches('\\').to_string());
    }

    /// PHP class names are case-insensitive.
    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries
            .get(alias)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(alias))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses the text of one `use ...;` statement into the table.
    pub fn add_use_statement(&mut self, text: &str) {
        let body = text.trim().trim_end_matches(';').trim();
        let Some(body) = body.strip_prefix("use") else { return };
        let body = body.trim();
        if body.starts_with("function ") || body.starts_with("const ") {
            return;
        }
        // grouped form: `use App\Models\{User, Post as P};`
        if let (Some(open), Some(close)) = (body.find('{'), body.rfind('}')) {
            let prefix = body[..open].trim().trim_end_matches('\\');
            for clause in body[open + 1..close].split(',') {
                self.add_clause(clause, Some(prefix));
            }
            return;
        }
        for clause in body.split(',') {
            self.add_clause(clause, None);
        }
    }

    fn add_clause(&mut self, clause: &str, prefix: Option<&str>) {
        let clause = clause.trim();
        if clause.is_empty() {
            return;
        }
        let (path, alias) = match split_alias(clause) {
            Some((p, a)) => (p, Some(a)),
            None => (clause, None),
        };
        let path = path.trim().trim_start_matches('\\');
        let fqn = match prefix {
            Some(prefix) => format!("{}\\{}", prefix.trim_start_matches('\\'), path),
            None => path.to_string(),
        };
        let alias = alias
            .map(str::to_string)
            .unwrap_or_else(|| short_name(&fqn).to_string());
        self.insert(alias, fqn);
    }
}

fn split_alias(clause: &str) -> Option<(&str, &str)> {
    let lower = clause.to_ascii_lowercase();
    let idx = lower.find(" as ")?;
    Some((&clause[..idx], clause[idx + 4..].trim()))
}

/// Last `\`-separated segment.
pub fn short_name(fqn: &str) -> &str {
    fqn.rsplit('\\').next().unwrap_or(fqn)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedVia {
    Absolute,
    Import,
    Namespace,
    SelfReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub fqn: String,
    pub via: ResolvedVia,
}

/// Stateless resolver over a namespace + import table (+ enclosing class).
pub struct SymbolResolver<'a> {
    pub namespace: &'a str,
    pub imports: &'a ImportTable,
    pub current_class: Option<&'a str>,
}

impl<'a> SymbolResolver<'a> {
    pub fn new(namespace: &'a str, imports: &'a ImportTable) -> Self {
        Self { namespace, imports, current_class: None }
    }

    pub fn with_class(mut self, fqn: &'a str) -> Self {
        self.current_class = Some(fqn);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Resolved> {
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(InferError::unresolved(name));
        }

        if let Some(abs) = name.strip_prefix('\\') {
            return Ok(Resolved { fqn: abs.to_string(), via: ResolvedVia::Absolute });
        }

        if matches!(name.to_ascii_lowercase().as_str(), "self" | "static" | "$this") {
            return match self.current_class {
                Some(fqn) => Ok(Resolved { fqn: fqn.to_string(), via: ResolvedVia::SelfReference }),
                None => Err(InferError::unresolved(name)),
            };
        }

        // first segment may be an imported alias: `Models\User` with `use App\Models;`
        let (head, tail) = match name.split_once('\\') {
            Some((h, t)) => (h, Some(t)),
            None => (name, None),
        };
        if let Some(imported) = self.imports.get(head) {
            let fqn = match tail {
                Some(t) => format!("{imported}\\{t}"),
                None => imported.to_string(),
            };
            return Ok(Resolved { fqn, via: ResolvedVia::Import });
        }

        let fqn = if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}\\{}", self.namespace, name)
        };
        Ok(Resolved { fqn, via: ResolvedVia::Namespace })
    }

    /// Resolution that never fails; unresolvable input comes back unchanged.
    pub fn resolve_or_keep(&self, name: &str) -> String {
        self.resolve(name)
            .map(|r| r.fqn)
            .unwrap_or_else(|_| name.trim_start_matches('\\').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imports() -> ImportTable {
        let mut t = ImportTable::default();
        t.add_use_statement("use App\\Models\\User;");
        t.add_use_statement("use App\\Http\\Resources\\{PostResource, CommentResource as Comments};");
        t.add_use_statement("use Illuminate\\Support\\Carbon as Date, App\\Enums;");
        t.add_use_statement("use function App\\helpers\\format_money;");
        t
    }

    #[test]
    fn parses_plain_grouped_and_aliased_imports() {
        let t = imports();
        assert_eq!(t.get("User"), Some("App\\Models\\User"));
        assert_eq!(t.get("PostResource"), Some("App\\Http\\Resources\\PostResource"));
        assert_eq!(t.get("Comments"), Some("App\\Http\\Resources\\CommentResource"));
        assert_eq!(t.get("Date"), Some("Illuminate\\Support\\Carbon"));
        assert_eq!(t.get("Enums"), Some("App\\Enums"));
        assert_eq!(t.get("format_money"), None);
        assert_eq!(t.len(), 5);
    }

    #[test]
    fn resolution_order() {
        let t = imports();
        let r = SymbolResolver::new("App\\Http\\Controllers", &t).with_class("App\\Http\\Controllers\\UserController");

        assert_eq!(r.resolve("\\Foo\\Bar").unwrap().fqn, "Foo\\Bar");
        assert_eq!(r.resolve("\\Foo\\Bar").unwrap().via, ResolvedVia::Absolute);

        let user = r.resolve("user").unwrap();
        assert_eq!(user.fqn, "App\\Models\\User");
        assert_eq!(user.via, ResolvedVia::Import);

        assert_eq!(r.resolve("Enums\\Status").unwrap().fqn, "App\\Enums\\Status");

        let local = r.resolve("Helper").unwrap();
        assert_eq!(local.fqn, "App\\Http\\Controllers\\Helper");
        assert_eq!(local.via, ResolvedVia::Namespace);

        assert_eq!(r.resolve("static").unwrap().fqn, "App\\Http\\Controllers\\UserController");
    }

    #[test]
    fn failures_are_reported_not_panicked() {
        let t = ImportTable::default();
        let r = SymbolResolver::new("", &t);
        assert!(matches!(r.resolve(""), Err(InferError::UnresolvedType { .. })));
        assert!(r.resolve("self").is_err());
        assert_eq!(r.resolve_or_keep("Foo"), "Foo");
    }
}
