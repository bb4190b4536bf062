//! Type expressions as written in signatures and doc-blocks.
//!
//! One parser covers both: `?int`, `int|string|null`, `A&B`, `User[]`,
//! `Collection<int, User>`, `array{id: int, name?: string}`, `'draft'|'live'`.
//! Unparseable text yields `None`; callers treat that as "no declared type".

use crate::ir::Scalar;

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Named { name: String, args: Vec<TypeRef> },
    /// `T[]`
    List(Box<TypeRef>),
    /// `array{...}` / `object{...}`
    Shape(Vec<ShapeEntry>),
    Nullable(Box<TypeRef>),
    Union(Vec<TypeRef>),
    Intersection(Vec<TypeRef>),
    Literal(Scalar),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeEntry {
    pub key: String,
    pub ty: TypeRef,
    pub optional: bool,
}

impl TypeRef {
    pub fn parse(text: &str) -> Option<TypeRef> {
        let mut p = TypeParser { chars: text.trim().chars().collect(), pos: 0 };
        let ty = p.union()?;
        p.skip_ws();
        // Trailing text (a doc-block description) is tolerated by callers
        // that split it off first; here it means malformed input.
        if p.pos < p.chars.len() {
            return None;
        }
        Some(ty)
    }

    pub fn named(name: &str) -> TypeRef {
        TypeRef::Named { name: name.to_string(), args: Vec::new() }
    }

    /// Lower-cased base name for named types.
    pub fn base_name(&self) -> Option<String> {
        match self {
            TypeRef::Named { name, .. } => Some(name.trim_start_matches('\\').to_ascii_lowercase()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.base_name().as_deref(), Some("null" | "void"))
            || matches!(self, TypeRef::Literal(Scalar::Null))
    }

    /// Whether `null` is one of the admitted values.
    pub fn admits_null(&self) -> bool {
        match self {
            TypeRef::Nullable(_) => true,
            TypeRef::Union(members) => members.iter().any(|m| m.is_null() || m.admits_null()),
            TypeRef::Named { .. } => self.base_name().as_deref() == Some("mixed") || self.is_null(),
            _ => false,
        }
    }

    /// Drops `null` from the type; `None` when nothing else remains.
    pub fn without_null(&self) -> Option<TypeRef> {
        match self {
            TypeRef::Nullable(inner) => Some((**inner).clone()),
            TypeRef::Union(members) => {
                let rest: Vec<TypeRef> = members.iter().filter(|m| !m.is_null()).cloned().collect();
                match rest.len() {
                    0 => None,
                    1 => rest.into_iter().next(),
                    _ => Some(TypeRef::Union(rest)),
                }
            }
            other if other.is_null() => None,
            other => Some(other.clone()),
        }
    }

    pub fn display(&self) -> String {
        match self {
            TypeRef::Named { name, args } if args.is_empty() => name.clone(),
            TypeRef::Named { name, args } => format!(
                "{name}<{}>",
                args.iter().map(TypeRef::display).collect::<Vec<_>>().join(", ")
            ),
            TypeRef::List(inner) => format!("{}[]", inner.display()),
            TypeRef::Shape(entries) => format!(
                "array{{{}}}",
                entries
                    .iter()
                    .map(|e| format!("{}{}: {}", e.key, if e.optional { "?" } else { "" }, e.ty.display()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TypeRef::Nullable(inner) => format!("?{}", inner.display()),
            TypeRef::Union(m) => m.iter().map(TypeRef::display).collect::<Vec<_>>().join("|"),
            TypeRef::Intersection(m) => m.iter().map(TypeRef::display).collect::<Vec<_>>().join("&"),
            TypeRef::Literal(Scalar::String(s)) => format!("'{s}'"),
            TypeRef::Literal(s) => s.to_json().to_string(),
        }
    }
}

// -------------------------------- Parser ---------------------------------- //

struct TypeParser {
    chars: Vec<char>,
    pos: usize,
}

impl TypeParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn union(&mut self) -> Option<TypeRef> {
        let mut members = vec![self.intersection()?];
        while self.eat('|') {
            members.push(self.intersection()?);
        }
        Some(if members.len() == 1 { members.remove(0) } else { TypeRef::Union(members) })
    }

    fn intersection(&mut self) -> Option<TypeRef> {
        let mut members = vec![self.postfix()?];
        loop {
            self.skip_ws();
            // `&` followed by `$` is a by-ref parameter, not an intersection
            if self.peek() == Some('&') && self.chars.get(self.pos + 1) != Some(&'$') {
                self.pos += 1;
                members.push(self.postfix()?);
            } else {
                break;
            }
        }
        Some(if members.len() == 1 { members.remove(0) } else { TypeRef::Intersection(members) })
    }

    fn postfix(&mut self) -> Option<TypeRef> {
        let mut ty = self.atom()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('[') && self.chars.get(self.pos + 1) == Some(&']') {
                self.pos += 2;
                ty = TypeRef::List(Box::new(ty));
            } else {
                break;
            }
        }
        Some(ty)
    }

    fn atom(&mut self) -> Option<TypeRef> {
        self.skip_ws();
        match self.peek()? {
            '?' => {
                self.pos += 1;
                Some(TypeRef::Nullable(Box::new(self.postfix()?)))
            }
            '(' => {
                self.pos += 1;
                let inner = self.union()?;
                self.eat(')').then_some(inner)
            }
            '\'' | '"' => self.string_literal().map(|s| TypeRef::Literal(Scalar::String(s))),
            c if c.is_ascii_digit() || c == '-' => {
                let start = self.pos;
                self.pos += 1;
                while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
                    self.pos += 1;
                }
                let raw: String = self.chars[start..self.pos].iter().collect();
                match Scalar::parse_loose(&raw) {
                    Scalar::String(_) => None,
                    lit => Some(TypeRef::Literal(lit)),
                }
            }
            _ => self.named(),
        }
    }

    fn ident(&mut self) -> Option<String> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '\\' | '-'))
        {
            self.pos += 1;
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }

    fn string_literal(&mut self) -> Option<String> {
        let quote = self.peek()?;
        self.pos += 1;
        let start = self.pos;
        while self.peek()? != quote {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.pos += 1;
        Some(text)
    }

    fn named(&mut self) -> Option<TypeRef> {
        let name = self.ident()?;
        let lower = name.to_ascii_lowercase();
        self.skip_ws();
        match self.peek() {
            Some('<') => {
                self.pos += 1;
                let mut args = vec![self.union()?];
                while self.eat(',') {
                    args.push(self.union()?);
                }
                self.eat('>').then_some(TypeRef::Named { name, args })
            }
            Some('{') if matches!(lower.as_str(), "array" | "list" | "object" | "non-empty-array") => {
                self.pos += 1;
                let entries = self.shape_entries()?;
                Some(TypeRef::Shape(entries))
            }
            Some('(') if matches!(lower.as_str(), "callable" | "closure" | "\\closure") => {
                // callable(int): string. Keep the name and skip the signature
                let mut depth = 0usize;
                while let Some(c) = self.peek() {
                    self.pos += 1;
                    match c {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                if self.eat(':') {
                    self.postfix()?;
                }
                Some(TypeRef::Named { name, args: Vec::new() })
            }
            _ => Some(TypeRef::Named { name, args: Vec::new() }),
        }
    }

    fn shape_entries(&mut self) -> Option<Vec<ShapeEntry>> {
        let mut entries = Vec::new();
        let mut index = 0usize;
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Some(entries);
            }
            if self.peek() == Some('.') {
                // `...` unsealed marker
                while self.peek() == Some('.') {
                    self.pos += 1;
                }
                self.eat(',');
                continue;
            }
            let save = self.pos;
            let key = match self.peek()? {
                '\'' | '"' => self.string_literal(),
                _ => self.ident(),
            };
            let optional = self.eat('?');
            let entry = if key.is_some() && self.eat(':') {
                ShapeEntry { key: key?, ty: self.union()?, optional }
            } else {
                // positional entry: `array{int, string}`
                self.pos = save;
                let ty = self.union()?;
                let entry = ShapeEntry { key: index.to_string(), ty, optional: false };
                index += 1;
                entry
            };
            entries.push(entry);
            if !self.eat(',') {
                return self.eat('}').then_some(entries);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullable_and_unions() {
        let t = TypeRef::parse("?int").unwrap();
        assert!(t.admits_null());
        assert_eq!(t.without_null(), Some(TypeRef::named("int")));

        let u = TypeRef::parse("string|null").unwrap();
        assert!(u.admits_null());
        assert_eq!(u.without_null(), Some(TypeRef::named("string")));

        let both = TypeRef::parse("int|string").unwrap();
        assert!(matches!(both, TypeRef::Union(ref m) if m.len() == 2));
        assert!(!both.admits_null());
    }

    #[test]
    fn generics_lists_and_shapes() {
        let g = TypeRef::parse("Collection<int, \\App\\Models\\User>").unwrap();
        match g {
            TypeRef::Named { name, args } => {
                assert_eq!(name, "Collection");
                assert_eq!(args.len(), 2);
                assert_eq!(args[1], TypeRef::named("\\App\\Models\\User"));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            TypeRef::parse("User[]").unwrap(),
            TypeRef::List(Box::new(TypeRef::named("User")))
        );

        let shape = TypeRef::parse("array{id: int, name?: string}").unwrap();
        match shape {
            TypeRef::Shape(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].key, "id");
                assert!(!entries[0].optional);
                assert!(entries[1].optional);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn literal_unions() {
        let t = TypeRef::parse("'draft'|'published'").unwrap();
        assert_eq!(
            t,
            TypeRef::Union(vec![
                TypeRef::Literal(Scalar::String("draft".into())),
                TypeRef::Literal(Scalar::String("published".into())),
            ])
        );
    }

    #[test]
    fn malformed_text_is_rejected() {
        assert!(TypeRef::parse("array<int").is_none());
        assert!(TypeRef::parse("").is_none());
        assert!(TypeRef::parse("int the id").is_none());
    }
}
