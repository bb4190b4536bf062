//! Doc-block (`/** ... */`) tag extraction.

use super::types::TypeRef;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocBlock {
    pub summary: Option<String>,
    pub tags: Vec<DocTag>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocTag {
    /// `@property`, `@property-read`, `@property-write`
    Property { name: String, ty: Option<TypeRef>, description: Option<String> },
    Var { name: Option<String>, ty: Option<TypeRef>, description: Option<String> },
    Return { ty: Option<TypeRef>, description: Option<String> },
    Param { name: String, ty: Option<TypeRef> },
    Deprecated,
    Other { name: String, text: String },
}

impl DocBlock {
    pub fn parse(raw: &str) -> Option<DocBlock> {
        let raw = raw.trim();
        if !raw.starts_with("/**") {
            return None;
        }
        let body = raw.trim_start_matches("/**").trim_end_matches("*/");

        // Join continuation lines onto the tag that opened them.
        let mut summary_lines: Vec<String> = Vec::new();
        let mut tag_lines: Vec<String> = Vec::new();
        for line in body.lines() {
            let line = line.trim().trim_start_matches('*').trim();
            if line.starts_with('@') {
                tag_lines.push(line.to_string());
            } else if let Some(last) = tag_lines.last_mut() {
                if !line.is_empty() {
                    last.push(' ');
                    last.push_str(line);
                }
            } else if !line.is_empty() {
                summary_lines.push(line.to_string());
            }
        }

        let summary = (!summary_lines.is_empty()).then(|| summary_lines.join(" "));
        let tags = tag_lines.iter().map(|l| parse_tag(l)).collect();
        Some(DocBlock { summary, tags })
    }

    pub fn return_type(&self) -> Option<&TypeRef> {
        self.tags.iter().find_map(|t| match t {
            DocTag::Return { ty, .. } => ty.as_ref(),
            _ => None,
        })
    }

    /// `@var` type; a named `@var T $x` only matches `name`.
    pub fn var_type(&self, name: Option<&str>) -> Option<&TypeRef> {
        self.tags.iter().find_map(|t| match t {
            DocTag::Var { name: tag_name, ty, .. } => match (tag_name, name) {
                (Some(a), Some(b)) if a != b => None,
                _ => ty.as_ref(),
            },
            _ => None,
        })
    }

    pub fn is_deprecated(&self) -> bool {
        self.tags.iter().any(|t| matches!(t, DocTag::Deprecated))
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, Option<&TypeRef>, Option<&str>)> {
        self.tags.iter().filter_map(|t| match t {
            DocTag::Property { name, ty, description } => {
                Some((name.as_str(), ty.as_ref(), description.as_deref()))
            }
            _ => None,
        })
    }
}

fn parse_tag(line: &str) -> DocTag {
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((n, r)) => (n.trim_start_matches('@'), r.trim()),
        None => (line.trim_start_matches('@'), ""),
    };
    match name {
        "property" | "property-read" | "property-write" => {
            let (ty, rest) = split_type(rest);
            match split_variable(rest) {
                Some((var, description)) => DocTag::Property { name: var, ty, description },
                None => DocTag::Other { name: name.to_string(), text: rest.to_string() },
            }
        }
        "var" => {
            let (ty, rest) = split_type(rest);
            match split_variable(rest) {
                Some((var, description)) => DocTag::Var { name: Some(var), ty, description },
                None => DocTag::Var { name: None, ty, description: non_empty(rest) },
            }
        }
        "return" => {
            let (ty, rest) = split_type(rest);
            DocTag::Return { ty, description: non_empty(rest) }
        }
        "param" => {
            let (ty, rest) = split_type(rest);
            match split_variable(rest) {
                Some((var, _)) => DocTag::Param { name: var, ty },
                None => DocTag::Other { name: name.to_string(), text: rest.to_string() },
            }
        }
        "deprecated" => DocTag::Deprecated,
        _ => DocTag::Other { name: name.to_string(), text: rest.to_string() },
    }
}

/// Splits a leading type expression off `text`; brackets may contain spaces.
fn split_type(text: &str) -> (Option<TypeRef>, &str) {
    if text.starts_with('$') {
        return (None, text);
    }
    let mut depth = 0i32;
    let mut end = text.len();
    for (i, c) in text.char_indices() {
        match c {
            '<' | '{' | '(' => depth += 1,
            '>' | '}' | ')' => depth -= 1,
            c if c.is_whitespace() && depth <= 0 => {
                // `int | null` style spacing around separators
                let before = text[..i].trim_end();
                let after = text[i..].trim_start();
                if before.ends_with('|') || after.starts_with('|') {
                    continue;
                }
                end = i;
                break;
            }
            _ => {}
        }
    }
    let raw: String = text[..end].chars().filter(|c| !c.is_whitespace() || depth > 0).collect();
    (TypeRef::parse(&raw), text[end..].trim())
}

fn split_variable(text: &str) -> Option<(String, Option<String>)> {
    let text = text.trim();
    let rest = text.strip_prefix('$')?;
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let name = rest[..end].to_string();
    (!name.is_empty()).then(|| (name, non_empty(&rest[end..])))
}

fn non_empty(text: &str) -> Option<String> {
    let t = text.trim();
    (!t.is_empty()).then(|| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_tags_with_generic_types() {
        let doc = DocBlock::parse(
            "/**\n * A user.\n *\n * @property int $id\n * @property-read array<int, string> $tags The tags\n * @property string|null $email\n */",
        )
        .unwrap();
        assert_eq!(doc.summary.as_deref(), Some("A user."));
        let props: Vec<_> = doc.properties().collect();
        assert_eq!(props.len(), 3);
        assert_eq!(props[0].0, "id");
        assert_eq!(props[0].1, Some(&TypeRef::named("int")));
        assert_eq!(props[1].0, "tags");
        assert!(matches!(props[1].1, Some(TypeRef::Named { args, .. }) if args.len() == 2));
        assert_eq!(props[1].2, Some("The tags"));
        assert!(props[2].1.unwrap().admits_null());
    }

    #[test]
    fn return_and_var_tags() {
        let doc = DocBlock::parse("/** @return array{id: int} */").unwrap();
        assert!(matches!(doc.return_type(), Some(TypeRef::Shape(_))));

        let var = DocBlock::parse("/** @var \\App\\Models\\User[] */").unwrap();
        assert!(matches!(var.var_type(None), Some(TypeRef::List(_))));

        let deprecated = DocBlock::parse("/**\n * @deprecated use v2\n */").unwrap();
        assert!(deprecated.is_deprecated());
    }

    #[test]
    fn plain_comments_are_not_docblocks() {
        assert!(DocBlock::parse("// nope").is_none());
        assert!(DocBlock::parse("/* nope */").is_none());
    }
}
