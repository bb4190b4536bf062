//! String facets: example generation from regex constraints and PHP date
//! formats. Every generated example is checked before it is returned; an
//! unknown shape yields no example, never a wrong one.
use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{TimeZone, Utc};
use regex::Regex;

use crate::ir::Format;

// ------------------------------ Regex shapes ------------------------------ //

/// Repetitions longer than this are not worth illustrating.
const MAX_REPEAT: u32 = 64;

#[derive(Debug, Clone)]
enum Atom {
    Literal(char),
    /// Inclusive ranges; a single char is `(c, c)`.
    Class(Vec<(char, char)>),
    Group(Vec<Piece>),
}

#[derive(Debug, Clone)]
struct Piece {
    atom: Atom,
    min: u32,
    max: Option<u32>,
}

struct PatternParser {
    chars: Vec<char>,
    pos: usize,
}

impl PatternParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// A sequence up to `)` or end. On `|` only the first branch is kept.
    fn sequence(&mut self) -> Option<Vec<Piece>> {
        let mut out = Vec::new();
        while let Some(c) = self.peek() {
            match c {
                ')' => break,
                '|' => {
                    self.skip_alternatives()?;
                    break;
                }
                '^' if self.pos == 0 => self.pos += 1,
                '$' if self.pos + 1 == self.chars.len() => self.pos += 1,
                _ => {
                    let atom = self.atom()?;
                    let (min, max) = self.quantifier()?;
                    out.push(Piece { atom, min, max });
                }
            }
        }
        Some(out)
    }

    /// Skips from `|` to the `)` closing the current group (or the end).
    fn skip_alternatives(&mut self) -> Option<()> {
        let mut depth = 0usize;
        let mut in_class = false;
        while let Some(c) = self.peek() {
            match c {
                '\\' => self.pos += 1,
                '[' => in_class = true,
                ']' => in_class = false,
                '(' if !in_class => depth += 1,
                ')' if !in_class => {
                    if depth == 0 {
                        return Some(());
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.pos += 1;
        }
        Some(())
    }

    fn atom(&mut self) -> Option<Atom> {
        match self.next()? {
            '\\' => self.escape(),
            '[' => self.class(),
            '(' => {
                if self.peek() == Some('?') {
                    self.pos += 1;
                    match self.next()? {
                        ':' => {}
                        // named group: (?<name>...) or (?P<name>...)
                        'P' | '<' => {
                            while self.next()? != '>' {}
                        }
                        // lookaround, inline flags: out of scope
                        _ => return None,
                    }
                }
                let inner = self.sequence()?;
                (self.next()? == ')').then_some(Atom::Group(inner))
            }
            '.' => Some(Atom::Literal('a')),
            c if "*+?{".contains(c) => None,
            c => Some(Atom::Literal(c)),
        }
    }

    fn escape(&mut self) -> Option<Atom> {
        Some(match self.next()? {
            'd' => Atom::Class(vec![('0', '9')]),
            'w' => Atom::Class(vec![('a', 'z'), ('A', 'Z'), ('0', '9')]),
            's' => Atom::Literal(' '),
            c if c.is_ascii_alphanumeric() => return None,
            c => Atom::Literal(c),
        })
    }

    fn class(&mut self) -> Option<Atom> {
        if self.peek() == Some('^') {
            return None;
        }
        let mut ranges = Vec::new();
        let mut first = true;
        loop {
            let c = self.next()?;
            if c == ']' && !first {
                break;
            }
            first = false;
            let start = match c {
                '\\' => match self.next()? {
                    'd' => {
                        ranges.push(('0', '9'));
                        continue;
                    }
                    'w' => {
                        ranges.extend([('a', 'z'), ('A', 'Z'), ('0', '9')]);
                        continue;
                    }
                    's' => ' ',
                    e if e.is_ascii_alphanumeric() => return None,
                    e => e,
                },
                other => other,
            };
            if self.peek() == Some('-') && self.chars.get(self.pos + 1).is_some_and(|n| *n != ']') {
                self.pos += 1;
                let end = match self.next()? {
                    '\\' => self.next()?,
                    e => e,
                };
                if end < start {
                    return None;
                }
                ranges.push((start, end));
            } else {
                ranges.push((start, start));
            }
        }
        (!ranges.is_empty()).then_some(Atom::Class(ranges))
    }

    fn quantifier(&mut self) -> Option<(u32, Option<u32>)> {
        let q = match self.peek() {
            Some('*') => (0, None),
            Some('+') => (1, None),
            Some('?') => (0, Some(1)),
            Some('{') => {
                let close = self.chars[self.pos..].iter().position(|c| *c == '}')? + self.pos;
                let body: String = self.chars[self.pos + 1..close].iter().collect();
                self.pos = close;
                match body.split_once(',') {
                    None => {
                        let n = body.trim().parse().ok()?;
                        (n, Some(n))
                    }
                    Some((lo, hi)) => {
                        let lo = lo.trim().parse().ok()?;
                        let hi = hi.trim();
                        let hi = if hi.is_empty() { None } else { Some(hi.parse().ok()?) };
                        (lo, hi)
                    }
                }
            }
            _ => return Some((1, Some(1))),
        };
        self.pos += 1;
        // lazy / possessive suffix
        if matches!(self.peek(), Some('?') | Some('+')) {
            self.pos += 1;
        }
        Some(q)
    }
}

fn render(pieces: &[Piece], out: &mut String) -> Option<()> {
    for piece in pieces {
        let count = piece.min.max(1).min(piece.max.unwrap_or(u32::MAX));
        if count > MAX_REPEAT {
            return None;
        }
        for i in 0..count {
            match &piece.atom {
                Atom::Literal(c) => out.push(*c),
                Atom::Class(ranges) => out.push(pick(ranges, i)),
                Atom::Group(inner) => render(inner, out)?,
            }
        }
    }
    Some(())
}

/// Cycles through the first range so `[0-9]{4}` renders as `0123`.
fn pick(ranges: &[(char, char)], i: u32) -> char {
    let (start, end) = ranges[0];
    let span = end as u32 - start as u32 + 1;
    char::from_u32(start as u32 + i % span).unwrap_or(start)
}

/// Example string matching `pattern`, when the pattern is one of the simple
/// shapes we know (literals, classes, counted repetitions, groups).
pub fn example_from_pattern(pattern: &str) -> Option<String> {
    let body = pattern.strip_prefix("(?i)").unwrap_or(pattern);
    let mut parser = PatternParser { chars: body.chars().collect(), pos: 0 };
    let pieces = parser.sequence()?;
    if parser.pos != parser.chars.len() {
        return None;
    }
    let mut out = String::new();
    render(&pieces, &mut out)?;
    let rx = Regex::new(pattern).ok()?;
    rx.is_match(&out).then_some(out)
}

/// `/^a+$/i` → `(?i)^a+$`. Input without delimiters is returned unchanged.
pub fn strip_delimiters(raw: &str) -> String {
    let raw = raw.trim();
    let Some(delim) = raw.chars().next() else { return String::new() };
    if delim.is_alphanumeric() || delim == '\\' || delim == '^' {
        return raw.to_string();
    }
    let close = match delim {
        '(' => ')',
        '{' => '}',
        '[' => ']',
        '<' => '>',
        other => other,
    };
    let Some(end) = raw.rfind(close).filter(|e| *e > 0) else {
        return raw.to_string();
    };
    let body = &raw[delim.len_utf8()..end];
    let flags = &raw[end + close.len_utf8()..];
    if flags.contains('i') {
        format!("(?i){body}")
    } else {
        body.to_string()
    }
}

// ------------------------------ Date formats ------------------------------ //

/// PHP `date()` format → chrono strftime. `None` for characters chrono cannot render.
fn php_to_strftime(php: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = php.chars();
    while let Some(c) = chars.next() {
        let piece = match c {
            'Y' => "%Y",
            'y' => "%y",
            'm' => "%m",
            'n' => "%-m",
            'd' => "%d",
            'j' => "%-d",
            'D' => "%a",
            'l' => "%A",
            'M' => "%b",
            'F' => "%B",
            'H' => "%H",
            'G' => "%-H",
            'h' => "%I",
            'g' => "%-I",
            'i' => "%M",
            's' => "%S",
            'A' => "%p",
            'a' => "%P",
            'u' => "%6f",
            'v' => "%3f",
            'P' => "%:z",
            'O' => "%z",
            'T' | 'e' => "%Z",
            'c' => "%+",
            'U' => "%s",
            '%' => "%%",
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
                continue;
            }
            c if c.is_ascii_alphabetic() => return None,
            c => {
                out.push(c);
                continue;
            }
        };
        out.push_str(piece);
    }
    Some(out)
}

/// Format plus rendered example for a `date_format:` parameter.
pub fn date_format_example(php: &str) -> Option<(Format, String)> {
    let has_date = php.chars().any(|c| "YymndjDlMFcU".contains(c));
    let has_time = php.chars().any(|c| "HGhgisuvcU".contains(c));
    let format = match (has_date, has_time) {
        (true, true) => Format::DateTime,
        (true, false) => Format::Date,
        (false, true) => Format::Time,
        (false, false) => return None,
    };

    let fmt = php_to_strftime(php)?;
    let items: Vec<Item<'_>> = StrftimeItems::new(&fmt).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return None;
    }
    let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).single()?;
    let mut example = String::new();
    write!(example, "{}", at.format_with_items(items.into_iter())).ok()?;
    Some((format, example))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_digit_and_letter_templates() {
        assert_eq!(example_from_pattern(r"^[0-9]{5}$").as_deref(), Some("01234"));
        assert_eq!(example_from_pattern(r"^[A-Z]{2}-\d{3}$").as_deref(), Some("AB-012"));
        assert_eq!(example_from_pattern(r"^\+?[0-9]{3}$").as_deref(), Some("+012"));
        assert_eq!(example_from_pattern(r"^(?:ab)+c$").as_deref(), Some("abc"));
    }

    #[test]
    fn unknown_shapes_yield_nothing() {
        assert_eq!(example_from_pattern(r"^(?=.*\d).+$"), None);
        assert_eq!(example_from_pattern(r"^[^a]+$"), None);
        assert_eq!(example_from_pattern(r"(a)\1"), None);
        assert_eq!(example_from_pattern(r"^\d{1000}$"), None);
    }

    #[test]
    fn alternation_keeps_first_branch() {
        assert_eq!(example_from_pattern(r"^(cat|dog)s$").as_deref(), Some("cats"));
    }

    #[test]
    fn laravel_delimiters_are_stripped() {
        assert_eq!(strip_delimiters("/^[a-z]+$/"), "^[a-z]+$");
        assert_eq!(strip_delimiters("/^[a-z]+$/i"), "(?i)^[a-z]+$");
        assert_eq!(strip_delimiters("#^a/b$#"), "^a/b$");
        assert_eq!(strip_delimiters("^plain$"), "^plain$");
    }

    #[test]
    fn php_date_formats_render_through_chrono() {
        assert_eq!(date_format_example("Y-m-d"), Some((Format::Date, "2024-01-15".to_string())));
        assert_eq!(
            date_format_example("Y-m-d H:i:s"),
            Some((Format::DateTime, "2024-01-15 10:30:00".to_string()))
        );
        assert_eq!(date_format_example("H:i"), Some((Format::Time, "10:30".to_string())));
        assert_eq!(date_format_example("d/m/Y \\a\\t H"), Some((Format::DateTime, "15/01/2024 at 10".to_string())));
        assert_eq!(date_format_example("---"), None);
    }
}
