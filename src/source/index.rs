//! Process-local index of parsed files and the classes they declare.
//!
//! Files are parsed at most once per path until invalidated. Unknown classes
//! are looked up lazily through PSR-4 style `autoload` prefixes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use super::ast::ClassDecl;
use super::{ParsedFile, parse_source};
use crate::error::{InferError, Result};

#[derive(Default)]
pub struct SourceIndex {
    files: DashMap<PathBuf, Arc<ParsedFile>>,
    /// keyed by lower-cased FQN: PHP class names are case-insensitive
    classes: DashMap<String, Arc<ClassDecl>>,
    autoload: Vec<(String, PathBuf)>,
}

fn class_key(fqn: &str) -> String {
    fqn.trim_start_matches('\\').to_ascii_lowercase()
}

impl SourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// `prefix` is a namespace prefix such as `App\`; longest prefix wins.
    pub fn with_autoload<I, P>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, P)>,
        P: Into<PathBuf>,
    {
        self.autoload = entries
            .into_iter()
            .map(|(prefix, dir)| (prefix.trim_start_matches('\\').trim_end_matches('\\').to_string(), dir.into()))
            .collect();
        self.autoload.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    pub fn add_file(&self, path: &Path) -> Result<Arc<ParsedFile>> {
        if let Some(parsed) = self.files.get(path) {
            return Ok(Arc::clone(&parsed));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|source| InferError::Io { path: path.to_path_buf(), source })?;
        self.add_source(path, &text)
    }

    /// Parses `text` as if read from `path`, replacing any earlier version.
    pub fn add_source(&self, path: &Path, text: &str) -> Result<Arc<ParsedFile>> {
        let parsed = Arc::new(parse_source(path, text)?);
        debug!(path = %path.display(), classes = parsed.classes.len(), "indexed source file");
        for class in &parsed.classes {
            self.classes.insert(class_key(&class.fqn), Arc::clone(class));
        }
        self.files.insert(path.to_path_buf(), Arc::clone(&parsed));
        Ok(parsed)
    }

    pub fn class(&self, fqn: &str) -> Option<Arc<ClassDecl>> {
        let key = class_key(fqn);
        if let Some(found) = self.classes.get(&key) {
            return Some(Arc::clone(&found));
        }
        let path = self.autoload_path(fqn)?;
        trace!(fqn, path = %path.display(), "autoloading class");
        if let Err(error) = self.add_file(&path) {
            debug!(%error, "autoload failed");
            return None;
        }
        self.classes.get(&key).map(|c| Arc::clone(&c))
    }

    fn autoload_path(&self, fqn: &str) -> Option<PathBuf> {
        let fqn = fqn.trim_start_matches('\\');
        self.autoload.iter().find_map(|(prefix, dir)| {
            let rest = if prefix.is_empty() {
                fqn
            } else {
                fqn.strip_prefix(prefix.as_str())?.strip_prefix('\\')?
            };
            let candidate = dir.join(format!("{}.php", rest.replace('\\', "/")));
            candidate.is_file().then_some(candidate)
        })
    }

    /// All indexed classes, ordered by FQN for deterministic output.
    pub fn classes(&self) -> Vec<Arc<ClassDecl>> {
        let mut out: Vec<_> = self.classes.iter().map(|e| Arc::clone(e.value())).collect();
        out.sort_by(|a, b| a.fqn.cmp(&b.fqn));
        out
    }

    /// The class, its traits, then each ancestor with its traits: nearest first.
    /// Walked iteratively; a class seen twice ends the walk.
    pub fn lineage(&self, class: &Arc<ClassDecl>) -> Vec<Arc<ClassDecl>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(Arc::clone(class));
        while let Some(c) = current.take() {
            if !seen.insert(class_key(&c.fqn)) {
                debug!(class = %c.fqn, "inheritance cycle");
                break;
            }
            let parent = c.parent.as_deref().and_then(|p| self.class(p));
            let traits: Vec<_> = c.traits.iter().filter_map(|t| self.class(t)).collect();
            out.push(c);
            for t in traits {
                if seen.insert(class_key(&t.fqn)) {
                    out.push(t);
                }
            }
            current = parent;
        }
        out
    }

    pub fn invalidate(&self, path: &Path) {
        if let Some((_, parsed)) = self.files.remove(path) {
            for class in &parsed.classes {
                self.classes.remove(&class_key(&class.fqn));
            }
        }
    }

    pub fn clear(&self) {
        self.files.clear();
        self.classes.clear();
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(sources: &[(&str, &str)]) -> SourceIndex {
        let index = SourceIndex::new();
        for (path, src) in sources {
            index.add_source(Path::new(path), src).unwrap();
        }
        index
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let index = index_with(&[("a.php", "<?php namespace App; class Foo {}")]);
        assert!(index.class("App\\Foo").is_some());
        assert!(index.class("\\app\\foo").is_some());
        assert!(index.class("App\\Bar").is_none());
    }

    #[test]
    fn lineage_is_nearest_first_and_survives_cycles() {
        let index = index_with(&[(
            "a.php",
            "<?php namespace App;\ntrait T {}\nclass A extends B { use T; }\nclass B extends C {}\nclass C extends A {}\n",
        )]);
        let a = index.class("App\\A").unwrap();
        let names: Vec<_> = index.lineage(&a).iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["A", "T", "B", "C"]);
    }

    #[test]
    fn invalidate_drops_classes_of_the_file() {
        let index = index_with(&[("a.php", "<?php namespace App; class Foo {}")]);
        index.invalidate(Path::new("a.php"));
        assert!(index.class("App\\Foo").is_none());
        assert_eq!(index.file_count(), 0);
    }

    #[test]
    fn autoload_resolves_psr4_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Models")).unwrap();
        std::fs::write(
            dir.path().join("Models/User.php"),
            "<?php namespace App\\Models; class User {}",
        )
        .unwrap();
        let index = SourceIndex::new().with_autoload([("App\\".to_string(), dir.path().to_path_buf())]);
        let user = index.class("App\\Models\\User").unwrap();
        assert_eq!(user.name, "User");
        assert_eq!(index.file_count(), 1);
    }
}
