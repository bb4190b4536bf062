//! Engine configuration, loaded from JSON.
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{InferError, Result};
use crate::heuristics::NamingRule;
use crate::path_de::from_str_with_path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferConfig {
    /// Recursion bound on top of the cycle guard.
    pub max_depth: usize,
    pub synthesize_examples: bool,
    /// PSR-4: namespace prefix → directory holding its classes.
    pub autoload: IndexMap<String, PathBuf>,
    /// Tried before the built-in naming table.
    pub naming: Vec<NamingRule>,
    /// Methods whose body describes a class's serialized form.
    pub shape_methods: Vec<String>,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            max_depth: 12,
            synthesize_examples: true,
            autoload: IndexMap::new(),
            naming: Vec::new(),
            shape_methods: vec!["toArray".to_string(), "jsonSerialize".to_string()],
        }
    }
}

impl InferConfig {
    pub fn from_json_str(src: &str) -> Result<Self> {
        from_str_with_path(src)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| InferError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::NameMatch;
    use crate::ir::Kind;

    #[test]
    fn missing_keys_take_defaults() {
        let cfg = InferConfig::from_json_str(r#"{"max_depth": 4}"#).expect("valid config");
        assert_eq!(cfg.max_depth, 4);
        assert!(cfg.synthesize_examples);
        assert_eq!(cfg.shape_methods, vec!["toArray", "jsonSerialize"]);
    }

    #[test]
    fn naming_rules_and_autoload() {
        let cfg = InferConfig::from_json_str(
            r#"{
                "autoload": {"App\\": "app/"},
                "naming": [{"match": "suffix", "value": "_iban", "kind": "string"}]
            }"#,
        )
        .expect("valid config");
        assert_eq!(cfg.autoload.get("App\\"), Some(&PathBuf::from("app/")));
        assert_eq!(cfg.naming, vec![NamingRule::new(NameMatch::Suffix, "_iban", Kind::String, None)]);
    }

    #[test]
    fn bad_values_name_their_path() {
        let err = InferConfig::from_json_str(r#"{"naming": [{"match": "around", "value": "x", "kind": "string"}]}"#)
            .expect_err("unknown match mode");
        assert!(err.to_string().contains("naming[0]"), "{err}");
    }
}
