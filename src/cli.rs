//! CLI: PHP sources → (output | input) schema
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::InferConfig;
use crate::emit;
use crate::inference::{Inference, ResolutionContext, RuleSet, Subject, rules::rule_set_from_json_str};
use crate::ir::SchemaNode;
use crate::source::SourceIndex;
use crate::source::ast::Visibility;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// infer request/response schemas from PHP classes and controller methods
#[derive(Parser, Debug)]
#[command(name = "php-shape", version)]
pub struct CommandLineInterface {
    /// engine configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// more logging; repeat for trace output (RUST_LOG overrides)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// response schema of a class or method
    Output(SubjectOut),
    /// request schema of a method
    Input(InputOut),
    /// output (and input, for methods) of every class and public method
    All(AllOut),
    /// fully-qualified name a short name refers to inside a file
    Resolve(ResolveOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more PHP sources. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug)]
struct SubjectOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// `Class`, `Class@method` or `Class::method`
    #[arg(long, short)]
    subject: String,

    /// print the engine's own tree instead of the JSON-schema view
    #[arg(long)]
    raw: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InputOut {
    #[command(flatten)]
    target: SubjectOut,

    /// JSON object of field path → rules (pipe string or list); replaces
    /// whatever the source declares
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AllOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ResolveOut {
    /// PHP file whose namespace and imports apply
    #[arg(long, short)]
    input: PathBuf,

    /// short (or relative) class name
    #[arg(long, short)]
    name: String,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    /// Parses every input. Files that fail to parse are reported and skipped.
    fn load_index(&self, config: &InferConfig) -> anyhow::Result<Arc<SourceIndex>> {
        let autoload = config.autoload.iter().map(|(prefix, dir)| (prefix.clone(), dir.clone()));
        let index = SourceIndex::new().with_autoload(autoload);
        let source_paths = resolve_file_path_patterns(&self.input)?;
        for source_path in source_paths {
            if let Err(error) = index.add_file(&source_path) {
                eprintln!("{} {error}", "warning:".yellow().bold());
            }
        }
        debug!(files = index.file_count(), "index ready");
        Ok(Arc::new(index))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    fn engine_config(&self) -> anyhow::Result<InferConfig> {
        match self.config.as_ref() {
            Some(path) => InferConfig::load(path).with_context(|| format!("loading {}", path.display())),
            None => Ok(InferConfig::default()),
        }
    }

    pub fn run(&self) -> anyhow::Result<()> {
        let config = self.engine_config()?;
        match &self.cmd {
            Command::Output(target) => {
                let engine = target.engine(config)?;
                let subject = engine.subject(&target.subject)?;
                let node = engine.infer_output_schema(&subject);
                target.write(&node)
            }
            Command::Input(InputOut { target, rules }) => {
                let rules = rules.as_deref().map(load_rules).transpose()?;
                let engine = target.engine(config)?;
                let subject = engine.subject(&target.subject)?;
                let node = engine.infer_input_schema(&subject, rules.as_ref());
                target.write(&node)
            }
            Command::All(target) => {
                let index = target.input_settings.load_index(&config)?;
                let engine = Inference::with_config(index, config);
                let report = infer_all(&engine);
                write_output(target.out.as_deref(), &Value::Object(report))
            }
            Command::Resolve(target) => {
                let index = SourceIndex::new();
                let parsed = index.add_file(&target.input)?;
                let ctx = match parsed.classes.first() {
                    Some(class) => ResolutionContext::for_class(class),
                    None => ResolutionContext::detached(),
                };
                let engine = Inference::with_config(Arc::new(index), config);
                println!("{}", engine.resolve_type(&target.name, &ctx));
                Ok(())
            }
        }
    }
}

impl SubjectOut {
    fn engine(&self, config: InferConfig) -> anyhow::Result<Inference> {
        let index = self.input_settings.load_index(&config)?;
        Ok(Inference::with_config(index, config))
    }

    fn write(&self, node: &SchemaNode) -> anyhow::Result<()> {
        let value = if self.raw { serde_json::to_value(node)? } else { emit::schema(node) };
        write_output(self.out.as_deref(), &value)
    }
}

/// Every class, and every public method of it, inferred in parallel.
fn infer_all(engine: &Inference) -> Map<String, Value> {
    let mut classes = engine.index().classes();
    classes.sort_by(|a, b| a.fqn.cmp(&b.fqn));
    let subjects: Vec<Subject> = classes
        .iter()
        .flat_map(|class| {
            let methods = class
                .methods
                .iter()
                .filter(|m| m.visibility == Visibility::Public && !m.is_static && !m.name.starts_with("__"))
                .map(|m| Subject::Method { class: class.clone(), method: m.name.clone() });
            std::iter::once(Subject::Class(class.clone())).chain(methods)
        })
        .collect();

    subjects
        .par_iter()
        .map(|subject| {
            let output = emit::schema(&engine.infer_output_schema(subject));
            let entry = match subject {
                Subject::Class(_) => json!({ "output": output }),
                Subject::Method { .. } => {
                    let input = emit::schema(&engine.infer_input_schema(subject, None));
                    json!({ "input": input, "output": output })
                }
            };
            (subject.label(), entry)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn load_rules(path: &Path) -> anyhow::Result<RuleSet> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let rules = rule_set_from_json_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(rules)
}

fn write_output(out: Option<&Path>, value: &Value) -> anyhow::Result<()> {
    let src = serde_json::to_string_pretty(value)?;
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, &src).with_context(|| format!("writing {}", out.display()))?;
        }
        None => println!("{src}"),
    }
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if has_glob_chars(pattern) {
            let before = out.len();
            for entry in glob::glob(pattern)? {
                out.push(entry?);
            }
            if out.len() == before {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_paths_pass_through_and_empty_globs_fail() {
        let paths = resolve_file_path_patterns(["app/User.php"]).expect("literal path");
        assert_eq!(paths, vec![PathBuf::from("app/User.php")]);
        assert!(resolve_file_path_patterns(["/definitely/not/here/*.php"]).is_err());
    }

    #[test]
    fn subcommands_parse() {
        let cli = CommandLineInterface::try_parse_from([
            "php-shape", "-vv", "input", "-i", "app/**/*.php", "--subject", "UserController@store", "--raw",
        ])
        .expect("valid arguments");
        assert_eq!(cli.verbose, 2);
        let Command::Input(InputOut { target, rules }) = cli.cmd else { panic!("expected input command") };
        assert!(target.raw);
        assert!(rules.is_none());
        assert_eq!(target.subject, "UserController@store");
    }
}
