//! Rule language used by filters: compiled once at startup, evaluated per torrent.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod types;

use std::collections::BTreeSet;

use crate::core::config::{FilterConfig, TagMode};
use crate::core::error::{CompileError, EvalError, SyntaxError};
use crate::models::Torrent;
use ast::{Expr, Function};
use types::Value;

pub use eval::EvalEnv;

/// A single compiled rule
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    expr: Expr,
}

impl Program {
    pub fn compile(source: &str) -> Result<Self, SyntaxError> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, torrent: &Torrent, env: &EvalEnv) -> Result<bool, EvalError> {
        match eval::evaluate(&self.expr, torrent, env)? {
            Value::Bool(result) => Ok(result),
            other => Err(EvalError::NotBoolean(other.ty())),
        }
    }

    pub fn calls(&self, function: Function) -> bool {
        self.expr.calls(function)
    }
}

#[derive(Debug, Clone)]
pub struct LabelRule {
    pub name: String,
    pub update: Vec<Program>,
}

#[derive(Debug, Clone)]
pub struct TagRule {
    pub name: String,
    pub mode: TagMode,
    pub update: Vec<Program>,
}

/// Tag changes decided for one torrent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetagInfo {
    pub add: BTreeSet<String>,
    pub remove: BTreeSet<String>,
}

impl RetagInfo {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Compiled form of one filter
#[derive(Debug, Clone, Default)]
pub struct Expressions {
    pub ignores: Vec<Program>,
    pub removes: Vec<Program>,
    pub labels: Vec<LabelRule>,
    pub tags: Vec<TagRule>,
}

fn compile_all(section: &str, rules: &[String]) -> Result<Vec<Program>, CompileError> {
    rules
        .iter()
        .map(|rule| {
            Program::compile(rule).map_err(|reason| CompileError {
                section: section.to_string(),
                rule: rule.clone(),
                reason,
            })
        })
        .collect()
}

/// True if any program holds
fn any_match(programs: &[Program], torrent: &Torrent, env: &EvalEnv) -> Result<bool, EvalError> {
    for program in programs {
        if program.evaluate(torrent, env)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// True if every program holds
fn all_match(programs: &[Program], torrent: &Torrent, env: &EvalEnv) -> Result<bool, EvalError> {
    for program in programs {
        if !program.evaluate(torrent, env)? {
            return Ok(false);
        }
    }
    Ok(true)
}

impl Expressions {
    pub fn compile(filter: &FilterConfig) -> Result<Self, CompileError> {
        let ignores = compile_all("ignore", &filter.ignore)?;
        let removes = compile_all("remove", &filter.remove)?;

        let labels = filter
            .label
            .iter()
            .map(|rule| -> Result<LabelRule, CompileError> {
                Ok(LabelRule {
                    name: rule.name.clone(),
                    update: compile_all(&format!("label {}", rule.name), &rule.update)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tags = filter
            .tag
            .iter()
            .map(|rule| -> Result<TagRule, CompileError> {
                Ok(TagRule {
                    name: rule.name.clone(),
                    mode: rule.mode,
                    update: compile_all(&format!("tag {}", rule.name), &rule.update)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            ignores,
            removes,
            labels,
            tags,
        })
    }

    fn programs(&self) -> impl Iterator<Item = &Program> {
        self.ignores
            .iter()
            .chain(self.removes.iter())
            .chain(self.labels.iter().flat_map(|rule| rule.update.iter()))
            .chain(self.tags.iter().flat_map(|rule| rule.update.iter()))
    }

    /// Whether any rule needs the tracker oracle
    pub fn uses_unregistered(&self) -> bool {
        self.programs()
            .any(|program| program.calls(Function::IsUnregistered))
    }

    pub fn should_ignore(&self, torrent: &Torrent, env: &EvalEnv) -> Result<bool, EvalError> {
        any_match(&self.ignores, torrent, env)
    }

    pub fn should_remove(&self, torrent: &Torrent, env: &EvalEnv) -> Result<bool, EvalError> {
        any_match(&self.removes, torrent, env)
    }

    /// Label of the first rule that fully matches, unless the torrent already carries it
    pub fn should_relabel(
        &self,
        torrent: &Torrent,
        env: &EvalEnv,
    ) -> Result<Option<&str>, EvalError> {
        for rule in &self.labels {
            if !all_match(&rule.update, torrent, env)? {
                continue;
            }

            if rule.name == torrent.label {
                return Ok(None);
            }
            return Ok(Some(&rule.name));
        }

        Ok(None)
    }

    pub fn should_retag(&self, torrent: &Torrent, env: &EvalEnv) -> Result<RetagInfo, EvalError> {
        let mut info = RetagInfo::default();

        for rule in &self.tags {
            let has_tag = torrent.has_tag(&rule.name);
            let relevant = if has_tag {
                rule.mode.removes()
            } else {
                rule.mode.adds()
            };
            if !relevant {
                continue;
            }

            let matched = all_match(&rule.update, torrent, env)?;
            if has_tag && !matched {
                info.remove.insert(rule.name.clone());
            } else if !has_tag && matched {
                info.add.insert(rule.name.clone());
            }
        }

        Ok(info)
    }

    /// Tags that rules may add, which must exist before they are applied
    pub fn creatable_tags(&self) -> BTreeSet<String> {
        self.tags
            .iter()
            .filter(|rule| rule.mode.adds())
            .map(|rule| rule.name.clone())
            .collect()
    }
}
