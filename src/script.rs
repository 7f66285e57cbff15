//! Watch scripts
//!
//! A small line-oriented language for driving operations through an engine's
//! root wrapper. One statement per line; blank lines and lines starting with
//! `#` are ignored.
//!
//! ```text
//! get a.b[0]
//! set a.b[0].c = {"deep": true}
//! delete a.x
//! has a.b
//! keys a
//! push a.b = 3
//! dump
//! ```
//!
//! Paths use the tracer's dot/bracket notation and are resolved from the
//! root, so every step along the way is itself intercepted.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::heap::Value;
use crate::path::{join_path, split_path};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while parsing or running a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: {source}")]
    Engine { line: usize, source: EngineError },
}

/// One parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Get(Vec<String>),
    Set(Vec<String>, serde_json::Value),
    Delete(Vec<String>),
    Has(Vec<String>),
    Keys(Vec<String>),
    /// Append to the array at the path.
    Push(Vec<String>, serde_json::Value),
    Dump,
}

impl Statement {
    pub fn keyword(&self) -> &'static str {
        match self {
            Statement::Get(_) => "get",
            Statement::Set(..) => "set",
            Statement::Delete(_) => "delete",
            Statement::Has(_) => "has",
            Statement::Keys(_) => "keys",
            Statement::Push(..) => "push",
            Statement::Dump => "dump",
        }
    }

    fn path(&self) -> &[String] {
        match self {
            Statement::Get(path)
            | Statement::Set(path, _)
            | Statement::Delete(path)
            | Statement::Has(path)
            | Statement::Keys(path)
            | Statement::Push(path, _) => path,
            Statement::Dump => &[],
        }
    }
}

/// What a statement produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub line: usize,
    pub command: &'static str,
    pub path: String,
    pub result: serde_json::Value,
}

/// A parsed script, statements paired with their 1-based line numbers.
#[derive(Debug, Clone, Default)]
pub struct Script {
    statements: Vec<(usize, Statement)>,
}

impl Script {
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let mut statements = Vec::new();
        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            statements.push((line, parse_statement(line, text)?));
        }
        Ok(Self { statements })
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter().map(|(_, statement)| statement)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Run every statement against the engine's root wrapper, reporting each
    /// outcome as it happens. Stops at the first failing statement.
    pub fn run(
        &self,
        engine: &mut Engine,
        mut report: impl FnMut(&Outcome),
    ) -> Result<Vec<Outcome>, ScriptError> {
        let mut outcomes = Vec::with_capacity(self.statements.len());
        for (line, statement) in &self.statements {
            let result = execute(engine, statement)
                .map_err(|source| ScriptError::Engine { line: *line, source })?;
            let outcome = Outcome {
                line: *line,
                command: statement.keyword(),
                path: join_path(statement.path()),
                result,
            };
            report(&outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

fn parse_statement(line: usize, text: &str) -> Result<Statement, ScriptError> {
    let syntax = |message: String| ScriptError::Syntax { line, message };
    let (keyword, rest) = text
        .split_once(char::is_whitespace)
        .map_or((text, ""), |(keyword, rest)| (keyword, rest.trim()));

    let path = |rest: &str| -> Result<Vec<String>, ScriptError> {
        let segments = split_path(rest);
        if segments.is_empty() {
            return Err(syntax(format!("`{keyword}` needs a path")));
        }
        Ok(segments)
    };
    let assignment = |rest: &str| -> Result<(Vec<String>, serde_json::Value), ScriptError> {
        let (target, json) = rest
            .split_once('=')
            .ok_or_else(|| syntax(format!("`{keyword}` needs `<path> = <json>`")))?;
        let value = serde_json::from_str(json.trim())
            .map_err(|e| syntax(format!("invalid JSON value: {e}")))?;
        Ok((path(target.trim())?, value))
    };

    match keyword {
        "get" => Ok(Statement::Get(path(rest)?)),
        "set" => assignment(rest).map(|(path, value)| Statement::Set(path, value)),
        "delete" => Ok(Statement::Delete(path(rest)?)),
        "has" => Ok(Statement::Has(path(rest)?)),
        "keys" => Ok(Statement::Keys(split_path(rest))),
        "push" => assignment(rest).map(|(path, value)| Statement::Push(path, value)),
        "dump" if rest.is_empty() => Ok(Statement::Dump),
        "dump" => Err(syntax("`dump` takes no arguments".to_string())),
        other => Err(syntax(format!("unknown command `{other}`"))),
    }
}

/// Resolve everything but the last segment; returns the container and the
/// final key.
fn locate<'p>(engine: &mut Engine, path: &'p [String]) -> Result<(Value, &'p str), EngineError> {
    let root = engine.proxy();
    match path.split_last() {
        Some((last, parents)) => Ok((engine.resolve_path(&root, parents)?, last.as_str())),
        None => Err(EngineError::NotAnObject("empty path".to_string())),
    }
}

fn execute(engine: &mut Engine, statement: &Statement) -> Result<serde_json::Value, EngineError> {
    match statement {
        Statement::Get(path) => {
            let (object, key) = locate(engine, path)?;
            let value = engine.get(&object, key)?;
            engine.to_json(&value)
        }
        Statement::Set(path, json) => {
            let (object, key) = locate(engine, path)?;
            let value = engine.heap_mut().import_json(json);
            Ok(engine.set(&object, key, value)?.into())
        }
        Statement::Delete(path) => {
            let (object, key) = locate(engine, path)?;
            Ok(engine.delete(&object, key)?.into())
        }
        Statement::Has(path) => {
            let (object, key) = locate(engine, path)?;
            Ok(engine.has(&object, key)?.into())
        }
        Statement::Keys(path) => {
            let root = engine.proxy();
            let object = engine.resolve_path(&root, path)?;
            let keys = engine.own_keys(&object)?;
            Ok(keys.into_iter().map(|key| key.to_string()).collect())
        }
        Statement::Push(path, json) => {
            let root = engine.proxy();
            let list = engine.resolve_path(&root, path)?;
            let length = engine.get(&list, "length")?.as_number().unwrap_or(0.0) as usize;
            let value = engine.heap_mut().import_json(json);
            Ok(engine.set(&list, length, value)?.into())
        }
        Statement::Dump => {
            let root = engine.proxy();
            engine.to_json(&root)
        }
    }
}
