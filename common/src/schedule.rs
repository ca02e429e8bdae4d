// Schedule file loading and compilation
//
// Turns the declarative schedule file into engine-ready trigger
// specifications. The file is a JSON array of schedule items; inline `//`
// and `/* */` comments are tolerated even though JSON proper does not
// allow them, so operators can annotate the schedule in place.

use crate::errors::ScheduleError;
use crate::models::{ScheduleItem, TriggerSpec};
use crate::trigger::TriggerBuilder;
use std::path::Path;
use tracing::debug;

/// Compiler for a declaration source: a parsed, validated list of schedule
/// items bound to the path they were loaded from.
#[derive(Debug)]
pub struct ScheduleCompiler {
    path: String,
    items: Vec<ScheduleItem>,
}

/// Load a schedule file and parse it into declaration records.
///
/// Fails with [`ScheduleError::Load`] when the file cannot be read and with
/// [`ScheduleError::Parse`] when the content is not a well-formed sequence
/// of declarations.
pub fn load_schedule(path: impl AsRef<Path>) -> Result<ScheduleCompiler, ScheduleError> {
    let path_str = path.as_ref().display().to_string();

    let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| ScheduleError::Load {
        path: path_str.clone(),
        source,
    })?;

    let stripped = strip_comments(&raw);
    let items: Vec<ScheduleItem> =
        serde_json::from_str(&stripped).map_err(|source| ScheduleError::Parse {
            path: path_str.clone(),
            source,
        })?;

    debug!(path = %path_str, items = items.len(), "schedule file loaded");

    Ok(ScheduleCompiler {
        path: path_str,
        items,
    })
}

impl ScheduleCompiler {
    /// Path, URL or name of the resource the schedule was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The parsed declaration records, in source order.
    pub fn items(&self) -> &[ScheduleItem] {
        &self.items
    }

    /// Compile every declaration into a trigger specification.
    ///
    /// Output order matches source order. The first invalid declaration
    /// aborts the whole compilation; no partial schedule is ever returned.
    pub fn compile(&self) -> Result<Vec<TriggerSpec>, ScheduleError> {
        let mut triggers = Vec::with_capacity(self.items.len());

        for (index, item) in self.items.iter().enumerate() {
            triggers.push(self.compile_item(index, item)?);
        }

        Ok(triggers)
    }

    fn compile_item(&self, index: usize, item: &ScheduleItem) -> Result<TriggerSpec, ScheduleError> {
        if item.cron.trim().is_empty() {
            return Err(ScheduleError::MissingField {
                index,
                field: "cron",
            });
        }
        if item.job.trim().is_empty() {
            return Err(ScheduleError::MissingField { index, field: "job" });
        }

        let job_key = item
            .job_key()
            .map_err(|source| ScheduleError::InvalidKey { index, source })?;

        let description = item
            .comment
            .clone()
            .unwrap_or_else(|| format!("loaded from '{}'", self.path));

        let mut builder = TriggerBuilder::new()
            .for_job(job_key)
            .with_description(description)
            .with_cron_schedule(item.cron.clone(), item.on_misfire);

        if let Some(priority) = item.priority {
            builder = builder.with_priority(priority);
        }

        if let Some(trigger_key) = item
            .trigger_key()
            .map_err(|source| ScheduleError::InvalidKey { index, source })?
        {
            builder = builder.with_identity(trigger_key);
        }

        if let Some(data) = &item.job_data {
            builder = builder.using_job_data(data.clone());
        }

        builder
            .build()
            .map_err(|source| ScheduleError::InvalidTrigger { index, source })
    }
}

/// Blank out `//` line comments and `/* */` block comments outside string
/// literals. Comment bytes become spaces so line/column positions in parser
/// diagnostics still point at the original file.
fn strip_comments(source: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        Str,
        StrEscape,
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '"' => {
                    state = State::Str;
                    out.push(c);
                }
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                    out.push_str("  ");
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                    out.push_str("  ");
                }
                _ => out.push(c),
            },
            State::Str => {
                out.push(c);
                match c {
                    '\\' => state = State::StrEscape,
                    '"' => state = State::Code,
                    _ => {}
                }
            }
            State::StrEscape => {
                out.push(c);
                state = State::Str;
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                    out.push_str("  ");
                } else if c == '\n' {
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
        }
    }

    out
}
