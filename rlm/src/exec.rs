//! Exec primitives
//!
//! `exec` accepts a snippet with one primitive call per line:
//!
//! ```text
//! # comments and blank lines are skipped
//! grep("ERROR \\d+", 5)
//! peek(0, 200)
//! add_buffer("first pass done")
//! sub_llm("summarise this chunk", 3)
//! ```
//!
//! Arguments are integers or JSON string literals. The whole snippet is
//! parsed before anything runs; a failing call stops the snippet but keeps
//! the mutations made by the calls before it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::bridge::SubcallBridge;
use crate::error::ReplError;
use crate::scheduler::truncate_chars;
use crate::session::Session;

/// Default cap on the characters `exec` prints
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 8_000;

/// Grep hits shown when no limit is given
const DEFAULT_GREP_LIMIT: usize = 20;

/// One parsed argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Str(String),
}

/// A primitive the snippet may call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Peek,
    Grep,
    ChunkIndices,
    WriteChunks,
    AddBuffer,
    SubLlm,
}

impl Primitive {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "peek" => Some(Self::Peek),
            "grep" => Some(Self::Grep),
            "chunk_indices" | "chunkIndices" => Some(Self::ChunkIndices),
            "write_chunks" | "writeChunks" => Some(Self::WriteChunks),
            "add_buffer" | "addBuffer" => Some(Self::AddBuffer),
            "sub_llm" | "subLlm" => Some(Self::SubLlm),
            _ => None,
        }
    }

    /// Whether the call changes session state
    pub fn mutates(&self) -> bool {
        matches!(self, Self::AddBuffer | Self::SubLlm)
    }
}

/// A parsed line of the snippet
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub line: usize,
    pub primitive: Primitive,
    pub args: Vec<Arg>,
}

/// Everything a snippet needs besides the session
pub struct ExecEnv {
    pub bridge: Arc<dyn SubcallBridge>,
    pub timeout: Duration,
    pub max_payload_chars: usize,
    pub max_output_chars: usize,
}

/// Result of running a snippet
#[derive(Debug)]
pub struct ExecOutcome {
    /// Output of every call that ran, already truncated
    pub output: String,
    /// Calls that completed
    pub completed: usize,
    /// Whether any completed call changed session state
    pub mutated: bool,
    /// The error that stopped the snippet, if any
    pub error: Option<ReplError>,
}

/// Parse a whole snippet
pub fn parse(code: &str) -> Result<Vec<Call>, ReplError> {
    let mut calls = Vec::new();
    for (idx, raw) in code.lines().enumerate() {
        let line = idx + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        calls.push(parse_line(line, text)?);
    }
    debug!(count = calls.len(), "exec::parse: parsed snippet");
    Ok(calls)
}

fn parse_line(line: usize, text: &str) -> Result<Call, ReplError> {
    let syntax = |message: &str| ReplError::Syntax {
        line,
        message: message.to_string(),
    };

    let open = text.find('(').ok_or_else(|| syntax("expected name(args)"))?;
    let name = text[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(syntax("expected a primitive name before '('"));
    }
    let body = text[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| syntax("missing closing ')'"))?;

    let primitive = Primitive::from_name(name).ok_or_else(|| ReplError::UnknownPrimitive {
        line,
        name: name.to_string(),
    })?;

    Ok(Call {
        line,
        primitive,
        args: parse_args(line, body)?,
    })
}

fn parse_args(line: usize, body: &str) -> Result<Vec<Arg>, ReplError> {
    let syntax = |message: String| ReplError::Syntax { line, message };
    let mut args = Vec::new();
    let mut rest = body.trim_start();

    while !rest.is_empty() {
        let (arg, remaining) = if rest.starts_with('"') {
            let end = string_literal_end(rest).ok_or_else(|| syntax("unterminated string".to_string()))?;
            let value: String = serde_json::from_str(&rest[..end]).map_err(|e| syntax(format!("bad string: {}", e)))?;
            (Arg::Str(value), &rest[end..])
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let token = rest[..end].trim();
            let value = token
                .parse::<i64>()
                .map_err(|_| syntax(format!("expected integer or string, found '{}'", token)))?;
            (Arg::Int(value), &rest[end..])
        };
        args.push(arg);

        let remaining = remaining.trim_start();
        rest = match remaining.strip_prefix(',') {
            Some(after) => {
                let after = after.trim_start();
                if after.is_empty() {
                    return Err(syntax("trailing ','".to_string()));
                }
                after
            }
            None if remaining.is_empty() => remaining,
            None => return Err(syntax(format!("unexpected '{}'", remaining))),
        };
    }

    Ok(args)
}

/// Byte index just past the closing quote of the literal starting at `s[0]`
fn string_literal_end(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Positional argument accessors
struct Args<'a> {
    call: &'a Call,
}

impl Args<'_> {
    fn invalid(&self, message: String) -> ReplError {
        ReplError::InvalidArgument(format!("line {}: {}", self.call.line, message))
    }

    fn check_arity(&self, min: usize, max: usize) -> Result<(), ReplError> {
        let n = self.call.args.len();
        if n < min || n > max {
            return Err(self.invalid(format!(
                "{:?} takes {}..={} arguments, got {}",
                self.call.primitive, min, max, n
            )));
        }
        Ok(())
    }

    fn usize_at(&self, idx: usize) -> Result<Option<usize>, ReplError> {
        match self.call.args.get(idx) {
            None => Ok(None),
            Some(Arg::Int(v)) => usize::try_from(*v)
                .map(Some)
                .map_err(|_| self.invalid(format!("argument {} must be non-negative, got {}", idx + 1, v))),
            Some(Arg::Str(_)) => Err(self.invalid(format!("argument {} must be an integer", idx + 1))),
        }
    }

    fn str_at(&self, idx: usize) -> Result<Option<&str>, ReplError> {
        match self.call.args.get(idx) {
            None => Ok(None),
            Some(Arg::Str(s)) => Ok(Some(s)),
            Some(Arg::Int(_)) => Err(self.invalid(format!("argument {} must be a string", idx + 1))),
        }
    }

    fn required_usize(&self, idx: usize) -> Result<usize, ReplError> {
        self.usize_at(idx)?
            .ok_or_else(|| self.invalid(format!("missing argument {}", idx + 1)))
    }

    fn required_str(&self, idx: usize) -> Result<&str, ReplError> {
        self.str_at(idx)?
            .ok_or_else(|| self.invalid(format!("missing argument {}", idx + 1)))
    }
}

/// Parse and run `code` against `session`.
///
/// A syntax error is returned before any call runs. Runtime errors are
/// reported in the outcome alongside the output produced so far.
pub async fn execute(session: &mut Session, code: &str, env: &ExecEnv) -> Result<ExecOutcome, ReplError> {
    let calls = parse(code)?;
    let mut output = String::new();
    let mut outcome = ExecOutcome {
        output: String::new(),
        completed: 0,
        mutated: false,
        error: None,
    };

    for call in &calls {
        debug!(line = call.line, primitive = ?call.primitive, "exec::execute: running call");
        match run_call(session, call, env).await {
            Ok(text) => {
                if !text.is_empty() {
                    output.push_str(&text);
                    if !text.ends_with('\n') {
                        output.push('\n');
                    }
                }
                outcome.completed += 1;
                outcome.mutated |= call.primitive.mutates();
            }
            Err(e) => {
                warn!(line = call.line, error = %e, "Exec call failed");
                outcome.error = Some(e);
                break;
            }
        }
    }

    outcome.output = truncate_output(&output, env.max_output_chars);
    Ok(outcome)
}

async fn run_call(session: &mut Session, call: &Call, env: &ExecEnv) -> Result<String, ReplError> {
    let args = Args { call };
    match call.primitive {
        Primitive::Peek => {
            args.check_arity(2, 2)?;
            let (start, end) = (args.required_usize(0)?, args.required_usize(1)?);
            Ok(session.corpus().peek(start, end)?.to_string())
        }
        Primitive::Grep => {
            args.check_arity(1, 2)?;
            let pattern = args.required_str(0)?;
            let limit = args.usize_at(1)?.unwrap_or(DEFAULT_GREP_LIMIT);
            let matches = session.corpus().grep_limited(pattern, limit)?;
            if matches.is_empty() {
                return Ok("(no matches)".to_string());
            }
            Ok(matches
                .iter()
                .map(|m| format!("{}:{}-{}: {}", m.line, m.offset_start, m.offset_end, m.text))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Primitive::ChunkIndices => {
            args.check_arity(1, 2)?;
            let size = args.required_usize(0)?;
            let overlap = args.usize_at(1)?.unwrap_or(0);
            let spans = session.corpus().chunk_indices(size, overlap)?;
            serde_json::to_string(&spans).map_err(|e| ReplError::Io(e.into()))
        }
        Primitive::WriteChunks => {
            args.check_arity(2, 4)?;
            let dir = PathBuf::from(args.required_str(0)?);
            let size = args.required_usize(1)?;
            let overlap = args.usize_at(2)?.unwrap_or(0);
            let prefix = args.str_at(3)?.unwrap_or("chunk");
            let paths = session.corpus().write_chunks(&dir, size, overlap, prefix)?;
            Ok(paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Primitive::AddBuffer => {
            args.check_arity(1, 1)?;
            let text = args.required_str(0)?;
            let count = session.add_buffer(text);
            Ok(format!("buffer {} added", count))
        }
        Primitive::SubLlm => {
            args.check_arity(2, 2)?;
            let prompt = args.required_str(0)?;
            let chunk_id = args.required_usize(1)?;
            let result = session
                .sub_call(env.bridge.as_ref(), prompt, chunk_id, env.timeout, env.max_payload_chars)
                .await?;
            Ok(match (result.success, result.payload, result.error) {
                (true, Some(payload), _) => match result.confidence {
                    Some(c) => format!("{}\n[confidence {:.2}]", payload, c),
                    None => payload,
                },
                (_, _, Some(error)) => format!("[sub-call failed: {}]", error),
                _ => "[sub-call returned nothing]".to_string(),
            })
        }
    }
}

/// Cut `output` to `max_chars` characters with a visible marker
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    let head = truncate_chars(output, max_chars);
    if head.len() == output.len() {
        return output.to_string();
    }
    format!("{}\n... [truncated to {} chars] ...\n", head, max_chars)
}
