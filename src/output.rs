//! Terminal and JSON rendering.
//!
//! Feedback from the service is word-wrapped to a fixed column with
//! continuation lines indented under their first line. Chunks can be printed
//! as plain text or as JSON carrying the resume state.

use serde::Serialize;

use crate::engine::{Chunk, Position, TraversalState};
use crate::errors::RedpenError;

/// Default wrap column for feedback.
pub const DEFAULT_WIDTH: usize = 80;

/// Extra indentation for continuation lines.
const HANGING_INDENT: usize = 2;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Annotated text followed by a status line.
    #[default]
    Text,
    /// JSON for programmatic access.
    Json,
}

/// Word-wrap `text` to `width` columns.
///
/// Each input line is wrapped on its own. Blank lines are kept. Continuation
/// lines repeat the original indentation plus two spaces. Words longer than
/// the width are not split.
///
/// # Examples
///
/// ```
/// use redpen::output::wrap_text;
///
/// assert_eq!(wrap_text("- L5: too many commas here", 16), "- L5: too many\n  commas here");
/// ```
pub fn wrap_text(text: &str, width: usize) -> String {
    let mut wrapped: Vec<String> = Vec::new();

    for line in text.split('\n') {
        let indent_len = line.len() - line.trim_start().len();
        let indent = &line[..indent_len];
        let continuation = format!("{}{}", indent, " ".repeat(HANGING_INDENT));

        let mut current = String::new();
        let mut current_width = 0;
        for word in line.split_whitespace() {
            let word_width = word.chars().count();
            if current.is_empty() {
                current.push_str(indent);
                current.push_str(word);
                current_width = indent.chars().count() + word_width;
            } else if current_width + 1 + word_width <= width {
                current.push(' ');
                current.push_str(word);
                current_width += 1 + word_width;
            } else {
                wrapped.push(std::mem::take(&mut current));
                current.push_str(&continuation);
                current.push_str(word);
                current_width = continuation.chars().count() + word_width;
            }
        }
        wrapped.push(current);
    }

    wrapped.join("\n")
}

/// Insert thousands separators.
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Usage and cost for one exchange.
pub fn usage_line(tokens: u64, cost: f64, total: f64) -> String {
    format!(
        "We dealt with {} tokens, around ${:.4} (total: ${:.4})",
        format_number(tokens as usize),
        cost,
        total
    )
}

/// Where a chunk stopped.
pub fn position_line(chunk: &Chunk) -> String {
    let position = chunk
        .last_line
        .as_ref()
        .map(Position::to_string)
        .unwrap_or_else(|| chunk.state.to_string());
    format!(
        "final line was: {} (done: {}, stack depth: {})",
        position,
        !chunk.partial,
        chunk.state.depth()
    )
}

#[derive(Serialize)]
struct JsonChunk<'a> {
    body: &'a str,
    partial: bool,
    units: usize,
    lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_line: Option<&'a Position>,
    state: &'a TraversalState,
}

/// Render a chunk in the requested format.
pub fn format_chunk(chunk: &Chunk, format: OutputFormat) -> Result<String, RedpenError> {
    match format {
        OutputFormat::Text => {
            let mut output = String::with_capacity(chunk.body.len() + 128);
            output.push_str(&chunk.body);
            output.push('\n');
            output.push_str(&format!(
                "{} lines, ~{} units\n",
                format_number(chunk.lines_emitted),
                format_number(chunk.units)
            ));
            output.push_str(&position_line(chunk));
            output.push('\n');
            if chunk.partial {
                output.push_str(&format!("state: {}\n", chunk.state.to_json()?));
            }
            Ok(output)
        }
        OutputFormat::Json => {
            let payload = JsonChunk {
                body: &chunk.body,
                partial: chunk.partial,
                units: chunk.units,
                lines: chunk.lines_emitted,
                last_line: chunk.last_line.as_ref(),
                state: &chunk.state,
            };
            Ok(serde_json::to_string_pretty(&payload)?)
        }
    }
}
