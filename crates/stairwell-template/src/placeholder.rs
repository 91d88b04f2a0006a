//! Placeholder scanning
//!
//! Finds `{{ ... }}` expression blocks in raw template text and the
//! identifier paths (`params.customers`) used inside them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::TemplateError;

/// Words that are part of the expression language, never parameters
const KEYWORDS: &[&str] = &[
    "if", "else", "and", "or", "not", "in", "is", "true", "false", "none",
];

fn identifier_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*")
            .expect("identifier path regex is valid")
    })
}

/// One `{{ ... }}` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderBlock {
    /// Text between the delimiters, untrimmed
    pub expression: String,

    /// Byte offset of the opening `{{`
    pub start: usize,

    /// Byte offset just past the closing `}}`
    pub end: usize,

    /// Line of the opening `{{` (1-indexed)
    pub line: usize,
}

impl PlaceholderBlock {
    /// Identifier paths inside this block, in order
    pub fn tokens(&self) -> Vec<String> {
        expression_tokens(&self.expression)
    }
}

/// A template line quoted in edge metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateLine {
    /// 1-indexed
    pub line_number: usize,
    pub line_str: String,
}

/// Scan `text` for expression blocks.
///
/// Braces nest inside a block (`{{ {'a': 1} }}`) and quoted strings are
/// skipped, so a `}}` inside a literal does not close the block.
pub fn scan_blocks(text: &str) -> Result<Vec<PlaceholderBlock>, TemplateError> {
    let bytes = text.as_bytes();
    let mut blocks = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\n' {
            line += 1;
            i += 1;
            continue;
        }

        if bytes[i] != b'{' || bytes.get(i + 1) != Some(&b'{') {
            i += 1;
            continue;
        }

        let start = i;
        let start_line = line;
        let mut depth = 0usize;
        let mut quote: Option<u8> = None;
        let mut j = i + 2;
        let mut end = None;

        while j < bytes.len() {
            let b = bytes[j];
            if b == b'\n' {
                line += 1;
            }

            match quote {
                Some(q) => {
                    if b == b'\\' {
                        j += 1;
                        if bytes.get(j) == Some(&b'\n') {
                            line += 1;
                        }
                    } else if b == q {
                        quote = None;
                    }
                }
                None => match b {
                    b'\'' | b'"' => quote = Some(b),
                    b'{' => depth += 1,
                    b'}' if depth > 0 => depth -= 1,
                    b'}' if bytes.get(j + 1) == Some(&b'}') => {
                        end = Some(j + 2);
                        break;
                    }
                    _ => {}
                },
            }
            j += 1;
        }

        let end = end.ok_or(TemplateError::UnterminatedBlock { line: start_line })?;
        blocks.push(PlaceholderBlock {
            expression: text[start + 2..end - 2].to_string(),
            start,
            end,
            line: start_line,
        });
        i = end;
    }

    Ok(blocks)
}

/// Identifier paths used in a single expression.
///
/// String literals, numbers, filter names, called functions and keywords are
/// skipped. Attribute access after a call (`f().x`) is not a path either.
pub fn expression_tokens(expression: &str) -> Vec<String> {
    let masked = mask_string_literals(expression);
    let bytes = masked.as_bytes();

    identifier_path()
        .find_iter(&masked)
        .filter(|m| {
            let before = masked[..m.start()].trim_end();
            let after = masked[m.end()..].trim_start();

            let glued = m.start() > 0 && {
                let prev = bytes[m.start() - 1];
                prev.is_ascii_alphanumeric() || prev == b'_' || prev == b'.'
            };

            !glued
                && !before.ends_with('|')
                && !after.starts_with('(')
                && !KEYWORDS.contains(&m.as_str().to_ascii_lowercase().as_str())
        })
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Replace quoted string contents with spaces, keeping byte offsets
fn mask_string_literals(expression: &str) -> String {
    let mut masked = String::with_capacity(expression.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in expression.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                for _ in 0..c.len_utf8() {
                    masked.push(' ');
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                    masked.push(' ');
                } else {
                    masked.push(c);
                }
            }
        }
    }

    masked
}

/// All placeholder tokens in `text`, in order, one entry per occurrence
pub fn get_parameter_tokens(text: &str) -> Result<Vec<String>, TemplateError> {
    Ok(scan_blocks(text)?
        .iter()
        .flat_map(PlaceholderBlock::tokens)
        .collect())
}

/// Lines holding a block that uses `token`
pub fn token_lines(text: &str, blocks: &[PlaceholderBlock], token: &str) -> Vec<TemplateLine> {
    let lines: Vec<&str> = text.lines().collect();
    let mut found: Vec<TemplateLine> = Vec::new();

    for block in blocks {
        if !block.tokens().iter().any(|t| t == token) {
            continue;
        }
        if found.iter().any(|l| l.line_number == block.line) {
            continue;
        }
        found.push(TemplateLine {
            line_number: block.line,
            line_str: lines.get(block.line - 1).copied().unwrap_or_default().to_string(),
        });
    }

    found
}

/// Lines containing `needle` (case-insensitive), for references found by SQL scan
pub fn lines_containing(text: &str, needle: &str) -> Vec<TemplateLine> {
    let needle = needle.to_ascii_lowercase();
    text.lines()
        .enumerate()
        .filter(|(_, line)| line.to_ascii_lowercase().contains(&needle))
        .map(|(i, line)| TemplateLine {
            line_number: i + 1,
            line_str: line.to_string(),
        })
        .collect()
}

/// Wrap every block that mentions an ignored parameter in `{% raw %}`, so
/// rendering leaves it verbatim.
pub fn protect_ignored(text: &str, ignored: &[String]) -> Result<String, TemplateError> {
    if ignored.is_empty() {
        return Ok(text.to_string());
    }

    let mut protected = String::with_capacity(text.len());
    let mut cursor = 0;

    for block in scan_blocks(text)? {
        if !block.tokens().iter().any(|t| ignored.contains(t)) {
            continue;
        }
        protected.push_str(&text[cursor..block.start]);
        protected.push_str("{% raw %}");
        protected.push_str(&text[block.start..block.end]);
        protected.push_str("{% endraw %}");
        cursor = block.end;
    }
    protected.push_str(&text[cursor..]);

    Ok(protected)
}
