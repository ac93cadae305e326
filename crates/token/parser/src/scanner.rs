//! Scanner: finds typed placeholders in template text
//!
//! One pass over the input produces every match, tagged with its
//! token type, plus a scoped issue for every malformed placeholder.
//! There is no per-type scan: the five forms share a single walk.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use token_types::{TokenError, TokenPattern, TokenType};

/// A placeholder matched in template text
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderMatch {
    /// Inferred kind, from the leading tag
    pub token_type: TokenType,
    /// The raw placeholder text including braces
    pub raw: String,
    /// The three colon-delimited segments after the tag
    pub segments: [String; 3],
    /// Byte span into the original text
    pub span: (usize, usize),
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
}

impl PlaceholderMatch {
    pub fn namespace(&self) -> &str {
        &self.segments[0]
    }

    pub fn scope(&self) -> &str {
        &self.segments[1]
    }

    pub fn identifier(&self) -> &str {
        &self.segments[2]
    }
}

/// A malformed placeholder, scoped to its region of the text
#[derive(Clone, Debug, PartialEq, Error, Serialize, Deserialize)]
#[error("{reason} at line {line}, column {column} ({raw})")]
pub struct ScanIssue {
    pub raw: String,
    pub span: (usize, usize),
    pub line: usize,
    pub column: usize,
    pub reason: String,
}

impl From<ScanIssue> for TokenError {
    fn from(issue: ScanIssue) -> Self {
        TokenError::MalformedToken {
            placeholder: issue.raw,
            position: issue.span.0,
            reason: issue.reason,
        }
    }
}

/// Everything one pass found: matches plus scoped issues
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateScan {
    pub matches: Vec<PlaceholderMatch>,
    pub issues: Vec<ScanIssue>,
}

impl TemplateScan {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Scan template text for placeholders
pub fn scan(text: &str) -> TemplateScan {
    Scanner::new(text).scan()
}

/// Match a single, already-extracted placeholder string.
///
/// The input must be exactly one placeholder, nothing around it.
pub fn match_placeholder(raw: &str) -> Result<PlaceholderMatch, ScanIssue> {
    let result = scan(raw);
    if let Some(issue) = result.issues.into_iter().next() {
        return Err(issue);
    }
    match result.matches.into_iter().next() {
        Some(matched) if matched.span == (0, raw.len()) => Ok(matched),
        _ => Err(ScanIssue {
            raw: raw.to_string(),
            span: (0, raw.len()),
            line: 1,
            column: 1,
            reason: "not a single placeholder".to_string(),
        }),
    }
}

/// Rebuild template text by substituting values at matched spans.
///
/// Substitutions are applied right-to-left so earlier spans stay
/// valid; spans must come from a scan of the same text.
pub fn splice(text: &str, substitutions: &[((usize, usize), String)]) -> String {
    let mut ordered: Vec<&((usize, usize), String)> = substitutions.iter().collect();
    ordered.sort_by(|a, b| b.0 .0.cmp(&a.0 .0));

    let mut out = text.to_string();
    for ((start, end), replacement) in ordered {
        if *start > *end || *end > out.len() {
            continue;
        }
        if !out.is_char_boundary(*start) || !out.is_char_boundary(*end) {
            continue;
        }
        out.replace_range(*start..*end, replacement);
    }
    out
}

// ── Scanner ──────────────────────────────────────────────────────────

/// Single-pass placeholder scanner
pub struct Scanner {
    input: Vec<char>,
    /// Byte offset of each char in the original text
    offsets: Vec<usize>,
    total_bytes: usize,
    pos: usize,
    line: usize,
    col: usize,
}

impl Scanner {
    pub fn new(text: &str) -> Self {
        let mut input = Vec::new();
        let mut offsets = Vec::new();
        for (offset, ch) in text.char_indices() {
            input.push(ch);
            offsets.push(offset);
        }
        Self {
            input,
            offsets,
            total_bytes: text.len(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Walk the input, collecting matches and scoped issues in order
    pub fn scan(mut self) -> TemplateScan {
        let mut result = TemplateScan::default();

        while self.pos < self.input.len() {
            if self.input[self.pos] != '{' {
                self.advance();
                continue;
            }

            let start = self.pos;
            let line = self.line;
            let col = self.col;

            // Segments admit '{' but never '}', so the candidate region
            // runs to the nearest closing brace.
            let mut end = start + 1;
            while end < self.input.len() && self.input[end] != '}' {
                end += 1;
            }

            if end >= self.input.len() {
                // Unterminated: rest of the input is literal text
                break;
            }

            let raw: String = self.input[start..=end].iter().collect();
            let inner: String = self.input[start + 1..end].iter().collect();
            let span = (self.byte_at(start), self.byte_after(end));

            match classify(&raw, &inner, span, line, col) {
                Some(Ok(matched)) => {
                    result.matches.push(matched);
                    self.advance_to(end + 1);
                }
                Some(Err(issue)) => {
                    result.issues.push(issue);
                    self.advance_to(end + 1);
                }
                // Literal text; a '{' later in the region may still
                // open a placeholder, so only this brace is consumed.
                None => self.advance(),
            }
        }

        result
    }

    fn advance(&mut self) {
        if self.pos < self.input.len() {
            if self.input[self.pos] == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            self.pos += 1;
        }
    }

    fn advance_to(&mut self, target: usize) {
        while self.pos < target && self.pos < self.input.len() {
            self.advance();
        }
    }

    fn byte_at(&self, pos: usize) -> usize {
        self.offsets.get(pos).copied().unwrap_or(self.total_bytes)
    }

    fn byte_after(&self, pos: usize) -> usize {
        self.offsets
            .get(pos + 1)
            .copied()
            .unwrap_or(self.total_bytes)
    }
}

/// Classify one brace region. `None` means plain text (not a
/// placeholder candidate); candidates either match one of the five
/// forms or yield an issue scoped to this region.
fn classify(
    raw: &str,
    inner: &str,
    span: (usize, usize),
    line: usize,
    col: usize,
) -> Option<Result<PlaceholderMatch, ScanIssue>> {
    // A candidate has a colon and an ASCII-uppercase head segment.
    // Anything else ({see appendix}, {12:30}) is literal text.
    let head = inner.split(':').next().unwrap_or("");
    if !inner.contains(':')
        || head.is_empty()
        || !head.chars().all(|c| c.is_ascii_uppercase())
    {
        return None;
    }

    let issue = |reason: String| ScanIssue {
        raw: raw.to_string(),
        span,
        line,
        column: col,
        reason,
    };

    let parts: Vec<&str> = inner.split(':').collect();
    let tag = parts[0];
    let token_type = match TokenType::from_tag(tag) {
        Some(token_type) => token_type,
        None => return Some(Err(issue(format!("unknown token type '{}'", tag)))),
    };

    if parts.len() != 4 {
        return Some(Err(issue(format!(
            "expected 3 segments after {}, found {}",
            tag,
            parts.len() - 1
        ))));
    }

    let pattern = TokenPattern::of(token_type);
    for (index, part) in parts[1..].iter().enumerate() {
        if part.is_empty() {
            return Some(Err(issue(format!(
                "empty '{}' segment",
                pattern.segment_names[index]
            ))));
        }
    }

    Some(Ok(PlaceholderMatch {
        token_type,
        raw: raw.to_string(),
        segments: [
            parts[1].to_string(),
            parts[2].to_string(),
            parts[3].to_string(),
        ],
        span,
        line,
        column: col,
    }))
}
