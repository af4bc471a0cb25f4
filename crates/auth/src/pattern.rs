//! Wildcard patterns used by the policy rule table.
//!
//! - `*` matches any (possibly empty) character sequence
//! - `a|b` matches either alternative
//! - in path patterns, a segment written `:name` matches exactly one
//!   non-empty path segment

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Lit(char),
    Any,
    Segment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Free-form value (subject, tenant).
    Plain,
    /// Request path; enables `:name` segments.
    Path,
    /// HTTP method; compared case-insensitively.
    Method,
}

/// A compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    kind: PatternKind,
    alternatives: Vec<Vec<Token>>,
}

impl Pattern {
    /// Compile a pattern. Returns `None` for an empty pattern or an empty
    /// alternative (`a||b`).
    pub fn compile(raw: &str, kind: PatternKind) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let mut alternatives = Vec::new();
        for alt in raw.split('|') {
            let alt = alt.trim();
            if alt.is_empty() {
                return None;
            }
            let alt = if kind == PatternKind::Method {
                alt.to_ascii_uppercase()
            } else {
                alt.to_string()
            };
            alternatives.push(tokenize(&alt, kind == PatternKind::Path));
        }

        Some(Self {
            raw: raw.to_string(),
            kind,
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, value: &str) -> bool {
        let value: Vec<char> = if self.kind == PatternKind::Method {
            value.to_ascii_uppercase().chars().collect()
        } else {
            value.chars().collect()
        };
        self.alternatives.iter().any(|tokens| match_tokens(tokens, &value))
    }
}

impl core::fmt::Display for Pattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn tokenize(pattern: &str, segments: bool) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let at_segment_start = i == 0 || chars[i - 1] == '/';

        if c == '*' {
            // Collapse runs of `*`.
            if tokens.last() != Some(&Token::Any) {
                tokens.push(Token::Any);
            }
            i += 1;
        } else if segments && c == ':' && at_segment_start {
            while i < chars.len() && chars[i] != '/' {
                i += 1;
            }
            tokens.push(Token::Segment);
        } else {
            tokens.push(Token::Lit(c));
            i += 1;
        }
    }

    tokens
}

fn match_tokens(tokens: &[Token], input: &[char]) -> bool {
    match tokens.split_first() {
        None => input.is_empty(),
        Some((Token::Lit(c), rest)) => input.first() == Some(c) && match_tokens(rest, &input[1..]),
        Some((Token::Any, rest)) => (0..=input.len()).any(|i| match_tokens(rest, &input[i..])),
        Some((Token::Segment, rest)) => {
            let max = input.iter().position(|c| *c == '/').unwrap_or(input.len());
            (1..=max).any(|i| match_tokens(rest, &input[i..]))
        }
    }
}
