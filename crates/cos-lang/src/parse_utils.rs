use std::fmt;
use std::time::Duration;

use winnow::ascii::multispace0;
use winnow::combinator::opt;
use winnow::error::{AddContext, ContextError, ErrMode, ParseError, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{literal, take_while};

// ---------------------------------------------------------------------------
// Syntax errors
// ---------------------------------------------------------------------------

/// A grammar failure with a 1-based source position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse error at line {line}, col {column}: syntax error: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    /// Build a [`SyntaxError`] from a winnow failure over `source`.
    ///
    /// A `Label` context is rendered verbatim (it carries semantic messages
    /// such as "not a valid duration string"); otherwise the expected items
    /// are listed after the offending token.
    pub fn from_parse(source: &str, err: &ParseError<&str, ContextError>) -> Self {
        let offset = err.offset().min(source.len());
        let (line, column) = line_col(source, offset);
        let inner = err.inner();

        let label = inner.context().find_map(|c| match c {
            StrContext::Label(l) => Some(*l),
            _ => None,
        });
        let expected: Vec<String> = inner
            .context()
            .filter_map(|c| match c {
                StrContext::Expected(v) => Some(v.to_string()),
                _ => None,
            })
            .collect();

        let found = describe_found(&source[offset..]);
        let message = match label {
            Some(l) => l.to_string(),
            None if !expected.is_empty() => {
                format!("unexpected {found}, expected {}", expected.join(" or "))
            }
            None => format!("unexpected {found}"),
        };
        SyntaxError {
            line,
            column,
            message,
        }
    }
}

fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

fn describe_found(rest: &str) -> String {
    let token: String = rest
        .trim_start()
        .chars()
        .take_while(|c| !c.is_whitespace())
        .take(16)
        .collect();
    if token.is_empty() {
        "end of input".to_string()
    } else {
        format!("{token:?}")
    }
}

/// Fail hard at the current position with a semantic message.
pub fn fail_cut<T>(input: &&str, label: &'static str) -> ModalResult<T> {
    Err(ErrMode::Cut(ContextError::new().add_context(
        input,
        &input.checkpoint(),
        StrContext::Label(label),
    )))
}

pub(crate) fn expected(desc: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(desc))
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

pub fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    // First character must be alphabetic or underscore (not digit).
    if !input.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}

/// Metric names additionally allow `:` (recording-rule convention).
pub fn metric_ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    if !input.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_' || c == ':') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == ':').parse_next(input)
}

pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ---------------------------------------------------------------------------
// Keyword matching with word boundary
// ---------------------------------------------------------------------------

/// Match an exact keyword string, ensuring it's not a prefix of a longer
/// identifier (i.e. the next character is not alphanumeric or `_`).
pub fn kw<'a>(keyword: &'static str) -> impl FnMut(&mut &'a str) -> ModalResult<()> {
    move |input: &mut &'a str| {
        let saved = *input;
        literal(keyword).parse_next(input)?;
        if input.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == ':') {
            *input = saved;
            return Err(ErrMode::Backtrack(ContextError::new()));
        }
        Ok(())
    }
}

/// Peek whether `input` starts with `keyword` on a word boundary.
pub fn peek_kw(input: &str, keyword: &str) -> bool {
    input.starts_with(keyword)
        && !input[keyword.len()..].starts_with(|c: char| is_ident_char(c) || c == ':')
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// Parse a double-quoted, single-quoted, or backtick (raw) string literal and
/// return its decoded content.
pub fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let quote = match input.chars().next() {
        Some(q @ ('"' | '\'' | '`')) => q,
        _ => return Err(ErrMode::Backtrack(ContextError::new())),
    };
    let body = &input[1..];

    if quote == '`' {
        return match body.find('`') {
            Some(end) => {
                let content = body[..end].to_string();
                *input = &body[end + 1..];
                Ok(content)
            }
            None => Err(ErrMode::Cut(ContextError::new().add_context(
                input,
                &input.checkpoint(),
                expected("closing backtick"),
            ))),
        };
    }

    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => {
                *input = &body[i + 1..];
                return Ok(out);
            }
            '\n' => break,
            '\\' => {
                let Some((_, esc)) = chars.next() else { break };
                let decoded = match esc {
                    'a' => '\u{07}',
                    'b' => '\u{08}',
                    'f' => '\u{0c}',
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    'v' => '\u{0b}',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    'x' | 'u' | 'U' => {
                        let width = match esc {
                            'x' => 2,
                            'u' => 4,
                            _ => 8,
                        };
                        let hex: String = chars.by_ref().take(width).map(|(_, h)| h).collect();
                        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                            Some(ch) if hex.len() == width => ch,
                            _ => return fail_cut(input, "invalid escape sequence in string"),
                        }
                    }
                    '0'..='7' => {
                        let mut digits = String::from(esc);
                        digits.extend(chars.by_ref().take(2).map(|(_, d)| d));
                        match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                            Some(ch) if digits.len() == 3 => ch,
                            _ => return fail_cut(input, "invalid escape sequence in string"),
                        }
                    }
                    _ => return fail_cut(input, "invalid escape sequence in string"),
                };
                out.push(decoded);
            }
            c => out.push(c),
        }
    }
    Err(ErrMode::Cut(ContextError::new().add_context(
        input,
        &input.checkpoint(),
        expected("closing quote"),
    )))
}

/// Render `s` as a double-quoted literal with Go-style escapes.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0b}' => out.push_str("\\v"),
            c if c.is_control() && (c as u32) < 0x80 => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Parse a number literal: decimal, float with optional exponent, hex
/// (`0x1f`), `Inf`, or `NaN`.
pub fn number_literal(input: &mut &str) -> ModalResult<f64> {
    let lower: String = input.chars().take(3).collect::<String>().to_ascii_lowercase();
    if (lower == "inf" || lower == "nan") && !input[3..].starts_with(is_ident_char) {
        *input = &input[3..];
        return Ok(if lower == "inf" { f64::INFINITY } else { f64::NAN });
    }

    if input.starts_with("0x") || input.starts_with("0X") {
        let digits = &input[2..];
        let len = digits.find(|c: char| !c.is_ascii_hexdigit()).unwrap_or(digits.len());
        if len > 0 {
            if let Ok(v) = u64::from_str_radix(&digits[..len], 16) {
                *input = &digits[len..];
                return Ok(v as f64);
            }
        }
        return Err(ErrMode::Backtrack(ContextError::new()));
    }

    let bytes = input.as_bytes();
    let mut end = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let int_len = end;
    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac = end + 1;
        while frac < bytes.len() && bytes[frac].is_ascii_digit() {
            frac += 1;
        }
        if frac > end + 1 || int_len > 0 {
            end = frac;
        }
    }
    if end == 0 || (int_len == 0 && end == 1) {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        let digits_start = exp;
        while exp < bytes.len() && bytes[exp].is_ascii_digit() {
            exp += 1;
        }
        if exp > digits_start {
            end = exp;
        }
    }
    let value: f64 = input[..end]
        .parse()
        .map_err(|_| ErrMode::Backtrack(ContextError::new()))?;
    *input = &input[end..];
    Ok(value)
}

/// Render a float the way the canonical printers do: shortest decimal
/// form, `+Inf`, `-Inf`, `NaN`.
pub fn format_number(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{v}")
    }
}

// ---------------------------------------------------------------------------
// Duration
// ---------------------------------------------------------------------------

const MS_PER_SECOND: u64 = 1000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;
const MS_PER_WEEK: u64 = 7 * MS_PER_DAY;
const MS_PER_YEAR: u64 = 365 * MS_PER_DAY;

/// Units in the only order they may appear in a compound duration.
const UNITS: &[(&str, u64)] = &[
    ("y", MS_PER_YEAR),
    ("w", MS_PER_WEEK),
    ("d", MS_PER_DAY),
    ("h", MS_PER_HOUR),
    ("ms", 1),
    ("m", MS_PER_MINUTE),
    ("s", MS_PER_SECOND),
];

fn unit_rank(unit: &str) -> usize {
    match unit {
        "y" => 0,
        "w" => 1,
        "d" => 2,
        "h" => 3,
        "m" => 4,
        "s" => 5,
        _ => 6,
    }
}

/// Parse a duration: compound `1h30m`, `5m`, `250ms`, or a bare integer
/// taken as a count of seconds.
pub fn duration_value(input: &mut &str) -> ModalResult<Duration> {
    if input.starts_with('-') {
        return fail_cut(input, "not a valid duration string");
    }
    let mut total_ms: u64 = 0;
    let mut last_rank: Option<usize> = None;
    let mut components = 0;

    loop {
        let digits_len = input.find(|c: char| !c.is_ascii_digit()).unwrap_or(input.len());
        if digits_len == 0 {
            break;
        }
        let value: u64 = input[..digits_len]
            .parse()
            .map_err(|_| ErrMode::Cut(ContextError::new()))?;
        let rest = &input[digits_len..];

        let unit = UNITS
            .iter()
            .find(|(u, _)| rest.starts_with(u) && !rest[u.len()..].starts_with(|c: char| c.is_ascii_alphabetic()));
        match unit {
            Some((u, mult)) => {
                let rank = unit_rank(u);
                if last_rank.is_some_and(|r| rank <= r) {
                    return fail_cut(input, "not a valid duration string");
                }
                last_rank = Some(rank);
                total_ms = value
                    .checked_mul(*mult)
                    .and_then(|v| total_ms.checked_add(v))
                    .ok_or(ErrMode::Cut(ContextError::new()))?;
                *input = &rest[u.len()..];
                components += 1;
            }
            None if components == 0 => {
                if rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '.') {
                    return fail_cut(input, "not a valid duration string");
                }
                *input = rest;
                return Ok(Duration::from_secs(value));
            }
            None => return fail_cut(input, "not a valid duration string"),
        }
    }

    if components == 0 {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    Ok(Duration::from_millis(total_ms))
}

/// Parse a whole string as a duration.
pub fn parse_duration(s: &str) -> Result<Duration, SyntaxError> {
    let trimmed = s.trim();
    duration_value
        .parse(trimmed)
        .map_err(|e| SyntaxError::from_parse(trimmed, &e))
}

/// Render a duration in the canonical unit-decomposed form. Years and weeks
/// are only used when they divide the remainder exactly (`90d`, not `12w6d`).
pub fn format_duration(d: Duration) -> String {
    let mut ms = d.as_millis() as u64;
    if ms == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    let mut emit = |unit: &str, mult: u64, exact: bool, ms: &mut u64| {
        if exact && *ms % mult != 0 {
            return;
        }
        let v = *ms / mult;
        if v > 0 {
            out.push_str(&format!("{v}{unit}"));
            *ms -= v * mult;
        }
    };
    emit("y", MS_PER_YEAR, true, &mut ms);
    emit("w", MS_PER_WEEK, true, &mut ms);
    emit("d", MS_PER_DAY, false, &mut ms);
    emit("h", MS_PER_HOUR, false, &mut ms);
    emit("m", MS_PER_MINUTE, false, &mut ms);
    emit("s", MS_PER_SECOND, false, &mut ms);
    emit("ms", 1, false, &mut ms);
    out
}

/// Display adaptor for durations inside printers.
pub struct Dur(pub Duration);

impl fmt::Display for Dur {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_duration(self.0))
    }
}

// ---------------------------------------------------------------------------
// Whitespace & comments
// ---------------------------------------------------------------------------

/// Skip whitespace and `# ...` line comments.
pub fn ws_skip(input: &mut &str) -> ModalResult<()> {
    loop {
        let _ = multispace0.parse_next(input)?;
        if opt(literal("#")).parse_next(input)?.is_some() {
            let _ = take_while(0.., |c: char| c != '\n').parse_next(input)?;
        } else {
            break;
        }
    }
    Ok(())
}

/// Parse a parenthesised, comma-separated list of label names: `(a, b)`.
pub fn label_list(input: &mut &str) -> ModalResult<Vec<String>> {
    literal("(").parse_next(input)?;
    let mut labels = Vec::new();
    loop {
        ws_skip.parse_next(input)?;
        if opt(literal(")")).parse_next(input)?.is_some() {
            return Ok(labels);
        }
        let name = winnow::combinator::cut_err(ident)
            .context(expected("label name"))
            .parse_next(input)?;
        labels.push(name.to_string());
        ws_skip.parse_next(input)?;
        if opt(literal(",")).parse_next(input)?.is_none() {
            ws_skip.parse_next(input)?;
            winnow::combinator::cut_err(literal(")"))
                .context(expected("',' or ')'"))
                .parse_next(input)?;
            return Ok(labels);
        }
    }
}

#[cfg(test)]
mod tests;
