//! Template-variable placeholders for query text.
//!
//! Dashboard queries embed variables (`$x`, `${x}`, `${x:fmt}`) that neither
//! grammar accepts. [`encode`] swaps every variable for a grammar-valid
//! stand-in chosen by its syntactic position, and [`decode`] puts the original
//! variable text back into the re-rendered query.
//!
//! Stand-ins are sequential integers starting at [`PLACEHOLDER_BASE`]. A
//! variable glued into a metric name gets an identifier-shaped token instead
//! (`__var99990000__`) so the name stays a single identifier.

use std::collections::HashMap;
use std::time::Duration;

use crate::parse_utils::format_duration;

/// First placeholder number handed out.
pub const PLACEHOLDER_BASE: u64 = 99_990_000;

/// Syntactic position a variable occurrence was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Glued into a metric name that is followed by `{`.
    MetricName,
    /// Range/step/offset position: `[$x]`, `[5m:$x]`, `offset $x`.
    Duration,
    /// Evaluation time of an `@` modifier: `x @ $ts`.
    Timestamp,
    /// Right-hand side of a label matcher, quoted or bare.
    LabelValue,
    /// Anywhere else, including inside other string literals.
    Generic,
}

/// One variable found in the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub kind: ContextKind,
    /// For label values: whether the source wrapped the variable in quotes.
    pub quoted: bool,
}

/// Mapping entry between a variable and its stand-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub original: String,
    pub token: String,
    /// Used at least once in a duration position.
    pub in_duration: bool,
    /// Used at least once as an `@` timestamp, which prints with three
    /// decimals (`99990000.000`).
    pub in_timestamp: bool,
    /// Quoting of the first label-value occurrence, if any.
    pub label_quoted: Option<bool>,
}

/// All placeholders allocated for one query, in allocation order.
#[derive(Debug, Clone)]
pub struct PlaceholderTable {
    entries: Vec<Placeholder>,
    index: HashMap<String, usize>,
    next: u64,
}

impl Default for PlaceholderTable {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            next: PLACEHOLDER_BASE,
        }
    }
}

impl PlaceholderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Placeholder] {
        &self.entries
    }

    pub fn get(&self, original: &str) -> Option<&Placeholder> {
        self.index.get(original).map(|&i| &self.entries[i])
    }

    /// Return the entry for `original`, allocating one on first sight. The
    /// token shape is fixed by the context of that first sighting.
    fn assign(&mut self, original: &str, kind: ContextKind) -> usize {
        if let Some(&i) = self.index.get(original) {
            return i;
        }
        let seq = self.next;
        self.next += 1;
        let token = match kind {
            ContextKind::MetricName => format!("__var{seq}__"),
            _ => seq.to_string(),
        };
        self.entries.push(Placeholder {
            original: original.to_string(),
            token,
            in_duration: false,
            in_timestamp: false,
            label_quoted: None,
        });
        let i = self.entries.len() - 1;
        self.index.insert(original.to_string(), i);
        i
    }
}

/// A variable sits where the grammars cannot take a stand-in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error(
        "variable {variable} at offset {offset}: variables in function name positions are not supported"
    )]
    FunctionName { variable: String, offset: usize },
    #[error(
        "variable {variable} at offset {offset}: variables in grouping (by/without) positions are not supported"
    )]
    Grouping { variable: String, offset: usize },
    #[error(
        "variable {variable} at offset {offset}: variables at the start of a metric name are not supported"
    )]
    LeadingMetricName { variable: String, offset: usize },
}

/// Query text with every variable replaced, plus the table to undo it.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub text: String,
    pub table: PlaceholderTable,
}

// ---------------------------------------------------------------------------
// Lexical scan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Code,
    Str,
    Var(usize),
}

#[derive(Debug, Clone, Copy)]
struct VarSpan {
    start: usize,
    end: usize,
    /// `(open quote, one past close quote)` of the enclosing string literal.
    string: Option<(usize, usize)>,
}

struct Scan<'a> {
    src: &'a str,
    bytes: &'a [u8],
    class: Vec<Class>,
    vars: Vec<VarSpan>,
    groupings: Vec<(usize, usize)>,
}

fn is_ident_cont(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// End of the variable starting at `bytes[i] == b'$'`, if one starts there.
fn var_end(bytes: &[u8], i: usize) -> Option<usize> {
    let len = bytes.len();
    if i + 1 < len && bytes[i + 1] == b'{' {
        let close = bytes[i + 2..].iter().position(|&b| b == b'}')? + i + 2;
        return (close > i + 2).then_some(close + 1);
    }
    let mut j = i + 1;
    while j < len && is_ident_cont(bytes[j]) {
        j += 1;
    }
    (j > i + 1).then_some(j)
}

impl<'a> Scan<'a> {
    fn new(src: &'a str) -> Self {
        let bytes = src.as_bytes();
        let len = bytes.len();
        let mut class = vec![Class::Code; len];
        let mut vars = Vec::new();
        let mut i = 0;

        while i < len {
            match bytes[i] {
                q @ (b'"' | b'\'' | b'`') => {
                    let open = i;
                    let mut j = i + 1;
                    while j < len && bytes[j] != q {
                        if bytes[j] == b'\\' && q != b'`' {
                            j += 1;
                        }
                        j += 1;
                    }
                    let close = j.min(len);
                    let end = if j < len { j + 1 } else { len };
                    for c in &mut class[open..end] {
                        *c = Class::Str;
                    }
                    let mut k = open + 1;
                    while k < close {
                        if bytes[k] == b'$' {
                            if let Some(e) = var_end(bytes, k).filter(|&e| e <= close) {
                                vars.push(VarSpan {
                                    start: k,
                                    end: e,
                                    string: Some((open, end)),
                                });
                                k = e;
                                continue;
                            }
                        }
                        k += 1;
                    }
                    i = end;
                }
                b'$' => match var_end(bytes, i) {
                    Some(e) => {
                        let idx = vars.len();
                        for c in &mut class[i..e] {
                            *c = Class::Var(idx);
                        }
                        vars.push(VarSpan {
                            start: i,
                            end: e,
                            string: None,
                        });
                        i = e;
                    }
                    None => i += 1,
                },
                _ => i += 1,
            }
        }

        let mut scan = Scan {
            src,
            bytes,
            class,
            vars,
            groupings: Vec::new(),
        };
        scan.groupings = scan.find_groupings();
        scan
    }

    fn is_code(&self, i: usize) -> bool {
        self.class[i] == Class::Code
    }

    fn is_code_ident(&self, i: usize) -> bool {
        self.is_code(i) && is_ident_cont(self.bytes[i])
    }

    fn skip_ws_back(&self, mut k: usize) -> usize {
        while k > 0 && self.bytes[k - 1].is_ascii_whitespace() {
            k -= 1;
        }
        k
    }

    fn skip_ws_fwd(&self, mut k: usize) -> usize {
        while k < self.bytes.len() && self.bytes[k].is_ascii_whitespace() {
            k += 1;
        }
        k
    }

    /// Spans `(open paren, close paren)` of every `by (...)` / `without (...)`.
    fn find_groupings(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let len = self.bytes.len();
        let mut i = 0;
        while i < len {
            let kw_len = ["by", "without"].iter().find_map(|kw| {
                let end = i + kw.len();
                let matches = end <= len
                    && &self.bytes[i..end] == kw.as_bytes()
                    && (i..end).all(|k| self.is_code(k))
                    && (i == 0 || !(self.is_code_ident(i - 1) || matches!(self.class[i - 1], Class::Var(_))))
                    && (end == len || !is_ident_cont(self.bytes[end]));
                matches.then_some(kw.len())
            });
            let Some(kw_len) = kw_len else {
                i += 1;
                continue;
            };
            let open = self.skip_ws_fwd(i + kw_len);
            if open < len && self.bytes[open] == b'(' && self.is_code(open) {
                if let Some(close) = (open + 1..len).find(|&k| self.bytes[k] == b')' && self.is_code(k)) {
                    out.push((open, close));
                    i = close + 1;
                    continue;
                }
            }
            i += kw_len;
        }
        out
    }

    /// Bounds of the identifier run (identifier bytes and glued variables)
    /// containing variable `v`.
    fn run_bounds(&self, v: usize) -> (usize, usize) {
        let span = self.vars[v];
        let mut start = span.start;
        while start > 0 {
            match self.class[start - 1] {
                Class::Code if is_ident_cont(self.bytes[start - 1]) => start -= 1,
                Class::Var(other) => start = self.vars[other].start,
                _ => break,
            }
        }
        let mut end = span.end;
        while end < self.bytes.len() {
            match self.class[end] {
                Class::Code if is_ident_cont(self.bytes[end]) => end += 1,
                Class::Var(other) => end = self.vars[other].end,
                _ => break,
            }
        }
        (start, end)
    }

    fn run_has_ident_bytes(&self, start: usize, end: usize) -> bool {
        (start..end).any(|k| self.is_code_ident(k))
    }

    /// Whether a label matcher operator (`=`, `!=`, `=~`, `!~`) preceded by a
    /// label name ends just before `pos`.
    fn matcher_op_before(&self, pos: usize) -> bool {
        let k = self.skip_ws_back(pos);
        if k == 0 || !self.is_code(k - 1) {
            return false;
        }
        let b = self.bytes;
        let prev = |n: usize| if k >= n { Some(b[k - n]) } else { None };
        let op_start = match (prev(1), prev(2)) {
            (Some(b'~'), Some(b'=' | b'!')) => k - 2,
            (Some(b'='), Some(b'!')) => k - 2,
            (Some(b'='), Some(b'=' | b'<' | b'>' | b'|')) => return false,
            (Some(b'='), _) => k - 1,
            _ => return false,
        };
        let name_end = self.skip_ws_back(op_start);
        name_end > 0 && self.is_code_ident(name_end - 1)
    }

    fn prev_word_is(&self, pos: usize, word: &str) -> bool {
        let end = self.skip_ws_back(pos);
        let mut start = end;
        while start > 0 && self.is_code_ident(start - 1) {
            start -= 1;
        }
        &self.src[start..end] == word
    }

    fn in_grouping(&self, pos: usize) -> bool {
        self.groupings.iter().any(|&(open, close)| open < pos && pos < close)
    }

    fn var_text(&self, v: usize) -> String {
        let span = self.vars[v];
        self.src[span.start..span.end].to_string()
    }

    fn classify_var(&self, v: usize) -> Result<Occurrence, PositionError> {
        let span = self.vars[v];
        let (kind, quoted) = self.context_of(v)?;
        Ok(Occurrence {
            text: self.var_text(v),
            start: span.start,
            end: span.end,
            kind,
            quoted,
        })
    }

    fn context_of(&self, v: usize) -> Result<(ContextKind, bool), PositionError> {
        let span = self.vars[v];

        if let Some((open, end)) = span.string {
            let whole_literal = span.start == open + 1
                && span.end + 1 == end
                && self.bytes[end - 1] == self.bytes[open];
            if whole_literal && self.matcher_op_before(open) {
                return Ok((ContextKind::LabelValue, true));
            }
            return Ok((ContextKind::Generic, false));
        }

        if self.in_grouping(span.start) {
            return Err(PositionError::Grouping {
                variable: self.var_text(v),
                offset: span.start,
            });
        }

        let (run_start, run_end) = self.run_bounds(v);
        let after = self.skip_ws_fwd(run_end);
        if after < self.bytes.len() && self.bytes[after] == b'(' && self.is_code(after) {
            return Err(PositionError::FunctionName {
                variable: self.var_text(v),
                offset: span.start,
            });
        }

        let glued = self.run_has_ident_bytes(run_start, run_end);
        let opens_selector = run_end < self.bytes.len() && self.bytes[run_end] == b'{';
        let opens_range = run_end < self.bytes.len() && self.bytes[run_end] == b'[';
        if let Class::Var(lead) = self.class[run_start] {
            if glued || opens_selector || opens_range {
                return Err(PositionError::LeadingMetricName {
                    variable: self.var_text(lead),
                    offset: self.vars[lead].start,
                });
            }
        }
        if glued {
            let kind = if opens_selector {
                ContextKind::MetricName
            } else {
                ContextKind::Generic
            };
            return Ok((kind, false));
        }

        let before = self.skip_ws_back(span.start);
        let prev = (before > 0).then(|| self.bytes[before - 1]);
        let next = (after < self.bytes.len()).then(|| self.bytes[after]);
        let in_range = matches!(
            (prev, next),
            (Some(b'['), Some(b']' | b':')) | (Some(b':'), Some(b']'))
        );
        if in_range || self.prev_word_is(span.start, "offset") {
            return Ok((ContextKind::Duration, false));
        }
        if prev == Some(b'@') && self.is_code(before - 1) {
            return Ok((ContextKind::Timestamp, false));
        }

        let terminated = span.end == self.bytes.len()
            || matches!(self.bytes[span.end], b',' | b'}' | b']' | b')')
            || self.bytes[span.end].is_ascii_whitespace();
        if terminated && self.matcher_op_before(span.start) {
            return Ok((ContextKind::LabelValue, false));
        }
        Ok((ContextKind::Generic, false))
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Find every variable in `query` and the context it appears in.
pub fn classify(query: &str) -> Result<Vec<Occurrence>, PositionError> {
    let scan = Scan::new(query);
    (0..scan.vars.len()).map(|v| scan.classify_var(v)).collect()
}

/// Replace every variable with its stand-in.
///
/// Allocation runs in context precedence (metric name, duration, timestamp,
/// label value, generic) so a variable's token shape comes from its most
/// constrained position; later occurrences reuse the same token.
pub fn encode(query: &str) -> Result<Encoded, PositionError> {
    let occurrences = classify(query)?;
    let mut table = PlaceholderTable::new();
    let mut slots = vec![0usize; occurrences.len()];

    for kind in [
        ContextKind::MetricName,
        ContextKind::Duration,
        ContextKind::Timestamp,
        ContextKind::LabelValue,
        ContextKind::Generic,
    ] {
        for (i, occ) in occurrences.iter().enumerate().filter(|(_, o)| o.kind == kind) {
            let idx = table.assign(&occ.text, kind);
            let entry = &mut table.entries[idx];
            match kind {
                ContextKind::Duration => entry.in_duration = true,
                ContextKind::Timestamp => entry.in_timestamp = true,
                ContextKind::LabelValue => {
                    entry.label_quoted.get_or_insert(occ.quoted);
                }
                _ => {}
            }
            slots[i] = idx;
        }
    }

    let mut text = String::with_capacity(query.len() + occurrences.len() * 8);
    let mut last = 0;
    for (occ, &idx) in occurrences.iter().zip(&slots) {
        text.push_str(&query[last..occ.start]);
        let token = &table.entries[idx].token;
        if occ.kind == ContextKind::LabelValue && !occ.quoted {
            text.push('"');
            text.push_str(token);
            text.push('"');
        } else {
            text.push_str(token);
        }
        last = occ.end;
    }
    text.push_str(&query[last..]);
    Ok(Encoded { text, table })
}

/// Put the original variables back into re-rendered query text.
pub fn decode(rendered: &str, table: &PlaceholderTable) -> String {
    let mut out = rendered.to_string();

    // Printers normalise durations (99990000 -> "1157d7h"); longer renderings
    // go first since one can be a prefix of another.
    let mut durations: Vec<(String, &str)> = table
        .entries
        .iter()
        .filter(|e| e.in_duration)
        .filter_map(|e| {
            let secs: u64 = e.token.parse().ok()?;
            Some((format_duration(Duration::from_secs(secs)), e.original.as_str()))
        })
        .collect();
    durations.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    for (rendering, original) in durations {
        out = out.replace(&rendering, original);
    }

    let mut entries: Vec<&Placeholder> = table.entries.iter().collect();
    entries.sort_by(|a, b| {
        b.token
            .len()
            .cmp(&a.token.len())
            .then_with(|| a.token.cmp(&b.token))
    });
    for entry in entries {
        if entry.in_timestamp {
            out = out.replace(&format!("{}.000", entry.token), &entry.original);
        }
        if entry.label_quoted == Some(false) {
            out = out.replace(&format!("\"{}\"", entry.token), &entry.original);
        }
        out = out.replace(&entry.token, &entry.original);
    }
    out
}

#[cfg(test)]
mod tests;
