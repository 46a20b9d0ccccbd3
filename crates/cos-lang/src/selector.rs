use std::fmt;

use winnow::combinator::{alt, cut_err, opt};
use winnow::prelude::*;
use winnow::token::literal;

use crate::parse_utils::{expected, fail_cut, ident, quote, quoted_string, ws_skip};

/// Comparison operator of a label matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOp {
    Equal,
    NotEqual,
    RegexMatch,
    RegexNoMatch,
}

impl MatchOp {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchOp::Equal => "=",
            MatchOp::NotEqual => "!=",
            MatchOp::RegexMatch => "=~",
            MatchOp::RegexNoMatch => "!~",
        }
    }

    pub fn is_regex(self) -> bool {
        matches!(self, MatchOp::RegexMatch | MatchOp::RegexNoMatch)
    }
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `name op "value"` constraint inside a series/stream selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
}

impl Matcher {
    pub fn new(op: MatchOp, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MatchOp::Equal, name, value)
    }

    /// Whether this matcher accepts a series that lacks the label entirely.
    pub fn matches_empty(&self) -> bool {
        match self.op {
            MatchOp::Equal => self.value.is_empty(),
            MatchOp::NotEqual => !self.value.is_empty(),
            MatchOp::RegexMatch | MatchOp::RegexNoMatch => {
                let anchored = format!("^(?:{})$", self.value);
                let hit = regex::Regex::new(&anchored)
                    .map(|re| re.is_match(""))
                    .unwrap_or(false);
                hit == (self.op == MatchOp::RegexMatch)
            }
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, self.op, quote(&self.value))
    }
}

/// A node that owns a list of label matchers.
pub trait Selector {
    fn matchers(&self) -> &[Matcher];

    fn append_matchers(&mut self, extra: Vec<Matcher>);

    fn has_matcher(&self, name: &str) -> bool {
        self.matchers().iter().any(|m| m.name == name)
    }
}

/// An expression tree whose selectors can be visited mutably.
pub trait SelectorTree {
    fn walk_selectors_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Selector));
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

pub(crate) fn match_op(input: &mut &str) -> ModalResult<MatchOp> {
    alt((
        literal("=~").value(MatchOp::RegexMatch),
        literal("!~").value(MatchOp::RegexNoMatch),
        literal("!=").value(MatchOp::NotEqual),
        literal("=").value(MatchOp::Equal),
    ))
    .parse_next(input)
}

/// `name op "value"`; regex values are checked for syntax.
pub(crate) fn matcher(input: &mut &str) -> ModalResult<Matcher> {
    let name = ident.parse_next(input)?;
    ws_skip.parse_next(input)?;
    let op = cut_err(match_op)
        .context(expected("matcher operator (=, !=, =~, !~)"))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let at_value = *input;
    let value = cut_err(quoted_string)
        .context(expected("quoted label value"))
        .parse_next(input)?;
    if op.is_regex() && regex_syntax::Parser::new().parse(&value).is_err() {
        *input = at_value;
        return fail_cut(input, "invalid regular expression in label matcher");
    }
    Ok(Matcher::new(op, name, value))
}

/// `{ m1, m2, ... }` with an optional trailing comma.
pub(crate) fn matcher_block(input: &mut &str) -> ModalResult<Vec<Matcher>> {
    literal("{").parse_next(input)?;
    let mut out = Vec::new();
    loop {
        ws_skip.parse_next(input)?;
        if opt(literal("}")).parse_next(input)?.is_some() {
            return Ok(out);
        }
        out.push(
            cut_err(matcher)
                .context(expected("label matcher"))
                .parse_next(input)?,
        );
        ws_skip.parse_next(input)?;
        if opt(literal(",")).parse_next(input)?.is_none() {
            cut_err(literal("}"))
                .context(expected("',' or '}'"))
                .parse_next(input)?;
            return Ok(out);
        }
    }
}
