//! Log query language: stream selectors, pipelines, and metric queries over
//! log ranges.

mod display;
mod parser;

use std::time::Duration;

use crate::ops::{BinModifiers, BinaryOp, Grouping};
use crate::parse_utils::SyntaxError;
use crate::selector::{Matcher, Selector, SelectorTree};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Log(LogExpr),
    Sample(SampleExpr),
}

/// `{a="b", c=~"d"}`; matcher order is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogSelector {
    pub matchers: Vec<Matcher>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogExpr {
    pub selector: LogSelector,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    LineFilter(LineFilter),
    Parser(ParserStage),
    LabelFilter(LabelFilter),
    LineFormat(String),
    LabelFormat(Vec<LabelFormat>),
    Drop(Vec<LabelRef>),
    Keep(Vec<LabelRef>),
    Decolorize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFilterOp {
    Contains,
    NotContains,
    Match,
    NotMatch,
    Pattern,
    NotPattern,
}

impl LineFilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LineFilterOp::Contains => "|=",
            LineFilterOp::NotContains => "!=",
            LineFilterOp::Match => "|~",
            LineFilterOp::NotMatch => "!~",
            LineFilterOp::Pattern => "|>",
            LineFilterOp::NotPattern => "!>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Ip(String),
}

/// `|= "a" or "b"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFilter {
    pub op: LineFilterOp,
    pub value: FilterValue,
    pub alternatives: Vec<String>,
}

/// One `name` or `name="expression"` entry of a json/logfmt stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub name: String,
    pub expr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserStage {
    Json(Vec<Extraction>),
    Logfmt {
        strict: bool,
        keep_empty: bool,
        extractions: Vec<Extraction>,
    },
    Regexp(String),
    Pattern(String),
    Unpack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Neq => "!=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelFilter {
    Matcher(Matcher),
    Number { name: String, op: CmpOp, value: f64 },
    Duration { name: String, op: CmpOp, value: Duration },
    And(Box<LabelFilter>, Box<LabelFilter>),
    Or(Box<LabelFilter>, Box<LabelFilter>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelFormat {
    Rename { dst: String, src: String },
    Template { dst: String, template: String },
}

/// A label named by a drop/keep stage, optionally constrained by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelRef {
    Name(String),
    Matcher(Matcher),
}

/// `| unwrap [conversion(]label[)] [| post-filter ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Unwrap {
    pub conversion: Option<String>,
    pub label: String,
    pub post_filters: Vec<LabelFilter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRange {
    pub log: LogExpr,
    pub range: Duration,
    pub unwrap: Option<Unwrap>,
    pub offset: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleExpr {
    RangeAggregation(RangeAggregation),
    VectorAggregation(VectorAggregation),
    Binary(Binary),
    Literal(f64),
    Vector(f64),
    LabelReplace(LabelReplace),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeAggregation {
    pub op: String,
    pub param: Option<f64>,
    pub range: LogRange,
    pub grouping: Option<Grouping>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorAggregation {
    pub op: String,
    pub param: Option<i64>,
    pub expr: Box<SampleExpr>,
    pub grouping: Option<Grouping>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub op: BinaryOp,
    pub modifiers: BinModifiers,
    pub lhs: Box<SampleExpr>,
    pub rhs: Box<SampleExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelReplace {
    pub expr: Box<SampleExpr>,
    pub dst: String,
    pub replacement: String,
    pub src: String,
    pub regex: String,
}

/// Parse a complete log or metric query.
pub fn parse(text: &str) -> Result<Expr, SyntaxError> {
    parser::parse_query(text)
}

impl Selector for LogSelector {
    fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    fn append_matchers(&mut self, extra: Vec<Matcher>) {
        self.matchers.extend(extra);
    }
}

impl SelectorTree for SampleExpr {
    fn walk_selectors_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Selector)) {
        match self {
            SampleExpr::RangeAggregation(agg) => visit(&mut agg.range.log.selector),
            SampleExpr::VectorAggregation(agg) => agg.expr.walk_selectors_mut(visit),
            SampleExpr::Binary(bin) => {
                bin.lhs.walk_selectors_mut(visit);
                bin.rhs.walk_selectors_mut(visit);
            }
            SampleExpr::LabelReplace(lr) => lr.expr.walk_selectors_mut(visit),
            SampleExpr::Literal(_) | SampleExpr::Vector(_) => {}
        }
    }
}

impl SelectorTree for Expr {
    fn walk_selectors_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Selector)) {
        match self {
            Expr::Log(log) => visit(&mut log.selector),
            Expr::Sample(sample) => sample.walk_selectors_mut(visit),
        }
    }
}

#[cfg(test)]
mod tests;
