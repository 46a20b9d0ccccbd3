//! Metric query language: AST, parser, and canonical printer.

mod display;
mod parser;

use std::time::Duration;

use crate::ops::{BinModifiers, BinaryOp, Grouping};
use crate::parse_utils::SyntaxError;
use crate::selector::{Matcher, Selector, SelectorTree};

pub use parser::FUNCTIONS;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Vector(VectorSelector),
    Matrix(MatrixSelector),
    Subquery(Subquery),
    Call(Call),
    Aggregate(Aggregate),
    Binary(Binary),
    Unary(Unary),
    Paren(Box<Expr>),
}

/// Time shift applied to a selector or subquery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub negative: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtModifier {
    Timestamp(f64),
    Start,
    End,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorSelector {
    pub name: Option<String>,
    pub matchers: Vec<Matcher>,
    pub at: Option<AtModifier>,
    pub offset: Option<Offset>,
}

/// `selector[range]`; modifiers live on the inner selector.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSelector {
    pub selector: VectorSelector,
    pub range: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub expr: Box<Expr>,
    pub range: Duration,
    pub step: Option<Duration>,
    pub at: Option<AtModifier>,
    pub offset: Option<Offset>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub func: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub op: String,
    pub param: Option<Box<Expr>>,
    pub expr: Box<Expr>,
    pub grouping: Option<Grouping>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub op: BinaryOp,
    pub modifiers: BinModifiers,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unary {
    pub negative: bool,
    pub expr: Box<Expr>,
}

/// Parse a complete metric query.
pub fn parse(text: &str) -> Result<Expr, SyntaxError> {
    parser::parse_query(text)
}

impl Selector for VectorSelector {
    fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    fn append_matchers(&mut self, extra: Vec<Matcher>) {
        self.matchers.extend(extra);
    }
}

impl SelectorTree for Expr {
    fn walk_selectors_mut(&mut self, visit: &mut dyn FnMut(&mut dyn Selector)) {
        match self {
            Expr::Number(_) | Expr::String(_) => {}
            Expr::Vector(vs) => visit(vs),
            Expr::Matrix(ms) => visit(&mut ms.selector),
            Expr::Subquery(sq) => sq.expr.walk_selectors_mut(visit),
            Expr::Call(call) => {
                for arg in &mut call.args {
                    arg.walk_selectors_mut(visit);
                }
            }
            Expr::Aggregate(agg) => {
                if let Some(param) = &mut agg.param {
                    param.walk_selectors_mut(visit);
                }
                agg.expr.walk_selectors_mut(visit);
            }
            Expr::Binary(bin) => {
                bin.lhs.walk_selectors_mut(visit);
                bin.rhs.walk_selectors_mut(visit);
            }
            Expr::Unary(u) => u.expr.walk_selectors_mut(visit),
            Expr::Paren(inner) => inner.walk_selectors_mut(visit),
        }
    }
}
