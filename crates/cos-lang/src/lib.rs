use std::fmt::Display;

pub mod logql;
pub mod names;
pub mod ops;
pub mod parse_utils;
pub mod placeholder;
pub mod promql;
pub mod selector;

pub use names::{is_valid_label_name, is_valid_metric_name};
pub use parse_utils::{SyntaxError, format_duration, parse_duration};
pub use placeholder::{Encoded, PlaceholderTable, PositionError, decode, encode};
pub use selector::{MatchOp, Matcher, Selector, SelectorTree};

/// A query dialect: parse text into a walkable AST that prints back
/// canonically.
pub trait Grammar {
    type Ast: SelectorTree + Display;

    fn parse(text: &str) -> Result<Self::Ast, SyntaxError>;
}

/// Metrics dialect. Printing sorts every selector's matchers by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromQlGrammar;

impl Grammar for PromQlGrammar {
    type Ast = promql::Expr;

    fn parse(text: &str) -> Result<Self::Ast, SyntaxError> {
        promql::parse(text)
    }
}

/// Log dialect. Printing keeps matchers in source order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogQlGrammar;

impl Grammar for LogQlGrammar {
    type Ast = logql::Expr;

    fn parse(text: &str) -> Result<Self::Ast, SyntaxError> {
        logql::parse(text)
    }
}
