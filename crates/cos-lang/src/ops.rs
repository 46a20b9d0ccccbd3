use std::fmt;

use winnow::combinator::{alt, cut_err, opt};
use winnow::error::{AddContext, ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::literal;

use crate::parse_utils::{expected, kw, label_list, ws_skip};

/// Binary operators shared by both query dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Unless,
    Eql,
    Neq,
    Gtr,
    Lss,
    Gte,
    Lte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Atan2,
    Pow,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Unless => "unless",
            BinaryOp::Eql => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Gtr => ">",
            BinaryOp::Lss => "<",
            BinaryOp::Gte => ">=",
            BinaryOp::Lte => "<=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Atan2 => "atan2",
            BinaryOp::Pow => "^",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And | BinaryOp::Unless => 2,
            BinaryOp::Eql
            | BinaryOp::Neq
            | BinaryOp::Gtr
            | BinaryOp::Lss
            | BinaryOp::Gte
            | BinaryOp::Lte => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Atan2 => 5,
            BinaryOp::Pow => 6,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 3
    }

    pub fn is_set_op(self) -> bool {
        matches!(self, BinaryOp::Or | BinaryOp::And | BinaryOp::Unless)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSide {
    Left,
    Right,
}

/// `on (..)` / `ignoring (..)` with an optional `group_left|group_right (..)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorMatching {
    pub on: bool,
    pub labels: Vec<String>,
    pub group: Option<(GroupSide, Vec<String>)>,
}

/// Modifiers that may follow a binary operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinModifiers {
    pub return_bool: bool,
    pub matching: Option<VectorMatching>,
}

/// `by (..)` or `without (..)` on an aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub without: bool,
    pub labels: Vec<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

pub(crate) fn binary_op(input: &mut &str) -> ModalResult<BinaryOp> {
    alt((
        literal("==").value(BinaryOp::Eql),
        literal("!=").value(BinaryOp::Neq),
        literal(">=").value(BinaryOp::Gte),
        literal("<=").value(BinaryOp::Lte),
        literal(">").value(BinaryOp::Gtr),
        literal("<").value(BinaryOp::Lss),
        literal("+").value(BinaryOp::Add),
        literal("-").value(BinaryOp::Sub),
        literal("*").value(BinaryOp::Mul),
        literal("/").value(BinaryOp::Div),
        literal("%").value(BinaryOp::Mod),
        literal("^").value(BinaryOp::Pow),
        kw("and").value(BinaryOp::And),
        kw("or").value(BinaryOp::Or),
        kw("unless").value(BinaryOp::Unless),
        kw("atan2").value(BinaryOp::Atan2),
    ))
    .parse_next(input)
}

fn group_modifier(input: &mut &str) -> ModalResult<(GroupSide, Vec<String>)> {
    let side = alt((
        kw("group_left").value(GroupSide::Left),
        kw("group_right").value(GroupSide::Right),
    ))
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let labels = opt(label_list).parse_next(input)?.unwrap_or_default();
    Ok((side, labels))
}

/// Parse `[bool] [on|ignoring (..) [group_left|group_right [(..)]]]`.
pub(crate) fn binary_modifiers(op: BinaryOp, input: &mut &str) -> ModalResult<BinModifiers> {
    let mut mods = BinModifiers::default();
    if opt(kw("bool")).parse_next(input)?.is_some() {
        if !op.is_comparison() {
            return crate::parse_utils::fail_cut(
                input,
                "bool modifier can only be used on comparison operators",
            );
        }
        mods.return_bool = true;
        ws_skip.parse_next(input)?;
    }

    let on = alt((kw("on").value(true), kw("ignoring").value(false)));
    if let Some(on) = opt(on).parse_next(input)? {
        ws_skip.parse_next(input)?;
        let labels = cut_err(label_list)
            .context(expected("label list"))
            .parse_next(input)?;
        ws_skip.parse_next(input)?;
        let group = opt(group_modifier).parse_next(input)?;
        if group.is_some() && op.is_set_op() {
            return crate::parse_utils::fail_cut(
                input,
                "no grouping allowed for set operations",
            );
        }
        ws_skip.parse_next(input)?;
        mods.matching = Some(VectorMatching { on, labels, group });
    }
    Ok(mods)
}

/// Precedence climbing over a dialect's operand parser.
///
/// `operand` parses one unary/postfix term; `combine` builds the dialect's
/// binary node.
pub(crate) fn binary_chain<T>(
    input: &mut &str,
    min_prec: u8,
    operand: fn(&mut &str) -> ModalResult<T>,
    combine: fn(BinaryOp, BinModifiers, T, T) -> T,
) -> ModalResult<T> {
    let mut lhs = operand(input)?;
    loop {
        let save = *input;
        ws_skip.parse_next(input)?;
        let Some(op) = opt(binary_op).parse_next(input)? else {
            *input = save;
            break;
        };
        if op.precedence() < min_prec {
            *input = save;
            break;
        }
        ws_skip.parse_next(input)?;
        let mods = binary_modifiers(op, input)?;
        let next_min = if op == BinaryOp::Pow {
            op.precedence()
        } else {
            op.precedence() + 1
        };
        let rhs = match binary_chain(input, next_min, operand, combine) {
            Ok(rhs) => rhs,
            Err(ErrMode::Backtrack(_)) => {
                return Err(ErrMode::Cut(ContextError::new().add_context(
                    input,
                    &input.checkpoint(),
                    expected("right-hand operand"),
                )));
            }
            Err(e) => return Err(e),
        };
        lhs = combine(op, mods, lhs, rhs);
    }
    Ok(lhs)
}

/// Parse `by (..)` or `without (..)`.
pub(crate) fn grouping(input: &mut &str) -> ModalResult<Grouping> {
    let without = alt((kw("by").value(false), kw("without").value(true))).parse_next(input)?;
    ws_skip.parse_next(input)?;
    let labels = cut_err(label_list)
        .context(expected("grouping label list"))
        .parse_next(input)?;
    Ok(Grouping { without, labels })
}
