use winnow::combinator::{alt, cut_err, opt};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::literal;

use super::*;
use crate::ops::{binary_chain, grouping};
use crate::parse_utils::{
    duration_value, expected, fail_cut, ident, kw, metric_ident, number_literal, peek_kw,
    quoted_string, ws_skip,
};
use crate::selector::matcher_block;

/// Known function names.
pub const FUNCTIONS: &[&str] = &[
    "abs",
    "absent",
    "absent_over_time",
    "acos",
    "acosh",
    "asin",
    "asinh",
    "atan",
    "atanh",
    "avg_over_time",
    "ceil",
    "changes",
    "clamp",
    "clamp_max",
    "clamp_min",
    "cos",
    "cosh",
    "count_over_time",
    "day_of_month",
    "day_of_week",
    "day_of_year",
    "days_in_month",
    "deg",
    "delta",
    "deriv",
    "double_exponential_smoothing",
    "exp",
    "floor",
    "histogram_avg",
    "histogram_count",
    "histogram_fraction",
    "histogram_quantile",
    "histogram_stddev",
    "histogram_stdvar",
    "histogram_sum",
    "holt_winters",
    "hour",
    "idelta",
    "increase",
    "info",
    "irate",
    "label_join",
    "label_replace",
    "last_over_time",
    "ln",
    "log10",
    "log2",
    "mad_over_time",
    "max_over_time",
    "min_over_time",
    "minute",
    "month",
    "pi",
    "predict_linear",
    "present_over_time",
    "quantile_over_time",
    "rad",
    "rate",
    "resets",
    "round",
    "scalar",
    "sgn",
    "sin",
    "sinh",
    "sort",
    "sort_by_label",
    "sort_by_label_desc",
    "sort_desc",
    "sqrt",
    "stddev_over_time",
    "stdvar_over_time",
    "sum_over_time",
    "tan",
    "tanh",
    "time",
    "timestamp",
    "vector",
    "year",
];

const AGGREGATIONS: &[&str] = &[
    "sum",
    "avg",
    "count",
    "min",
    "max",
    "group",
    "stddev",
    "stdvar",
    "topk",
    "bottomk",
    "count_values",
    "quantile",
    "limitk",
    "limit_ratio",
];

const PARAM_AGGREGATIONS: &[&str] = &[
    "topk",
    "bottomk",
    "count_values",
    "quantile",
    "limitk",
    "limit_ratio",
];

pub(super) fn parse_query(text: &str) -> Result<Expr, SyntaxError> {
    if text.trim().is_empty() {
        return Err(SyntaxError {
            line: 1,
            column: 1,
            message: "no expression found in input".to_string(),
        });
    }
    (ws_skip, expr, ws_skip)
        .map(|(_, e, _)| e)
        .parse(text)
        .map_err(|e| SyntaxError::from_parse(text, &e))
}

// ---------------------------------------------------------------------------
// Binary levels
// ---------------------------------------------------------------------------

fn expr(input: &mut &str) -> ModalResult<Expr> {
    binary_chain(input, 1, operand, combine)
}

fn combine(op: BinaryOp, modifiers: BinModifiers, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(Binary {
        op,
        modifiers,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

/// Unary sign binds looser than `^` but tighter than `*`.
fn operand(input: &mut &str) -> ModalResult<Expr> {
    ws_skip.parse_next(input)?;
    let sign = opt(alt((literal("-").value(true), literal("+").value(false)))).parse_next(input)?;
    if let Some(negative) = sign {
        ws_skip.parse_next(input)?;
        let inner = cut_err(|i: &mut &str| binary_chain(i, BinaryOp::Pow.precedence(), operand, combine))
            .context(expected("expression after unary operator"))
            .parse_next(input)?;
        return Ok(match inner {
            Expr::Number(v) => Expr::Number(if negative { -v } else { v }),
            other => Expr::Unary(Unary {
                negative,
                expr: Box::new(other),
            }),
        });
    }
    let base = primary.parse_next(input)?;
    postfix(input, base)
}

// ---------------------------------------------------------------------------
// Primaries
// ---------------------------------------------------------------------------

fn primary(input: &mut &str) -> ModalResult<Expr> {
    let Some(first) = input.chars().next() else {
        return Err(ErrMode::Backtrack(ContextError::new()));
    };
    match first {
        '(' => paren_expr(input),
        '{' => vector_selector(input).map(Expr::Vector),
        '"' | '\'' | '`' => quoted_string(input).map(Expr::String),
        c if c.is_ascii_digit() || c == '.' => number_literal(input).map(Expr::Number),
        c if c.is_ascii_alphabetic() || c == '_' || c == ':' => ident_led(input),
        _ => Err(ErrMode::Backtrack(ContextError::new())),
    }
}

fn paren_expr(input: &mut &str) -> ModalResult<Expr> {
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let inner = cut_err(expr).context(expected("expression")).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(")"))
        .context(expected("')'"))
        .parse_next(input)?;
    Ok(Expr::Paren(Box::new(inner)))
}

/// Anything starting with a name: number keywords, aggregations, calls,
/// or a metric selector.
fn ident_led(input: &mut &str) -> ModalResult<Expr> {
    if let Some(v) = opt(number_literal).parse_next(input)? {
        return Ok(Expr::Number(v));
    }

    let save = *input;
    if let Some(name) = opt(ident).parse_next(input)? {
        let after_name = *input;
        ws_skip.parse_next(input)?;
        let opens_call = input.starts_with('(');
        if AGGREGATIONS.contains(&name)
            && (opens_call || peek_kw(input, "by") || peek_kw(input, "without"))
        {
            return aggregate(name, input);
        }
        if opens_call && !after_name.starts_with(':') {
            if !FUNCTIONS.contains(&name) {
                *input = save;
                return fail_cut(input, "unknown function");
            }
            return call(name, input);
        }
        *input = save;
    }
    vector_selector(input).map(Expr::Vector)
}

fn call_args(input: &mut &str) -> ModalResult<Vec<Expr>> {
    literal("(").parse_next(input)?;
    let mut args = Vec::new();
    ws_skip.parse_next(input)?;
    if opt(literal(")")).parse_next(input)?.is_some() {
        return Ok(args);
    }
    loop {
        ws_skip.parse_next(input)?;
        args.push(cut_err(expr).context(expected("argument")).parse_next(input)?);
        ws_skip.parse_next(input)?;
        if opt(literal(",")).parse_next(input)?.is_none() {
            cut_err(literal(")"))
                .context(expected("',' or ')'"))
                .parse_next(input)?;
            return Ok(args);
        }
    }
}

fn call(name: &str, input: &mut &str) -> ModalResult<Expr> {
    let args = call_args(input)?;
    Ok(Expr::Call(Call {
        func: name.to_string(),
        args,
    }))
}

fn aggregate(op: &str, input: &mut &str) -> ModalResult<Expr> {
    let mut group = opt(grouping).parse_next(input)?;
    ws_skip.parse_next(input)?;
    let mut args = cut_err(call_args)
        .context(expected("aggregation arguments"))
        .parse_next(input)?;

    let save = *input;
    ws_skip.parse_next(input)?;
    if let Some(trailing) = opt(grouping).parse_next(input)? {
        if group.is_some() {
            return fail_cut(input, "aggregation may only have one grouping clause");
        }
        group = Some(trailing);
    } else {
        *input = save;
    }

    let wants_param = PARAM_AGGREGATIONS.contains(&op);
    let expected_args = if wants_param { 2 } else { 1 };
    if args.len() != expected_args {
        return fail_cut(input, "wrong number of arguments for aggregate expression");
    }
    let inner = args.pop().map(Box::new);
    let param = if wants_param { args.pop().map(Box::new) } else { None };
    match inner {
        Some(expr) => Ok(Expr::Aggregate(Aggregate {
            op: op.to_string(),
            param,
            expr,
            grouping: group,
        })),
        None => fail_cut(input, "wrong number of arguments for aggregate expression"),
    }
}

fn vector_selector(input: &mut &str) -> ModalResult<VectorSelector> {
    let name = opt(metric_ident).parse_next(input)?.map(str::to_string);

    let save = *input;
    ws_skip.parse_next(input)?;
    let matchers = if input.starts_with('{') {
        matcher_block.parse_next(input)?
    } else {
        *input = save;
        Vec::new()
    };

    if name.is_none() && matchers.is_empty() && !save.starts_with('{') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    if name.is_some() && matchers.iter().any(|m| m.name == "__name__") {
        return fail_cut(input, "metric name must not be set twice");
    }
    if name.is_none() && matchers.iter().all(|m| m.matches_empty()) {
        return fail_cut(
            input,
            "vector selector must contain at least one non-empty matcher",
        );
    }
    Ok(VectorSelector {
        name,
        matchers,
        at: None,
        offset: None,
    })
}

// ---------------------------------------------------------------------------
// Postfix: ranges, subqueries, modifiers
// ---------------------------------------------------------------------------

fn postfix(input: &mut &str, mut base: Expr) -> ModalResult<Expr> {
    loop {
        let save = *input;
        ws_skip.parse_next(input)?;
        if input.starts_with('[') {
            base = range_suffix(input, base)?;
        } else if peek_kw(input, "offset") {
            base = offset_modifier(input, base)?;
        } else if input.starts_with('@') {
            base = at_modifier(input, base)?;
        } else {
            *input = save;
            return Ok(base);
        }
    }
}

fn bracket_duration(input: &mut &str) -> ModalResult<Duration> {
    cut_err(duration_value)
        .context(expected("duration"))
        .parse_next(input)
}

fn range_suffix(input: &mut &str, base: Expr) -> ModalResult<Expr> {
    literal("[").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let range = bracket_duration(input)?;
    ws_skip.parse_next(input)?;

    if opt(literal(":")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let step = if input.starts_with(']') {
            None
        } else {
            Some(bracket_duration(input)?)
        };
        ws_skip.parse_next(input)?;
        cut_err(literal("]"))
            .context(expected("']'"))
            .parse_next(input)?;
        return Ok(Expr::Subquery(Subquery {
            expr: Box::new(base),
            range,
            step,
            at: None,
            offset: None,
        }));
    }

    cut_err(literal("]"))
        .context(expected("']' or ':'"))
        .parse_next(input)?;
    match base {
        Expr::Vector(selector) if selector.at.is_none() && selector.offset.is_none() => {
            Ok(Expr::Matrix(MatrixSelector { selector, range }))
        }
        _ => fail_cut(input, "ranges only allowed for vector selectors"),
    }
}

fn offset_modifier(input: &mut &str, base: Expr) -> ModalResult<Expr> {
    kw("offset").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let negative = opt(literal("-")).parse_next(input)?.is_some();
    let duration = cut_err(duration_value)
        .context(expected("offset duration"))
        .parse_next(input)?;
    let offset = Offset { negative, duration };

    let mut base = base;
    let Some((_, slot)) = modifier_slots(&mut base) else {
        return fail_cut(
            input,
            "offset modifier must be preceded by an instant vector selector or range vector selector or a subquery",
        );
    };
    if slot.is_some() {
        return fail_cut(input, "offset may not be set multiple times");
    }
    *slot = Some(offset);
    Ok(base)
}

fn at_modifier(input: &mut &str, base: Expr) -> ModalResult<Expr> {
    literal("@").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let at = if opt(kw("start")).parse_next(input)?.is_some() {
        empty_parens(input)?;
        AtModifier::Start
    } else if opt(kw("end")).parse_next(input)?.is_some() {
        empty_parens(input)?;
        AtModifier::End
    } else {
        let negative = opt(literal("-")).parse_next(input)?.is_some();
        let ts = cut_err(number_literal)
            .context(expected("timestamp, start() or end()"))
            .parse_next(input)?;
        AtModifier::Timestamp(if negative { -ts } else { ts })
    };

    let mut base = base;
    let Some((slot, _)) = modifier_slots(&mut base) else {
        return fail_cut(
            input,
            "@ modifier must be preceded by an instant vector selector or range vector selector or a subquery",
        );
    };
    if slot.is_some() {
        return fail_cut(input, "@ <timestamp> may not be set multiple times");
    }
    *slot = Some(at);
    Ok(base)
}

fn empty_parens(input: &mut &str) -> ModalResult<()> {
    ws_skip.parse_next(input)?;
    cut_err((literal("("), ws_skip, literal(")")))
        .context(expected("'()'"))
        .parse_next(input)?;
    Ok(())
}

type ModifierSlots<'e> = (&'e mut Option<AtModifier>, &'e mut Option<Offset>);

fn modifier_slots(base: &mut Expr) -> Option<ModifierSlots<'_>> {
    match base {
        Expr::Vector(vs) => Some((&mut vs.at, &mut vs.offset)),
        Expr::Matrix(ms) => Some((&mut ms.selector.at, &mut ms.selector.offset)),
        Expr::Subquery(sq) => Some((&mut sq.at, &mut sq.offset)),
        _ => None,
    }
}
