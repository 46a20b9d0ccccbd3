use winnow::combinator::{alt, cut_err, eof, opt, terminated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::literal;

use super::*;
use crate::ops::{binary_chain, grouping};
use crate::parse_utils::{
    duration_value, expected, fail_cut, ident, kw, number_literal, peek_kw, quoted_string,
    ws_skip,
};
use crate::selector::{MatchOp, match_op, matcher, matcher_block};

const RANGE_OPS: &[&str] = &[
    "count_over_time",
    "rate",
    "rate_counter",
    "bytes_over_time",
    "bytes_rate",
    "avg_over_time",
    "sum_over_time",
    "min_over_time",
    "max_over_time",
    "stdvar_over_time",
    "stddev_over_time",
    "quantile_over_time",
    "first_over_time",
    "last_over_time",
    "absent_over_time",
];

/// Range operations that only make sense over an unwrapped label.
const UNWRAP_REQUIRED: &[&str] = &[
    "rate_counter",
    "avg_over_time",
    "sum_over_time",
    "min_over_time",
    "max_over_time",
    "stdvar_over_time",
    "stddev_over_time",
    "quantile_over_time",
    "first_over_time",
    "last_over_time",
];

/// Range operations that count lines or bytes and reject an unwrap.
const UNWRAP_FORBIDDEN: &[&str] = &[
    "count_over_time",
    "bytes_over_time",
    "bytes_rate",
    "absent_over_time",
];

const VECTOR_OPS: &[&str] = &[
    "sum",
    "avg",
    "count",
    "max",
    "min",
    "stddev",
    "stdvar",
    "bottomk",
    "topk",
    "sort",
    "sort_desc",
    "approx_topk",
];

const PARAM_VECTOR_OPS: &[&str] = &["bottomk", "topk", "approx_topk"];

pub(super) fn parse_query(text: &str) -> Result<Expr, SyntaxError> {
    if text.trim().is_empty() {
        return Err(SyntaxError {
            line: 1,
            column: 1,
            message: "unexpected end of input, expected query".to_string(),
        });
    }
    (ws_skip, query, ws_skip)
        .map(|(_, e, _)| e)
        .parse(text)
        .map_err(|e| SyntaxError::from_parse(text, &e))
}

/// A bare log query is tried first; anything else must be a metric query.
fn query(input: &mut &str) -> ModalResult<Expr> {
    if let Some(log) = opt(terminated(log_expr, (ws_skip, eof))).parse_next(input)? {
        return Ok(Expr::Log(log));
    }
    sample_expr.map(Expr::Sample).parse_next(input)
}

// ---------------------------------------------------------------------------
// Log expressions
// ---------------------------------------------------------------------------

fn log_selector(input: &mut &str) -> ModalResult<LogSelector> {
    if !input.starts_with('{') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let matchers = matcher_block.parse_next(input)?;
    if matchers.iter().all(|m| m.matches_empty()) {
        return fail_cut(
            input,
            "queries require at least one regexp or equality matcher that does not have an empty-compatible value",
        );
    }
    Ok(LogSelector { matchers })
}

fn log_expr(input: &mut &str) -> ModalResult<LogExpr> {
    if opt(literal("(")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let inner = log_expr.parse_next(input)?;
        ws_skip.parse_next(input)?;
        cut_err(literal(")"))
            .context(expected("')'"))
            .parse_next(input)?;
        return Ok(inner);
    }
    let selector = log_selector.parse_next(input)?;
    let stages = pipeline.parse_next(input)?;
    Ok(LogExpr { selector, stages })
}

fn line_filter_op(input: &mut &str) -> ModalResult<LineFilterOp> {
    alt((
        literal("|=").value(LineFilterOp::Contains),
        literal("!=").value(LineFilterOp::NotContains),
        literal("|~").value(LineFilterOp::Match),
        literal("!~").value(LineFilterOp::NotMatch),
        literal("|>").value(LineFilterOp::Pattern),
        literal("!>").value(LineFilterOp::NotPattern),
    ))
    .parse_next(input)
}

/// Stages up to (but not including) an `| unwrap`, a range, or the end.
fn pipeline(input: &mut &str) -> ModalResult<Vec<Stage>> {
    let mut stages = Vec::new();
    loop {
        let save = *input;
        ws_skip.parse_next(input)?;
        if let Some(op) = opt(line_filter_op).parse_next(input)? {
            stages.push(Stage::LineFilter(line_filter(op, input)?));
            continue;
        }
        if opt(literal("|")).parse_next(input)?.is_some() {
            ws_skip.parse_next(input)?;
            if peek_kw(input, "unwrap") {
                *input = save;
                return Ok(stages);
            }
            stages.push(cut_err(stage).context(expected("pipeline stage")).parse_next(input)?);
            continue;
        }
        *input = save;
        return Ok(stages);
    }
}

fn filter_value(input: &mut &str) -> ModalResult<FilterValue> {
    if opt(kw("ip")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let (_, _, cidr, _, _) = cut_err((literal("("), ws_skip, quoted_string, ws_skip, literal(")")))
            .context(expected("ip(\"...\")"))
            .parse_next(input)?;
        return Ok(FilterValue::Ip(cidr));
    }
    cut_err(quoted_string)
        .context(expected("quoted string"))
        .map(FilterValue::Text)
        .parse_next(input)
}

fn line_filter(op: LineFilterOp, input: &mut &str) -> ModalResult<LineFilter> {
    ws_skip.parse_next(input)?;
    let at_value = *input;
    let value = filter_value(input)?;
    if let (LineFilterOp::Match | LineFilterOp::NotMatch, FilterValue::Text(re)) = (op, &value) {
        if regex_syntax::Parser::new().parse(re).is_err() {
            *input = at_value;
            return fail_cut(input, "invalid regular expression in line filter");
        }
    }

    let mut alternatives = Vec::new();
    loop {
        let save = *input;
        ws_skip.parse_next(input)?;
        if opt(kw("or")).parse_next(input)?.is_none() {
            *input = save;
            break;
        }
        ws_skip.parse_next(input)?;
        alternatives.push(
            cut_err(quoted_string)
                .context(expected("quoted string after 'or'"))
                .parse_next(input)?,
        );
    }
    Ok(LineFilter {
        op,
        value,
        alternatives,
    })
}

fn stage(input: &mut &str) -> ModalResult<Stage> {
    if opt(kw("json")).parse_next(input)?.is_some() {
        return Ok(Stage::Parser(ParserStage::Json(extractions(input)?)));
    }
    if opt(kw("logfmt")).parse_next(input)?.is_some() {
        let mut strict = false;
        let mut keep_empty = false;
        loop {
            let save = *input;
            ws_skip.parse_next(input)?;
            if opt(literal("--strict")).parse_next(input)?.is_some() {
                strict = true;
            } else if opt(literal("--keep-empty")).parse_next(input)?.is_some() {
                keep_empty = true;
            } else {
                *input = save;
                break;
            }
        }
        let extractions = extractions(input)?;
        return Ok(Stage::Parser(ParserStage::Logfmt {
            strict,
            keep_empty,
            extractions,
        }));
    }
    if opt(kw("regexp")).parse_next(input)?.is_some() {
        let re = quoted_arg(input)?;
        if regex_syntax::Parser::new().parse(&re).is_err() {
            return fail_cut(input, "invalid regular expression in regexp stage");
        }
        return Ok(Stage::Parser(ParserStage::Regexp(re)));
    }
    if opt(kw("pattern")).parse_next(input)?.is_some() {
        return Ok(Stage::Parser(ParserStage::Pattern(quoted_arg(input)?)));
    }
    if opt(kw("unpack")).parse_next(input)?.is_some() {
        return Ok(Stage::Parser(ParserStage::Unpack));
    }
    if opt(kw("decolorize")).parse_next(input)?.is_some() {
        return Ok(Stage::Decolorize);
    }
    if opt(kw("line_format")).parse_next(input)?.is_some() {
        return Ok(Stage::LineFormat(quoted_arg(input)?));
    }
    if opt(kw("label_format")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        return comma_list(input, label_format_entry).map(Stage::LabelFormat);
    }
    if opt(kw("drop")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        return comma_list(input, label_ref).map(Stage::Drop);
    }
    if opt(kw("keep")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        return comma_list(input, label_ref).map(Stage::Keep);
    }
    label_filter_expr.map(Stage::LabelFilter).parse_next(input)
}

fn quoted_arg(input: &mut &str) -> ModalResult<String> {
    ws_skip.parse_next(input)?;
    cut_err(quoted_string)
        .context(expected("quoted string"))
        .parse_next(input)
}

fn comma_list<T>(
    input: &mut &str,
    item: fn(&mut &str) -> ModalResult<T>,
) -> ModalResult<Vec<T>> {
    let mut out = vec![cut_err(item).context(expected("label")).parse_next(input)?];
    loop {
        let save = *input;
        ws_skip.parse_next(input)?;
        if opt(literal(",")).parse_next(input)?.is_none() {
            *input = save;
            return Ok(out);
        }
        ws_skip.parse_next(input)?;
        out.push(cut_err(item).context(expected("label")).parse_next(input)?);
    }
}

/// Optional `a, b="expr"` list following json/logfmt.
fn extractions(input: &mut &str) -> ModalResult<Vec<Extraction>> {
    let save = *input;
    ws_skip.parse_next(input)?;
    let starts_name = input.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_');
    if !starts_name || peek_kw(input, "or") || peek_kw(input, "offset") {
        *input = save;
        return Ok(Vec::new());
    }
    comma_list(input, extraction)
}

fn extraction(input: &mut &str) -> ModalResult<Extraction> {
    let name = ident.parse_next(input)?.to_string();
    let save = *input;
    ws_skip.parse_next(input)?;
    if opt(literal("=")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let expr = cut_err(quoted_string)
            .context(expected("quoted extraction expression"))
            .parse_next(input)?;
        return Ok(Extraction {
            name,
            expr: Some(expr),
        });
    }
    *input = save;
    Ok(Extraction { name, expr: None })
}

fn label_format_entry(input: &mut &str) -> ModalResult<LabelFormat> {
    let dst = ident.parse_next(input)?.to_string();
    ws_skip.parse_next(input)?;
    cut_err(literal("="))
        .context(expected("'='"))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;
    if let Some(template) = opt(quoted_string).parse_next(input)? {
        return Ok(LabelFormat::Template { dst, template });
    }
    let src = cut_err(ident)
        .context(expected("label name or template"))
        .parse_next(input)?
        .to_string();
    Ok(LabelFormat::Rename { dst, src })
}

fn label_ref(input: &mut &str) -> ModalResult<LabelRef> {
    let save = *input;
    let name = ident.parse_next(input)?;
    ws_skip.parse_next(input)?;
    if input.starts_with(['=', '!']) {
        *input = save;
        return matcher.map(LabelRef::Matcher).parse_next(input);
    }
    *input = save;
    ident.parse_next(input)?;
    Ok(LabelRef::Name(name.to_string()))
}

// ---------------------------------------------------------------------------
// Label filters
// ---------------------------------------------------------------------------

fn label_filter_expr(input: &mut &str) -> ModalResult<LabelFilter> {
    let mut left = label_filter_and.parse_next(input)?;
    loop {
        let save = *input;
        ws_skip.parse_next(input)?;
        if opt(kw("or")).parse_next(input)?.is_none() {
            *input = save;
            return Ok(left);
        }
        ws_skip.parse_next(input)?;
        let right = cut_err(label_filter_and)
            .context(expected("label filter"))
            .parse_next(input)?;
        left = LabelFilter::Or(Box::new(left), Box::new(right));
    }
}

fn label_filter_and(input: &mut &str) -> ModalResult<LabelFilter> {
    let mut left = label_filter_unary.parse_next(input)?;
    loop {
        let save = *input;
        ws_skip.parse_next(input)?;
        let joined = alt((literal(",").void(), kw("and")));
        if opt(joined).parse_next(input)?.is_none() {
            *input = save;
            return Ok(left);
        }
        ws_skip.parse_next(input)?;
        let right = cut_err(label_filter_unary)
            .context(expected("label filter"))
            .parse_next(input)?;
        left = LabelFilter::And(Box::new(left), Box::new(right));
    }
}

fn label_filter_unary(input: &mut &str) -> ModalResult<LabelFilter> {
    if opt(literal("(")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let inner = cut_err(label_filter_expr)
            .context(expected("label filter"))
            .parse_next(input)?;
        ws_skip.parse_next(input)?;
        cut_err(literal(")"))
            .context(expected("')'"))
            .parse_next(input)?;
        return Ok(inner);
    }
    single_label_filter.parse_next(input)
}

fn cmp_op(input: &mut &str) -> ModalResult<CmpOp> {
    alt((
        literal("==").value(CmpOp::Eq),
        literal("!=").value(CmpOp::Neq),
        literal(">=").value(CmpOp::Gte),
        literal("<=").value(CmpOp::Lte),
        literal(">").value(CmpOp::Gt),
        literal("<").value(CmpOp::Lt),
        literal("=").value(CmpOp::Eq),
    ))
    .parse_next(input)
}

fn single_label_filter(input: &mut &str) -> ModalResult<LabelFilter> {
    let name = ident.parse_next(input)?.to_string();
    ws_skip.parse_next(input)?;

    let save = *input;
    if let Some(op) = opt(match_op).parse_next(input)? {
        ws_skip.parse_next(input)?;
        if input.starts_with(['"', '\'', '`']) {
            let at_value = *input;
            let value = quoted_string.parse_next(input)?;
            if op.is_regex() && regex_syntax::Parser::new().parse(&value).is_err() {
                *input = at_value;
                return fail_cut(input, "invalid regular expression in label filter");
            }
            return Ok(LabelFilter::Matcher(Matcher::new(op, name, value)));
        }
        if op.is_regex() {
            return fail_cut(input, "regular expression label filter requires a quoted value");
        }
        *input = save;
    }

    let op = cut_err(cmp_op)
        .context(expected("label filter operator"))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;

    if op == CmpOp::Eq && input.starts_with(['"', '\'', '`']) {
        let value = quoted_string.parse_next(input)?;
        return Ok(LabelFilter::Matcher(Matcher::new(MatchOp::Equal, name, value)));
    }

    let at_value = *input;
    let number = cut_err(number_literal)
        .context(expected("number, duration or quoted string"))
        .parse_next(input)?;
    if input.starts_with(|c: char| c.is_ascii_alphabetic()) {
        *input = at_value;
        let value = cut_err(duration_value)
            .context(expected("duration"))
            .parse_next(input)?;
        return Ok(LabelFilter::Duration { name, op, value });
    }
    Ok(LabelFilter::Number {
        name,
        op,
        value: number,
    })
}

// ---------------------------------------------------------------------------
// Log ranges
// ---------------------------------------------------------------------------

fn unwrap_stage(input: &mut &str) -> ModalResult<Unwrap> {
    literal("|").parse_next(input)?;
    ws_skip.parse_next(input)?;
    kw("unwrap").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let first = cut_err(ident)
        .context(expected("label to unwrap"))
        .parse_next(input)?;

    let save = *input;
    ws_skip.parse_next(input)?;
    let (conversion, label) = if opt(literal("(")).parse_next(input)?.is_some() {
        if !matches!(first, "duration" | "duration_seconds" | "bytes") {
            return fail_cut(input, "unknown unwrap conversion");
        }
        ws_skip.parse_next(input)?;
        let label = cut_err(ident)
            .context(expected("label to unwrap"))
            .parse_next(input)?;
        ws_skip.parse_next(input)?;
        cut_err(literal(")"))
            .context(expected("')'"))
            .parse_next(input)?;
        (Some(first.to_string()), label.to_string())
    } else {
        *input = save;
        (None, first.to_string())
    };

    let mut post_filters = Vec::new();
    loop {
        let save = *input;
        ws_skip.parse_next(input)?;
        if opt(literal("|")).parse_next(input)?.is_none() {
            *input = save;
            break;
        }
        ws_skip.parse_next(input)?;
        post_filters.push(
            cut_err(label_filter_expr)
                .context(expected("label filter after unwrap"))
                .parse_next(input)?,
        );
    }
    Ok(Unwrap {
        conversion,
        label,
        post_filters,
    })
}

fn log_range(input: &mut &str) -> ModalResult<LogRange> {
    let mut log = cut_err(log_expr)
        .context(expected("log stream selector"))
        .parse_next(input)?;

    let save = *input;
    ws_skip.parse_next(input)?;
    let mut unwrap = opt(unwrap_stage).parse_next(input)?;
    if unwrap.is_none() {
        *input = save;
    }

    ws_skip.parse_next(input)?;
    cut_err(literal("["))
        .context(expected("range, e.g. [5m]"))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let range = cut_err(duration_value)
        .context(expected("duration"))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal("]"))
        .context(expected("']'"))
        .parse_next(input)?;

    // Stages may also follow the range: `{app="x"}[5m] |= "err"`.
    log.stages.extend(pipeline.parse_next(input)?);
    if unwrap.is_none() {
        let save = *input;
        ws_skip.parse_next(input)?;
        unwrap = opt(unwrap_stage).parse_next(input)?;
        if unwrap.is_none() {
            *input = save;
        }
    }

    let save = *input;
    ws_skip.parse_next(input)?;
    let offset = if opt(kw("offset")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        Some(
            cut_err(duration_value)
                .context(expected("offset duration"))
                .parse_next(input)?,
        )
    } else {
        *input = save;
        None
    };

    Ok(LogRange {
        log,
        range,
        unwrap,
        offset,
    })
}

// ---------------------------------------------------------------------------
// Sample expressions
// ---------------------------------------------------------------------------

fn sample_expr(input: &mut &str) -> ModalResult<SampleExpr> {
    binary_chain(input, 1, sample_operand, combine)
}

fn combine(op: BinaryOp, modifiers: BinModifiers, lhs: SampleExpr, rhs: SampleExpr) -> SampleExpr {
    SampleExpr::Binary(Binary {
        op,
        modifiers,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn sample_operand(input: &mut &str) -> ModalResult<SampleExpr> {
    ws_skip.parse_next(input)?;
    if opt(literal("-")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let v = cut_err(number_literal)
            .context(expected("number"))
            .parse_next(input)?;
        return Ok(SampleExpr::Literal(-v));
    }
    if opt(literal("(")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let inner = cut_err(sample_expr)
            .context(expected("expression"))
            .parse_next(input)?;
        ws_skip.parse_next(input)?;
        cut_err(literal(")"))
            .context(expected("')'"))
            .parse_next(input)?;
        return Ok(inner);
    }
    if let Some(v) = opt(number_literal).parse_next(input)? {
        return Ok(SampleExpr::Literal(v));
    }

    let save = *input;
    let Some(name) = opt(ident).parse_next(input)? else {
        return Err(ErrMode::Backtrack(ContextError::new()));
    };
    if name == "vector" {
        return vector_literal(input);
    }
    if name == "label_replace" {
        return label_replace(input);
    }
    if RANGE_OPS.contains(&name) {
        return range_aggregation(name, input);
    }
    if VECTOR_OPS.contains(&name) {
        return vector_aggregation(name, input);
    }
    *input = save;
    Err(ErrMode::Backtrack(ContextError::new()))
}

fn open_paren(input: &mut &str) -> ModalResult<()> {
    ws_skip.parse_next(input)?;
    cut_err(literal("("))
        .context(expected("'('"))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;
    Ok(())
}

fn close_paren(input: &mut &str) -> ModalResult<()> {
    ws_skip.parse_next(input)?;
    cut_err(literal(")"))
        .context(expected("')'"))
        .parse_next(input)?;
    Ok(())
}

fn comma(input: &mut &str) -> ModalResult<()> {
    ws_skip.parse_next(input)?;
    cut_err(literal(","))
        .context(expected("','"))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;
    Ok(())
}

fn vector_literal(input: &mut &str) -> ModalResult<SampleExpr> {
    open_paren(input)?;
    let v = cut_err(number_literal)
        .context(expected("number"))
        .parse_next(input)?;
    close_paren(input)?;
    Ok(SampleExpr::Vector(v))
}

fn label_replace(input: &mut &str) -> ModalResult<SampleExpr> {
    open_paren(input)?;
    let expr = cut_err(sample_expr)
        .context(expected("expression"))
        .parse_next(input)?;
    let mut strings = Vec::with_capacity(4);
    for _ in 0..4 {
        comma(input)?;
        strings.push(
            cut_err(quoted_string)
                .context(expected("quoted string"))
                .parse_next(input)?,
        );
    }
    close_paren(input)?;
    let regex = strings.pop().unwrap_or_default();
    let src = strings.pop().unwrap_or_default();
    let replacement = strings.pop().unwrap_or_default();
    let dst = strings.pop().unwrap_or_default();
    Ok(SampleExpr::LabelReplace(LabelReplace {
        expr: Box::new(expr),
        dst,
        replacement,
        src,
        regex,
    }))
}

fn trailing_grouping(input: &mut &str) -> ModalResult<Option<Grouping>> {
    let save = *input;
    ws_skip.parse_next(input)?;
    let g = opt(grouping).parse_next(input)?;
    if g.is_none() {
        *input = save;
    }
    Ok(g)
}

fn range_aggregation(op: &str, input: &mut &str) -> ModalResult<SampleExpr> {
    open_paren(input)?;
    let param = if op == "quantile_over_time" {
        let p = cut_err(number_literal)
            .context(expected("quantile parameter"))
            .parse_next(input)?;
        comma(input)?;
        Some(p)
    } else {
        None
    };
    let range = log_range(input)?;
    close_paren(input)?;
    let grouping = trailing_grouping(input)?;

    if range.unwrap.is_none() && UNWRAP_REQUIRED.contains(&op) {
        return fail_cut(input, "invalid aggregation without unwrap");
    }
    if range.unwrap.is_some() && UNWRAP_FORBIDDEN.contains(&op) {
        return fail_cut(input, "invalid aggregation with unwrap");
    }
    Ok(SampleExpr::RangeAggregation(RangeAggregation {
        op: op.to_string(),
        param,
        range,
        grouping,
    }))
}

fn vector_aggregation(op: &str, input: &mut &str) -> ModalResult<SampleExpr> {
    let save = *input;
    ws_skip.parse_next(input)?;
    let mut group = opt(grouping).parse_next(input)?;
    if group.is_none() {
        *input = save;
    }
    open_paren(input)?;

    let param = if PARAM_VECTOR_OPS.contains(&op) {
        let at = *input;
        let p = cut_err(number_literal)
            .context(expected("integer parameter"))
            .parse_next(input)?;
        if p.fract() != 0.0 || p < 0.0 {
            *input = at;
            return fail_cut(input, "aggregation parameter must be a non-negative integer");
        }
        comma(input)?;
        Some(p as i64)
    } else {
        None
    };

    let expr = cut_err(sample_expr)
        .context(expected("expression"))
        .parse_next(input)?;
    close_paren(input)?;

    if let Some(trailing) = trailing_grouping(input)? {
        if group.is_some() {
            return fail_cut(input, "aggregation may only have one grouping clause");
        }
        group = Some(trailing);
    }
    if group.is_some() && matches!(op, "sort" | "sort_desc") {
        return fail_cut(input, "grouping not allowed for sort and sort_desc");
    }
    Ok(SampleExpr::VectorAggregation(VectorAggregation {
        op: op.to_string(),
        param,
        expr: Box::new(expr),
        grouping: group,
    }))
}
