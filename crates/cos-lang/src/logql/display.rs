use std::fmt;

use super::*;
use crate::ops::GroupSide;
use crate::parse_utils::{Dur, format_number, quote};

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Log(log) => write!(f, "{log}"),
            Expr::Sample(sample) => write!(f, "{sample}"),
        }
    }
}

impl fmt::Display for LogSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.matchers.iter().map(|m| m.to_string()).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl fmt::Display for LogExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.selector)?;
        for stage in &self.stages {
            write!(f, " {stage}")?;
        }
        Ok(())
    }
}

fn write_extractions(f: &mut fmt::Formatter<'_>, list: &[Extraction]) -> fmt::Result {
    if list.is_empty() {
        return Ok(());
    }
    let parts: Vec<String> = list
        .iter()
        .map(|e| match &e.expr {
            Some(expr) => format!("{}={}", e.name, quote(expr)),
            None => e.name.clone(),
        })
        .collect();
    write!(f, " {}", parts.join(","))
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::LineFilter(lf) => {
                write!(f, "{} ", lf.op.as_str())?;
                match &lf.value {
                    FilterValue::Text(s) => f.write_str(&quote(s))?,
                    FilterValue::Ip(cidr) => write!(f, "ip({})", quote(cidr))?,
                }
                for alt in &lf.alternatives {
                    write!(f, " or {}", quote(alt))?;
                }
                Ok(())
            }
            Stage::Parser(ParserStage::Json(list)) => {
                f.write_str("| json")?;
                write_extractions(f, list)
            }
            Stage::Parser(ParserStage::Logfmt {
                strict,
                keep_empty,
                extractions,
            }) => {
                f.write_str("| logfmt")?;
                if *strict {
                    f.write_str(" --strict")?;
                }
                if *keep_empty {
                    f.write_str(" --keep-empty")?;
                }
                write_extractions(f, extractions)
            }
            Stage::Parser(ParserStage::Regexp(re)) => write!(f, "| regexp {}", quote(re)),
            Stage::Parser(ParserStage::Pattern(p)) => write!(f, "| pattern {}", quote(p)),
            Stage::Parser(ParserStage::Unpack) => f.write_str("| unpack"),
            Stage::LabelFilter(lf) => write!(f, "| {lf}"),
            Stage::LineFormat(t) => write!(f, "| line_format {}", quote(t)),
            Stage::LabelFormat(list) => {
                let parts: Vec<String> = list
                    .iter()
                    .map(|lf| match lf {
                        LabelFormat::Rename { dst, src } => format!("{dst}={src}"),
                        LabelFormat::Template { dst, template } => {
                            format!("{dst}={}", quote(template))
                        }
                    })
                    .collect();
                write!(f, "| label_format {}", parts.join(","))
            }
            Stage::Drop(list) => write!(f, "| drop {}", join_refs(list)),
            Stage::Keep(list) => write!(f, "| keep {}", join_refs(list)),
            Stage::Decolorize => f.write_str("| decolorize"),
        }
    }
}

fn join_refs(list: &[LabelRef]) -> String {
    list.iter()
        .map(|r| match r {
            LabelRef::Name(n) => n.clone(),
            LabelRef::Matcher(m) => m.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelFilter::Matcher(m) => write!(f, "{m}"),
            LabelFilter::Number { name, op, value } => {
                write!(f, "{name}{}{}", op.as_str(), format_number(*value))
            }
            LabelFilter::Duration { name, op, value } => {
                write!(f, "{name}{}{}", op.as_str(), Dur(*value))
            }
            LabelFilter::And(l, r) => write!(f, "( {l} , {r} )"),
            LabelFilter::Or(l, r) => write!(f, "( {l} or {r} )"),
        }
    }
}

impl fmt::Display for Unwrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.conversion {
            Some(conv) => write!(f, " | unwrap {conv}({})", self.label)?,
            None => write!(f, " | unwrap {}", self.label)?,
        }
        for post in &self.post_filters {
            write!(f, " | {post}")?;
        }
        Ok(())
    }
}

impl fmt::Display for LogRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log)?;
        if let Some(unwrap) = &self.unwrap {
            write!(f, "{unwrap}")?;
        }
        write!(f, "[{}]", Dur(self.range))?;
        if let Some(offset) = self.offset {
            write!(f, " offset {}", Dur(offset))?;
        }
        Ok(())
    }
}

fn write_grouping(f: &mut fmt::Formatter<'_>, grouping: &Option<Grouping>) -> fmt::Result {
    let Some(g) = grouping else { return Ok(()) };
    if g.without {
        write!(f, " without({})", g.labels.join(","))
    } else if g.labels.is_empty() {
        Ok(())
    } else {
        write!(f, " by({})", g.labels.join(","))
    }
}

impl fmt::Display for SampleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleExpr::RangeAggregation(agg) => {
                write!(f, "{}(", agg.op)?;
                if let Some(p) = agg.param {
                    write!(f, "{},", format_number(p))?;
                }
                write!(f, "{})", agg.range)?;
                write_grouping(f, &agg.grouping)
            }
            SampleExpr::VectorAggregation(agg) => {
                f.write_str(&agg.op)?;
                write_grouping(f, &agg.grouping)?;
                f.write_str("(")?;
                if let Some(p) = agg.param {
                    write!(f, "{p},")?;
                }
                write!(f, "{})", agg.expr)
            }
            SampleExpr::Binary(bin) => {
                write!(f, "({} {}", bin.lhs, bin.op)?;
                if bin.modifiers.return_bool {
                    f.write_str(" bool")?;
                }
                if let Some(vm) = &bin.modifiers.matching {
                    let tag = if vm.on { "on" } else { "ignoring" };
                    write!(f, " {tag} ({})", vm.labels.join(","))?;
                    if let Some((side, include)) = &vm.group {
                        let side = match side {
                            GroupSide::Left => "group_left",
                            GroupSide::Right => "group_right",
                        };
                        write!(f, " {side} ({})", include.join(","))?;
                    }
                }
                write!(f, " {})", bin.rhs)
            }
            SampleExpr::Literal(v) => f.write_str(&format_number(*v)),
            SampleExpr::Vector(v) => write!(f, "vector({})", format_number(*v)),
            SampleExpr::LabelReplace(lr) => write!(
                f,
                "label_replace({},{},{},{},{})",
                lr.expr,
                quote(&lr.dst),
                quote(&lr.replacement),
                quote(&lr.src),
                quote(&lr.regex)
            ),
        }
    }
}
