use std::fmt;

use super::*;
use crate::ops::{GroupSide, VectorMatching};
use crate::parse_utils::{Dur, format_number, quote};

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => f.write_str(&format_number(*v)),
            Expr::String(s) => f.write_str(&quote(s)),
            Expr::Vector(vs) => write!(f, "{vs}"),
            Expr::Matrix(ms) => write!(f, "{ms}"),
            Expr::Subquery(sq) => write!(f, "{sq}"),
            Expr::Call(call) => {
                write!(f, "{}(", call.func)?;
                write_joined(f, &call.args, ", ")?;
                f.write_str(")")
            }
            Expr::Aggregate(agg) => write!(f, "{agg}"),
            Expr::Binary(bin) => write!(f, "{bin}"),
            Expr::Unary(u) => write!(f, "{}{}", if u.negative { "-" } else { "+" }, u.expr),
            Expr::Paren(inner) => write!(f, "({inner})"),
        }
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_modifiers(
    f: &mut fmt::Formatter<'_>,
    at: Option<AtModifier>,
    offset: Option<Offset>,
) -> fmt::Result {
    match at {
        Some(AtModifier::Timestamp(ts)) => write!(f, " @ {ts:.3}")?,
        Some(AtModifier::Start) => f.write_str(" @ start()")?,
        Some(AtModifier::End) => f.write_str(" @ end()")?,
        None => {}
    }
    if let Some(off) = offset {
        if off.duration.is_zero() {
            return Ok(());
        }
        let sign = if off.negative { "-" } else { "" };
        write!(f, " offset {sign}{}", Dur(off.duration))?;
    }
    Ok(())
}

impl VectorSelector {
    /// Name and matcher block, without modifiers.
    fn write_series(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered: Vec<(&str, String)> = self
            .matchers
            .iter()
            .map(|m| (m.name.as_str(), m.to_string()))
            .collect();
        rendered.sort();
        let block = rendered
            .into_iter()
            .map(|(_, r)| r)
            .collect::<Vec<_>>()
            .join(",");
        match &self.name {
            Some(name) if block.is_empty() => f.write_str(name),
            Some(name) => write!(f, "{name}{{{block}}}"),
            None => write!(f, "{{{block}}}"),
        }
    }
}

impl fmt::Display for VectorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_series(f)?;
        write_modifiers(f, self.at, self.offset)
    }
}

impl fmt::Display for MatrixSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.selector.write_series(f)?;
        write!(f, "[{}]", Dur(self.range))?;
        write_modifiers(f, self.selector.at, self.selector.offset)
    }
}

impl fmt::Display for Subquery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}:", self.expr, Dur(self.range))?;
        if let Some(step) = self.step {
            write!(f, "{}", Dur(step))?;
        }
        f.write_str("]")?;
        write_modifiers(f, self.at, self.offset)
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.op)?;
        if let Some(g) = &self.grouping {
            let kw = if g.without { "without" } else { "by" };
            write!(f, " {kw} ({}) ", g.labels.join(", "))?;
        }
        f.write_str("(")?;
        if let Some(param) = &self.param {
            write!(f, "{param}, ")?;
        }
        write!(f, "{})", self.expr)
    }
}

fn write_matching(f: &mut fmt::Formatter<'_>, vm: &VectorMatching) -> fmt::Result {
    if !vm.on && vm.labels.is_empty() && vm.group.is_none() {
        return Ok(());
    }
    let tag = if vm.on { "on" } else { "ignoring" };
    write!(f, " {tag} ({})", vm.labels.join(", "))?;
    if let Some((side, include)) = &vm.group {
        let side = match side {
            GroupSide::Left => "left",
            GroupSide::Right => "right",
        };
        write!(f, " group_{side} ({})", include.join(", "))?;
    }
    Ok(())
}

impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.lhs, self.op)?;
        if self.modifiers.return_bool {
            f.write_str(" bool")?;
        }
        if let Some(vm) = &self.modifiers.matching {
            write_matching(f, vm)?;
        }
        write!(f, " {}", self.rhs)
    }
}
