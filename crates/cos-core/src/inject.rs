//! Matcher injection: add a fixed set of equality matchers to every selector
//! of an expression tree.

use std::collections::BTreeMap;

use cos_lang::{Matcher, Selector, SelectorTree};

/// Label name → value pairs to inject. Iteration is always in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionSet(BTreeMap<String, String>);

impl InjectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The matchers `selector` lacks, in name order.
    fn missing_from(&self, selector: &dyn Selector) -> Vec<Matcher> {
        self.iter()
            .filter(|(name, _)| !selector.has_matcher(name))
            .map(|(name, value)| Matcher::equal(name, value))
            .collect()
    }
}

impl From<BTreeMap<String, String>> for InjectionSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InjectionSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Append every matcher of `set` to every selector in `tree` that does not
/// already constrain that label. Existing matchers are never touched.
/// Returns the number of matchers added.
pub fn inject<T: SelectorTree + ?Sized>(tree: &mut T, set: &InjectionSet) -> usize {
    if set.is_empty() {
        return 0;
    }
    let mut added = 0;
    tree.walk_selectors_mut(&mut |selector| {
        let extra = set.missing_from(selector);
        added += extra.len();
        if !extra.is_empty() {
            selector.append_matchers(extra);
        }
    });
    added
}

#[cfg(test)]
mod tests {
    use cos_lang::{logql, promql};

    use super::*;

    fn set(pairs: &[(&str, &str)]) -> InjectionSet {
        pairs.iter().copied().collect()
    }

    #[test]
    fn injects_into_every_selector() {
        let mut expr = promql::parse("sum(rate(a[5m])) / on(job) b + count(c offset 1h)").unwrap();
        let added = inject(&mut expr, &set(&[("env", "prod")]));
        assert_eq!(added, 3);
        let mut seen = 0;
        expr.walk_selectors_mut(&mut |s| {
            assert!(s.has_matcher("env"));
            seen += 1;
        });
        assert_eq!(seen, 3);
    }

    #[test]
    fn existing_label_is_not_overwritten() {
        let mut expr = promql::parse(r#"up{env=~"dev|stage"}"#).unwrap();
        assert_eq!(inject(&mut expr, &set(&[("env", "prod")])), 0);
        assert_eq!(expr.to_string(), r#"up{env=~"dev|stage"}"#);
    }

    #[test]
    fn injection_is_idempotent() {
        let s = set(&[("b", "2"), ("a", "1")]);
        let mut expr = logql::parse(r#"{job="x"} |= "err""#).unwrap();
        inject(&mut expr, &s);
        let once = expr.to_string();
        assert_eq!(inject(&mut expr, &s), 0);
        assert_eq!(expr.to_string(), once);
        assert_eq!(once, r#"{job="x", a="1", b="2"} |= "err""#);
    }

    #[test]
    fn empty_set_is_a_no_op() {
        let mut expr = logql::parse(r#"{job="x"}"#).unwrap();
        assert_eq!(inject(&mut expr, &InjectionSet::new()), 0);
        assert_eq!(expr.to_string(), r#"{job="x"}"#);
    }

    #[test]
    fn set_iterates_in_name_order() {
        let s = set(&[("zeta", "1"), ("alpha", "2"), ("mid", "3")]);
        let names: Vec<_> = s.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }
}
