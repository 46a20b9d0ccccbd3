use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;

/// Parse `KEY=VALUE` label matchers from CLI arguments. Exactly one `=` is
/// allowed per argument.
pub fn parse_label_matchers(args: &[String]) -> Result<BTreeMap<String, String>> {
    let mut matchers = BTreeMap::new();
    for arg in args {
        let parts: Vec<&str> = arg.split('=').collect();
        let [key, value] = parts.as_slice() else {
            anyhow::bail!("malformed label injector");
        };
        matchers.insert(key.to_string(), value.to_string());
    }
    Ok(matchers)
}

/// Expand rule-file arguments. Arguments containing glob characters are
/// expanded (sorted, must match at least one file); anything else is taken
/// as a literal path.
pub fn resolve_rule_paths(args: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for arg in args {
        if arg.contains(['*', '?', '[']) {
            let mut entries: Vec<PathBuf> = glob::glob(arg)
                .map_err(|e| anyhow::anyhow!("invalid glob pattern {arg:?}: {e}"))?
                .filter_map(|e| e.ok())
                .collect();
            if entries.is_empty() {
                anyhow::bail!("no rule files match {arg:?}");
            }
            entries.sort();
            paths.extend(entries);
        } else {
            paths.push(PathBuf::from(arg));
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_matchers() {
        let m = parse_label_matchers(&args(&["juju_model=lma", "juju_unit=prom/0"])).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m["juju_unit"], "prom/0");
    }

    #[test]
    fn empty_value_is_allowed() {
        let m = parse_label_matchers(&args(&["env="])).unwrap();
        assert_eq!(m["env"], "");
    }

    #[test]
    fn malformed_matchers() {
        for bad in ["novalue", "a=b=c", ""] {
            let err = parse_label_matchers(&args(&[bad])).unwrap_err();
            assert_eq!(err.to_string(), "malformed label injector", "{bad:?}");
        }
    }

    #[test]
    fn later_matcher_wins() {
        let m = parse_label_matchers(&args(&["a=1", "a=2"])).unwrap();
        assert_eq!(m["a"], "2");
    }

    #[test]
    fn glob_expansion_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.rules", "a.rules", "c.txt"] {
            std::fs::write(dir.path().join(name), "groups: []\n").unwrap();
        }
        let pattern = dir.path().join("*.rules").to_string_lossy().into_owned();
        let paths = resolve_rule_paths(&[pattern]).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.rules", "b.rules"]);
    }

    #[test]
    fn literal_paths_pass_through() {
        let paths = resolve_rule_paths(&args(&["rules/one.yaml"])).unwrap();
        assert_eq!(paths, [PathBuf::from("rules/one.yaml")]);
    }

    #[test]
    fn glob_without_matches_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("*.none").to_string_lossy().into_owned();
        assert!(resolve_rule_paths(&[pattern]).is_err());
    }
}
