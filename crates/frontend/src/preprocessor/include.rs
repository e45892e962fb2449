//! Header search-path resolution.
//!
//! Quoted includes search the including file's directory first, then the
//! quote, normal, system, and after tiers. Angled includes skip the current
//! directory and the quote tier. `#include_next` restarts the search after
//! the root that produced the current file.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::options::FrontendOptions;

fn direct_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(?:"([^"\n]+)"|<([^>\n]+)>)$"#).expect("header operand pattern")
    })
}

/// Parse a literal `"name"` or `<name>` operand. Returns the name and
/// whether it was angled.
pub(crate) fn parse_direct_header(operand: &str) -> Option<(String, bool)> {
    let captures = direct_header_re().captures(operand)?;
    if let Some(quoted) = captures.get(1) {
        return Some((quoted.as_str().to_string(), false));
    }
    let angled = captures.get(2)?;
    Some((angled.as_str().to_string(), true))
}

/// Resolve a header name against the search path. Returns the canonical path
/// of the first hit.
pub(crate) fn resolve_include(
    options: &FrontendOptions,
    name: &str,
    is_angled: bool,
    base_dir: Option<&Path>,
    include_next_from: Option<&Path>,
) -> Option<PathBuf> {
    let mut search_roots: Vec<PathBuf> = Vec::new();
    if !is_angled {
        if let Some(base_dir) = base_dir {
            search_roots.push(base_dir.to_path_buf());
        }
        search_roots.extend(options.quote_include_dirs.iter().cloned());
    }
    search_roots.extend(options.include_dirs.iter().cloned());
    search_roots.extend(options.system_include_dirs.iter().cloned());
    search_roots.extend(options.after_include_dirs.iter().cloned());

    let mut start_index = 0;
    if let Some(from) = include_next_from {
        let from_resolved = from.canonicalize().unwrap_or_else(|_| from.to_path_buf());
        for (index, root) in search_roots.iter().enumerate() {
            let root_resolved = root.canonicalize().unwrap_or_else(|_| root.clone());
            if root_resolved == from_resolved {
                start_index = index + 1;
                break;
            }
        }
    }

    for root in &search_roots[start_index.min(search_roots.len())..] {
        let candidate = root.join(name);
        if candidate.is_file() {
            return Some(candidate.canonicalize().unwrap_or(candidate));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_direct_header() {
        assert_eq!(
            parse_direct_header("\"inc.h\""),
            Some(("inc.h".to_string(), false))
        );
        assert_eq!(
            parse_direct_header("<stdio.h>"),
            Some(("stdio.h".to_string(), true))
        );
        assert_eq!(parse_direct_header("bad"), None);
        assert_eq!(parse_direct_header("\"a\" extra"), None);
    }

    #[test]
    fn test_quoted_prefers_base_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let source_dir = tmp.path().join("src");
        let include_dir = tmp.path().join("include");
        fs::create_dir_all(&source_dir).unwrap();
        fs::create_dir_all(&include_dir).unwrap();
        fs::write(source_dir.join("inc.h"), "int from_source;\n").unwrap();
        fs::write(include_dir.join("inc.h"), "int from_include;\n").unwrap();
        let options = FrontendOptions::new().with_include_dir(&include_dir);

        let quoted = resolve_include(&options, "inc.h", false, Some(&source_dir), None).unwrap();
        assert!(quoted.starts_with(source_dir.canonicalize().unwrap()));

        let angled = resolve_include(&options, "inc.h", true, Some(&source_dir), None).unwrap();
        assert!(angled.starts_with(include_dir.canonicalize().unwrap()));
    }

    #[test]
    fn test_search_tier_order() {
        let tmp = tempfile::tempdir().unwrap();
        let system_dir = tmp.path().join("sys");
        let after_dir = tmp.path().join("after");
        fs::create_dir_all(&system_dir).unwrap();
        fs::create_dir_all(&after_dir).unwrap();
        fs::write(system_dir.join("inc.h"), "int sys;\n").unwrap();
        fs::write(after_dir.join("inc.h"), "int after;\n").unwrap();
        let mut options = FrontendOptions::new();
        options.system_include_dirs.push(system_dir.clone());
        options.after_include_dirs.push(after_dir.clone());

        let found = resolve_include(&options, "inc.h", true, None, None).unwrap();
        assert!(found.starts_with(system_dir.canonicalize().unwrap()));
    }

    #[test]
    fn test_include_next_starts_after_current_root() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("inc.h"), "int first;\n").unwrap();
        fs::write(second.join("inc.h"), "int second;\n").unwrap();
        let mut options = FrontendOptions::new();
        options.include_dirs.push(first.clone());
        options.include_dirs.push(second.clone());

        let next = resolve_include(&options, "inc.h", true, None, Some(&first)).unwrap();
        assert!(next.starts_with(second.canonicalize().unwrap()));
    }

    #[test]
    fn test_missing_header() {
        let options = FrontendOptions::new();
        assert_eq!(resolve_include(&options, "missing.h", false, None, None), None);
    }
}
