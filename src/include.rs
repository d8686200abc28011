//! Recognition of `\input{...}` inclusion directives.
//!
//! Exactly one syntax is supported: the directive must open the line (after
//! indentation), name the included document in braces, and be the only thing
//! on the line apart from a trailing comment. Names without a recognized
//! document extension get `.tex` appended.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Extension appended to names that lack a recognized one.
pub const DEFAULT_EXTENSION: &str = "tex";

/// Extensions treated as document extensions.
pub const RECOGNIZED_EXTENSIONS: &[&str] = &["tex", "ltx"];

/// Outcome of inspecting one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Not an inclusion; the line is ordinary content.
    Text,
    /// Inclusion of the named document, extension already normalized.
    Include(String),
    /// Looks like an inclusion but cannot be parsed into a reference.
    Malformed,
}

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\\input\s*\{(?P<name>[^}]*)(?P<close>\})?(?P<rest>.*)$")
            .expect("inclusion pattern is valid")
    })
}

/// Classify a raw line.
///
/// # Examples
///
/// ```
/// use redpen::include::{resolve, Directive};
///
/// assert_eq!(resolve("\\input{chapters/intro}"), Directive::Include("chapters/intro.tex".into()));
/// assert_eq!(resolve("\\inputencoding{utf8}"), Directive::Text);
/// assert_eq!(resolve("\\input{intro"), Directive::Malformed);
/// ```
pub fn resolve(line: &str) -> Directive {
    let Some(caps) = directive_regex().captures(line) else {
        return Directive::Text;
    };
    if caps.name("close").is_none() {
        return Directive::Malformed;
    }

    let name = caps.name("name").map_or("", |m| m.as_str()).trim();
    if name.is_empty() {
        return Directive::Malformed;
    }
    // anything after the brace would be lost, so it must be a comment
    let rest = caps.name("rest").map_or("", |m| m.as_str()).trim_start();
    if !rest.is_empty() && !rest.starts_with('%') {
        return Directive::Malformed;
    }
    Directive::Include(normalize_name(name))
}

/// Append the default extension when `name` lacks a recognized one.
pub fn normalize_name(name: &str) -> String {
    let recognized = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            RECOGNIZED_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        });

    if recognized {
        name.to_string()
    } else {
        format!("{}.{}", name, DEFAULT_EXTENSION)
    }
}

/// Resolve an included name against the directory of the root document.
pub fn resolve_path(root: &Path, name: &str) -> PathBuf {
    match root.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines() {
        assert_eq!(resolve("Some prose."), Directive::Text);
        assert_eq!(resolve("\\section{Intro}"), Directive::Text);
        assert_eq!(resolve("\\inputencoding{latin1}"), Directive::Text);
        // only directives that open the line count
        assert_eq!(resolve("see \\input{x}"), Directive::Text);
    }

    #[test]
    fn test_include_with_indentation_and_spaces() {
        assert_eq!(
            resolve("   \\input { body }  % trailing"),
            Directive::Include("body.tex".into())
        );
    }

    #[test]
    fn test_extension_kept() {
        assert_eq!(resolve("\\input{a/b.tex}"), Directive::Include("a/b.tex".into()));
        assert_eq!(resolve("\\input{a/b.TEX}"), Directive::Include("a/b.TEX".into()));
    }

    #[test]
    fn test_unknown_extension_gets_default() {
        assert_eq!(normalize_name("table.v2"), "table.v2.tex");
        assert_eq!(normalize_name("ch1.2/intro"), "ch1.2/intro.tex");
    }

    #[test]
    fn test_malformed() {
        assert_eq!(resolve("\\input{"), Directive::Malformed);
        assert_eq!(resolve("\\input{}"), Directive::Malformed);
        assert_eq!(resolve("\\input{  }"), Directive::Malformed);
    }

    #[test]
    fn test_trailing_text_is_malformed() {
        assert_eq!(resolve("\\input{a}\\input{b}"), Directive::Malformed);
        assert_eq!(resolve("\\input{fig} and the caption text"), Directive::Malformed);
        assert_eq!(resolve("\\input{fig}   "), Directive::Include("fig.tex".into()));
        assert_eq!(resolve("\\input{fig}% figure"), Directive::Include("fig.tex".into()));
    }

    #[test]
    fn test_resolve_path_relative_to_root() {
        let root = Path::new("/thesis/main.tex");
        assert_eq!(
            resolve_path(root, "chapters/intro.tex"),
            PathBuf::from("/thesis/chapters/intro.tex")
        );
    }
}
