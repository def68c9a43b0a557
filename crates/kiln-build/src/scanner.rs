//! Lightweight dependency scanning
//!
//! Extracts `#include` / `#import` directives from C-family sources without
//! running the preprocessor. Conditional blocks are not evaluated, so every
//! directive in the file counts as a dependency.

use crate::error::{BuildError, BuildResult};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Extracts the source files a unit statically depends on
pub trait DependencyScanner {
    /// Canonical paths of the files `unit` references, sorted and deduplicated
    fn scan(&self, unit: &Path) -> BuildResult<Vec<PathBuf>>;
}

/// Delimiter style of an include operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// `#include "file.h"`
    Quoted,
    /// `#include <file.h>`
    Angle,
}

/// A dependency directive found in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    /// Operand text between the delimiters
    pub token: String,
    /// Delimiter style
    pub kind: IncludeKind,
}

/// Scanner for `#include` and `#import` directives
#[derive(Debug, Clone)]
pub struct IncludeScanner {
    /// Directories searched after the including file's own directory
    search_paths: Vec<PathBuf>,
}

impl IncludeScanner {
    /// Create a scanner; missing search directories are dropped
    pub fn new(search_paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut seen = BTreeSet::new();
        let search_paths = search_paths
            .into_iter()
            .filter_map(|dir| match dir.canonicalize() {
                Ok(canonical) => Some(canonical),
                Err(_) => {
                    debug!(path = %dir.display(), "include path does not exist, skipping");
                    None
                }
            })
            .filter(|dir| seen.insert(dir.clone()))
            .collect();

        Self { search_paths }
    }

    /// Directories consulted for resolution, in order
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Resolve one directive relative to the including unit
    fn resolve(&self, unit: &Path, directive: &IncludeDirective) -> Option<PathBuf> {
        let local_dir = match directive.kind {
            IncludeKind::Quoted => unit.parent(),
            IncludeKind::Angle => None,
        };

        local_dir
            .into_iter()
            .chain(self.search_paths.iter().map(|p| p.as_path()))
            .map(|dir| dir.join(&directive.token))
            .find(|candidate| candidate.is_file())
            .and_then(|candidate| candidate.canonicalize().ok())
    }
}

impl DependencyScanner for IncludeScanner {
    fn scan(&self, unit: &Path) -> BuildResult<Vec<PathBuf>> {
        let bytes = fs::read(unit).map_err(|e| BuildError::discovery(unit, e))?;
        let source = String::from_utf8_lossy(&bytes);

        let mut dependencies = BTreeSet::new();
        for directive in extract_directives(&source) {
            match self.resolve(unit, &directive) {
                Some(path) => {
                    dependencies.insert(path);
                }
                None if directive.kind == IncludeKind::Angle => {
                    trace!(
                        unit = %unit.display(),
                        header = %directive.token,
                        "treating unresolved <> include as a system header"
                    );
                }
                None => return Err(BuildError::unresolved(unit, directive.token)),
            }
        }

        Ok(dependencies.into_iter().collect())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    LineComment,
    BlockComment,
    Literal(char),
}

/// Remove comments and splice continued lines, keeping string literals intact
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut state = LexState::Code;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        // Line splices are removed before any other lexing
        if c == '\\' {
            match chars.peek() {
                Some('\n') => {
                    chars.next();
                    continue;
                }
                Some('\r') => {
                    chars.next();
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    continue;
                }
                _ => {}
            }
        }

        match state {
            LexState::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = LexState::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push(' ');
                    state = LexState::BlockComment;
                }
                '"' | '\'' => {
                    out.push(c);
                    state = LexState::Literal(c);
                }
                _ => out.push(c),
            },
            LexState::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = LexState::Code;
                }
            }
            LexState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = LexState::Code;
                } else if c == '\n' {
                    out.push('\n');
                }
            }
            LexState::Literal(quote) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == quote || c == '\n' {
                    state = LexState::Code;
                }
            }
        }
    }

    out
}

/// Extract every `#include` / `#import` directive with a literal operand
pub fn extract_directives(source: &str) -> Vec<IncludeDirective> {
    strip_comments(source)
        .lines()
        .filter_map(parse_directive_line)
        .collect()
}

fn parse_directive_line(line: &str) -> Option<IncludeDirective> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest
        .strip_prefix("include")
        .or_else(|| rest.strip_prefix("import"))?;

    // Reject identifiers such as `#include_next` or `#imports`
    if rest
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }

    let rest = rest.trim_start();
    let (kind, close) = match rest.chars().next()? {
        '"' => (IncludeKind::Quoted, '"'),
        '<' => (IncludeKind::Angle, '>'),
        // Macro-expanded operand, cannot be resolved lexically
        _ => return None,
    };

    let body = &rest[1..];
    let end = body.find(close)?;
    let token = body[..end].trim();
    if token.is_empty() {
        return None;
    }

    Some(IncludeDirective {
        token: token.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn quoted(token: &str) -> IncludeDirective {
        IncludeDirective {
            token: token.to_string(),
            kind: IncludeKind::Quoted,
        }
    }

    fn angle(token: &str) -> IncludeDirective {
        IncludeDirective {
            token: token.to_string(),
            kind: IncludeKind::Angle,
        }
    }

    #[test]
    fn test_extract_basic_directives() {
        let source = r#"
#include "util.h"
#include <stdio.h>
  #  include   "platform/win32.cpp"
#import "macos_main.mm"
int main() { return 0; }
"#;
        assert_eq!(
            extract_directives(source),
            vec![
                quoted("util.h"),
                angle("stdio.h"),
                quoted("platform/win32.cpp"),
                quoted("macos_main.mm"),
            ]
        );
    }

    #[rstest]
    #[case("// #include \"commented.h\"")]
    #[case("/* #include \"block.h\" */")]
    #[case("const char* s = \"#include \\\"in_string.h\\\"\";")]
    #[case("#include_next <stdlib.h>")]
    #[case("#include HEADER_MACRO")]
    #[case("#define INCLUDE \"x.h\"")]
    fn test_non_directives_ignored(#[case] source: &str) {
        assert!(extract_directives(source).is_empty(), "{}", source);
    }

    #[test]
    fn test_multiline_block_comment() {
        let source = "/*\n#include \"hidden.h\"\n*/\n#include \"visible.h\"\n";
        assert_eq!(extract_directives(source), vec![quoted("visible.h")]);
    }

    #[test]
    fn test_line_continuation() {
        let source = "#include \\\n  \"continued.h\"\n";
        assert_eq!(extract_directives(source), vec![quoted("continued.h")]);
    }

    #[test]
    fn test_trailing_comment_after_directive() {
        let source = "#include \"a.h\" // the a header\n#include <b.h> /* b */\n";
        assert_eq!(extract_directives(source), vec![quoted("a.h"), angle("b.h")]);
    }

    #[test]
    fn test_scan_resolves_local_then_search_paths() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let inc = temp_dir.path().join("libs/internal");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&inc).unwrap();
        fs::write(src.join("local.h"), "").unwrap();
        fs::write(inc.join("shared.h"), "").unwrap();
        fs::write(
            src.join("main.cpp"),
            "#include \"local.h\"\n#include <shared.h>\n#include <vector>\n",
        )
        .unwrap();

        let scanner = IncludeScanner::new(vec![src.clone(), inc.clone()]);
        let deps = scanner.scan(&src.join("main.cpp")).unwrap();

        let mut expected = vec![
            src.join("local.h").canonicalize().unwrap(),
            inc.join("shared.h").canonicalize().unwrap(),
        ];
        expected.sort();
        assert_eq!(deps, expected);
    }

    #[test]
    fn test_scan_unresolved_quoted_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let main = temp_dir.path().join("main.cpp");
        fs::write(&main, "#include \"missing.h\"\n").unwrap();

        let scanner = IncludeScanner::new(vec![temp_dir.path().to_path_buf()]);
        match scanner.scan(&main) {
            Err(BuildError::UnresolvedDependency { unit, token }) => {
                assert_eq!(unit, main);
                assert_eq!(token, "missing.h");
            }
            other => panic!("Expected UnresolvedDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_deduplicates() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.h"), "").unwrap();
        let main = temp_dir.path().join("main.cpp");
        fs::write(&main, "#include \"a.h\"\n#include \"./a.h\"\n").unwrap();

        let scanner = IncludeScanner::new(Vec::new());
        assert_eq!(scanner.scan(&main).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_search_paths_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = IncludeScanner::new(vec![
            temp_dir.path().to_path_buf(),
            temp_dir.path().join("does-not-exist"),
        ]);
        assert_eq!(scanner.search_paths().len(), 1);
    }
}
