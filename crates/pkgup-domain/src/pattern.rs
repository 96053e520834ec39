//! Package patterns: matchers over [`PkgName`]s.
//!
//! A pattern is one of a shell-style glob over the serialized name, a
//! version-bounded constraint `base<cmp>version`, or a brace alternation of
//! sub-patterns. The original text is kept for display; matching dispatches
//! on the parsed form.

use std::fmt;
use std::str::FromStr;

use crate::name::{PkgBase, PkgName, PkgVersion};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("malformed package pattern: {0:?}")]
    Malformed(String),
    #[error("unbalanced braces in package pattern: {0:?}")]
    UnbalancedBraces(String),
}

/// Version comparators usable in a bounded pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCmp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl VersionCmp {
    fn holds(self, lhs: &PkgVersion, rhs: &PkgVersion) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
            Self::Ge => lhs >= rhs,
            Self::Gt => lhs > rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Glob(String),
    Bounded {
        base: PkgBase,
        cmp: VersionCmp,
        version: PkgVersion,
    },
    Alternatives(Vec<PkgPattern>),
}

/// A matcher for package names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgPattern {
    raw: String,
    kind: Kind,
}

impl PkgPattern {
    pub fn glob(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        Self {
            kind: Kind::Glob(raw.clone()),
            raw,
        }
    }

    pub fn matches(&self, name: &PkgName) -> bool {
        match &self.kind {
            Kind::Glob(pattern) => glob_match(pattern.as_bytes(), name.to_string().as_bytes()),
            Kind::Bounded { base, cmp, version } => {
                name.base == *base && cmp.holds(&name.version, version)
            }
            Kind::Alternatives(patterns) => patterns.iter().any(|p| p.matches(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for PkgPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PatternError::Malformed(s.to_owned()));
        }
        if s.contains('{') {
            let expansions = expand_braces(s)?;
            if expansions.len() == 1 {
                return parse_flat(&expansions[0]).map(|kind| Self {
                    raw: s.to_owned(),
                    kind,
                });
            }
            let alternatives = expansions
                .iter()
                .map(|alt| {
                    parse_flat(alt).map(|kind| Self {
                        raw: alt.clone(),
                        kind,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self {
                raw: s.to_owned(),
                kind: Kind::Alternatives(alternatives),
            });
        }
        parse_flat(s).map(|kind| Self {
            raw: s.to_owned(),
            kind,
        })
    }
}

impl fmt::Display for PkgPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_flat(s: &str) -> Result<Kind, PatternError> {
    if let Some(pos) = s.find(['<', '>', '=']) {
        if pos == 0 {
            return Err(PatternError::Malformed(s.to_owned()));
        }
        let base = PkgBase::new(&s[..pos]);
        let rest = &s[pos..];
        let (cmp, version) = if let Some(v) = rest.strip_prefix(">=") {
            (VersionCmp::Ge, v)
        } else if let Some(v) = rest.strip_prefix("<=") {
            (VersionCmp::Le, v)
        } else if let Some(v) = rest.strip_prefix('>') {
            (VersionCmp::Gt, v)
        } else if let Some(v) = rest.strip_prefix('<') {
            (VersionCmp::Lt, v)
        } else if let Some(v) = rest.strip_prefix('=') {
            (VersionCmp::Eq, v)
        } else {
            return Err(PatternError::Malformed(s.to_owned()));
        };
        if version.is_empty() || version.contains(['<', '>', '=']) {
            // Compound bounds like `base>=1<2` are not representable in the
            // pattern sum; reject so callers can warn and skip.
            return Err(PatternError::Malformed(s.to_owned()));
        }
        let version = version
            .parse::<PkgVersion>()
            .map_err(|_| PatternError::Malformed(s.to_owned()))?;
        return Ok(Kind::Bounded { base, cmp, version });
    }
    Ok(Kind::Glob(s.to_owned()))
}

/// Expand `{a,b}` alternation, innermost-last, into flat strings.
fn expand_braces(s: &str) -> Result<Vec<String>, PatternError> {
    let Some(open) = s.find('{') else {
        return Ok(vec![s.to_owned()]);
    };
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut close = None;
    let mut commas = Vec::new();
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            b',' if depth == 1 => commas.push(i),
            _ => {}
        }
    }
    let close = close.ok_or_else(|| PatternError::UnbalancedBraces(s.to_owned()))?;

    let prefix = &s[..open];
    let suffix = &s[close + 1..];
    let mut results = Vec::new();
    let mut start = open + 1;
    for end in commas.iter().copied().chain([close]) {
        let middle = &s[start..end];
        start = end + 1;
        for expanded in expand_braces(&format!("{prefix}{middle}{suffix}"))? {
            results.push(expanded);
        }
    }
    Ok(results)
}

/// fnmatch-style wildcard match: `*`, `?`, `[...]` classes with ranges and
/// leading `!`/`^` negation, `\` escaping the next byte.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    star = Some((p, t));
                    p += 1;
                    continue;
                }
                b'?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                b'[' => match match_class(pattern, p, text[t]) {
                    Some((true, next_p)) => {
                        p = next_p;
                        t += 1;
                        continue;
                    }
                    Some((false, _)) => {}
                    // Unterminated class: the `[` matches literally.
                    None => {
                        if text[t] == b'[' {
                            p += 1;
                            t += 1;
                            continue;
                        }
                    }
                },
                b'\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c if c == text[t] => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }
        }
        // Mismatch: backtrack to the last star, letting it swallow one more
        // byte, or fail if there is none.
        match star {
            Some((star_p, star_t)) => {
                p = star_p + 1;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

/// Match `text_byte` against the class starting at `pattern[open]` (a `[`).
/// Returns `(matched, index past the closing bracket)`, or `None` when the
/// class is unterminated (the `[` then matches literally).
fn match_class(pattern: &[u8], open: usize, text_byte: u8) -> Option<(bool, usize)> {
    let mut i = open + 1;
    let negated = matches!(pattern.get(i), Some(b'!' | b'^'));
    if negated {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let c = pattern[i];
        if c == b']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;
        if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            if (c..=pattern[i + 2]).contains(&text_byte) {
                matched = true;
            }
            i += 3;
        } else {
            if c == text_byte {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PkgName {
        s.parse().expect("pkgname")
    }

    fn pattern(s: &str) -> PkgPattern {
        s.parse().expect("pattern")
    }

    #[test]
    fn glob_matches_serialized_name() {
        assert!(pattern("python311-3.11.*").matches(&name("python311-3.11.4")));
        assert!(pattern("python311-[0-9]*").matches(&name("python311-3.11.4")));
        assert!(!pattern("python310-*").matches(&name("python311-3.11.4")));
        assert!(pattern("foo-?.?").matches(&name("foo-1.2")));
        assert!(!pattern("foo-?.?").matches(&name("foo-1.22")));
    }

    #[test]
    fn glob_class_negation() {
        assert!(pattern("foo-[!0-2]*").matches(&name("foo-3.0")));
        assert!(!pattern("foo-[!0-2]*").matches(&name("foo-1.0")));
    }

    #[test]
    fn bounded_requires_matching_base() {
        let p = pattern("python311>=3.11");
        assert!(p.matches(&name("python311-3.11.4")));
        assert!(!p.matches(&name("python310-3.11.4")));
    }

    #[test]
    fn bounded_comparators() {
        assert!(pattern("foo>=1.2").matches(&name("foo-1.2")));
        assert!(pattern("foo>1.2").matches(&name("foo-1.2nb1")));
        assert!(!pattern("foo>1.2").matches(&name("foo-1.2")));
        assert!(pattern("foo<2").matches(&name("foo-1.9")));
        assert!(!pattern("foo<=1.9").matches(&name("foo-2.0")));
        assert!(pattern("foo=1.0").matches(&name("foo-1.0.0")));
    }

    #[test]
    fn alternatives_match_any() {
        let p = pattern("{py310,py311}-foo>=1.0");
        assert!(p.matches(&name("py311-foo-1.2")));
        assert!(p.matches(&name("py310-foo-1.0")));
        assert!(!p.matches(&name("py39-foo-1.2")));
    }

    #[test]
    fn nested_braces_expand() {
        let p = pattern("foo{,-devel}-[0-9]*");
        assert!(p.matches(&name("foo-1.0")));
        assert!(p.matches(&name("foo-devel-1.0")));
    }

    #[test]
    fn compound_bounds_are_rejected() {
        assert!("foo>=1.0<2.0".parse::<PkgPattern>().is_err());
        assert!("foo>=".parse::<PkgPattern>().is_err());
        assert!("".parse::<PkgPattern>().is_err());
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        assert!(matches!(
            "foo{bar".parse::<PkgPattern>(),
            Err(PatternError::UnbalancedBraces(_))
        ));
    }
}
