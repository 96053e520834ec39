//! The `base-version` identifier space: package bases, structured versions,
//! full names, and two-segment package paths.
//!
//! Versions follow the source-collection grammar: alternating numeric and
//! alphabetic runs compared componentwise, an `nb<N>` package-revision
//! suffix compared last, and `alpha`/`beta`/`pre`/`rc` markers that sort
//! before the plain version with the same leading components. Two versions
//! are equal iff their canonical decompositions match, so `1.0` and `1.0.0`
//! compare equal even though they render differently.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    /// No `-<digit>` boundary separates the base from the version.
    #[error("malformed package name: {0:?}")]
    MalformedName(String),
    /// Not a two-segment `category/name` path.
    #[error("malformed package path: {0:?}")]
    MalformedPath(String),
}

/// The name portion of a package, e.g. `python311`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PkgBase(String);

impl PkgBase {
    pub fn new(base: impl Into<String>) -> Self {
        Self(base.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PkgBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PkgBase {
    fn from(base: &str) -> Self {
        Self(base.to_owned())
    }
}

/// Pre-release markers, ordered by how early they sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreKind {
    Alpha,
    Beta,
    Pre,
    Rc,
}

impl PreKind {
    fn from_run(run: &str) -> Option<Self> {
        match run {
            "alpha" => Some(Self::Alpha),
            "beta" => Some(Self::Beta),
            "pre" => Some(Self::Pre),
            "rc" => Some(Self::Rc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
    Num(u64),
    Alpha(String),
}

impl Component {
    fn cmp_component(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => a.cmp(b),
            (Self::Alpha(a), Self::Alpha(b)) => a.cmp(b),
            // A numeric run sorts before an alphabetic run at the same
            // position: 1.0 < 1.0a and 1.0.1 < 1.0a.
            (Self::Num(_), Self::Alpha(_)) => Ordering::Less,
            (Self::Alpha(_), Self::Num(_)) => Ordering::Greater,
        }
    }
}

const MISSING: Component = Component::Num(0);

/// The version portion of a package, e.g. `3.11.4nb2`.
#[derive(Debug, Clone)]
pub struct PkgVersion {
    components: Vec<Component>,
    pre: Option<(PreKind, u64)>,
    revision: u64,
    raw: String,
}

impl PkgVersion {
    /// The empty version; serves as the lower bound when searching a name
    /// set by base. Pre-releases of a literal zero version sort below it,
    /// the same corner the ecosystem's own tools share.
    pub fn zero() -> Self {
        Self {
            components: Vec::new(),
            pre: None,
            revision: 0,
            raw: String::new(),
        }
    }

    /// The `nb<N>` package revision, 0 when absent.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for PkgVersion {
    type Err = NameError;

    // The grammar has no failure case: any string decomposes into runs.
    // Separators other than alphanumerics only delimit runs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut components = Vec::new();
        let mut pre = None;
        let mut revision = 0;

        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i];
            if c.is_ascii_digit() {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let num = s[start..i].parse::<u64>().unwrap_or(u64::MAX);
                components.push(Component::Num(num));
            } else if c.is_ascii_alphabetic() {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let run = s[start..i].to_ascii_lowercase();

                let mut trailing_num = None;
                if run == "nb" || PreKind::from_run(&run).is_some() {
                    let num_start = i;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                    if i > num_start {
                        trailing_num = Some(s[num_start..i].parse::<u64>().unwrap_or(u64::MAX));
                    }
                }

                if run == "nb" {
                    match trailing_num {
                        Some(n) => revision = n,
                        // A bare "nb" with no digits is an ordinary
                        // alphabetic component.
                        None => components.push(Component::Alpha(run)),
                    }
                } else if let Some(kind) = PreKind::from_run(&run) {
                    if pre.is_none() {
                        pre = Some((kind, trailing_num.unwrap_or(0)));
                    } else if let Some(n) = trailing_num {
                        components.push(Component::Alpha(run));
                        components.push(Component::Num(n));
                    } else {
                        components.push(Component::Alpha(run));
                    }
                } else {
                    components.push(Component::Alpha(run));
                }
            } else {
                i += 1;
            }
        }

        Ok(Self {
            components,
            pre,
            revision,
            raw: s.to_owned(),
        })
    }
}

impl Ord for PkgVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).unwrap_or(&MISSING);
            let b = other.components.get(i).unwrap_or(&MISSING);
            match a.cmp_component(b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        // A pre-release sorts before the plain version with the same
        // components; two pre-releases compare by kind, then argument.
        let pre_ord = match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        };
        pre_ord.then_with(|| self.revision.cmp(&other.revision))
    }
}

impl PartialOrd for PkgVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PkgVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PkgVersion {}

impl fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A full package name: `(base, version)` serialized as `<base>-<version>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PkgName {
    pub base: PkgBase,
    pub version: PkgVersion,
}

impl PkgName {
    pub fn new(base: PkgBase, version: PkgVersion) -> Self {
        Self { base, version }
    }
}

impl FromStr for PkgName {
    type Err = NameError;

    /// The base/version boundary is the rightmost `-` followed by a digit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let boundary = (0..bytes.len().saturating_sub(1))
            .rev()
            .find(|&i| bytes[i] == b'-' && bytes[i + 1].is_ascii_digit())
            .filter(|&i| i > 0);
        match boundary {
            Some(i) => Ok(Self {
                base: PkgBase::new(&s[..i]),
                version: s[i + 1..].parse()?,
            }),
            None => Err(NameError::MalformedName(s.to_owned())),
        }
    }
}

impl fmt::Display for PkgName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.version)
    }
}

/// A two-segment logical path into the source tree, e.g. `lang/python311`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PkgPath(String);

impl PkgPath {
    pub fn category(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.0.split('/').nth(1).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PkgPath {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = s.split('/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(category), Some(name), None) if !category.is_empty() && !name.is_empty() => {
                Ok(Self(s.to_owned()))
            }
            _ => Err(NameError::MalformedPath(s.to_owned())),
        }
    }
}

impl fmt::Display for PkgPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
