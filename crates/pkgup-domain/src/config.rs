//! The desired-package configuration file.
//!
//! Each non-comment line associates a package path with tag expressions:
//!
//! ```text
//! # packages for every host
//! shells/zsh
//! lang/python311    x86_64 aarch64
//! www/firefox       x86_64+desktop
//! print/cups        -headless
//! ```
//!
//! An expression is a `+`-joined conjunction of atoms; an atom is a tag, a
//! negated `-tag`, or `*`. A line with no expressions is always selected;
//! otherwise any satisfied expression selects it.

use std::collections::BTreeSet;
use std::io::{self, BufRead};

use crate::name::PkgPath;
use crate::strings::words;
use crate::tags::TagSet;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TagAtom {
    negated: bool,
    name: String,
}

impl TagAtom {
    fn satisfied(&self, included: &TagSet, excluded: &TagSet) -> bool {
        if self.name == "*" {
            return true;
        }
        if self.negated {
            !included.contains(&self.name)
        } else {
            included.contains(&self.name) && !excluded.contains(&self.name)
        }
    }
}

/// A `+`-joined conjunction of atoms.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TagExpr {
    atoms: Vec<TagAtom>,
}

impl TagExpr {
    fn parse(word: &str) -> Self {
        let atoms = word
            .split('+')
            .filter(|atom| !atom.is_empty())
            .map(|atom| match atom.strip_prefix('-') {
                Some(name) => TagAtom {
                    negated: true,
                    name: name.to_owned(),
                },
                None => TagAtom {
                    negated: false,
                    name: atom.to_owned(),
                },
            })
            .collect();
        Self { atoms }
    }

    fn satisfied(&self, included: &TagSet, excluded: &TagSet) -> bool {
        self.atoms
            .iter()
            .all(|atom| atom.satisfied(included, excluded))
    }
}

/// One configuration line: a path plus its tag expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub path: PkgPath,
    exprs: Vec<TagExpr>,
}

impl ConfigEntry {
    fn selected(&self, included: &TagSet, excluded: &TagSet) -> bool {
        self.exprs.is_empty()
            || self
                .exprs
                .iter()
                .any(|expr| expr.satisfied(included, excluded))
    }
}

/// A parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    entries: Vec<ConfigEntry>,
}

impl Config {
    /// Parse a configuration stream. Lines whose first word is not a valid
    /// package path are logged and skipped.
    pub fn parse<R: BufRead>(input: R) -> io::Result<Self> {
        let mut entries = Vec::new();
        for line in input.lines() {
            let line = line?;
            let line = line.split('#').next().unwrap_or("");
            let mut fields = words(line);
            let Some(first) = fields.next() else {
                continue;
            };
            match first.parse::<PkgPath>() {
                Ok(path) => entries.push(ConfigEntry {
                    path,
                    exprs: fields.map(TagExpr::parse).collect(),
                }),
                Err(err) => tracing::warn!(%err, "skipping config line"),
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> impl Iterator<Item = &ConfigEntry> {
        self.entries.iter()
    }

    /// The paths whose tag expressions are satisfied by `(included, excluded)`.
    pub fn apply_tags(&self, included: &TagSet, excluded: &TagSet) -> BTreeSet<PkgPath> {
        self.entries
            .iter()
            .filter(|entry| entry.selected(included, excluded))
            .map(|entry| entry.path.clone())
            .collect()
    }
}
