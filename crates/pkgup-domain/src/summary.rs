//! Binary-package summary records and their indexes.
//!
//! A summary stream is a sequence of blank-line-separated records of
//! `KEY=VALUE` lines. Only `DEPENDS`, `PKGNAME`, and `PKGPATH` are
//! interpreted; a record is kept only when both `PKGNAME` and `PKGPATH`
//! were present.

use std::collections::BTreeMap;
use std::io::{self, BufRead};

use crate::name::{PkgBase, PkgName, PkgPath};
use crate::pattern::PkgPattern;

/// The interpreted variables of one summary record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgVars {
    pub depends: Vec<PkgPattern>,
    pub pkgname: PkgName,
    pub pkgpath: PkgPath,
}

/// A set of summary records keyed by package name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    records: BTreeMap<PkgName, PkgVars>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a summary stream. Unparseable values are logged and skipped;
    /// a record missing `PKGNAME` or `PKGPATH` is discarded, as is a
    /// trailing record not terminated by a blank line.
    pub fn parse<R: BufRead>(input: R) -> io::Result<Self> {
        let mut summary = Self::new();
        let mut depends = Vec::new();
        let mut pkgname: Option<PkgName> = None;
        let mut pkgpath: Option<PkgPath> = None;

        for line in input.lines() {
            let line = line?;
            if line.is_empty() {
                if let (Some(name), Some(path)) = (pkgname.take(), pkgpath.take()) {
                    summary.records.insert(
                        name.clone(),
                        PkgVars {
                            depends: std::mem::take(&mut depends),
                            pkgname: name,
                            pkgpath: path,
                        },
                    );
                }
                depends.clear();
                continue;
            }
            let Some((variable, value)) = line.split_once('=') else {
                continue;
            };
            match variable {
                "DEPENDS" => match value.parse::<PkgPattern>() {
                    Ok(pattern) => depends.push(pattern),
                    Err(err) => tracing::warn!(%err, "skipping unparseable DEPENDS"),
                },
                "PKGNAME" => match value.parse::<PkgName>() {
                    Ok(name) => pkgname = Some(name),
                    Err(err) => tracing::warn!(%err, "skipping unparseable PKGNAME"),
                },
                "PKGPATH" => match value.parse::<PkgPath>() {
                    Ok(path) => pkgpath = Some(path),
                    Err(err) => tracing::warn!(%err, "skipping unparseable PKGPATH"),
                },
                _ => {}
            }
        }
        Ok(summary)
    }

    pub fn insert(&mut self, vars: PkgVars) {
        self.records.insert(vars.pkgname.clone(), vars);
    }

    /// Absorb every record of `other`, later records replacing earlier ones.
    pub fn merge(&mut self, other: Self) {
        self.records.extend(other.records);
    }

    pub fn get(&self, name: &PkgName) -> Option<&PkgVars> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &PkgName) -> bool {
        self.records.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PkgName, &PkgVars)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for Summary {
    type Item = (PkgName, PkgVars);
    type IntoIter = std::collections::btree_map::IntoIter<PkgName, PkgVars>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// A summary indexed by path, then base, then name.
#[derive(Debug, Clone, Default)]
pub struct PkgMap {
    buckets: BTreeMap<PkgPath, BTreeMap<PkgBase, BTreeMap<PkgName, PkgVars>>>,
}

impl PkgMap {
    pub fn get(&self, path: &PkgPath) -> Option<&BTreeMap<PkgBase, BTreeMap<PkgName, PkgVars>>> {
        self.buckets.get(path)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&PkgPath, &BTreeMap<PkgBase, BTreeMap<PkgName, PkgVars>>)> {
        self.buckets.iter()
    }
}

impl From<&Summary> for PkgMap {
    fn from(summary: &Summary) -> Self {
        let mut buckets: BTreeMap<PkgPath, BTreeMap<PkgBase, BTreeMap<PkgName, PkgVars>>> =
            BTreeMap::new();
        for (name, vars) in summary.iter() {
            buckets
                .entry(vars.pkgpath.clone())
                .or_default()
                .entry(name.base.clone())
                .or_default()
                .insert(name.clone(), vars.clone());
        }
        Self { buckets }
    }
}
