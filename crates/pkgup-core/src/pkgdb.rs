//! Queries against the installed-package database, via `PKG_INFO`.
//!
//! The configured `PKG_INFO` value is a command line, not just a path, so
//! it is split into words before spawning (`pkg_info -K /var/db/pkg` is a
//! common setting).

use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Lines, Read};
use std::process::ChildStdout;

use anyhow::{Context, Result};

use pkgup_domain::{words, PkgName, PkgPattern};

use crate::harness::{Harness, HarnessBuilder};

fn pkg_info_builder(pkg_info: &str) -> Result<HarnessBuilder> {
    let mut info_words = words(pkg_info);
    let cmd = info_words.next().context("PKG_INFO is empty")?;
    Ok(Harness::builder(cmd).args(info_words))
}

/// A single-pass stream of installed package names, read from a bare
/// `PKG_INFO` invocation as it runs. The child is reaped when the stream
/// is exhausted or dropped.
pub struct InstalledPkgNames {
    // Dropped before `child`, so an abandoned stream closes the pipe and
    // the child can terminate before the harness reaps it.
    lines: Lines<BufReader<ChildStdout>>,
    child: Harness,
    done: bool,
}

impl InstalledPkgNames {
    pub fn new(pkg_info: &str) -> Result<Self> {
        let mut child = pkg_info_builder(pkg_info)?.spawn()?;
        let lines = BufReader::new(child.stdout()?).lines();
        Ok(Self {
            lines,
            child,
            done: false,
        })
    }
}

impl Iterator for InstalledPkgNames {
    type Item = Result<PkgName>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for line in self.lines.by_ref() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            };
            // `pkg_info` lists "<pkgname>  <comment>"; only the first word
            // is the name, and some builds emit bare name lines.
            let Some(word) = words(&line).next() else {
                continue;
            };
            match word.parse::<PkgName>() {
                Ok(name) => return Some(Ok(name)),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err).context(format!("listing installed packages: {line:?}")));
                }
            }
        }
        self.done = true;
        if let Err(err) = self.child.wait_success() {
            return Some(Err(err.into()));
        }
        None
    }
}

/// Collect the full installed-name set.
pub fn installed_pkgnames(pkg_info: &str) -> Result<BTreeSet<PkgName>> {
    InstalledPkgNames::new(pkg_info)?.collect()
}

/// Whether any installed package matches `pattern` (`PKG_INFO -E`).
pub fn is_pkg_installed(pkg_info: &str, pattern: &PkgPattern) -> Result<bool> {
    let mut child = pkg_info_builder(pkg_info)?
        .arg("-E")
        .arg(pattern.as_str())
        .spawn()?;
    match child.wait_exit() {
        Ok(0) => Ok(true),
        Ok(_) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// The build-dependency names recorded for an installed package
/// (`PKG_INFO -Nq`).
pub fn build_depends(pkg_info: &str, name: &PkgName) -> Result<BTreeSet<PkgName>> {
    let mut child = pkg_info_builder(pkg_info)?
        .arg("-Nq")
        .arg(name.to_string())
        .spawn()?;
    let mut output = String::new();
    child
        .stdout()?
        .read_to_string(&mut output)
        .with_context(|| format!("reading `{}`", child.cmdline()))?;
    child.wait_success()?;

    output
        .lines()
        .flat_map(words)
        .map(|word| {
            word.parse::<PkgName>()
                .with_context(|| format!("build dependency of {name}"))
        })
        .collect()
}
