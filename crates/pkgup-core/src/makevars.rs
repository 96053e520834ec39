//! Extracting variables from package Makefiles.
//!
//! The build system is the only authority on what a package directory
//! provides, so the engine spawns it with `show-var` and reads the single
//! line it prints. Overrides such as `PKGNAME_REQD` are passed as
//! command-line assignments, which beat environment and Makefile settings.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use pkgup_domain::words;

use crate::harness::Harness;

/// Ask the build system for the value of `var` in `pkgdir`. Returns `None`
/// when the variable expands to nothing.
pub fn extract_mk_var(
    make: &str,
    pkgdir: &Path,
    var: &str,
    overrides: &[(String, String)],
) -> Result<Option<String>> {
    let mut make_words = words(make);
    let cmd = make_words.next().context("MAKE is empty")?;
    let mut child = Harness::builder(cmd)
        .args(make_words)
        .arg("-C")
        .arg(pkgdir.to_string_lossy())
        .arg("show-var")
        .arg(format!("VARNAME={var}"))
        .args(
            overrides
                .iter()
                .map(|(name, value)| format!("{name}={value}")),
        )
        .spawn()?;

    let mut output = String::new();
    child
        .stdout()?
        .read_to_string(&mut output)
        .with_context(|| format!("reading `{}`", child.cmdline()))?;
    child.wait_success()?;

    let value = output.lines().next().unwrap_or("").trim();
    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(value.to_owned()))
    }
}
