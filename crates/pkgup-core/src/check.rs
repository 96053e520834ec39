//! The check engine: classify every candidate package path as OK, missing,
//! or mismatched.
//!
//! Extracting variables from package Makefiles dominates the run time, and
//! every path is independent of every other, so one nursery task runs per
//! path and all tasks write into one lock-protected result.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use pkgup_domain::{Config, PkgName, PkgPath, PkgVersion};

use crate::environment::Environment;
use crate::makevars::extract_mk_var;
use crate::nursery::Nursery;
use crate::report::Reporter;

/// Worker ceiling; checks are subprocess-bound, so more buys nothing.
const WORKER_CAP: usize = 16;

#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Consider paths selected by the configuration file.
    pub add_missing: bool,
    /// Consider installed paths, looking for newer versions.
    pub update: bool,
    /// Consider installed paths, looking for stale installs to delete.
    pub delete_mismatched: bool,
    /// Derive latest names from the source tree rather than the binary
    /// package summary.
    pub build_from_source: bool,
    /// Treat an installed version newer than the latest as a mismatch.
    pub check_build_version: bool,
    /// Only print the candidate paths, without checking them.
    pub print_pkgpaths_to_check: bool,
    /// Worker-count override for the nursery.
    pub concurrency: Option<usize>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            add_missing: false,
            update: false,
            delete_mismatched: false,
            build_from_source: true,
            check_build_version: false,
            print_pkgpaths_to_check: false,
            concurrency: None,
        }
    }
}

/// The three classification buckets, after every task has joined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Paths that provide nothing to install (obsolete or dropped).
    pub missing_done: BTreeSet<PkgPath>,
    /// Latest names not installed, and the path providing them.
    pub missing_todo: BTreeMap<PkgName, PkgPath>,
    /// Installed names that are out of date.
    pub mismatch_todo: BTreeSet<PkgName>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.missing_done.is_empty()
            && self.missing_todo.is_empty()
            && self.mismatch_todo.is_empty()
    }

    pub fn payload(&self) -> ReportPayload {
        ReportPayload {
            missing: self
                .missing_todo
                .iter()
                .map(|(name, path)| MissingPayload {
                    pkgname: name.to_string(),
                    pkgpath: path.to_string(),
                })
                .collect(),
            mismatched: self.mismatch_todo.iter().map(ToString::to_string).collect(),
            unavailable: self.missing_done.iter().map(ToString::to_string).collect(),
        }
    }
}

/// The serializable shape of a [`CheckReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload {
    pub missing: Vec<MissingPayload>,
    pub mismatched: Vec<String>,
    pub unavailable: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingPayload {
    pub pkgname: String,
    pub pkgpath: String,
}

/// The classification buckets while tasks are still writing; mutations are
/// serialized by the internal lock.
#[derive(Debug, Default)]
struct CheckResult {
    inner: Mutex<CheckReport>,
}

impl CheckResult {
    fn record_missing_done(&self, path: PkgPath) {
        self.lock().missing_done.insert(path);
    }

    fn record_missing_todo(&self, name: PkgName, path: PkgPath) {
        self.lock().missing_todo.insert(name, path);
    }

    fn record_mismatch_todo(&self, name: PkgName) {
        self.lock().mismatch_todo.insert(name);
    }

    fn snapshot(&self) -> CheckReport {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CheckReport> {
        self.inner.lock().expect("check result poisoned")
    }
}

/// The union of installed paths (for `-u`/`-r`) and config-selected paths
/// (for `-a`).
pub fn pkgpaths_to_check(
    opts: &CheckOptions,
    env: &Environment,
    reporter: &Reporter,
) -> Result<BTreeSet<PkgPath>> {
    let mut pkgpaths = BTreeSet::new();
    if opts.delete_mismatched || opts.update {
        pkgpaths.extend(env.installed_pkgpaths.get()?.iter().cloned());
    }
    if opts.add_missing {
        let conf_path = env.pkgchk_conf.get()?;
        reporter.verbose(format!(
            "Appending to the path list based on config {}",
            conf_path.display()
        ));
        let file = File::open(&*conf_path)
            .with_context(|| format!("opening config {}", conf_path.display()))?;
        let config = Config::parse(BufReader::new(file))?;
        pkgpaths.extend(
            config.apply_tags(&*env.included_tags.get()?, &*env.excluded_tags.get()?),
        );
    }
    Ok(pkgpaths)
}

/// The latest names `path` provides according to the source tree.
///
/// Only the default `PKGNAME` can be extracted without more context, so in
/// update/delete modes every installed base that differs from the default
/// is re-extracted with `PKGNAME_REQD`. A base the path no longer provides
/// makes the whole path unusable: the stale install must be deleted by
/// hand first.
pub fn latest_pkgnames_from_source(
    opts: &CheckOptions,
    env: &Environment,
    reporter: &Reporter,
    path: &PkgPath,
) -> Result<BTreeSet<PkgName>> {
    let pkgdir = env.pkgsrcdir.get()?.join(path.as_str());
    if !pkgdir.join("Makefile").is_file() {
        reporter.warn(format!("No {path}/Makefile - package moved or obsolete?"));
        return Ok(BTreeSet::new());
    }

    let make = env.make.get()?;
    let default_name = extract_mk_var(&make, &pkgdir, "PKGNAME", &[])?
        .ok_or_else(|| anyhow!("Unable to extract PKGNAME for {path}"))?
        .parse::<PkgName>()
        .with_context(|| format!("extracting PKGNAME for {path}"))?;

    let mut pkgnames = BTreeSet::new();
    if opts.update || opts.delete_mismatched {
        let installed_map = env.installed_pkgpaths_with_pkgnames.get()?;
        if let Some(installed_names) = installed_map.get(path) {
            for installed_name in installed_names {
                if installed_name.base == default_name.base {
                    continue;
                }
                let reqd = format!("{}-[0-9]*", installed_name.base);
                let alternative = extract_mk_var(
                    &make,
                    &pkgdir,
                    "PKGNAME",
                    &[("PKGNAME_REQD".to_owned(), reqd.clone())],
                )?
                .ok_or_else(|| {
                    anyhow!("Unable to extract PKGNAME for {path} with PKGNAME_REQD={reqd}")
                })?
                .parse::<PkgName>()
                .with_context(|| format!("extracting PKGNAME for {path}"))?;

                if alternative.base == installed_name.base {
                    pkgnames.insert(alternative);
                } else {
                    reporter.warn(format!(
                        "{path} had presumably provided a package named like {reqd} \
                         but it no longer does so. The installed package {installed_name} \
                         cannot be updated. Delete it and re-run the command."
                    ));
                    return Ok(BTreeSet::new());
                }
            }
        }
    }
    pkgnames.insert(default_name);
    Ok(pkgnames)
}

/// The latest names `path` provides according to the binary summary: the
/// highest version in each base bucket.
pub fn latest_pkgnames_from_binary(
    env: &Environment,
    path: &PkgPath,
) -> Result<BTreeSet<PkgName>> {
    let map = env.bin_pkg_map.get()?;
    let mut pkgnames = BTreeSet::new();
    if let Some(by_base) = map.get(path) {
        for bucket in by_base.values() {
            if let Some((name, _)) = bucket.iter().next_back() {
                pkgnames.insert(name.clone());
            }
        }
    }
    Ok(pkgnames)
}

/// Check every path, one nursery task per path.
pub fn check_installed_packages(
    opts: &CheckOptions,
    env: &Arc<Environment>,
    reporter: &Arc<Reporter>,
    pkgpaths: BTreeSet<PkgPath>,
) -> Result<CheckReport> {
    let result = Arc::new(CheckResult::default());
    let nursery = Nursery::with_capacity(opts.concurrency.unwrap_or(WORKER_CAP));
    for path in pkgpaths {
        let opts = opts.clone();
        let env = Arc::clone(env);
        let reporter = Arc::clone(reporter);
        let result = Arc::clone(&result);
        nursery.start_soon(move |cancel| {
            if cancel.is_cancelled() {
                return Ok(());
            }
            check_one_path(&opts, &env, &reporter, &result, &path)
        });
    }
    nursery.join()?;
    Ok(result.snapshot())
}

fn check_one_path(
    opts: &CheckOptions,
    env: &Environment,
    reporter: &Reporter,
    result: &CheckResult,
    path: &PkgPath,
) -> Result<()> {
    // Most paths provide exactly one name; some (py-*) provide several.
    let latest_pkgnames = if opts.build_from_source {
        latest_pkgnames_from_source(opts, env, reporter, path)?
    } else {
        latest_pkgnames_from_binary(env, path)?
    };

    if latest_pkgnames.is_empty() {
        result.record_missing_done(path.clone());
        return Ok(());
    }

    let installed_pkgnames = env.installed_pkgnames.get()?;
    for name in latest_pkgnames {
        let lower = PkgName::new(name.base.clone(), PkgVersion::zero());
        let installed = installed_pkgnames
            .range(lower..)
            .next()
            .filter(|candidate| candidate.base == name.base);

        let Some(installed) = installed else {
            let binary = binary_note(env, &name)?;
            reporter.msg(format!("{path} - {name} missing{binary}"));
            result.record_missing_todo(name, path.clone());
            continue;
        };

        if installed.version == name.version {
            reporter.verbose(format!("{path} - {name} OK"));
        } else if installed.version < name.version {
            let binary = binary_note(env, &name)?;
            reporter.msg(format!("{path} - {installed} < {name}{binary}"));
            result.record_mismatch_todo(installed.clone());
        } else if opts.check_build_version {
            let binary = binary_note(env, &name)?;
            reporter.msg(format!("{path} - {installed} > {name}{binary}"));
            result.record_mismatch_todo(installed.clone());
        } else {
            let binary = binary_note(env, &name)?;
            reporter.msg(format!("{path} - {installed} > {name} - ignoring{binary}"));
        }
    }
    Ok(())
}

fn binary_note(env: &Environment, name: &PkgName) -> Result<&'static str> {
    Ok(if env.is_binary_available(name)? {
        " (has binary package)"
    } else {
        ""
    })
}

/// Run the whole pipeline: collect paths, check them, report. Returns
/// `None` when only the path list was requested.
pub fn run_check(
    opts: &CheckOptions,
    env: &Arc<Environment>,
    reporter: &Arc<Reporter>,
) -> Result<Option<CheckReport>> {
    let pkgpaths = pkgpaths_to_check(opts, env, reporter)?;
    if opts.print_pkgpaths_to_check {
        for path in &pkgpaths {
            reporter.msg(path.as_str());
        }
        return Ok(None);
    }
    let report = check_installed_packages(opts, env, reporter, pkgpaths)?;
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_clean() {
        let report = CheckReport::default();
        assert!(report.is_clean());
        let payload = report.payload();
        assert!(payload.missing.is_empty());
        assert!(payload.mismatched.is_empty());
        assert!(payload.unavailable.is_empty());
    }

    #[test]
    fn payload_orders_by_sorted_keys() {
        let mut report = CheckReport::default();
        report
            .missing_todo
            .insert("zsh-5.9".parse().unwrap(), "shells/zsh".parse().unwrap());
        report
            .missing_todo
            .insert("bash-5.2".parse().unwrap(), "shells/bash".parse().unwrap());
        report.mismatch_todo.insert("vim-9.0".parse().unwrap());
        let payload = report.payload();
        assert_eq!(payload.missing[0].pkgname, "bash-5.2");
        assert_eq!(payload.missing[1].pkgname, "zsh-5.9");
        assert_eq!(payload.mismatched, ["vim-9.0"]);
    }

    #[test]
    fn default_options_build_from_source() {
        let opts = CheckOptions::default();
        assert!(opts.build_from_source);
        assert!(!opts.add_missing);
        assert!(!opts.update);
    }
}
