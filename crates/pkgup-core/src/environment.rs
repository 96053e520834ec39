//! The per-run environment: every value the check engine needs from the
//! host, each computed at most once and only when first demanded.
//!
//! Leaf fields come from environment variables (with defaults from system
//! introspection); derived fields chain by calling other fields' `get`
//! inside their thunk. The whole bundle lives behind an `Arc` so check
//! tasks on any worker can read it; a fresh instance is built per run.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context, Result};

use pkgup_domain::{PkgBase, PkgMap, PkgName, PkgPath, Summary, Tag, TagSet};

use crate::harness::Harness;
use crate::lazy::Lazy;
use crate::pkgdb;
use crate::report::Reporter;
use crate::summary_io;
use crate::xargs_fold::xargs_fold;

pub struct Environment {
    reporter: Arc<Reporter>,

    pub pkg_path: Lazy<String>,
    pub machine_arch: Lazy<String>,
    pub makeconf: Lazy<PathBuf>,
    pub opsys: Lazy<String>,
    pub os_version: Lazy<String>,
    pub pkgsrcdir: Lazy<PathBuf>,
    /// A directory or a URL; summaries decide which on demand.
    pub packages: Lazy<String>,
    pub pkg_add: Lazy<String>,
    pub pkg_admin: Lazy<String>,
    pub pkg_dbdir: Lazy<PathBuf>,
    pub pkg_delete: Lazy<String>,
    pub pkg_info: Lazy<String>,
    pub pkg_sufx: Lazy<String>,
    pub pkgchk_conf: Lazy<PathBuf>,
    pub pkgchk_update_conf: Lazy<PathBuf>,
    pub su_cmd: Lazy<String>,
    pub make: Lazy<String>,

    pub included_tags: Lazy<TagSet>,
    pub excluded_tags: Lazy<TagSet>,

    pub bin_pkg_summary: Lazy<Summary>,
    pub bin_pkg_map: Lazy<PkgMap>,

    pub installed_pkgnames: Lazy<BTreeSet<PkgName>>,
    pub installed_pkgpaths: Lazy<BTreeSet<PkgPath>>,
    pub installed_pkg_summary: Lazy<Summary>,
    pub installed_pkgbases: Lazy<BTreeSet<PkgBase>>,
    pub installed_pkgpaths_with_pkgnames: Lazy<BTreeMap<PkgPath, BTreeSet<PkgName>>>,
}

/// Snapshot the process environment for [`Environment::new`]. The CLI
/// injects flag overrides into this map before handing it over.
pub fn process_vars() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

impl Environment {
    #[allow(clippy::too_many_lines)]
    pub fn new(vars: &BTreeMap<String, String>, reporter: Arc<Reporter>) -> Arc<Self> {
        let var = |name: &str| vars.get(name).cloned().filter(|v| !v.is_empty());
        let string_field = |name: &str, default: &str| match var(name) {
            Some(value) => Lazy::ready(value),
            None => {
                let default = default.to_owned();
                Lazy::new(move || Ok(default))
            }
        };
        let path_field = |name: &str, default: &str| match var(name) {
            Some(value) => Lazy::ready(PathBuf::from(value)),
            None => {
                let default = PathBuf::from(default);
                Lazy::new(move || Ok(default))
            }
        };
        let uname_field = |name: &str, flag: &'static str| match var(name) {
            Some(value) => Lazy::ready(value),
            None => Lazy::new(move || uname(flag)),
        };

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let packages = match var("PACKAGES") {
                Some(value) => Lazy::ready(value),
                None => {
                    let env = weak.clone();
                    Lazy::new(move || {
                        let env = upgrade(&env)?;
                        Ok(env
                            .pkgsrcdir
                            .get()?
                            .join("packages")
                            .to_string_lossy()
                            .into_owned())
                    })
                }
            };

            let pkgchk_conf = match var("PKGCHK_CONF") {
                Some(value) => Lazy::ready(PathBuf::from(value)),
                None => {
                    let env = weak.clone();
                    Lazy::new(move || Ok(upgrade(&env)?.pkgsrcdir.get()?.join("pkgchk.conf")))
                }
            };

            let pkgchk_update_conf = match var("PKGCHK_UPDATE_CONF") {
                Some(value) => Lazy::ready(PathBuf::from(value)),
                None => {
                    let env = weak.clone();
                    Lazy::new(move || {
                        Ok(upgrade(&env)?.pkg_dbdir.get()?.join("pkgchk_update.conf"))
                    })
                }
            };

            let included_tags = {
                let env = weak.clone();
                let extra = var("PKGCHK_TAGS");
                Lazy::new(move || {
                    let env = upgrade(&env)?;
                    let mut tags = TagSet::new();
                    tags.insert(Tag::new(env.machine_arch.get()?.as_str()));
                    let opsys = env.opsys.get()?;
                    tags.insert(Tag::new(opsys.as_str()));
                    tags.insert(Tag::new(format!("{opsys}-{}", env.os_version.get()?)));
                    if let Ok(node) = uname("-n") {
                        if let Some(host) = node.split('.').next() {
                            if !host.is_empty() {
                                tags.insert(Tag::new(host));
                            }
                        }
                    }
                    for tag in TagSet::from_spec(extra.as_deref().unwrap_or("")).iter() {
                        tags.insert(tag.clone());
                    }
                    Ok(tags)
                })
            };

            let excluded_tags = {
                let spec = var("PKGCHK_NOTAGS");
                Lazy::new(move || Ok(TagSet::from_spec(spec.as_deref().unwrap_or(""))))
            };

            let bin_pkg_summary = {
                let env = weak.clone();
                Lazy::new(move || {
                    let env = upgrade(&env)?;
                    summary_io::read_summary(
                        &env.reporter,
                        &env.packages.get()?,
                        &env.pkg_info.get()?,
                        &env.pkg_sufx.get()?,
                    )
                    .context("reading the binary package summary")
                })
            };

            let bin_pkg_map = {
                let env = weak.clone();
                Lazy::new(move || Ok(PkgMap::from(&*upgrade(&env)?.bin_pkg_summary.get()?)))
            };

            let installed_pkgnames = {
                let env = weak.clone();
                Lazy::new(move || {
                    let env = upgrade(&env)?;
                    pkgdb::installed_pkgnames(&env.pkg_info.get()?)
                        .context("listing installed packages")
                })
            };

            let installed_pkg_summary = {
                let env = weak.clone();
                Lazy::new(move || {
                    let env = upgrade(&env)?;
                    let names: Vec<String> = env
                        .installed_pkgnames
                        .get()?
                        .iter()
                        .map(ToString::to_string)
                        .collect();
                    let pkg_info = env.pkg_info.get()?;
                    xargs_fold(
                        "/bin/sh",
                        &[
                            "-c".to_owned(),
                            format!("exec {pkg_info} -X \"$@\""),
                            "sh".to_owned(),
                        ],
                        &names,
                        |stdout| Ok(Summary::parse(stdout)?),
                        Summary::merge,
                    )
                    .context("summarizing installed packages")
                })
            };

            let installed_pkgpaths = {
                let env = weak.clone();
                Lazy::new(move || {
                    let summary = upgrade(&env)?.installed_pkg_summary.get()?;
                    Ok(summary
                        .iter()
                        .map(|(_, vars)| vars.pkgpath.clone())
                        .collect())
                })
            };

            let installed_pkgbases = {
                let env = weak.clone();
                Lazy::new(move || {
                    let names = upgrade(&env)?.installed_pkgnames.get()?;
                    Ok(names.iter().map(|name| name.base.clone()).collect())
                })
            };

            let installed_pkgpaths_with_pkgnames = {
                let env = weak.clone();
                Lazy::new(move || {
                    let summary = upgrade(&env)?.installed_pkg_summary.get()?;
                    let mut map: BTreeMap<PkgPath, BTreeSet<PkgName>> = BTreeMap::new();
                    for (name, vars) in summary.iter() {
                        map.entry(vars.pkgpath.clone())
                            .or_default()
                            .insert(name.clone());
                    }
                    Ok(map)
                })
            };

            Self {
                reporter,
                pkg_path: string_field("PKG_PATH", ""),
                machine_arch: uname_field("MACHINE_ARCH", "-m"),
                makeconf: path_field("MAKECONF", "/etc/mk.conf"),
                opsys: uname_field("OPSYS", "-s"),
                os_version: uname_field("OS_VERSION", "-r"),
                pkgsrcdir: path_field("PKGSRCDIR", "/usr/pkgsrc"),
                packages,
                pkg_add: string_field("PKG_ADD", "pkg_add"),
                pkg_admin: string_field("PKG_ADMIN", "pkg_admin"),
                pkg_dbdir: path_field("PKG_DBDIR", "/usr/pkg/pkgdb"),
                pkg_delete: string_field("PKG_DELETE", "pkg_delete"),
                pkg_info: string_field("PKG_INFO", "pkg_info"),
                pkg_sufx: string_field("PKG_SUFX", ".tgz"),
                pkgchk_conf,
                pkgchk_update_conf,
                su_cmd: string_field("SU_CMD", ""),
                make: string_field("MAKE", "make"),
                included_tags,
                excluded_tags,
                bin_pkg_summary,
                bin_pkg_map,
                installed_pkgnames,
                installed_pkgpaths,
                installed_pkg_summary,
                installed_pkgbases,
                installed_pkgpaths_with_pkgnames,
            }
        })
    }

    /// Whether a binary package for `name` is present in the summary.
    pub fn is_binary_available(&self, name: &PkgName) -> Result<bool> {
        Ok(self.bin_pkg_summary.get()?.contains(name))
    }

    /// The on-disk binary package for `name`, when `PACKAGES` is a local
    /// directory containing one.
    pub fn binary_package_file_of(&self, name: &PkgName) -> Result<Option<PathBuf>> {
        let packages = self.packages.get()?;
        if packages.contains("://") {
            return Ok(None);
        }
        let file = PathBuf::from(packages.as_str()).join(format!("{name}{}", self.pkg_sufx.get()?));
        Ok(file.is_file().then_some(file))
    }
}

fn upgrade(weak: &Weak<Environment>) -> Result<Arc<Environment>> {
    weak.upgrade()
        .ok_or_else(|| anyhow!("environment released before its fields resolved"))
}

fn uname(flag: &'static str) -> Result<String> {
    let mut child = Harness::builder("uname").arg(flag).spawn()?;
    let mut output = String::new();
    child
        .stdout()?
        .read_to_string(&mut output)
        .context("reading uname output")?;
    child.wait_success()?;
    Ok(output.trim().to_owned())
}
