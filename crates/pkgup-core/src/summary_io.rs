//! Obtaining a binary-package summary.
//!
//! `PACKAGES` is either a local directory or a URL. Locally the candidate
//! summary files are tried in preference order and checked for freshness
//! against the newest binary package; when no usable summary exists the
//! packages themselves are scanned with `pkg_info -X`. Remotely each
//! candidate is fetched over HTTP and the first one that answers wins.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;

use pkgup_domain::Summary;

use crate::report::Reporter;
use crate::xargs_fold::xargs_fold;

const SUMMARY_FILES: [&str; 3] = ["pkg_summary.bz2", "pkg_summary.gz", "pkg_summary.txt"];

const USER_AGENT: &str = concat!("pkgup/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// One summary candidate failed over HTTP; the next candidate should be
/// tried.
#[derive(Debug, thiserror::Error)]
#[error("remote summary unavailable: {url}")]
pub struct RemoteUnavailable {
    pub url: String,
}

/// Read the binary-package summary named by `packages`, local or remote.
pub fn read_summary(
    reporter: &Reporter,
    packages: &str,
    pkg_info: &str,
    pkg_sufx: &str,
) -> Result<Summary> {
    if packages.contains("://") {
        read_remote_summary(reporter, packages)
    } else {
        read_local_summary(reporter, Path::new(packages), pkg_info, pkg_sufx)
    }
}

/// Wrap `raw` in the decompressor selected by the file name extension.
fn decompressed<'a>(name: &str, raw: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
    if name.ends_with(".bz2") {
        Box::new(bzip2::read::BzDecoder::new(raw))
    } else if name.ends_with(".gz") {
        Box::new(GzDecoder::new(raw))
    } else {
        raw
    }
}

fn parse_decompressed(name: &str, raw: Box<dyn Read + '_>) -> Result<Summary> {
    let mut reader = BufReader::new(decompressed(name, raw));
    Ok(Summary::parse(&mut reader)?)
}

fn read_local_summary(
    reporter: &Reporter,
    packages: &Path,
    pkg_info: &str,
    pkg_sufx: &str,
) -> Result<Summary> {
    if !packages.is_dir() {
        reporter.verbose(format!(
            "No binary package directory {}; treating the summary as empty",
            packages.display()
        ));
        return Ok(Summary::new());
    }

    // The newest binary package's mtime is only needed once a candidate
    // summary file actually exists.
    let mut newest_cache: Option<SystemTime> = None;
    for name in SUMMARY_FILES {
        let path = packages.join(name);
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        let modified = metadata
            .modified()
            .with_context(|| format!("reading mtime of {}", path.display()))?;
        let newest = match newest_cache {
            Some(newest) => newest,
            None => {
                let newest = newest_mtime(packages)?;
                newest_cache = Some(newest);
                newest
            }
        };
        if modified < newest {
            reporter.msg(format!(
                "** Ignoring {} as there are newer packages in {}",
                path.display(),
                packages.display()
            ));
            continue;
        }
        reporter.verbose(format!("Using summary file: {}", path.display()));
        let file =
            File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        return parse_decompressed(name, Box::new(file));
    }

    reporter.verbose(format!(
        "No valid summaries exist. Scanning {} ...",
        packages.display()
    ));
    scan_binary_packages(packages, pkg_info, pkg_sufx)
}

/// Produce summary records for every `*<pkg_sufx>` file in `packages` by
/// folding the file list through `pkg_info -X`.
fn scan_binary_packages(packages: &Path, pkg_info: &str, pkg_sufx: &str) -> Result<Summary> {
    let mut files = Vec::new();
    for entry in fs::read_dir(packages)
        .with_context(|| format!("scanning {}", packages.display()))?
    {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().ends_with(pkg_sufx) {
            files.push(entry.path().to_string_lossy().into_owned());
        }
    }
    files.sort();

    xargs_fold(
        "/bin/sh",
        &[
            "-c".to_owned(),
            format!("exec {pkg_info} -X \"$@\""),
            // $0 of the shell; the chunk arguments follow.
            "sh".to_owned(),
        ],
        &files,
        |stdout: &mut dyn BufRead| Ok(Summary::parse(stdout)?),
        Summary::merge,
    )
}

fn newest_mtime(dir: &Path) -> Result<SystemTime> {
    let mut newest = SystemTime::UNIX_EPOCH;
    for entry in
        fs::read_dir(dir).with_context(|| format!("scanning {}", dir.display()))?
    {
        let modified = entry?.metadata()?.modified()?;
        if modified > newest {
            newest = modified;
        }
    }
    Ok(newest)
}

fn read_remote_summary(reporter: &Reporter, base_url: &str) -> Result<Summary> {
    let base = base_url.trim_end_matches('/');
    for name in SUMMARY_FILES {
        let url = format!("{base}/{name}");
        match http_get(&url) {
            Ok(response) => {
                reporter.verbose(format!("Using summary file: {url}"));
                return parse_decompressed(name, Box::new(response));
            }
            Err(err) => {
                reporter.verbose(format!("{err}; trying the next candidate"));
            }
        }
    }
    bail!("No summary files are available: {base_url}");
}

fn http_get(url: &str) -> Result<reqwest::blocking::Response, RemoteUnavailable> {
    let unavailable = || RemoteUnavailable {
        url: url.to_owned(),
    };
    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|_| unavailable())?;
    let response = client.get(url).send().map_err(|_| unavailable())?;
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(unavailable())
    }
}
