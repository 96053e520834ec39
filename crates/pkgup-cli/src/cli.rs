use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "pkgup",
    version,
    about = "Check installed packages against a pkgsrc-style source tree",
    after_help = "At least one of -a, -u, or -r selects what to check. \
                  Exit status is 0 even when mismatches are found; 1 means a fatal error."
)]
#[allow(clippy::struct_excessive_bools)]
pub struct PkgupCli {
    #[arg(short = 'a', long, help = "Report desired packages that are not installed")]
    pub add_missing: bool,
    #[arg(short = 'u', long, help = "Report installed packages that are out of date")]
    pub update: bool,
    #[arg(
        short = 'r',
        long = "delete-mismatched",
        help = "Report installed packages whose versions no longer match the tree"
    )]
    pub delete_mismatched: bool,
    #[arg(
        short = 'b',
        long = "binary",
        conflicts_with = "source",
        help = "Derive latest versions from the binary package summary"
    )]
    pub binary: bool,
    #[arg(
        short = 's',
        long = "source",
        help = "Derive latest versions from the source tree (default)"
    )]
    pub source: bool,
    #[arg(
        short = 'B',
        long = "check-build-version",
        help = "Treat an installed version newer than the latest as a mismatch"
    )]
    pub check_build_version: bool,
    #[arg(
        short = 'p',
        long = "print-pkgpaths",
        help = "Print the candidate package paths and exit without checking"
    )]
    pub print_pkgpaths: bool,
    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help = "Read the package list from FILE (overrides PKGCHK_CONF)"
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short = 'D',
        long = "tags",
        value_name = "TAGS",
        help = "Add comma-separated TAGS to the included tag set"
    )]
    pub tags: Option<String>,
    #[arg(
        short = 'U',
        long = "no-tags",
        value_name = "TAGS",
        help = "Add comma-separated TAGS to the excluded tag set"
    )]
    pub no_tags: Option<String>,
    #[arg(short, long, help = "Suppress result lines (warnings still print)")]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, help = "Emit the report as a JSON envelope")]
    pub json: bool,
    #[arg(
        short = 'j',
        long,
        value_name = "N",
        help = "Number of concurrent check tasks"
    )]
    pub jobs: Option<usize>,
}
