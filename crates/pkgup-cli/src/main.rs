#![deny(clippy::all, warnings)]

use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;

use pkgup_core::{process_vars, run_check, CheckOptions, CheckReport, Environment, Reporter};

mod cli;

use cli::PkgupCli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = PkgupCli::parse();
    init_tracing(cli.verbose);

    if !(cli.add_missing || cli.update || cli.delete_mismatched) {
        eprintln!("pkgup: at least one of -a, -u, or -r is required");
        std::process::exit(1);
    }

    let opts = CheckOptions {
        add_missing: cli.add_missing,
        update: cli.update,
        delete_mismatched: cli.delete_mismatched,
        build_from_source: cli.source || !cli.binary,
        check_build_version: cli.check_build_version,
        print_pkgpaths_to_check: cli.print_pkgpaths,
        concurrency: cli.jobs,
    };

    let mut vars = process_vars();
    if let Some(config) = &cli.config {
        vars.insert("PKGCHK_CONF".to_owned(), config.display().to_string());
    }
    if let Some(tags) = &cli.tags {
        append_spec(&mut vars, "PKGCHK_TAGS", tags);
    }
    if let Some(no_tags) = &cli.no_tags {
        append_spec(&mut vars, "PKGCHK_NOTAGS", no_tags);
    }

    // JSON mode owns stdout; per-path result lines are suppressed.
    let reporter = Arc::new(Reporter::stdio(cli.quiet || cli.json, cli.verbose));
    let env = Environment::new(&vars, Arc::clone(&reporter));

    match run_check(&opts, &env, &reporter) {
        Ok(None) => Ok(()),
        Ok(Some(report)) => {
            if cli.json {
                emit_json(&report)?;
            } else {
                render_human(&reporter, &report);
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("pkgup: {err:#}");
            std::process::exit(1);
        }
    }
}

/// CLI tag flags extend whatever the environment already carries.
fn append_spec(
    vars: &mut std::collections::BTreeMap<String, String>,
    name: &str,
    spec: &str,
) {
    let value = vars.entry(name.to_owned()).or_default();
    if !value.is_empty() {
        value.push(',');
    }
    value.push_str(spec);
}

fn render_human(reporter: &Reporter, report: &CheckReport) {
    if !report.missing_done.is_empty() {
        reporter.msg(format!("Unavailable: {}", joined(report.missing_done.iter())));
    }
    if !report.missing_todo.is_empty() {
        reporter.msg(format!("Missing: {}", joined(report.missing_todo.keys())));
    }
    if !report.mismatch_todo.is_empty() {
        reporter.msg(format!("Mismatched: {}", joined(report.mismatch_todo.iter())));
    }
}

fn joined<T: ToString>(items: impl Iterator<Item = T>) -> String {
    items
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn emit_json(report: &CheckReport) -> Result<()> {
    let envelope = serde_json::json!({
        "status": if report.is_clean() { "ok" } else { "attention" },
        "message": summary_message(report),
        "details": report.payload(),
    });
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn summary_message(report: &CheckReport) -> String {
    if report.is_clean() {
        "every checked package is up to date".to_owned()
    } else {
        format!(
            "{} missing, {} mismatched, {} unavailable",
            report.missing_todo.len(),
            report.mismatch_todo.len(),
            report.missing_done.len()
        )
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = format!("pkgup={level},pkgup_core={level},pkgup_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
