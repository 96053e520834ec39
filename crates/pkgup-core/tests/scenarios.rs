//! End-to-end checks of the engine against fake `make` and `pkg_info`
//! tools in a temporary pkgsrc layout.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use pkgup_core::{run_check, CheckOptions, CheckReport, Environment, Reporter};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().expect("buf").clone()).expect("utf8")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buf").extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("pkgsrc")).expect("mkdir pkgsrc");
        let fixture = Self { dir };
        fixture.install_make();
        fixture.set_installed(&[], "");
        fixture.write_config("");
        fixture
    }

    fn pkgsrc(&self) -> PathBuf {
        self.dir.path().join("pkgsrc")
    }

    fn make_log(&self) -> String {
        fs::read_to_string(self.dir.path().join("make.log")).unwrap_or_default()
    }

    fn install_make(&self) {
        let script = self.dir.path().join("make");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\n\
                 dir=\"\"\n\
                 reqd=\"\"\n\
                 prev=\"\"\n\
                 for arg in \"$@\"; do\n\
                 case \"$prev\" in -C) dir=\"$arg\" ;; esac\n\
                 case \"$arg\" in PKGNAME_REQD=*) reqd=\"${{arg#PKGNAME_REQD=}}\" ;; esac\n\
                 prev=\"$arg\"\n\
                 done\n\
                 echo \"$dir\" >> {log}\n\
                 if [ -n \"$reqd\" ] && [ -f \"$dir/.pkgname_reqd\" ]; then\n\
                 cat \"$dir/.pkgname_reqd\"\n\
                 else\n\
                 cat \"$dir/.pkgname\"\n\
                 fi\n",
                log = self.dir.path().join("make.log").display()
            ),
        )
        .expect("write make");
        make_executable(&script);
    }

    /// A package directory whose default PKGNAME extraction yields
    /// `pkgname`.
    fn add_package(&self, path: &str, pkgname: &str) {
        let pkgdir = self.pkgsrc().join(path);
        fs::create_dir_all(&pkgdir).expect("mkdir package");
        fs::write(pkgdir.join("Makefile"), "# placeholder\n").expect("write Makefile");
        fs::write(pkgdir.join(".pkgname"), format!("{pkgname}\n")).expect("write pkgname");
    }

    /// The PKGNAME the package reports under a PKGNAME_REQD override.
    fn set_reqd_pkgname(&self, path: &str, pkgname: &str) {
        let pkgdir = self.pkgsrc().join(path);
        fs::write(pkgdir.join(".pkgname_reqd"), format!("{pkgname}\n"))
            .expect("write reqd pkgname");
    }

    /// Install a fake `pkg_info`: the bare listing prints `installed`
    /// names, `-X` prints `summary`.
    fn set_installed(&self, installed: &[&str], summary: &str) {
        let listing = installed
            .iter()
            .map(|name| format!("{name}\n"))
            .collect::<String>();
        fs::write(self.dir.path().join("installed.txt"), listing).expect("write listing");
        fs::write(self.dir.path().join("installed_summary.txt"), summary)
            .expect("write summary");

        let script = self.dir.path().join("pkg_info");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\n\
                 echo run >> {calls}\n\
                 if [ \"$1\" = \"-X\" ]; then\n\
                 cat {summary}\n\
                 else\n\
                 cat {listing}\n\
                 fi\n",
                calls = self.dir.path().join("pkg_info.calls").display(),
                summary = self.dir.path().join("installed_summary.txt").display(),
                listing = self.dir.path().join("installed.txt").display(),
            ),
        )
        .expect("write pkg_info");
        make_executable(&script);
    }

    fn write_config(&self, content: &str) {
        fs::write(self.dir.path().join("pkgchk.conf"), content).expect("write config");
    }

    fn environment(&self, reporter: &Arc<Reporter>) -> Arc<Environment> {
        let mut vars = BTreeMap::new();
        vars.insert(
            "PKGSRCDIR".to_owned(),
            self.pkgsrc().to_string_lossy().into_owned(),
        );
        vars.insert(
            "MAKE".to_owned(),
            self.dir.path().join("make").to_string_lossy().into_owned(),
        );
        vars.insert(
            "PKG_INFO".to_owned(),
            self.dir
                .path()
                .join("pkg_info")
                .to_string_lossy()
                .into_owned(),
        );
        vars.insert(
            "PKGCHK_CONF".to_owned(),
            self.dir
                .path()
                .join("pkgchk.conf")
                .to_string_lossy()
                .into_owned(),
        );
        vars.insert(
            "PACKAGES".to_owned(),
            self.dir.path().join("packages").to_string_lossy().into_owned(),
        );
        vars.insert("MACHINE_ARCH".to_owned(), "x86_64".to_owned());
        vars.insert("OPSYS".to_owned(), "NetBSD".to_owned());
        vars.insert("OS_VERSION".to_owned(), "10.0".to_owned());
        Environment::new(&vars, Arc::clone(reporter))
    }
}

fn make_executable(path: &Path) {
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
}

fn reporter(verbosity: u8) -> (Arc<Reporter>, SharedBuf, SharedBuf) {
    let out = SharedBuf::default();
    let err = SharedBuf::default();
    let reporter = Arc::new(Reporter::with_sinks(
        false,
        verbosity,
        Box::new(out.clone()),
        Box::new(err.clone()),
    ));
    (reporter, out, err)
}

fn check(fixture: &Fixture, opts: &CheckOptions, verbosity: u8) -> (CheckReport, String, String) {
    let (reporter, out, err) = reporter(verbosity);
    let env = fixture.environment(&reporter);
    let report = run_check(opts, &env, &reporter)
        .expect("run_check")
        .expect("report");
    (report, out.contents(), err.contents())
}

fn add_missing_opts() -> CheckOptions {
    CheckOptions {
        add_missing: true,
        ..CheckOptions::default()
    }
}

#[test]
fn clean_system_reports_one_missing_package() {
    let fixture = Fixture::new();
    fixture.add_package("lang/python311", "python311-3.11.4");
    fixture.write_config("lang/python311\n");

    let (report, out, _) = check(&fixture, &add_missing_opts(), 0);

    assert!(report.missing_done.is_empty());
    assert!(report.mismatch_todo.is_empty());
    assert_eq!(report.missing_todo.len(), 1);
    let (name, path) = report.missing_todo.iter().next().expect("entry");
    assert_eq!(name.to_string(), "python311-3.11.4");
    assert_eq!(path.to_string(), "lang/python311");
    assert!(out.contains("lang/python311 - python311-3.11.4 missing"));
}

#[test]
fn up_to_date_package_is_clean_and_logged_ok() {
    let fixture = Fixture::new();
    fixture.add_package("lang/python311", "python311-3.11.4");
    fixture.write_config("lang/python311\n");
    fixture.set_installed(
        &["python311-3.11.4"],
        "PKGNAME=python311-3.11.4\nPKGPATH=lang/python311\n\n",
    );

    let (report, out, _) = check(&fixture, &add_missing_opts(), 1);

    assert!(report.is_clean());
    assert!(out.contains("lang/python311 - python311-3.11.4 OK"));
}

#[test]
fn older_installed_version_is_a_mismatch() {
    let fixture = Fixture::new();
    fixture.add_package("lang/python311", "python311-3.11.4");
    fixture.write_config("lang/python311\n");
    fixture.set_installed(
        &["python311-3.11.3"],
        "PKGNAME=python311-3.11.3\nPKGPATH=lang/python311\n\n",
    );

    let (report, out, _) = check(&fixture, &add_missing_opts(), 0);

    assert!(report.missing_todo.is_empty());
    assert_eq!(report.mismatch_todo.len(), 1);
    assert!(report
        .mismatch_todo
        .contains(&"python311-3.11.3".parse().expect("name")));
    assert!(out.contains("lang/python311 - python311-3.11.3 < python311-3.11.4"));
}

#[test]
fn newer_installed_version_is_ignored_without_build_check() {
    let fixture = Fixture::new();
    fixture.add_package("lang/python311", "python311-3.11.4");
    fixture.write_config("lang/python311\n");
    fixture.set_installed(
        &["python311-3.11.5"],
        "PKGNAME=python311-3.11.5\nPKGPATH=lang/python311\n\n",
    );

    let (report, out, _) = check(&fixture, &add_missing_opts(), 0);
    assert!(report.mismatch_todo.is_empty());
    assert!(out.contains("- ignoring"));

    let opts = CheckOptions {
        check_build_version: true,
        ..add_missing_opts()
    };
    let (report, _, _) = check(&fixture, &opts, 0);
    assert!(report
        .mismatch_todo
        .contains(&"python311-3.11.5".parse().expect("name")));
}

#[test]
fn obsolete_path_is_missing_done_without_spawning_make() {
    let fixture = Fixture::new();
    fixture.add_package("lang/python311", "python311-3.11.4");
    fixture.write_config("lang/python311\nlang/python27\n");

    let (report, _, err) = check(&fixture, &add_missing_opts(), 0);

    assert!(report
        .missing_done
        .contains(&"lang/python27".parse().expect("path")));
    assert!(err.contains("No lang/python27/Makefile - package moved or obsolete?"));
    assert!(!fixture.make_log().contains("python27"));
    assert!(fixture.make_log().contains("python311"));
}

#[test]
fn dropped_alternative_base_warns_and_contributes_nothing() {
    let fixture = Fixture::new();
    fixture.add_package("devel/py-foo", "py311-foo-1.2");
    fixture.set_reqd_pkgname("devel/py-foo", "py311-foo-1.2");
    fixture.set_installed(
        &["py310-foo-1.0"],
        "PKGNAME=py310-foo-1.0\nPKGPATH=devel/py-foo\n\n",
    );

    let opts = CheckOptions {
        update: true,
        ..CheckOptions::default()
    };
    let (report, _, err) = check(&fixture, &opts, 0);

    assert!(report.missing_todo.is_empty());
    assert!(report.mismatch_todo.is_empty());
    assert!(report
        .missing_done
        .contains(&"devel/py-foo".parse().expect("path")));
    assert!(err.contains("py310-foo-[0-9]*"));
    assert!(err.contains("no longer does so"));
    assert!(err.contains("py310-foo-1.0"));
}

#[test]
fn surviving_alternative_base_is_checked_alongside_the_default() {
    let fixture = Fixture::new();
    fixture.add_package("devel/py-foo", "py311-foo-1.2");
    fixture.set_reqd_pkgname("devel/py-foo", "py310-foo-1.2");
    fixture.set_installed(
        &["py310-foo-1.0"],
        "PKGNAME=py310-foo-1.0\nPKGPATH=devel/py-foo\n\n",
    );

    let opts = CheckOptions {
        update: true,
        ..CheckOptions::default()
    };
    let (report, out, _) = check(&fixture, &opts, 0);

    // The installed py310 flavour is out of date, and the default py311
    // flavour is missing entirely.
    assert!(report
        .mismatch_todo
        .contains(&"py310-foo-1.0".parse().expect("name")));
    assert_eq!(report.missing_todo.len(), 1);
    assert!(out.contains("devel/py-foo - py310-foo-1.0 < py310-foo-1.2"));
}

#[test]
fn print_pkgpaths_only_lists_without_checking() {
    let fixture = Fixture::new();
    fixture.add_package("lang/python311", "python311-3.11.4");
    fixture.write_config("lang/python311\nshells/zsh\n");

    let opts = CheckOptions {
        print_pkgpaths_to_check: true,
        ..add_missing_opts()
    };
    let (reporter, out, _) = reporter(0);
    let env = fixture.environment(&reporter);
    let report = run_check(&opts, &env, &reporter).expect("run_check");
    assert!(report.is_none());
    assert_eq!(out.contents(), "lang/python311\nshells/zsh\n");
    assert!(fixture.make_log().is_empty());
}

#[test]
fn config_tags_filter_candidate_paths() {
    let fixture = Fixture::new();
    fixture.add_package("lang/python311", "python311-3.11.4");
    fixture.add_package("www/firefox", "firefox-128.0");
    fixture.write_config("lang/python311 x86_64\nwww/firefox sparc\n");

    let (report, _, _) = check(&fixture, &add_missing_opts(), 0);

    assert_eq!(report.missing_todo.len(), 1);
    let (name, _) = report.missing_todo.iter().next().expect("entry");
    assert_eq!(name.to_string(), "python311-3.11.4");
}

#[test]
fn many_paths_share_one_installed_listing() {
    let fixture = Fixture::new();
    let mut config = String::new();
    for i in 0..12 {
        let path = format!("devel/pkg{i}");
        fixture.add_package(&path, &format!("pkg{i}-1.0"));
        config.push_str(&path);
        config.push('\n');
    }
    fixture.write_config(&config);

    let (report, _, _) = check(&fixture, &add_missing_opts(), 0);
    assert_eq!(report.missing_todo.len(), 12);
    assert_eq!(fixture.make_log().lines().count(), 12);

    // Twelve concurrent tasks, one listing subprocess.
    let calls = fs::read_to_string(fixture.dir.path().join("pkg_info.calls")).expect("calls");
    assert_eq!(calls.lines().count(), 1);
}
