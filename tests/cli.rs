use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::{tempdir, NamedTempFile};

fn pdfs_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("output folder exists")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".pdf"))
        .collect();
    names.sort();
    names
}

fn export_cmd(workdir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("osf-export").expect("Binary exists");
    cmd.current_dir(workdir)
        .env_remove("OSF_PAT")
        .env("RUST_LOG", "warn")
        .arg("export-projects");
    cmd
}

#[test]
fn dry_run_exports_every_root_project() {
    let workdir = tempdir().unwrap();
    let out = workdir.path().join("pdfs");

    export_cmd(workdir.path())
        .arg("--dryrun")
        .arg("--folder")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 4 projects."))
        .stdout(predicate::str::contains("Generating PDF...").count(2))
        .stdout(predicate::str::contains("Export complete."));

    let pdfs = pdfs_in(&out);
    assert_eq!(pdfs.len(), 2, "{pdfs:?}");
    assert!(pdfs.iter().any(|n| n.starts_with("Test1-")));
    assert!(pdfs.iter().any(|n| n.starts_with("Test2-")));
}

#[test]
fn dry_run_single_project_from_url() {
    let workdir = tempdir().unwrap();

    export_cmd(workdir.path())
        .args(["--dryrun", "--url", "https://osf.io/x/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 3 projects."))
        .stdout(predicate::str::contains("Generating PDF...").count(1));

    // No folder: the working directory receives the document.
    let pdfs = pdfs_in(workdir.path());
    assert_eq!(pdfs.len(), 1);
    assert!(pdfs[0].starts_with("Test1-"));
}

#[test]
fn dry_run_reads_settings_from_config_file() {
    let workdir = tempdir().unwrap();
    let out = workdir.path().join("from-config");
    let config = NamedTempFile::new().unwrap();
    write(
        config.path(),
        format!("output_dir: {}\ndry_run: true\npage_size: 10\n", out.display()),
    )
    .unwrap();

    export_cmd(workdir.path())
        .arg("--config")
        .arg(config.path())
        .args(["--url", "a"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 1 projects."));

    let pdfs = pdfs_in(&out);
    assert_eq!(pdfs.len(), 1);
    assert!(pdfs[0].starts_with("Test1-Component-A-"));
}

#[test]
fn malformed_url_fails_with_one_line_notice() {
    let workdir = tempdir().unwrap();

    export_cmd(workdir.path())
        .args(["--dryrun", "--url", "https://osf.io/bad id!/"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Exporting failed as an error occurred:"));

    assert!(pdfs_in(workdir.path()).is_empty());
}

#[test]
fn unknown_project_fails_without_output() {
    let workdir = tempdir().unwrap();

    export_cmd(workdir.path())
        .args(["--dryrun", "--url", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("404"));

    assert!(pdfs_in(workdir.path()).is_empty());
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("osf-export")
        .expect("Binary exists")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("export-projects"))
        .stdout(predicate::str::contains("show-user"));
}
