//! Integration tests for `spkg build`
//!
//! Drives the binary against small projects whose steps are shell scripts
//! packed into real tar.gz archives.

mod common;

use common::{stderr, stdout, TestProject};
use predicates::prelude::*;

fn three_packages(failing_build_exit: i32) -> TestProject {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);
    project.add_package("beta", "2.1", failing_build_exit);
    project.add_package("gamma", "0.3", 0);
    project
}

fn json_report(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_str(&stdout(output)).expect("build --json prints a JSON report")
}

#[test]
fn test_build_installs_all_packages_in_order() {
    let project = three_packages(0);

    let output = project.build(&[]);

    assert!(
        output.status.success(),
        "build should succeed: {}",
        stderr(&output)
    );
    for name in ["alpha", "beta", "gamma"] {
        assert!(project.is_installed(name), "{name} should be installed");
    }
    assert!(predicate::str::contains("Build complete: 3 packages installed").eval(&stdout(&output)));
}

#[test]
fn test_build_writes_installed_stamps() {
    let project = three_packages(0);

    let output = project.build(&[]);
    assert!(output.status.success(), "{}", stderr(&output));

    let stamps = project.prefix().join("var/lib/spkg/installed");
    assert!(stamps.join("alpha-1.0").exists());
    assert!(stamps.join("beta-2.1").exists());
    assert!(stamps.join("gamma-0.3").exists());

    let stamp: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(stamps.join("alpha-1.0")).unwrap(),
    )
    .unwrap();
    assert_eq!(stamp["name"], "alpha");
    assert_eq!(stamp["version"], "1.0");
}

#[test]
fn test_build_removes_work_dir_of_successful_units() {
    let project = three_packages(0);

    let output = project.build(&[]);
    assert!(output.status.success(), "{}", stderr(&output));

    assert!(!project.file_exists("build/alpha-1.0"));
    assert!(project.file_exists("logs/alpha-1.0.log"));
}

#[test]
fn test_configure_receives_prefix_and_flags() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);

    let output = project.build(&["--keep-workdir"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let configured = project.read_file("build/alpha-1.0/alpha-1.0/configured.txt");
    let prefix = project.prefix().display().to_string();
    assert!(
        configured.contains(&format!("args: --prefix={prefix}")),
        "configure arguments: {configured}"
    );
    assert!(configured.contains("CFLAGS="));
    assert!(configured.contains("-O2"), "default optimization: {configured}");
}

#[test]
fn test_debug_build_uses_debug_flags() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);

    let output = project.build(&["--keep-workdir", "--debug"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let configured = project.read_file("build/alpha-1.0/alpha-1.0/configured.txt");
    assert!(configured.contains("-g"), "debug CFLAGS: {configured}");
    assert!(configured.contains("-O0"), "debug CFLAGS: {configured}");
}

#[test]
fn test_stop_on_first_failure() {
    let project = three_packages(2);

    let output = project.build(&[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(project.is_installed("alpha"));
    assert!(!project.is_installed("beta"));
    assert!(!project.is_installed("gamma"), "gamma must not be attempted");

    let err = stderr(&output);
    assert!(err.contains("beta-2.1 failed at build"), "stderr: {err}");
    assert!(err.contains("exit code 2"), "stderr: {err}");
    assert!(err.contains("compile error in beta"), "diagnostics: {err}");
    assert!(err.contains("Not attempted: gamma-0.3"), "stderr: {err}");
}

#[test]
fn test_failed_unit_keeps_work_dir_and_log() {
    let project = three_packages(2);

    let output = project.build(&[]);
    assert_eq!(output.status.code(), Some(1));

    assert!(project.file_exists("build/beta-2.1/beta-2.1/build.sh"));
    let log = project.read_file("logs/beta-2.1.log");
    assert!(log.contains("building beta"), "log: {log}");
    assert!(log.contains("compile error in beta"), "log: {log}");
}

#[test]
fn test_continue_on_error_attempts_remaining_units() {
    let project = three_packages(3);

    let output = project.build(&["--continue-on-error"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(project.is_installed("alpha"));
    assert!(!project.is_installed("beta"));
    assert!(project.is_installed("gamma"));

    let err = stderr(&output);
    assert!(err.contains("beta-2.1 failed at build"), "stderr: {err}");
    assert!(!err.contains("Not attempted"), "stderr: {err}");
}

#[test]
fn test_continue_on_error_from_manifest() {
    let mut project = three_packages(3);
    project.add_package("delta", "1.0", 0);
    project.write_manifest("[build]\ncontinue_on_error = true\n");

    let output = project.build(&[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(project.is_installed("gamma"));
    assert!(project.is_installed("delta"));
}

#[test]
fn test_json_report() {
    let project = three_packages(2);

    let output = project.build(&["--json"]);
    assert_eq!(output.status.code(), Some(1));

    let report = json_report(&output);
    assert_eq!(report["overall_status"], "failure");
    let units = report["units"].as_array().unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0]["name"], "alpha");
    assert_eq!(units[0]["status"], "success");
    assert_eq!(units[1]["name"], "beta");
    assert_eq!(units[1]["status"], "build_failed");
    assert_eq!(units[1]["failed_step"], "build");
    assert_eq!(units[1]["exit_code"], 2);
    assert_eq!(report["not_attempted"], serde_json::json!(["gamma-0.3"]));
}

#[test]
fn test_missing_prefix_is_a_precondition_failure() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);

    let output = project.run(&["build", "--json"]);

    assert_eq!(output.status.code(), Some(1));
    let report = json_report(&output);
    assert_eq!(report["overall_status"], "failure");
    assert_eq!(report["units"][0]["status"], "precondition_failed");
    assert!(!project.file_exists("build"), "nothing may be staged");
}

#[test]
fn test_relative_prefix_is_rejected() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);

    let output = project.run(&["build", "--prefix", "relative/dir"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("must be an absolute path"));
    assert!(!project.file_exists("build"));
}

#[test]
fn test_prefix_from_environment_variable() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_spkg"))
        .current_dir(project.path())
        .env_remove("SPKG_DEBUG")
        .env_remove("UNAME")
        .env_remove("SPKG_PROJECT_DIR")
        .env("SPKG_LOCAL", project.prefix())
        .arg("build")
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(project.is_installed("alpha"));
}

#[test]
fn test_second_run_skips_installed_packages() {
    let project = three_packages(0);
    assert!(project.build(&[]).status.success());

    let output = project.build(&[]);

    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("alpha-1.0 (already installed)"), "stdout: {out}");
    assert!(!project.file_exists("build/alpha-1.0"));
}

#[test]
fn test_force_rebuilds_installed_packages() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);
    assert!(project.build(&[]).status.success());
    std::fs::remove_file(project.prefix().join("lib/alpha.installed")).unwrap();

    let output = project.build(&["--force"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(project.is_installed("alpha"));
}

#[test]
fn test_package_filter_builds_only_selected() {
    let project = three_packages(0);

    let output = project.build(&["-p", "gamma", "-p", "alpha"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(project.is_installed("alpha"));
    assert!(!project.is_installed("beta"));
    assert!(project.is_installed("gamma"));
}

#[test]
fn test_unknown_package_filter_fails() {
    let project = three_packages(0);

    let output = project.build(&["-p", "missing"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("missing"));
    assert!(!project.file_exists("build"));
}

#[test]
fn test_rebuild_announces_replaced_work_dir() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);
    assert!(project.build(&["--keep-workdir"]).status.success());
    assert!(project.file_exists("build/alpha-1.0"));

    let output = project.build(&["--force"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let err = stderr(&output);
    assert!(err.contains("destroyed and re-staged"), "stderr: {err}");
    assert!(err.contains("Replacing existing working directory"), "stderr: {err}");
}

#[test]
fn test_missing_archive_is_a_stage_failure() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);
    std::fs::remove_file(project.path().join("upstream/alpha-1.0.tar.gz")).unwrap();

    let output = project.build(&["--json"]);

    assert_eq!(output.status.code(), Some(1));
    let report = json_report(&output);
    assert_eq!(report["units"][0]["status"], "stage_failed");
    assert_eq!(report["units"][0]["failed_step"], "stage");
}

#[test]
fn test_patches_are_applied_before_configure() {
    if which::which("patch").is_err() {
        eprintln!("Skipping: patch tool not available");
        return;
    }
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);
    project.create_file(
        "packages/alpha/patches/01-greeting.patch",
        "--- a/hello.txt\n+++ b/hello.txt\n@@ -1 +1 @@\n-hello\n+patched hello\n",
    );

    let output = project.build(&["--keep-workdir", "--json"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        project.read_file("build/alpha-1.0/alpha-1.0/hello.txt"),
        "patched hello\n"
    );
    let report = json_report(&output);
    assert_eq!(report["units"][0]["patches"][0]["outcome"], "applied");
}

#[test]
fn test_failing_patch_stops_before_configure() {
    if which::which("patch").is_err() {
        eprintln!("Skipping: patch tool not available");
        return;
    }
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);
    project.create_file(
        "packages/alpha/patches/01-broken.patch",
        "--- a/hello.txt\n+++ b/hello.txt\n@@ -1 +1 @@\n-no such line\n+patched\n",
    );

    let output = project.build(&["--json"]);

    assert_eq!(output.status.code(), Some(1));
    let report = json_report(&output);
    assert_eq!(report["units"][0]["status"], "patch_failed");
    assert!(!project.file_exists("build/alpha-1.0/alpha-1.0/configured.txt"));
}

#[test]
fn test_quiet_suppresses_progress_output() {
    let project = three_packages(0);

    let output = project.build(&["--quiet"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).is_empty(), "stdout: {}", stdout(&output));
}

#[test]
fn test_directory_option_selects_project() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);
    let prefix = project.prefix().display().to_string();
    let project_dir = project.path().display().to_string();

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_spkg"))
        .current_dir(std::env::temp_dir())
        .env_remove("SPKG_LOCAL")
        .env_remove("SPKG_PROJECT_DIR")
        .args(["-C", project_dir.as_str(), "build", "--prefix", prefix.as_str()])
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(project.is_installed("alpha"));
}

#[test]
fn test_misspelled_placeholder_is_a_precondition_failure() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);
    let manifest = project.read_file("spkg.toml").replace(
        "[package.steps]",
        "configure_args = [\"--prefix=${PERFIX}\"]\n\n[package.steps]",
    );
    project.create_file("spkg.toml", &manifest);

    let output = project.build(&["--json"]);

    assert_eq!(output.status.code(), Some(1));
    let report = json_report(&output);
    assert_eq!(report["units"][0]["status"], "precondition_failed");
    let message = report["units"][0]["message"].as_str().unwrap();
    assert!(message.contains("PERFIX"), "message: {message}");
    assert!(!project.file_exists("build"), "nothing may be staged");
    assert!(!project.is_installed("alpha"));
}
