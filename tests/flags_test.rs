//! Integration tests for `spkg flags`

mod common;

use common::{stderr, stdout, TestProject};

fn flags(project: &TestProject, args: &[&str]) -> std::process::Output {
    let prefix = project.prefix().display().to_string();
    let mut full = vec!["flags", "--prefix", prefix.as_str()];
    full.extend_from_slice(args);
    project.run(&full)
}

#[test]
fn test_flags_shows_expanded_commands() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);

    let output = flags(&project, &["alpha", "--platform", "Linux"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    let prefix = project.prefix().display().to_string();
    assert!(out.contains("alpha-1.0 on Linux"), "stdout: {out}");
    assert!(out.contains("CFLAGS=-O2 -g"), "stdout: {out}");
    assert!(
        out.contains(&format!("configure: sh ./configure --prefix={prefix}")),
        "stdout: {out}"
    );
    assert!(out.contains("build: sh build.sh"), "stdout: {out}");
}

#[test]
fn test_flags_debug_mode() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);

    let output = flags(&project, &["alpha", "--debug"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("CFLAGS=-O0 -g"));
}

#[test]
fn test_flags_force64() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);

    let output = flags(&project, &["alpha", "--force64"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("-m64"));
}

#[test]
fn test_flags_darwin_rule() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);

    let output = flags(&project, &["alpha", "--platform", "Darwin", "--json"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["package"], "alpha-1.0");
    assert_eq!(report["platform"], "Darwin");
    let configure: Vec<String> = serde_json::from_value(report["configure"].clone()).unwrap();
    assert!(configure.contains(&"--with-blas=-framework Accelerate".to_string()));
}

#[test]
fn test_flags_manifest_platform_rule() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);
    project.write_manifest(
        "[[platform]]\nmatch = \"SunOS\"\ncflags = [\"-xc99\"]\nconfigure_args = [\"--disable-shared\"]\n",
    );

    let output = flags(&project, &["alpha", "--platform", "SunOS"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("-xc99"), "stdout: {out}");
    assert!(out.contains("--disable-shared"), "stdout: {out}");
}

#[test]
fn test_flags_unknown_package() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);

    let output = flags(&project, &["nope"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Package 'nope' not found"));
}

#[test]
fn test_flags_misspelled_placeholder() {
    let mut project = TestProject::new();
    project.add_package("alpha", "1.0", 0);
    let manifest = project.read_file("spkg.toml").replace(
        "[package.steps]",
        "configure_args = [\"--prefix=${PERFIX}\"]\n\n[package.steps]",
    );
    project.create_file("spkg.toml", &manifest);

    let output = flags(&project, &["alpha"]);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("unknown placeholder '${PERFIX}'"), "stderr: {err}");
}
