//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Environment variables that would leak host settings into a test run
const HOST_VARIABLES: &[&str] = &[
    "SPKG_DEBUG",
    "SPKG64",
    "SPKG_LOCAL",
    "UNAME",
    "SPKG_JOBS",
    "SPKG_PROJECT_DIR",
    "RUST_LOG",
];

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
    packages: Vec<String>,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            packages: Vec::new(),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Installation prefix used by [`Self::build`]
    pub fn prefix(&self) -> PathBuf {
        self.dir.path().join("prefix")
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Write `upstream/<name>-<version>.tar.gz` holding `(path, contents)`
    /// entries below a `<name>-<version>/` top-level directory
    pub fn create_archive(&self, name: &str, version: &str, files: &[(&str, &str)]) -> String {
        let relative = format!("upstream/{name}-{version}.tar.gz");
        let path = self.dir.path().join(&relative);
        std::fs::create_dir_all(path.parent().expect("archive has a parent"))
            .expect("Failed to create upstream directory");

        let file = std::fs::File::create(&path).expect("Failed to create archive");
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (entry, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(
                    &mut header,
                    format!("{name}-{version}/{entry}"),
                    contents.as_bytes(),
                )
                .expect("Failed to append archive entry");
        }
        builder
            .into_inner()
            .expect("Failed to finish tar stream")
            .finish()
            .expect("Failed to finish gzip stream");
        relative
    }

    /// Add a package whose configure/build/install steps are shell scripts.
    ///
    /// Configure records its arguments and `CFLAGS`; build exits with
    /// `build_exit`; install drops `<prefix>/lib/<name>.installed`.
    pub fn add_package(&mut self, name: &str, version: &str, build_exit: i32) {
        let build = format!("#!/bin/sh\necho \"building {name}\"\necho \"compile error in {name}\" >&2\nexit {build_exit}\n");
        let install = format!(
            "#!/bin/sh\nmkdir -p \"$PREFIX/lib\"\necho {name} > \"$PREFIX/lib/{name}.installed\"\n"
        );
        let archive = self.create_archive(
            name,
            version,
            &[
                (
                    "configure",
                    "#!/bin/sh\necho \"args: $*\" > configured.txt\necho \"CFLAGS=$CFLAGS\" >> configured.txt\n",
                ),
                ("build.sh", build.as_str()),
                ("install.sh", install.as_str()),
                ("hello.txt", "hello\n"),
            ],
        );
        self.packages.push(format!(
            r#"
[[package]]
name = "{name}"
version = "{version}"
archive = "{archive}"

[package.steps]
configure = ["sh", "./configure"]
build = ["sh", "build.sh"]
install = ["sh", "install.sh"]
"#
        ));
        self.write_manifest("");
    }

    /// Write spkg.toml with the added packages; `extra` goes before them
    pub fn write_manifest(&self, extra: &str) {
        let mut manifest = format!("[project]\nname = \"test-dist\"\n{extra}\n");
        for package in &self.packages {
            manifest.push_str(package);
        }
        self.create_file("spkg.toml", &manifest);
    }

    /// Run spkg in the project directory with a clean environment
    pub fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_spkg"));
        cmd.current_dir(self.dir.path());
        for var in HOST_VARIABLES {
            cmd.env_remove(var);
        }
        cmd.args(args);
        cmd.output().expect("Failed to execute spkg")
    }

    /// Run `spkg build --prefix <prefix>` plus `args`
    pub fn build(&self, args: &[&str]) -> Output {
        let prefix = self.prefix().display().to_string();
        let mut full = vec!["build", "--prefix", prefix.as_str()];
        full.extend_from_slice(args);
        self.run(&full)
    }

    /// Whether a package's install script ran
    pub fn is_installed(&self, name: &str) -> bool {
        self.prefix().join(format!("lib/{name}.installed")).exists()
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Stdout as a string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stderr as a string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
