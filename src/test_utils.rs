//! Test utilities
//!
//! Proptest generators, archive fixtures and a scripted command executor.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid package name (lowercase alphanumeric with hyphens)
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,30}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a distribution-style version string (e.g. 1.21.p1)
    pub fn package_version() -> impl Strategy<Value = String> {
        (1u32..100, 0u32..100, proptest::option::of(0u32..10)).prop_map(|(major, minor, p)| {
            match p {
                Some(p) => format!("{major}.{minor}.p{p}"),
                None => format!("{major}.{minor}"),
            }
        })
    }
}

#[cfg(test)]
pub mod fixtures {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::path::Path;

    /// Write a `.tar.gz` holding `(path, contents, mode)` entries
    pub fn write_tar_gz(archive: &Path, entries: &[(&str, &str, u32)]) {
        let file = std::fs::File::create(archive).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (path, contents, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    /// Relative paths and contents of every file under `root`, sorted
    pub fn snapshot(root: &Path) -> Vec<(String, String)> {
        let mut files: Vec<(String, String)> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().display().to_string();
                let contents = std::fs::read_to_string(e.path()).unwrap_or_default();
                (rel, contents)
            })
            .collect();
        files.sort();
        files
    }
}

#[cfg(test)]
pub mod executor {
    use std::cell::RefCell;

    use crate::infra::process::{CommandExecutor, StepCommand, StepOutput};

    type Responder = Box<dyn Fn(&StepCommand) -> std::io::Result<StepOutput>>;

    /// Executor that records every command and answers from a closure
    pub struct ScriptedExecutor {
        calls: RefCell<Vec<StepCommand>>,
        respond: Responder,
    }

    impl ScriptedExecutor {
        pub fn new<F>(respond: F) -> Self
        where
            F: Fn(&StepCommand) -> std::io::Result<StepOutput> + 'static,
        {
            Self {
                calls: RefCell::new(Vec::new()),
                respond: Box::new(respond),
            }
        }

        /// Every command succeeds
        pub fn succeeding() -> Self {
            Self::new(|_| Ok(StepOutput::ok("")))
        }

        /// Commands whose rendering contains `needle` exit with `code`
        pub fn failing_on(needle: &'static str, code: i32) -> Self {
            Self::new(move |cmd| {
                if cmd.display().contains(needle) {
                    Ok(StepOutput::failed(code, &format!("error: {needle} broke")))
                } else {
                    Ok(StepOutput::ok("ok"))
                }
            })
        }

        pub fn calls(&self) -> Vec<StepCommand> {
            self.calls.borrow().clone()
        }

        /// Rendered command lines, in call order
        pub fn rendered(&self) -> Vec<String> {
            self.calls.borrow().iter().map(StepCommand::display).collect()
        }
    }

    impl CommandExecutor for ScriptedExecutor {
        fn execute(&self, command: &StepCommand) -> std::io::Result<StepOutput> {
            self.calls.borrow_mut().push(command.clone());
            (self.respond)(command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_package_version_generator(version in package_version()) {
            prop_assert!(!version.is_empty());
            prop_assert!(!version.contains('/'));
        }
    }
}
