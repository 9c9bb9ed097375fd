//! External process execution
//!
//! Every configure/build/install/patch step crosses this boundary. The core
//! only looks at the exit status and the captured output of a step; it never
//! parses what the tool printed.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::defaults::PROCESS_POLL_INTERVAL_MS;

/// One external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    /// Program to run
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Variables added to the inherited environment
    pub env: BTreeMap<String, String>,
}

impl StepCommand {
    /// Create a command with no arguments
    pub fn new(program: &str, cwd: &Path) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    /// Build from an argv; `None` when argv is empty.
    ///
    /// A relative program containing a path separator (`./configure`) is
    /// resolved against `cwd`.
    pub fn from_argv(argv: &[String], cwd: &Path) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        let program = if program.contains('/') && Path::new(program).is_relative() {
            cwd.join(program).display().to_string()
        } else {
            program.clone()
        };
        Some(Self {
            program,
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
            env: BTreeMap::new(),
        })
    }

    /// Append arguments
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add environment variables
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Shell-like rendering for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// Exit code; `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout followed by stderr
    pub output: String,
    /// The command was killed through a [`CancelToken`]
    pub cancelled: bool,
}

impl StepOutput {
    /// Successful output with the given text
    pub fn ok(output: &str) -> Self {
        Self {
            exit_code: Some(0),
            output: output.to_string(),
            cancelled: false,
        }
    }

    /// Failed output with the given exit code and text
    pub fn failed(exit_code: i32, output: &str) -> Self {
        Self {
            exit_code: Some(exit_code),
            output: output.to_string(),
            cancelled: false,
        }
    }

    pub fn success(&self) -> bool {
        !self.cancelled && self.exit_code == Some(0)
    }
}

/// Process-execution boundary used by the patch applier and the unit runner
pub trait CommandExecutor {
    /// Run a command to completion; `Err` only when it cannot be started
    fn execute(&self, command: &StepCommand) -> std::io::Result<StepOutput>;

    /// Whether a cancellation has been requested
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared flag that aborts the active external step
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    cancel: CancelToken,
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor that kills its active child once `cancel` is triggered
    pub fn with_cancel_token(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    source.map(|mut s| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            // A read error only truncates the captured output.
            let _ = s.read_to_end(&mut buf);
            buf
        })
    })
}

/// Kill the step's whole process group
#[cfg(unix)]
fn kill_step(child: &mut Child) -> std::io::Result<()> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = i32::try_from(child.id())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    killpg(Pid::from_raw(pgid), Signal::SIGKILL).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
fn kill_step(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

impl CommandExecutor for SystemExecutor {
    fn execute(&self, command: &StepCommand) -> std::io::Result<StepOutput> {
        tracing::debug!("Running `{}` in {}", command.display(), command.cwd.display());

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group so cancellation reaches everything the step spawns
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut child = cmd.spawn()?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let mut cancelled = false;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if self.cancel.is_cancelled() {
                tracing::warn!("Cancelling `{}`", command.display());
                if let Err(e) = kill_step(&mut child) {
                    tracing::debug!("Kill failed, step may have exited: {e}");
                }
                cancelled = true;
                break child.wait()?;
            }
            thread::sleep(Duration::from_millis(PROCESS_POLL_INTERVAL_MS));
        };

        let mut output = String::new();
        for handle in [stdout, stderr].into_iter().flatten() {
            let bytes = handle.join().unwrap_or_default();
            output.push_str(&String::from_utf8_lossy(&bytes));
        }

        Ok(StepOutput {
            exit_code: status.code(),
            output,
            cancelled,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Last `n` lines of captured output
pub fn tail_lines(output: &str, n: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    #[test]
    fn test_from_argv_resolves_relative_program() {
        let cwd = Path::new("/work/src");
        let argv = vec!["./configure".to_string(), "--prefix=/opt".to_string()];
        let cmd = StepCommand::from_argv(&argv, cwd).unwrap();
        assert_eq!(cmd.program, "/work/src/./configure");
        assert_eq!(cmd.args, vec!["--prefix=/opt"]);
    }

    #[test]
    fn test_from_argv_keeps_path_lookup_programs() {
        let argv = vec!["make".to_string(), "install".to_string()];
        let cmd = StepCommand::from_argv(&argv, Path::new("/w")).unwrap();
        assert_eq!(cmd.program, "make");
        assert_eq!(cmd.display(), "make install");
    }

    #[test]
    fn test_from_argv_empty() {
        assert!(StepCommand::from_argv(&[], Path::new("/w")).is_none());
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail_lines("a", 5), "a");
        assert_eq!(tail_lines("", 5), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_executor_captures_status_and_output() {
        let dir = TempDir::new().unwrap();
        let cmd = StepCommand::new("sh", dir.path())
            .with_args(["-c", "echo out; echo err >&2; echo $SPKG_TEST_VAR; exit 3"])
            .with_env(BTreeMap::from([(
                "SPKG_TEST_VAR".to_string(),
                "hello".to_string(),
            )]));

        let output = SystemExecutor::new().execute(&cmd).unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert!(output.output.contains("out"));
        assert!(output.output.contains("err"));
        assert!(output.output.contains("hello"));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_executor_runs_in_cwd() {
        let dir = TempDir::new().unwrap();
        let cmd = StepCommand::new("sh", dir.path()).with_args(["-c", "touch marker"]);
        let output = SystemExecutor::new().execute(&cmd).unwrap();
        assert!(output.success());
        assert!(dir.path().join("marker").exists());
    }

    #[test]
    fn test_system_executor_missing_program() {
        let dir = TempDir::new().unwrap();
        let cmd = StepCommand::new("spkg-definitely-not-a-program", dir.path());
        assert!(SystemExecutor::new().execute(&cmd).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_active_step() {
        let dir = TempDir::new().unwrap();
        let token = CancelToken::new();
        let executor = SystemExecutor::with_cancel_token(token.clone());
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                token.cancel();
            })
        };

        let started = Instant::now();
        let output = executor
            .execute(&StepCommand::new("sleep", dir.path()).with_args(["30"]))
            .unwrap();
        canceller.join().unwrap();

        assert!(output.cancelled);
        assert!(!output.success());
        assert!(started.elapsed() < Duration::from_secs(20));
        assert!(executor.is_cancelled());
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_background_grandchildren() {
        let dir = TempDir::new().unwrap();
        let token = CancelToken::new();
        let executor = SystemExecutor::with_cancel_token(token.clone());
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                token.cancel();
            })
        };

        let started = Instant::now();
        let output = executor
            .execute(
                &StepCommand::new("sh", dir.path())
                    .with_args(["-c", "sleep 8 & sleep 8 & wait; touch finished"]),
            )
            .unwrap();
        canceller.join().unwrap();

        assert!(output.cancelled);
        assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
        assert!(!dir.path().join("finished").exists());
    }
}
