//! Subprocess execution utilities.
//!
//! Every external command the resolver runs goes through a [`ProbeRunner`].
//! A probe never fails with an error: spawn failures, nonzero exits and
//! timeouts are all reported as a [`ProbeOutput`] value.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

use crate::builder::toolchain::CommandSpec;

/// Interval between child status polls while waiting on a probe.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    /// Exit code, `None` if the process was killed, timed out or never ran.
    pub status: Option<i32>,
    /// Standard output (lossy UTF-8).
    pub stdout: String,
    /// Standard error (lossy UTF-8).
    pub stderr: String,
    /// The process exceeded its timeout and was terminated.
    pub timed_out: bool,
    /// The process could not be started.
    pub spawn_error: Option<String>,
}

impl ProbeOutput {
    /// A successful run with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        ProbeOutput {
            status: Some(0),
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// A run that exited with `status` and printed `stderr`.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        ProbeOutput {
            status: Some(status),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// A run that exceeded its timeout.
    pub fn timeout() -> Self {
        ProbeOutput {
            timed_out: true,
            ..Default::default()
        }
    }

    /// A command that could not be started.
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        ProbeOutput {
            spawn_error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Whether the command ran to completion with exit code 0.
    pub fn succeeded(&self) -> bool {
        self.status == Some(0) && !self.timed_out
    }

    /// Diagnostic text suitable for a log line.
    pub fn diagnostic(&self) -> String {
        if let Some(ref err) = self.spawn_error {
            return err.clone();
        }
        if self.timed_out {
            return "timed out".to_string();
        }
        let stderr = self.stderr.trim();
        match self.status {
            Some(code) if stderr.is_empty() => format!("exit code {}", code),
            Some(code) => format!("exit code {}: {}", code, stderr),
            None => format!("terminated by signal: {}", stderr),
        }
    }
}

/// Runs external commands with a timeout.
///
/// The resolver only talks to the outside world through this trait so that
/// probing can be driven by canned outputs in tests.
pub trait ProbeRunner: Send + Sync {
    /// Run `cmd`, killing it if it does not finish within `timeout`.
    fn run(&self, cmd: &CommandSpec, timeout: Duration) -> ProbeOutput;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProbeRunner for SystemRunner {
    fn run(&self, cmd: &CommandSpec, timeout: Duration) -> ProbeOutput {
        let builder = ProcessBuilder::from_spec(cmd);
        tracing::debug!("running `{}`", builder.display_command());
        let output = builder.exec_with_timeout(timeout);
        if output.timed_out {
            tracing::warn!(
                "`{}` timed out after {}s and was terminated",
                builder.display_command(),
                timeout.as_secs()
            );
        }
        output
    }
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Create a process builder from a toolchain command.
    pub fn from_spec(spec: &CommandSpec) -> Self {
        let mut builder = ProcessBuilder::new(&spec.program).args(&spec.args);
        for (key, value) in &spec.env {
            builder = builder.env(key, value);
        }
        if let Some(ref cwd) = spec.cwd {
            builder = builder.cwd(cwd);
        }
        builder
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        // Own process group, so a timeout can take down anything the
        // compiler driver forked.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd
    }

    /// Execute the command, terminating it once `timeout` elapses.
    ///
    /// On timeout the child's whole process group is killed and the child
    /// reaped before returning. Output readers are detached in that case.
    pub fn exec_with_timeout(&self, timeout: Duration) -> ProbeOutput {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ProbeOutput::spawn_failed(format!(
                    "failed to spawn `{}`: {}",
                    self.program.display(),
                    e
                ))
            }
        };

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    terminate(&mut child);
                    return ProbeOutput::timeout();
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    terminate(&mut child);
                    return ProbeOutput::spawn_failed(format!(
                        "failed to wait for `{}`: {}",
                        self.program.display(),
                        e
                    ));
                }
            }
        };

        ProbeOutput {
            status: status.code(),
            stdout: join_reader(stdout),
            stderr: join_reader(stderr),
            timed_out: false,
            spawn_error: None,
        }
    }

    /// Display the command for log and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Kill the child's process group (or just the child off unix) and reap it.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        let pgid = Pid::from_raw(child.id() as i32);
        if let Err(e) = signal::killpg(pgid, Signal::SIGKILL) {
            if e != nix::errno::Errno::ESRCH {
                tracing::debug!("killpg({}) failed: {}", pgid, e);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_exec_captures_stdout() {
        let output = ProcessBuilder::new("echo")
            .arg("hello")
            .exec_with_timeout(Duration::from_secs(10));

        assert!(output.succeeded());
        assert!(output.stdout.contains("hello"));
    }

    #[test]
    #[cfg(unix)]
    fn test_nonzero_exit_is_a_value() {
        let output = ProcessBuilder::new("sh")
            .args(["-c", "echo oops >&2; exit 3"])
            .exec_with_timeout(Duration::from_secs(10));

        assert!(!output.succeeded());
        assert_eq!(output.status, Some(3));
        assert!(output.diagnostic().contains("oops"));
    }

    #[test]
    #[cfg(unix)]
    fn test_timeout_kills_child() {
        let started = Instant::now();
        let output = ProcessBuilder::new("sleep")
            .arg("30")
            .exec_with_timeout(Duration::from_millis(200));

        assert!(output.timed_out);
        assert!(!output.succeeded());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_timeout_kills_forked_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let script = format!("sleep 47 & echo $! > {}; wait; true", pid_file.display());

        let output = ProcessBuilder::new("sh")
            .args(["-c", &script])
            .exec_with_timeout(Duration::from_millis(500));
        assert!(output.timed_out);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let stat = PathBuf::from(format!("/proc/{}/stat", pid.trim()));

        // Dead means gone or a zombie waiting on its new parent.
        let gone = |stat: &Path| match std::fs::read_to_string(stat) {
            Err(_) => true,
            Ok(text) => text
                .rsplit(')')
                .next()
                .map(|rest| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        while !gone(stat.as_path()) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(gone(stat.as_path()), "forked sleep survived the timeout");
    }

    #[test]
    fn test_missing_program_is_a_value() {
        let output = ProcessBuilder::new("berth-definitely-not-a-real-tool")
            .exec_with_timeout(Duration::from_secs(1));

        assert!(output.spawn_error.is_some());
        assert!(!output.succeeded());
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("gcc").args(["-Wall", "-o", "output", "input.c"]);

        assert_eq!(pb.display_command(), "gcc -Wall -o output input.c");
    }
}
