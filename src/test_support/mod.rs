//! Test utilities and mocks for berth unit tests.
//!
//! The resolver only reaches the outside world through
//! [`ProbeRunner`](crate::util::process::ProbeRunner), so most tests drive it
//! with a [`MockRunner`] that answers commands from canned outputs, together
//! with fake installation trees from [`fixtures`].
//!
//! # Example
//!
//! ```rust,ignore
//! use berth::test_support::{MockRunner, InstallTree};
//!
//! #[test]
//! fn test_example() {
//!     let tree = InstallTree::new().header("include/zlib.h", "").library("libz.a");
//!     let runner = MockRunner::new().compile_succeeds().link_succeeds_with("libz.a");
//!     // Resolve against tree.root() using runner...
//! }
//! ```

pub mod fixtures;

use std::sync::Mutex;
use std::time::Duration;

use crate::builder::toolchain::CommandSpec;
use crate::util::process::{ProbeOutput, ProbeRunner};

pub use fixtures::*;

/// Pattern for matching commands in [`MockRunner`].
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command contains substring.
    Contains(String),
    /// Match using a regex pattern.
    Regex(String),
    /// Match any command.
    Any,
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
            CommandPattern::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(cmd))
                .unwrap_or(false),
            CommandPattern::Any => true,
        }
    }
}

/// Expectation for a command execution.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    /// Pattern to match against commands.
    pub pattern: CommandPattern,
    /// Output to return when matched.
    pub output: ProbeOutput,
    /// Number of times this expectation can be used (None = unlimited).
    pub times: Option<usize>,
    /// Number of times this expectation has been used.
    pub used: usize,
}

impl CommandExpectation {
    /// Create a new expectation.
    pub fn new(pattern: CommandPattern, output: ProbeOutput) -> Self {
        CommandExpectation {
            pattern,
            output,
            times: None,
            used: 0,
        }
    }

    /// Set the number of times this expectation can be used.
    pub fn times(mut self, n: usize) -> Self {
        self.times = Some(n);
        self
    }

    /// Check if this expectation can still be used.
    pub fn available(&self) -> bool {
        match self.times {
            Some(n) => self.used < n,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    expectations: Vec<CommandExpectation>,
    calls: Vec<String>,
    sources: Vec<String>,
}

/// Mock probe runner.
///
/// Expectations are tried in the order they were added; the first available
/// match answers. Unmatched commands fail like a missing program, which is
/// what the resolver would see on a host without the tool.
#[derive(Debug, Default)]
pub struct MockRunner {
    state: Mutex<MockState>,
    default_output: Option<ProbeOutput>,
}

impl MockRunner {
    /// Create a new mock runner with no expectations.
    pub fn new() -> Self {
        MockRunner::default()
    }

    /// Add a custom expectation.
    pub fn expect(self, expectation: CommandExpectation) -> Self {
        self.lock().expectations.push(expectation);
        self
    }

    /// Answer commands containing `substring` with a successful run printing `stdout`.
    pub fn expect_contains(self, substring: &str, stdout: impl Into<String>) -> Self {
        self.expect(CommandExpectation::new(
            CommandPattern::Contains(substring.to_string()),
            ProbeOutput::success(stdout),
        ))
    }

    /// Answer commands matching `pattern` with a successful run printing `stdout`.
    pub fn expect_regex(self, pattern: &str, stdout: impl Into<String>) -> Self {
        self.expect(CommandExpectation::new(
            CommandPattern::Regex(pattern.to_string()),
            ProbeOutput::success(stdout),
        ))
    }

    /// Answer commands containing `substring` with a failed run.
    pub fn fail_contains(self, substring: &str, stderr: impl Into<String>) -> Self {
        self.expect(CommandExpectation::new(
            CommandPattern::Contains(substring.to_string()),
            ProbeOutput::failure(1, stderr),
        ))
    }

    /// Let every compile-only (`-c`) command succeed.
    pub fn compile_succeeds(self) -> Self {
        self.expect(CommandExpectation::new(
            CommandPattern::Regex(r"\s-c\s".to_string()),
            ProbeOutput::success(""),
        ))
    }

    /// Let link commands mentioning `library` succeed.
    pub fn link_succeeds_with(self, library: &str) -> Self {
        self.expect_contains(library, "")
    }

    /// Set the output for commands that don't match any expectation.
    pub fn with_default(mut self, output: ProbeOutput) -> Self {
        self.default_output = Some(output);
        self
    }

    /// All commands that were run, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Commands that were run and contain `substring`.
    pub fn calls_containing(&self, substring: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.contains(substring))
            .collect()
    }

    /// Contents of the source files passed to commands, in order.
    pub fn sources(&self) -> Vec<String> {
        self.lock().sources.clone()
    }

    /// Verify that all expectations with a specific count were satisfied.
    pub fn verify(&self) -> Result<(), String> {
        for (i, exp) in self.lock().expectations.iter().enumerate() {
            if let Some(expected) = exp.times {
                if exp.used != expected {
                    return Err(format!(
                        "expectation {} was used {} times, expected {}",
                        i, exp.used, expected
                    ));
                }
            }
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProbeRunner for MockRunner {
    fn run(&self, cmd: &CommandSpec, _timeout: Duration) -> ProbeOutput {
        let full_cmd = cmd.display();
        let mut state = self.lock();
        state.calls.push(full_cmd.clone());
        // Sources are deleted with their temporary directory, so keep a copy.
        for arg in cmd.args.iter().filter(|a| a.contains("berth-probe")) {
            if let Ok(source) = std::fs::read_to_string(arg) {
                state.sources.push(source);
            }
        }

        for exp in &mut state.expectations {
            if exp.pattern.matches(&full_cmd) && exp.available() {
                exp.used += 1;
                return exp.output.clone();
            }
        }

        match self.default_output {
            Some(ref output) => output.clone(),
            None => ProbeOutput::spawn_failed(format!("unexpected command: {}", full_cmd)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_pattern_matching() {
        assert!(CommandPattern::Exact("cc --version".into()).matches("cc --version"));
        assert!(CommandPattern::StartsWith("hipcc".into()).matches("hipcc -c probe.hip"));
        assert!(CommandPattern::Contains("rocminfo".into()).matches("/opt/rocm/bin/rocminfo"));
        assert!(CommandPattern::Regex(r"^cc\s".into()).matches("cc -E probe.c"));
        assert!(CommandPattern::Any.matches("anything"));
    }

    #[test]
    fn test_first_expectation_wins() {
        let runner = MockRunner::new()
            .expect_contains("rocminfo", "Name: gfx90a")
            .expect_contains("rocm", "unused");

        let out = runner.run(&CommandSpec::new("/opt/rocm/bin/rocminfo"), Duration::ZERO);
        assert_eq!(out.stdout, "Name: gfx90a");
        assert_eq!(runner.calls(), vec!["/opt/rocm/bin/rocminfo".to_string()]);
    }

    #[test]
    fn test_unmatched_command_fails_softly() {
        let runner = MockRunner::new();
        let out = runner.run(&CommandSpec::new("hipconfig").arg("--platform"), Duration::ZERO);
        assert!(!out.succeeded());
        assert!(out.diagnostic().contains("unexpected command"));
    }

    #[test]
    fn test_limited_expectation() {
        let runner = MockRunner::new().expect(
            CommandExpectation::new(CommandPattern::Any, ProbeOutput::success("once")).times(1),
        );
        assert!(runner.run(&CommandSpec::new("a"), Duration::ZERO).succeeded());
        assert!(!runner.run(&CommandSpec::new("b"), Duration::ZERO).succeeded());
        assert!(runner.verify().is_ok());
    }
}
