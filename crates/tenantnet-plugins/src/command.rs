//! External command execution
//!
//! Every OS-level network change goes through a [`CommandRunner`]. The host
//! runner shells out with a deadline; the mock records calls and fails on
//! demand so setup/teardown ordering can be tested without touching the OS.

use crate::error::CommandError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Runs one external command, returning its output lines
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<String>, CommandError>;
}

/// Render a command line for logs and errors
pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

fn lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}

/// Runs commands on the host
pub struct HostCommandRunner {
    timeout: Duration,
}

impl HostCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for HostCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<String>, CommandError> {
        let command = command_line(program, args);
        debug!("exec: {}", command);

        let child = Command::new(program).args(args).kill_on_drop(true).output();
        let output = match tokio::time::timeout(self.timeout, child).await {
            Err(_) => {
                return Err(CommandError::Timeout {
                    command,
                    timeout: self.timeout,
                })
            }
            Ok(Err(source)) => return Err(CommandError::Spawn { command, source }),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            Ok(lines(&output.stdout))
        } else {
            let mut combined = lines(&output.stdout);
            combined.extend(lines(&output.stderr));
            Err(CommandError::Failed {
                command,
                status: output.status.code(),
                output: combined,
            })
        }
    }
}

/// Scripted runner for tests
///
/// Responses and failures are matched by command-line prefix, first match wins.
pub struct MockCommandRunner {
    calls: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, Vec<String>)>>,
    failures: Mutex<Vec<(String, Vec<String>)>>,
    fail_call: Mutex<Option<usize>>,
    timeout_call: Mutex<Option<(usize, Duration)>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            fail_call: Mutex::new(None),
            timeout_call: Mutex::new(None),
        }
    }

    /// Return `output` for commands starting with `prefix`
    pub fn respond(&self, prefix: &str, output: &[&str]) {
        self.responses
            .lock()
            .push((prefix.to_string(), output.iter().map(|s| s.to_string()).collect()));
    }

    /// Fail every command starting with `prefix`
    pub fn fail_on(&self, prefix: &str) {
        self.fail_on_with(prefix, &["injected failure"]);
    }

    /// Fail every command starting with `prefix`, reporting `output`
    pub fn fail_on_with(&self, prefix: &str, output: &[&str]) {
        self.failures
            .lock()
            .push((prefix.to_string(), output.iter().map(|s| s.to_string()).collect()));
    }

    /// Fail only the `index`-th call (0-based)
    pub fn fail_call(&self, index: usize) {
        *self.fail_call.lock() = Some(index);
    }

    /// Report the `index`-th call (0-based) as having missed `timeout`
    pub fn time_out_call(&self, index: usize, timeout: Duration) {
        *self.timeout_call.lock() = Some((index, timeout));
    }

    /// Every command line run so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of commands run so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl Default for MockCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<String>, CommandError> {
        let command = command_line(program, args);
        let index = {
            let mut calls = self.calls.lock();
            calls.push(command.clone());
            calls.len() - 1
        };

        if let Some((at, timeout)) = *self.timeout_call.lock() {
            if at == index {
                return Err(CommandError::Timeout { command, timeout });
            }
        }

        let failure = if *self.fail_call.lock() == Some(index) {
            Some(vec!["injected failure".to_string()])
        } else {
            self.failures
                .lock()
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map(|(_, output)| output.clone())
        };
        if let Some(output) = failure {
            return Err(CommandError::Failed {
                command,
                status: Some(1),
                output,
            });
        }

        Ok(self
            .responses
            .lock()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}
