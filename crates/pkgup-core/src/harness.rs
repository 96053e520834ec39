//! Scoped child processes.
//!
//! Every external tool the engine touches goes through [`Harness`]: stdin
//! and stdout are always piped, stderr is configurable, the child's
//! environment starts from a fresh copy of the parent's, and termination is
//! reported as a typed [`Termination`]. A harness that was not explicitly
//! waited on reaps its child when dropped, so no zombie can escape a scope.

use std::collections::BTreeMap;
use std::env;
use std::io;
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

/// How a terminated child went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled { signal: i32, coredumped: bool },
}

/// What to do with the child's stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StderrAction {
    #[default]
    Inherit,
    /// The child writes to the bit bucket.
    Close,
    Pipe,
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("failed to spawn `{cmdline}`: {source}")]
    SpawnFailed {
        cmdline: String,
        #[source]
        source: io::Error,
    },
    #[error("`{cmdline}` died of signal {signal}")]
    DiedOfSignal {
        cmdline: String,
        signal: i32,
        coredumped: bool,
    },
    #[error("`{cmdline}` exited with status {status}")]
    ExitNonZero { cmdline: String, status: i32 },
    #[error("stream {stream} of `{cmdline}` is not available")]
    StreamUnavailable {
        cmdline: String,
        stream: &'static str,
    },
    #[error("failed waiting for `{cmdline}`: {source}")]
    Wait {
        cmdline: String,
        #[source]
        source: io::Error,
    },
}

/// Reconstruct a command line for diagnostics. Arguments containing
/// whitespace are double-quoted with `"` escaped as `\"`.
pub fn stringify_argv<'a>(argv: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for arg in argv {
        if !out.is_empty() {
            out.push(' ');
        }
        if arg.contains(char::is_whitespace) {
            out.push('"');
            for c in arg.chars() {
                if c == '"' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        } else {
            out.push_str(arg);
        }
    }
    out
}

/// Configuration for a [`Harness`] spawn.
pub struct HarnessBuilder {
    cmd: String,
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    env_mod: Option<Box<dyn FnOnce(&mut BTreeMap<String, String>) + Send>>,
    stderr: StderrAction,
}

impl HarnessBuilder {
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Mutate a fresh copy of the parent environment; the result becomes
    /// the child's environment.
    pub fn modify_env(
        mut self,
        f: impl FnOnce(&mut BTreeMap<String, String>) + Send + 'static,
    ) -> Self {
        self.env_mod = Some(Box::new(f));
        self
    }

    pub fn stderr(mut self, action: StderrAction) -> Self {
        self.stderr = action;
        self
    }

    pub fn spawn(self) -> Result<Harness, HarnessError> {
        let cmdline = stringify_argv(
            std::iter::once(self.cmd.as_str()).chain(self.argv.iter().map(String::as_str)),
        );

        let mut envs: BTreeMap<String, String> = env::vars().collect();
        if let Some(f) = self.env_mod {
            f(&mut envs);
        }

        let mut command = Command::new(&self.cmd);
        command.args(&self.argv);
        command.env_clear();
        command.envs(&envs);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(match self.stderr {
            StderrAction::Inherit => Stdio::inherit(),
            StderrAction::Close => Stdio::null(),
            StderrAction::Pipe => Stdio::piped(),
        });

        let mut child = command
            .spawn()
            .map_err(|source| HarnessError::SpawnFailed {
                cmdline: cmdline.clone(),
                source,
            })?;
        let stdin = child.stdin.take();
        Ok(Harness {
            cmdline,
            child,
            stdin,
            status: None,
        })
    }
}

/// A spawned child process with piped stdin/stdout.
#[derive(Debug)]
pub struct Harness {
    cmdline: String,
    child: Child,
    stdin: Option<ChildStdin>,
    status: Option<Termination>,
}

impl Harness {
    pub fn builder(cmd: impl Into<String>) -> HarnessBuilder {
        HarnessBuilder {
            cmd: cmd.into(),
            argv: Vec::new(),
            cwd: None,
            env_mod: None,
            stderr: StderrAction::default(),
        }
    }

    /// The reconstructed command line, for diagnostics.
    pub fn cmdline(&self) -> &str {
        &self.cmdline
    }

    /// Take the writer connected to the child's stdin. Dropping it closes
    /// the pipe, which a child reading to EOF requires.
    pub fn stdin(&mut self) -> Result<ChildStdin, HarnessError> {
        self.stdin
            .take()
            .ok_or_else(|| HarnessError::StreamUnavailable {
                cmdline: self.cmdline.clone(),
                stream: "stdin",
            })
    }

    /// Take the reader connected to the child's stdout.
    pub fn stdout(&mut self) -> Result<ChildStdout, HarnessError> {
        self.child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::StreamUnavailable {
                cmdline: self.cmdline.clone(),
                stream: "stdout",
            })
    }

    /// Take the reader connected to the child's stderr; only available
    /// after spawning with [`StderrAction::Pipe`].
    pub fn stderr(&mut self) -> Result<ChildStderr, HarnessError> {
        self.child
            .stderr
            .take()
            .ok_or_else(|| HarnessError::StreamUnavailable {
                cmdline: self.cmdline.clone(),
                stream: "stderr",
            })
    }

    /// Block until the child terminates; the status is cached, so further
    /// calls return immediately. Waiting closes the child's stdin.
    pub fn wait(&mut self) -> Result<Termination, HarnessError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        drop(self.stdin.take());
        let status = self.child.wait().map_err(|source| HarnessError::Wait {
            cmdline: self.cmdline.clone(),
            source,
        })?;
        let termination = termination_of(&status);
        self.status = Some(termination);
        Ok(termination)
    }

    /// As [`Self::wait`], but a signal death is an error.
    pub fn wait_exit(&mut self) -> Result<i32, HarnessError> {
        match self.wait()? {
            Termination::Exited(code) => Ok(code),
            Termination::Signaled { signal, coredumped } => Err(HarnessError::DiedOfSignal {
                cmdline: self.cmdline.clone(),
                signal,
                coredumped,
            }),
        }
    }

    /// As [`Self::wait_exit`], but a non-zero exit is also an error.
    pub fn wait_success(&mut self) -> Result<(), HarnessError> {
        match self.wait_exit()? {
            0 => Ok(()),
            status => Err(HarnessError::ExitNonZero {
                cmdline: self.cmdline.clone(),
                status,
            }),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if self.status.is_some() {
            return;
        }
        // Destructors cannot propagate; reap and record. Call sites that
        // must observe the status wait explicitly.
        match self.wait() {
            Ok(Termination::Exited(0)) => {}
            Ok(status) => {
                tracing::warn!(cmdline = %self.cmdline, ?status, "child reaped with abnormal status");
            }
            Err(err) => {
                tracing::warn!(cmdline = %self.cmdline, %err, "failed to reap child");
            }
        }
    }
}

#[cfg(unix)]
fn termination_of(status: &ExitStatus) -> Termination {
    match status.code() {
        Some(code) => Termination::Exited(code),
        None => Termination::Signaled {
            signal: status.signal().unwrap_or(0),
            coredumped: status.core_dumped(),
        },
    }
}

#[cfg(not(unix))]
fn termination_of(status: &ExitStatus) -> Termination {
    Termination::Exited(status.code().unwrap_or(-1))
}
