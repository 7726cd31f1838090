//! External command execution.
//!
//! Every mutation of a collaborator control plane (kubectl, vault, helm,
//! docker, terraform, aws) goes through [`Runner::run`]. A non-zero exit is
//! data for the caller to branch on, never an `Err`; `Err` is reserved for
//! failing to launch the process at all.

use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Instant;

/// Captured result of one collaborator CLI invocation.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_trim(&self) -> &str {
        self.stdout.trim()
    }

    /// First non-empty stderr line, for compact error messages.
    pub fn stderr_line(&self) -> &str {
        self.stderr
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
    }
}

/// One command to run: program, args, extra environment, optional stdin.
#[derive(Debug, Clone)]
pub struct CmdSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub stdin: Option<String>,
}

impl CmdSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CmdSpec {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
            stdin: None,
        }
    }

    /// Build from an argv whose first element is the program, e.g. a
    /// shell-words-parsed `VSODEMO_KUBECTL` override.
    pub fn from_argv<I, S>(argv: &[String], extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args: Vec<String> = argv[1..].to_vec();
        args.extend(extra.into_iter().map(Into::into));
        CmdSpec {
            program: argv[0].clone(),
            args,
            envs: Vec::new(),
            stdin: None,
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn stdin(mut self, input: &str) -> Self {
        self.stdin = Some(input.to_string());
        self
    }

    /// Rendered `program arg...` line for logs and error messages.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Seam between step logic and the real system. Tests substitute a scripted
/// implementation; production uses [`SystemRunner`].
pub trait Runner {
    fn run(&self, spec: &CmdSpec) -> Result<CmdOutput>;
}

/// Runs commands synchronously on the host.
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, spec: &CmdSpec) -> Result<CmdOutput> {
        let start = Instant::now();
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        for (key, value) in &spec.envs {
            command.env(key, value);
        }

        let output = if let Some(input) = &spec.stdin {
            let mut child = command
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .with_context(|| format!("spawn {}", spec.program))?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .with_context(|| format!("write stdin to {}", spec.program))?;
            }
            child
                .wait_with_output()
                .with_context(|| format!("wait for {}", spec.program))?
        } else {
            command
                .output()
                .with_context(|| format!("run {}", spec.program))?
        };

        let elapsed_ms = start.elapsed().as_millis();
        tracing::debug!(
            elapsed_ms,
            command = %spec.display_line(),
            code = output.status.code(),
            "command complete"
        );

        Ok(CmdOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
