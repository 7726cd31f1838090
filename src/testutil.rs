//! Shared test doubles for step logic.

use crate::exec::{CmdOutput, CmdSpec, Runner};
use anyhow::Result;
use std::cell::RefCell;

/// Scripted [`Runner`]: matches invocations by substring of the rendered
/// command line and replays canned output. Unmatched commands succeed with
/// empty output, which keeps happy-path scripts short.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, CmdOutput)>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        ScriptedRunner {
            rules: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Succeed with `stdout` for command lines containing `needle`.
    pub fn ok_on(mut self, needle: &str, stdout: &str) -> Self {
        self.rules.push((needle.to_string(), output(0, stdout, "")));
        self
    }

    /// Fail with `code`/`stderr` for command lines containing `needle`.
    pub fn fail_on(mut self, needle: &str, code: i32, stderr: &str) -> Self {
        self.rules.push((needle.to_string(), output(code, "", stderr)));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn called(&self, needle: &str) -> bool {
        self.calls.borrow().iter().any(|line| line.contains(needle))
    }

    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl Runner for ScriptedRunner {
    fn run(&self, spec: &CmdSpec) -> Result<CmdOutput> {
        let line = spec.display_line();
        self.calls.borrow_mut().push(line.clone());
        for (needle, canned) in &self.rules {
            if line.contains(needle.as_str()) {
                return Ok(canned.clone());
            }
        }
        Ok(output(0, "", ""))
    }
}

fn output(code: i32, stdout: &str, stderr: &str) -> CmdOutput {
    CmdOutput {
        code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}
