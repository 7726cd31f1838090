//! Severity-tagged operator output and interactive prompts.
//!
//! Step-by-step diagnostics go to stdout with a severity prefix so transcript
//! readers can grep a run. Structured timing data goes through `tracing`
//! instead.

use anyhow::{Context, Result};
use std::fmt::Display;
use std::io::{BufRead, Write};

pub fn info(msg: impl Display) {
    println!("[INFO] {msg}");
}

pub fn ok(msg: impl Display) {
    println!("[OK] {msg}");
}

pub fn warn(msg: impl Display) {
    println!("[WARN] {msg}");
}

pub fn error(msg: impl Display) {
    println!("[ERROR] {msg}");
}

/// Yes/no confirmation injected into components so decision logic stays
/// testable without a terminal.
pub type Confirm<'a> = &'a dyn Fn(&str) -> Result<bool>;

/// Free-text prompt used to collect missing credentials.
pub type Prompt<'a> = &'a dyn Fn(&str) -> Result<String>;

/// Read a y/n answer from stdin. Anything other than `y`/`yes` is a no.
pub fn confirm_stdin(question: &str) -> Result<bool> {
    let answer = read_line(&format!("{question} [y/N]: "))?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Read one line of input for `label`, trimmed.
pub fn prompt_stdin(label: &str) -> Result<String> {
    read_line(&format!("{label}: "))
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    std::io::stdout().flush().context("flush prompt")?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read interactive input")?;
    Ok(line.trim().to_string())
}
