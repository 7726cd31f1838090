//! Integration tests for the vsodemo binary surface.
//!
//! These drive the built binary directly and only exercise paths that need
//! no cluster, no Vault, and no network: usage handling and the fatal
//! missing-tool path.

use std::process::Command;

fn vsodemo() -> Command {
    Command::new(env!("CARGO_BIN_EXE_vsodemo"))
}

#[test]
fn no_arguments_prints_usage_and_exits_nonzero() {
    let output = vsodemo().output().expect("run vsodemo");
    assert!(!output.status.success());
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("Usage"), "expected usage text, got:\n{text}");
    assert!(text.contains("setup-all"));
}

#[test]
fn unrecognized_subcommand_exits_nonzero() {
    let output = vsodemo().arg("frobnicate").output().expect("run vsodemo");
    assert!(!output.status.success());
}

#[test]
fn help_lists_every_subcommand() {
    let output = vsodemo().arg("--help").output().expect("run vsodemo");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout).to_string();
    for name in [
        "deploy",
        "deploy-with-ingress",
        "setup-all",
        "install-vso",
        "configure-vault",
        "check-vso",
        "fix-image",
        "cleanup",
        "status",
    ] {
        assert!(text.contains(name), "help missing {name}:\n{text}");
    }
}

#[test]
fn missing_tools_make_deploy_fatal() {
    // An empty PATH guarantees kubectl cannot be found, which must abort
    // before any mutating step and name the missing tool.
    let empty_dir = tempfile::tempdir().expect("tempdir");
    let output = vsodemo()
        .arg("deploy")
        .env("PATH", empty_dir.path())
        .env("VAULT_ADDR", "http://localhost:8200")
        .env("VAULT_TOKEN", "test-token")
        .output()
        .expect("run vsodemo");
    assert!(!output.status.success());
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("[ERROR]"), "expected tagged error, got:\n{text}");
    assert!(text.contains("kubectl"), "expected the missing tool name:\n{text}");
}
