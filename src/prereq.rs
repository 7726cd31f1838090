//! Pre-flight checks run before any mutating step.

use crate::context::EnvContext;
use crate::exec::Runner;
use crate::operator;
use anyhow::Result;

/// CLIs every command path depends on.
pub const REQUIRED_TOOLS: &[&str] = &["kubectl", "vault", "helm"];

/// Tool-presence seam over `which` so checks are testable.
pub type ToolLookup<'a> = &'a dyn Fn(&str) -> bool;

pub fn tool_on_path(tool: &str) -> bool {
    which::which(tool).is_ok()
}

#[derive(Debug, PartialEq, Eq)]
pub enum PrereqStatus {
    Ready,
    MissingTool(String),
    NoClusterConnectivity,
    OperatorNotInstalled,
}

/// Probe tools, cluster reachability, then operator presence, in that order.
/// The first failing probe wins; later probes are skipped since they would
/// fail for the same underlying reason.
pub fn check(runner: &dyn Runner, ctx: &EnvContext, lookup: ToolLookup) -> Result<PrereqStatus> {
    for tool in required_tools(ctx) {
        if !lookup(&tool) {
            return Ok(PrereqStatus::MissingTool(tool));
        }
    }

    let cluster = runner.run(&ctx.kubectl(["cluster-info"]))?;
    if !cluster.success() {
        return Ok(PrereqStatus::NoClusterConnectivity);
    }

    let crd = runner.run(&ctx.kubectl(["get", "crd", operator::STATIC_SECRET_CRD]))?;
    if !crd.success() {
        return Ok(PrereqStatus::OperatorNotInstalled);
    }

    Ok(PrereqStatus::Ready)
}

fn required_tools(ctx: &EnvContext) -> Vec<String> {
    let mut tools: Vec<String> = REQUIRED_TOOLS.iter().map(|t| t.to_string()).collect();
    // A kubectl override replaces the stock binary probe with its own argv[0].
    if ctx.kubectl[0] != "kubectl" {
        tools[0] = ctx.kubectl[0].clone();
    }
    tools
}
