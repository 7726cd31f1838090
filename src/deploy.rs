//! Workload deployment: fixed-order manifest application and teardown.

use crate::context::EnvContext;
use crate::exec::{CmdOutput, CmdSpec, Runner};
use crate::manifests;
use crate::operator::{OPERATOR_NAMESPACE, RELEASE_NAME};
use crate::ui;
use anyhow::{anyhow, Result};
use std::time::Duration;

/// Grace period after applying sync manifests so the operator's first
/// reconcile lands before readiness checks. A heuristic, not a guarantee.
pub const SYNC_GRACE: Duration = Duration::from_secs(10);

/// Apply namespace/identity, connection, auth binding, sync intents, then
/// the workload and its service, substituting runtime parameters as we go.
/// The workload image comes from the context; `fix-image` repoints a live
/// deployment at a pushed reference separately.
pub fn deploy(
    runner: &dyn Runner,
    ctx: &EnvContext,
    vault_addr: &str,
    sync_grace: Duration,
) -> Result<()> {
    let ns = ctx.namespace.as_str();
    let image = ctx.image_tag.as_str();

    ui::info(format!("applying namespace and service accounts ({ns})"));
    apply(runner, ctx, &manifests::render(manifests::NAMESPACE, &[("NAMESPACE", ns)])?)?;

    ui::info("applying vault connection");
    apply(
        runner,
        ctx,
        &manifests::render(
            manifests::VAULT_CONNECTION,
            &[("NAMESPACE", ns), ("VAULT_ADDR", vault_addr)],
        )?,
    )?;

    ui::info("applying vault auth binding");
    apply(runner, ctx, &manifests::render(manifests::VAULT_AUTH, &[("NAMESPACE", ns)])?)?;

    ui::info("applying secret sync intents");
    apply(runner, ctx, &manifests::render(manifests::STATIC_SECRETS, &[("NAMESPACE", ns)])?)?;
    ui::info(format!(
        "allowing {}s for the operator's first sync",
        sync_grace.as_secs()
    ));
    std::thread::sleep(sync_grace);

    ui::info(format!("applying workload (image {image})"));
    apply(
        runner,
        ctx,
        &manifests::render(manifests::DEPLOYMENT, &[("NAMESPACE", ns), ("IMAGE", image)])?,
    )?;

    ui::info("applying service");
    apply(runner, ctx, &manifests::render(manifests::SERVICE, &[("NAMESPACE", ns)])?)?;

    ui::ok("workload manifests applied");
    Ok(())
}

/// `kubectl apply -f -` with the rendered document on stdin.
pub fn apply(runner: &dyn Runner, ctx: &EnvContext, rendered: &str) -> Result<CmdOutput> {
    let output = runner.run(&ctx.kubectl(["apply", "-f", "-"]).stdin(rendered))?;
    if !output.success() {
        return Err(anyhow!("kubectl apply failed: {}", output.stderr_line()));
    }
    Ok(output)
}

/// Delete the demo namespace (and with it every namespaced resource), then
/// optionally uninstall the operator. The operator may serve other demos,
/// so its removal is a separate confirmed choice.
pub fn cleanup(runner: &dyn Runner, ctx: &EnvContext, confirm: ui::Confirm) -> Result<()> {
    let ns = ctx.namespace.as_str();
    if !confirm(&format!("Delete namespace {ns} and everything in it?"))? {
        ui::info("cleanup aborted; nothing deleted");
        return Ok(());
    }

    ui::info(format!("deleting namespace {ns}"));
    let delete = runner.run(&ctx.kubectl([
        "delete",
        "namespace",
        ns,
        "--ignore-not-found",
        "--wait=true",
        "--timeout=120s",
    ]))?;
    if !delete.success() {
        return Err(anyhow!(
            "namespace deletion failed: {}",
            delete.stderr_line()
        ));
    }

    let cluster_binding = runner.run(&ctx.kubectl([
        "delete",
        "clusterrolebinding",
        "vso-demo-vault-auth-delegator",
        "--ignore-not-found",
    ]))?;
    if !cluster_binding.success() {
        ui::warn(format!(
            "could not delete auth-delegator binding: {}",
            cluster_binding.stderr_line()
        ));
    }

    if confirm(&format!("Also uninstall {RELEASE_NAME}?"))? {
        let uninstall = runner.run(&CmdSpec::new(
            "helm",
            ["uninstall", RELEASE_NAME, "-n", OPERATOR_NAMESPACE],
        ))?;
        if !uninstall.success() {
            ui::warn(format!(
                "helm uninstall failed: {}",
                uninstall.stderr_line()
            ));
        }
    }

    ui::ok("cleanup complete");
    Ok(())
}
