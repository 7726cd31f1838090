//! Vault Secrets Operator install and diagnostics.

use crate::context::EnvContext;
use crate::exec::{CmdSpec, Runner};
use crate::poll::{poll, PollConfig};
use crate::ui;
use anyhow::{anyhow, Result};
use std::time::Duration;

pub const HELM_REPO_NAME: &str = "hashicorp";
pub const HELM_REPO_URL: &str = "https://helm.releases.hashicorp.com";
pub const HELM_CHART: &str = "hashicorp/vault-secrets-operator";
pub const RELEASE_NAME: &str = "vault-secrets-operator";
pub const OPERATOR_NAMESPACE: &str = "vault-secrets-operator-system";
pub const STATIC_SECRET_CRD: &str = "vaultstaticsecrets.secrets.hashicorp.com";
pub const AUTH_ROLE: &str = "vso-demo-role";

/// Installer deployment names differ across chart versions; probe in order
/// and accept the first that exists.
pub const DEPLOYMENT_CANDIDATES: &[&str] = &[
    "vault-secrets-operator-controller-manager",
    "vault-secrets-operator",
];

/// Timings for install convergence. Tests shrink these to milliseconds.
#[derive(Debug, Clone)]
pub struct InstallTimings {
    pub crd_poll: PollConfig,
    /// Best-effort wait when no candidate deployment name matches.
    pub unresolved_grace: Duration,
    pub rollout_timeout: Duration,
}

impl Default for InstallTimings {
    fn default() -> Self {
        InstallTimings {
            crd_poll: PollConfig::new(Duration::from_secs(5), Duration::from_secs(60)),
            unresolved_grace: Duration::from_secs(15),
            rollout_timeout: Duration::from_secs(120),
        }
    }
}

/// Install or upgrade the operator release bound to `vault_addr`, then wait
/// for its control surface. CRD registration never converging is fatal: no
/// later step can succeed without it.
pub fn install(
    runner: &dyn Runner,
    ctx: &EnvContext,
    vault_addr: &str,
    timings: &InstallTimings,
) -> Result<()> {
    ui::info(format!("registering helm repo {HELM_REPO_NAME}"));
    // --force-update makes re-registration a no-op by helm's own contract.
    let add = runner.run(&CmdSpec::new(
        "helm",
        ["repo", "add", HELM_REPO_NAME, HELM_REPO_URL, "--force-update"],
    ))?;
    if !add.success() {
        return Err(anyhow!("helm repo add failed: {}", add.stderr_line()));
    }
    let update = runner.run(&CmdSpec::new(
        "helm",
        ["repo", "update", HELM_REPO_NAME],
    ))?;
    if !update.success() {
        return Err(anyhow!("helm repo update failed: {}", update.stderr_line()));
    }

    ui::info(format!("installing {RELEASE_NAME} (vault at {vault_addr})"));
    let addr_value = format!("defaultVaultConnection.address={vault_addr}");
    let role_value = format!("defaultAuthMethod.kubernetes.role={AUTH_ROLE}");
    let upgrade = runner.run(&CmdSpec::new(
        "helm",
        [
            "upgrade",
            "--install",
            RELEASE_NAME,
            HELM_CHART,
            "-n",
            OPERATOR_NAMESPACE,
            "--create-namespace",
            "--set",
            "defaultVaultConnection.enabled=true",
            "--set",
            addr_value.as_str(),
            "--set",
            "defaultAuthMethod.enabled=true",
            "--set",
            role_value.as_str(),
        ],
    ))?;
    if !upgrade.success() {
        return Err(anyhow!(
            "helm upgrade --install {RELEASE_NAME} failed: {}",
            upgrade.stderr_line()
        ));
    }

    match resolve_deployment(runner, ctx)? {
        Some(name) => {
            ui::info(format!("waiting for rollout of deployment/{name}"));
            let target = format!("deployment/{name}");
            let timeout_flag = format!("--timeout={}s", timings.rollout_timeout.as_secs());
            let rollout = runner.run(&ctx.kubectl([
                "rollout",
                "status",
                target.as_str(),
                "-n",
                OPERATOR_NAMESPACE,
                timeout_flag.as_str(),
            ]))?;
            if !rollout.success() {
                return Err(anyhow!(
                    "operator deployment {name} never became ready: {}",
                    rollout.stderr_line()
                ));
            }
        }
        None => {
            ui::warn(format!(
                "no known operator deployment name found; waiting {}s and continuing best-effort",
                timings.unresolved_grace.as_secs()
            ));
            std::thread::sleep(timings.unresolved_grace);
        }
    }

    ui::info("waiting for operator CRDs to register");
    let outcome = poll("operator CRDs", timings.crd_poll, || {
        crd_present(runner, ctx).unwrap_or(false)
    });
    if !outcome.satisfied() {
        return Err(anyhow!(
            "operator CRD {STATIC_SECRET_CRD} never registered within {}s; \
             inspect with: kubectl get crds | grep hashicorp",
            timings.crd_poll.timeout.as_secs()
        ));
    }

    ui::ok("vault-secrets-operator installed");
    Ok(())
}

/// Probe the candidate list; first existing deployment wins.
pub fn resolve_deployment(runner: &dyn Runner, ctx: &EnvContext) -> Result<Option<String>> {
    for &candidate in DEPLOYMENT_CANDIDATES {
        let probe = runner.run(&ctx.kubectl([
            "get",
            "deployment",
            candidate,
            "-n",
            OPERATOR_NAMESPACE,
        ]))?;
        if probe.success() {
            return Ok(Some(candidate.to_string()));
        }
    }
    Ok(None)
}

pub fn crd_present(runner: &dyn Runner, ctx: &EnvContext) -> Result<bool> {
    let probe = runner.run(&ctx.kubectl(["get", "crd", STATIC_SECRET_CRD]))?;
    Ok(probe.success())
}

/// Read-only `check-vso` diagnostics.
pub fn check(runner: &dyn Runner, ctx: &EnvContext) -> Result<()> {
    if crd_present(runner, ctx)? {
        ui::ok(format!("CRD {STATIC_SECRET_CRD} is registered"));
    } else {
        ui::warn(format!("CRD {STATIC_SECRET_CRD} is not registered"));
    }

    match resolve_deployment(runner, ctx)? {
        Some(name) => ui::ok(format!("operator deployment present: {name}")),
        None => ui::warn("operator deployment not found under any known name"),
    }

    let pods = runner.run(&ctx.kubectl(["get", "pods", "-n", OPERATOR_NAMESPACE]))?;
    if pods.success() {
        println!("{}", pods.stdout_trim());
    } else {
        ui::warn(format!(
            "cannot list pods in {OPERATOR_NAMESPACE}: {}",
            pods.stderr_line()
        ));
    }
    Ok(())
}
