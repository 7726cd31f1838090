//! Command compositions. The only module aware of full step order; every
//! step below re-derives its own preconditions, so a re-run converges
//! forward instead of duplicating work.

use crate::context::{self, EnvContext, EnvLookup, VaultEnv};
use crate::deploy;
use crate::exec::Runner;
use crate::image;
use crate::ingress;
use crate::operator::{self, InstallTimings};
use crate::poll::PollConfig;
use crate::prereq::{self, PrereqStatus, ToolLookup};
use crate::report::{self, HttpProbe};
use crate::ui::{Confirm, Prompt};
use crate::vault;
use anyhow::{anyhow, Result};
use std::time::Duration;

/// Convergence timings, overridable so tests run in milliseconds.
#[derive(Debug, Clone)]
pub struct Timings {
    pub install: InstallTimings,
    pub sync_grace: Duration,
    pub lb_poll: PollConfig,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            install: InstallTimings::default(),
            sync_grace: deploy::SYNC_GRACE,
            lb_poll: ingress::default_poll(),
        }
    }
}

/// Everything one invocation needs: the immutable context plus the seams
/// (runner, env lookup, prompts, tool probe, liveness probe) that tests
/// substitute.
pub struct Session<'a> {
    pub runner: &'a dyn Runner,
    pub ctx: &'a EnvContext,
    pub lookup: EnvLookup<'a>,
    pub prompt: Prompt<'a>,
    pub confirm: Confirm<'a>,
    pub tools: ToolLookup<'a>,
    pub probe: HttpProbe<'a>,
    pub timings: Timings,
}

/// Gate shared by the mutating commands. `OperatorNotInstalled` is the only
/// recoverable outcome and the only one that asks for confirmation; tool and
/// connectivity failures need out-of-band remediation, so they abort.
fn ensure_ready(s: &Session, offer_install: bool) -> Result<()> {
    match prereq::check(s.runner, s.ctx, s.tools)? {
        PrereqStatus::Ready => Ok(()),
        PrereqStatus::MissingTool(tool) => Err(missing_tool(&tool)),
        PrereqStatus::NoClusterConnectivity => Err(no_cluster(s.ctx)),
        PrereqStatus::OperatorNotInstalled => {
            if offer_install
                && (s.confirm)("Vault Secrets Operator is not installed. Install it now?")?
            {
                let addr = context::resolve_addr(s.lookup, s.prompt)?;
                operator::install(s.runner, s.ctx, &addr, &s.timings.install)
            } else {
                Err(anyhow!(
                    "vault-secrets-operator is not installed (run: vsodemo install-vso)"
                ))
            }
        }
    }
}

/// Like [`ensure_ready`] but tolerates a missing operator; used by commands
/// that install it themselves or never touch it.
fn ensure_tools_and_cluster(s: &Session) -> Result<()> {
    match prereq::check(s.runner, s.ctx, s.tools)? {
        PrereqStatus::Ready | PrereqStatus::OperatorNotInstalled => Ok(()),
        PrereqStatus::MissingTool(tool) => Err(missing_tool(&tool)),
        PrereqStatus::NoClusterConnectivity => Err(no_cluster(s.ctx)),
    }
}

fn missing_tool(tool: &str) -> anyhow::Error {
    anyhow!("required tool `{tool}` not found on PATH; install {tool} and re-run")
}

fn no_cluster(ctx: &EnvContext) -> anyhow::Error {
    anyhow!(
        "cannot reach the cluster; fix kubeconfig first \
         (e.g. aws eks update-kubeconfig --region {} --name <cluster>)",
        ctx.region
    )
}

pub fn run_deploy(s: &Session) -> Result<()> {
    ensure_ready(s, true)?;
    let addr = context::resolve_addr(s.lookup, s.prompt)?;
    deploy::deploy(s.runner, s.ctx, &addr, s.timings.sync_grace)?;
    report::report(s.runner, s.ctx, s.probe)
}

pub fn run_deploy_with_ingress(s: &Session) -> Result<()> {
    ensure_ready(s, true)?;
    let addr = context::resolve_addr(s.lookup, s.prompt)?;
    deploy::deploy(s.runner, s.ctx, &addr, s.timings.sync_grace)?;
    ingress::attach(s.runner, s.ctx, s.timings.lb_poll)?;
    report::report(s.runner, s.ctx, s.probe)
}

/// Full provisioning pass. Each stage is idempotent, so re-running after a
/// mid-sequence failure converges without duplicating applied work.
pub fn run_setup_all(s: &Session) -> Result<()> {
    ensure_tools_and_cluster(s)?;
    let vault_env = VaultEnv::resolve(s.lookup, s.prompt)?;
    vault::check_reachable(s.runner, &vault_env)?;

    operator::install(s.runner, s.ctx, &vault_env.addr, &s.timings.install)?;
    vault::configure(s.runner, s.ctx, &vault_env)?;
    deploy::deploy(s.runner, s.ctx, &vault_env.addr, s.timings.sync_grace)?;
    // Ingress is best-effort; the report prints the fallback when skipped.
    ingress::attach(s.runner, s.ctx, s.timings.lb_poll)?;
    report::report(s.runner, s.ctx, s.probe)
}

pub fn run_install_vso(s: &Session) -> Result<()> {
    ensure_tools_and_cluster(s)?;
    let addr = context::resolve_addr(s.lookup, s.prompt)?;
    operator::install(s.runner, s.ctx, &addr, &s.timings.install)?;

    if (s.confirm)("Configure the Vault backend now?")? {
        let vault_env = VaultEnv::resolve(s.lookup, s.prompt)?;
        vault::check_reachable(s.runner, &vault_env)?;
        vault::configure(s.runner, s.ctx, &vault_env)?;
    }
    Ok(())
}

pub fn run_configure_vault(s: &Session) -> Result<()> {
    ensure_tools_and_cluster(s)?;
    let vault_env = VaultEnv::resolve(s.lookup, s.prompt)?;
    vault::check_reachable(s.runner, &vault_env)?;
    vault::configure(s.runner, s.ctx, &vault_env)
}

pub fn run_check_vso(s: &Session) -> Result<()> {
    operator::check(s.runner, s.ctx)
}

pub fn run_fix_image(s: &Session) -> Result<()> {
    for tool in ["terraform", "aws", "docker"] {
        if !(s.tools)(tool) {
            return Err(missing_tool(tool));
        }
    }
    image::fix_image(s.runner, s.ctx)
}

pub fn run_cleanup(s: &Session) -> Result<()> {
    deploy::cleanup(s.runner, s.ctx, s.confirm)
}

pub fn run_status(s: &Session) -> Result<()> {
    report::report(s.runner, s.ctx, s.probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedRunner;
    use std::collections::HashMap;

    const MOUNTS: &str = r#"{"secret/":{"type":"kv"}}"#;
    const AUTHS: &str = r#"{"kubernetes/":{"type":"kubernetes"}}"#;

    fn fast_timings() -> Timings {
        Timings {
            install: InstallTimings {
                crd_poll: PollConfig::new(Duration::from_millis(5), Duration::from_millis(20)),
                unresolved_grace: Duration::from_millis(1),
                rollout_timeout: Duration::from_secs(1),
            },
            sync_grace: Duration::ZERO,
            lb_poll: PollConfig::new(Duration::from_millis(5), Duration::from_millis(20)),
        }
    }

    fn credentials() -> HashMap<String, String> {
        [
            ("VAULT_ADDR".to_string(), "http://vault:8200".to_string()),
            ("VAULT_TOKEN".to_string(), "root".to_string()),
        ]
        .into_iter()
        .collect()
    }

    fn happy_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .ok_on("secrets list -format=json", MOUNTS)
            .ok_on("auth list -format=json", AUTHS)
            .ok_on("config view", "https://api.cluster.example:443")
            .ok_on("get configmap kube-root-ca.crt", "CA-PEM")
            .ok_on("get secret vault-auth-token", "reviewer-jwt")
            .ok_on("get svc vso-demo-service", "abc.elb.amazonaws.com")
    }

    struct Harness {
        runner: ScriptedRunner,
        ctx: EnvContext,
        env: HashMap<String, String>,
        confirm_answer: bool,
        tool_missing: Option<&'static str>,
    }

    impl Harness {
        fn new(runner: ScriptedRunner) -> Self {
            Harness {
                runner,
                ctx: EnvContext::load_from(&|_| None).expect("load"),
                env: credentials(),
                confirm_answer: true,
                tool_missing: None,
            }
        }

        fn run<F>(&self, f: F) -> Result<()>
        where
            F: FnOnce(&Session) -> Result<()>,
        {
            let session = Session {
                runner: &self.runner,
                ctx: &self.ctx,
                lookup: &|key| self.env.get(key).cloned(),
                prompt: &|label| Err(anyhow!("unexpected prompt: {label}")),
                confirm: &|_| Ok(self.confirm_answer),
                tools: &|tool| Some(tool) != self.tool_missing,
                probe: &|_| true,
                timings: fast_timings(),
            };
            f(&session)
        }
    }

    #[test]
    fn setup_all_runs_the_full_sequence() {
        let h = Harness::new(happy_runner());
        h.run(run_setup_all).expect("setup-all");
        assert!(h.runner.called("helm upgrade --install vault-secrets-operator"));
        assert!(h.runner.called("kv put -mount=secret myapp"));
        assert!(h.runner.called("kv put -mount=secret database"));
        assert!(
            h.runner.count_calls("apply -f -") >= 7,
            "six workload applies plus the ingress"
        );
        assert!(h.runner.called("wait --for=condition=available"));
    }

    #[test]
    fn missing_tool_blocks_every_mutation() {
        let mut h = Harness::new(ScriptedRunner::new());
        h.tool_missing = Some("vault");
        let err = h.run(run_deploy).expect_err("must fail");
        assert!(err.to_string().contains("vault"));
        assert!(
            h.runner.calls().is_empty(),
            "no command may run with a tool missing"
        );
    }

    #[test]
    fn crd_timeout_stops_setup_before_vault_configuration() {
        let h = Harness::new(happy_runner().fail_on("get crd", 1, "NotFound"));
        h.run(run_setup_all).expect_err("setup-all must fail");
        assert!(!h.runner.called("kv put"), "no configure step after install failure");
        assert!(!h.runner.called("apply -f -"));
    }

    #[test]
    fn lb_timeout_does_not_fail_setup() {
        // First matching rule wins, so the empty hostname is registered ahead
        // of the shared happy-path rules.
        let h = Harness::new(
            ScriptedRunner::new()
                .ok_on("get svc vso-demo-service", "")
                .ok_on("secrets list -format=json", MOUNTS)
                .ok_on("auth list -format=json", AUTHS)
                .ok_on("config view", "https://api.cluster.example:443")
                .ok_on("get configmap kube-root-ca.crt", "CA-PEM")
                .ok_on("get secret vault-auth-token", "reviewer-jwt"),
        );
        h.run(run_setup_all).expect("lb timeout is non-fatal");
        assert_eq!(
            h.runner.count_calls("apply -f -"),
            6,
            "workload applies only; no ingress without an endpoint"
        );
    }

    #[test]
    fn declined_operator_install_aborts_deploy() {
        let mut h = Harness::new(ScriptedRunner::new().fail_on("get crd", 1, "NotFound"));
        h.confirm_answer = false;
        let err = h.run(run_deploy).expect_err("must abort");
        assert!(err.to_string().contains("install-vso"));
        assert!(!h.runner.called("apply -f -"));
    }

    #[test]
    fn deploy_twice_repeats_only_declarative_applies() {
        let h = Harness::new(happy_runner());
        h.run(run_deploy).expect("first deploy");
        let first = h.runner.count_calls("apply -f -");
        h.run(run_deploy).expect("second deploy");
        assert_eq!(h.runner.count_calls("apply -f -"), first * 2);
        assert!(!h.runner.called("secrets enable"));
        assert!(!h.runner.called("helm upgrade"));
    }

    #[test]
    fn fix_image_requires_its_own_toolchain() {
        let mut h = Harness::new(ScriptedRunner::new());
        h.tool_missing = Some("docker");
        let err = h.run(run_fix_image).expect_err("must fail");
        assert!(err.to_string().contains("docker"));
        assert!(h.runner.calls().is_empty());
    }
}
