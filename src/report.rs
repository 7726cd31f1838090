//! Read-only status aggregation. Never mutates external state.

use crate::context::EnvContext;
use crate::exec::Runner;
use crate::ingress;
use crate::ui;
use anyhow::{anyhow, Result};
use std::time::Duration;

pub const WORKLOAD: &str = "vso-demo-app";
pub const SYNCED_SECRETS: &[&str] = &["vso-demo-secret", "vso-db-secret"];
pub const READY_TIMEOUT: Duration = Duration::from_secs(120);
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP liveness seam; production probes with `ureq`.
pub type HttpProbe<'a> = &'a dyn Fn(&str) -> bool;

pub fn http_probe(url: &str) -> bool {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(LIVENESS_TIMEOUT))
        .build()
        .into();
    agent.get(url).call().is_ok()
}

/// Aggregate workload, secret-sync, and endpoint state.
///
/// An absent workload is a clean "not deployed" report with a zero exit; a
/// present workload that never turns ready is a deployment failure and
/// errors out. Missing synced secrets only warn, since the operator may
/// still be converging.
pub fn report(runner: &dyn Runner, ctx: &EnvContext, probe: HttpProbe) -> Result<()> {
    let exists = runner.run(&ctx.kubectl_ns(["get", "deployment", WORKLOAD]))?;
    if !exists.success() {
        ui::info(format!(
            "workload {WORKLOAD} is not deployed in namespace {} (run: vsodemo deploy)",
            ctx.namespace
        ));
        return Ok(());
    }

    ui::info(format!("waiting for deployment/{WORKLOAD} to be available"));
    let target = format!("deployment/{WORKLOAD}");
    let timeout_flag = format!("--timeout={}s", READY_TIMEOUT.as_secs());
    let wait = runner.run(&ctx.kubectl_ns([
        "wait",
        "--for=condition=available",
        target.as_str(),
        timeout_flag.as_str(),
    ]))?;
    if !wait.success() {
        return Err(anyhow!(
            "deployment {WORKLOAD} is not ready: {} \
             (inspect with: kubectl describe deployment {WORKLOAD} -n {})",
            wait.stderr_line(),
            ctx.namespace
        ));
    }
    ui::ok(format!("deployment {WORKLOAD} is ready"));

    for &name in SYNCED_SECRETS {
        let secret = runner.run(&ctx.kubectl_ns(["get", "secret", name]))?;
        if secret.success() {
            ui::ok(format!("synced secret {name} present"));
        } else {
            ui::warn(format!(
                "synced secret {name} missing; the operator may still be syncing \
                 (inspect with: kubectl get vaultstaticsecrets -n {})",
                ctx.namespace
            ));
        }
    }

    let pods = runner.run(&ctx.kubectl_ns(["get", "pods"]))?;
    if pods.success() {
        println!("{}", pods.stdout_trim());
    }
    let services = runner.run(&ctx.kubectl_ns(["get", "svc"]))?;
    if services.success() {
        println!("{}", services.stdout_trim());
    }

    match ingress::lb_hostname(runner, ctx)? {
        Some(host) => {
            let url = format!("http://{host}/api/health");
            if probe(&url) {
                ui::ok(format!("demo is live at http://{host}/"));
            } else {
                ui::warn(format!(
                    "load balancer {host} assigned but not answering yet; \
                     DNS may still be propagating"
                ));
            }
        }
        None => ui::info(ingress::port_forward_fallback(ctx)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedRunner;

    fn ctx() -> EnvContext {
        EnvContext::load_from(&|_| None).expect("load")
    }

    fn no_probe(_: &str) -> bool {
        panic!("liveness probe must not run in this scenario")
    }

    #[test]
    fn absent_workload_reports_clean_not_failed() {
        let runner = ScriptedRunner::new().fail_on("get deployment vso-demo-app", 1, "NotFound");
        report(&runner, &ctx(), &no_probe).expect("absent workload is not an error");
        assert!(!runner.called("wait --for=condition=available"));
    }

    #[test]
    fn readiness_timeout_is_fatal() {
        let runner = ScriptedRunner::new()
            .fail_on("wait --for=condition=available", 1, "timed out waiting");
        let err = report(&runner, &ctx(), &no_probe).expect_err("must fail");
        assert!(err.to_string().contains("not ready"));
    }

    #[test]
    fn missing_synced_secret_only_warns() {
        let runner = ScriptedRunner::new()
            .fail_on("get secret vso-db-secret", 1, "NotFound")
            .ok_on("get svc vso-demo-service", "");
        report(&runner, &ctx(), &|_| true).expect("missing secret must not fail status");
    }

    #[test]
    fn assigned_hostname_is_probed() {
        let probed = std::cell::RefCell::new(Vec::new());
        let runner = ScriptedRunner::new()
            .ok_on("get svc vso-demo-service", "abc.elb.amazonaws.com");
        report(&runner, &ctx(), &|url: &str| {
            probed.borrow_mut().push(url.to_string());
            true
        })
        .expect("report");
        assert_eq!(
            probed.borrow().as_slice(),
            ["http://abc.elb.amazonaws.com/api/health"]
        );
    }

    #[test]
    fn report_never_mutates() {
        let runner = ScriptedRunner::new().ok_on("get svc vso-demo-service", "");
        report(&runner, &ctx(), &|_| true).expect("report");
        for call in runner.calls() {
            assert!(
                !call.contains("apply") && !call.contains("delete") && !call.contains("create"),
                "mutating call in status path: {call}"
            );
        }
    }
}
