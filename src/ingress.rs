//! Ingress attachment once the load balancer acquires a hostname.
//!
//! The load balancer is provisioned asynchronously by the cloud controller;
//! never converging here is degraded service, not failure, because the demo
//! stays reachable through a port-forward.

use crate::context::EnvContext;
use crate::deploy;
use crate::exec::Runner;
use crate::manifests;
use crate::poll::{poll, PollConfig};
use crate::ui;
use anyhow::Result;
use std::time::Duration;

pub const SERVICE_NAME: &str = "vso-demo-service";

pub fn default_poll() -> PollConfig {
    PollConfig::new(Duration::from_secs(5), Duration::from_secs(300))
}

#[derive(Debug, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached(String),
    SkippedNoEndpoint,
}

/// Wait for the service's external hostname, then apply the routing rule
/// bound to it. Timeout degrades to `SkippedNoEndpoint` with the
/// port-forward fallback printed for the operator.
pub fn attach(runner: &dyn Runner, ctx: &EnvContext, config: PollConfig) -> Result<AttachOutcome> {
    ui::info("waiting for load balancer hostname");
    let mut hostname: Option<String> = None;
    let outcome = poll("load balancer hostname", config, || {
        match lb_hostname(runner, ctx) {
            Ok(Some(host)) => {
                hostname = Some(host);
                true
            }
            _ => false,
        }
    });

    let Some(host) = hostname.filter(|_| outcome.satisfied()) else {
        ui::warn(format!(
            "no load balancer hostname after {}s; skipping ingress",
            config.timeout.as_secs()
        ));
        ui::info(port_forward_fallback(ctx));
        return Ok(AttachOutcome::SkippedNoEndpoint);
    };

    ui::info(format!("attaching ingress for {host}"));
    let rendered = manifests::render(
        manifests::INGRESS,
        &[("NAMESPACE", ctx.namespace.as_str()), ("LB_HOSTNAME", host.as_str())],
    )?;
    deploy::apply(runner, ctx, &rendered)?;
    ui::ok(format!("ingress attached; demo at http://{host}/"));
    Ok(AttachOutcome::Attached(host))
}

/// External hostname of the demo service, if assigned yet.
pub fn lb_hostname(runner: &dyn Runner, ctx: &EnvContext) -> Result<Option<String>> {
    let probe = runner.run(&ctx.kubectl_ns([
        "get",
        "svc",
        SERVICE_NAME,
        "-o",
        "jsonpath={.status.loadBalancer.ingress[0].hostname}",
    ]))?;
    if !probe.success() {
        return Ok(None);
    }
    let host = probe.stdout_trim();
    Ok(if host.is_empty() { None } else { Some(host.to_string()) })
}

pub fn port_forward_fallback(ctx: &EnvContext) -> String {
    format!(
        "fallback: kubectl port-forward svc/{SERVICE_NAME} 8080:80 -n {} then open http://localhost:8080/",
        ctx.namespace
    )
}
