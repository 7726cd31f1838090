//! Vault backend configuration: kv mount, demo secrets, policy, and the
//! Kubernetes auth binding the operator authenticates through.
//!
//! Every sub-step is idempotent by precondition check. Failure at any
//! sub-step is fatal for the whole configure operation; there is no rollback
//! because a re-run skips already-done work.

use crate::context::{EnvContext, VaultEnv};
use crate::exec::Runner;
use crate::operator::AUTH_ROLE;
use crate::ui;
use anyhow::{anyhow, Context, Result};

pub const MOUNT_PATH: &str = "secret";
pub const POLICY_NAME: &str = "vso-demo-policy";
pub const AUTH_PATH: &str = "kubernetes";
pub const TOKEN_TTL: &str = "24h";
pub const TOKEN_AUDIENCE: &str = "vault";
/// Service account whose token Vault uses for TokenReview calls.
pub const REVIEWER_SA: &str = "vault-auth";
/// Service account the demo workload runs as.
pub const WORKLOAD_SA: &str = "vso-demo-sa";

const POLICY_HCL: &str = r#"path "secret/data/*" {
  capabilities = ["read"]
}

path "secret/metadata/*" {
  capabilities = ["read", "list"]
}
"#;

/// Run all configuration sub-steps in dependency order.
pub fn configure(runner: &dyn Runner, ctx: &EnvContext, vault: &VaultEnv) -> Result<()> {
    ensure_kv_mount(runner, vault)?;
    write_demo_secrets(runner, vault)?;
    write_policy(runner, vault)?;
    ensure_kubernetes_auth(runner, vault)?;
    let conn = resolve_cluster_connection(runner, ctx)?;
    write_auth_config(runner, vault, &conn)?;
    write_auth_role(runner, ctx, vault)?;
    ui::ok("vault backend configured");
    Ok(())
}

/// Enable kv-v2 at the fixed mount only when the mount listing lacks it.
fn ensure_kv_mount(runner: &dyn Runner, vault: &VaultEnv) -> Result<()> {
    let listing = runner.run(&vault.vault(["secrets", "list", "-format=json"]))?;
    if !listing.success() {
        return Err(anyhow!(
            "cannot list vault mounts: {} (is VAULT_TOKEN valid?)",
            listing.stderr_line()
        ));
    }
    if mount_listed(&listing.stdout, MOUNT_PATH)? {
        ui::info(format!("kv mount {MOUNT_PATH}/ already enabled; skipping"));
        return Ok(());
    }

    ui::info(format!("enabling kv-v2 secrets engine at {MOUNT_PATH}/"));
    let path_flag = format!("-path={MOUNT_PATH}");
    let enable = runner.run(&vault.vault([
        "secrets",
        "enable",
        path_flag.as_str(),
        "-version=2",
        "kv",
    ]))?;
    if !enable.success() {
        return Err(anyhow!("vault secrets enable failed: {}", enable.stderr_line()));
    }
    Ok(())
}

/// Demo secret material is disposable, so writes are unconditional
/// overwrites. Field names match the demo app's env contract.
fn write_demo_secrets(runner: &dyn Runner, vault: &VaultEnv) -> Result<()> {
    ui::info("writing demo secrets (myapp, database)");
    let mount_flag = format!("-mount={MOUNT_PATH}");

    let myapp = runner.run(&vault.vault([
        "kv",
        "put",
        mount_flag.as_str(),
        "myapp",
        "username=demo-user",
        "password=demo-password-123",
        "api_key=sample-api-key-456",
    ]))?;
    if !myapp.success() {
        return Err(anyhow!("write secret myapp failed: {}", myapp.stderr_line()));
    }

    let database = runner.run(&vault.vault([
        "kv",
        "put",
        mount_flag.as_str(),
        "database",
        "host=vso-demo-db.internal",
        "port=5432",
        "username=db-admin",
        "password=db-password-789",
    ]))?;
    if !database.success() {
        return Err(anyhow!(
            "write secret database failed: {}",
            database.stderr_line()
        ));
    }
    Ok(())
}

/// Read-only policy over the demo mount's data and metadata paths.
fn write_policy(runner: &dyn Runner, vault: &VaultEnv) -> Result<()> {
    ui::info(format!("writing policy {POLICY_NAME}"));
    let write = runner.run(
        &vault
            .vault(["policy", "write", POLICY_NAME, "-"])
            .stdin(POLICY_HCL),
    )?;
    if !write.success() {
        return Err(anyhow!("vault policy write failed: {}", write.stderr_line()));
    }
    Ok(())
}

/// Enable the kubernetes auth method only when the auth listing lacks it.
fn ensure_kubernetes_auth(runner: &dyn Runner, vault: &VaultEnv) -> Result<()> {
    let listing = runner.run(&vault.vault(["auth", "list", "-format=json"]))?;
    if !listing.success() {
        return Err(anyhow!(
            "cannot list vault auth methods: {}",
            listing.stderr_line()
        ));
    }
    if mount_listed(&listing.stdout, AUTH_PATH)? {
        ui::info(format!("auth method {AUTH_PATH}/ already enabled; skipping"));
        return Ok(());
    }

    ui::info(format!("enabling {AUTH_PATH} auth method"));
    let enable = runner.run(&vault.vault(["auth", "enable", AUTH_PATH]))?;
    if !enable.success() {
        return Err(anyhow!("vault auth enable failed: {}", enable.stderr_line()));
    }
    Ok(())
}

/// Cluster connection parameters for the auth method's backend config.
pub struct ClusterConnection {
    pub host: String,
    pub ca_cert: String,
    pub reviewer_jwt: String,
}

/// Read the API endpoint, CA material, and reviewer token. The reviewer JWT
/// comes from the bound service-account secret; when that yields an empty
/// token (token-secret autogeneration is off on recent clusters), mint one
/// directly instead.
fn resolve_cluster_connection(runner: &dyn Runner, ctx: &EnvContext) -> Result<ClusterConnection> {
    let host = runner.run(&ctx.kubectl([
        "config",
        "view",
        "--raw",
        "--minify",
        "--flatten",
        "-o",
        "jsonpath={.clusters[].cluster.server}",
    ]))?;
    if !host.success() || host.stdout_trim().is_empty() {
        return Err(anyhow!(
            "cannot resolve cluster API endpoint: {}",
            host.stderr_line()
        ));
    }

    let ca = runner.run(&ctx.kubectl_ns([
        "get",
        "configmap",
        "kube-root-ca.crt",
        "-o",
        r"jsonpath={.data.ca\.crt}",
    ]))?;
    if !ca.success() || ca.stdout_trim().is_empty() {
        return Err(anyhow!(
            "cannot read cluster CA from kube-root-ca.crt: {}",
            ca.stderr_line()
        ));
    }

    let jwt = reviewer_jwt(runner, ctx)?;

    Ok(ClusterConnection {
        host: host.stdout_trim().to_string(),
        ca_cert: ca.stdout.trim().to_string(),
        reviewer_jwt: jwt,
    })
}

fn reviewer_jwt(runner: &dyn Runner, ctx: &EnvContext) -> Result<String> {
    let from_secret = runner.run(&ctx.kubectl_ns([
        "get",
        "secret",
        "vault-auth-token",
        "-o",
        "go-template={{.data.token | base64decode}}",
    ]))?;
    if from_secret.success() && !from_secret.stdout_trim().is_empty() {
        return Ok(from_secret.stdout_trim().to_string());
    }

    ui::info("service-account token secret empty; minting a fresh reviewer token");
    let minted = runner.run(&ctx.kubectl_ns(["create", "token", REVIEWER_SA, "--duration=24h"]))?;
    if !minted.success() || minted.stdout_trim().is_empty() {
        return Err(anyhow!(
            "cannot mint reviewer token for {REVIEWER_SA}: {}",
            minted.stderr_line()
        ));
    }
    Ok(minted.stdout_trim().to_string())
}

fn write_auth_config(
    runner: &dyn Runner,
    vault: &VaultEnv,
    conn: &ClusterConnection,
) -> Result<()> {
    ui::info("writing kubernetes auth backend config");
    let config_path = format!("auth/{AUTH_PATH}/config");
    let host_arg = format!("kubernetes_host={}", conn.host);
    let ca_arg = format!("kubernetes_ca_cert={}", conn.ca_cert);
    let jwt_arg = format!("token_reviewer_jwt={}", conn.reviewer_jwt);
    let write = runner.run(&vault.vault([
        "write",
        config_path.as_str(),
        host_arg.as_str(),
        ca_arg.as_str(),
        jwt_arg.as_str(),
    ]))?;
    if !write.success() {
        return Err(anyhow!(
            "vault write {config_path} failed: {}",
            write.stderr_line()
        ));
    }
    Ok(())
}

/// Role binding scoping which service accounts may authenticate, with the
/// fixed ttl and the audience claim projected tokens carry.
fn write_auth_role(runner: &dyn Runner, ctx: &EnvContext, vault: &VaultEnv) -> Result<()> {
    ui::info(format!("writing auth role {AUTH_ROLE}"));
    let role_path = format!("auth/{AUTH_PATH}/role/{AUTH_ROLE}");
    let names_arg = format!("bound_service_account_names={WORKLOAD_SA}");
    let namespaces_arg = format!("bound_service_account_namespaces={}", ctx.namespace);
    let policies_arg = format!("policies={POLICY_NAME}");
    let ttl_arg = format!("ttl={TOKEN_TTL}");
    let audience_arg = format!("audience={TOKEN_AUDIENCE}");
    let write = runner.run(&vault.vault([
        "write",
        role_path.as_str(),
        names_arg.as_str(),
        namespaces_arg.as_str(),
        policies_arg.as_str(),
        ttl_arg.as_str(),
        audience_arg.as_str(),
    ]))?;
    if !write.success() {
        return Err(anyhow!(
            "vault write {role_path} failed: {}",
            write.stderr_line()
        ));
    }
    Ok(())
}

/// True when `vault ... list -format=json` contains `<path>/` as a mount key.
fn mount_listed(listing_json: &str, path: &str) -> Result<bool> {
    let mounts: serde_json::Value =
        serde_json::from_str(listing_json).context("parse vault mount listing")?;
    let key = format!("{path}/");
    Ok(mounts
        .as_object()
        .map(|map| map.contains_key(&key))
        .unwrap_or(false))
}

/// Fatal connectivity probe used before configure mutates anything.
pub fn check_reachable(runner: &dyn Runner, vault: &VaultEnv) -> Result<()> {
    let status = runner.run(&vault.vault(["status", "-format=json"]))?;
    if !status.success() {
        return Err(anyhow!(
            "vault at {} is unreachable or sealed: {} \
             (verify VAULT_ADDR and run: vault status)",
            vault.addr,
            status.stderr_line()
        ));
    }
    Ok(())
}
