//! Immutable per-invocation configuration.
//!
//! Built once at dispatch time from environment variables plus an injected
//! prompt for anything that must not default silently (Vault credentials).
//! Nothing here is persisted; a fresh invocation re-derives all of it.

use crate::exec::CmdSpec;
use crate::ui::Prompt;
use anyhow::{anyhow, Context, Result};

pub const DEFAULT_NAMESPACE: &str = "vso-demo";
pub const DEFAULT_IMAGE: &str = "vso-demo-app:latest";
pub const DEFAULT_REGION: &str = "us-west-2";

/// Lookup seam over `std::env::var` so construction is testable.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Cluster-facing settings, fixed for the whole invocation.
#[derive(Debug, Clone)]
pub struct EnvContext {
    pub namespace: String,
    pub region: String,
    pub image_tag: String,
    /// kubectl argv; overridable via `VSODEMO_KUBECTL` (e.g. `minikube kubectl --`).
    pub kubectl: Vec<String>,
}

impl EnvContext {
    pub fn load() -> Result<Self> {
        Self::load_from(&process_env)
    }

    pub fn load_from(lookup: EnvLookup) -> Result<Self> {
        let kubectl = match lookup("VSODEMO_KUBECTL") {
            Some(raw) => {
                let argv = shell_words::split(&raw)
                    .with_context(|| format!("parse VSODEMO_KUBECTL override: {raw}"))?;
                if argv.is_empty() {
                    return Err(anyhow!("VSODEMO_KUBECTL is set but empty"));
                }
                argv
            }
            None => vec!["kubectl".to_string()],
        };

        Ok(EnvContext {
            namespace: lookup("VSO_DEMO_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.into()),
            region: lookup("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.into()),
            image_tag: lookup("VSO_DEMO_IMAGE").unwrap_or_else(|| DEFAULT_IMAGE.into()),
            kubectl,
        })
    }

    /// kubectl invocation pinned to the demo namespace.
    pub fn kubectl_ns<I, S>(&self, args: I) -> CmdSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full: Vec<String> = vec!["-n".into(), self.namespace.clone()];
        full.extend(args.into_iter().map(Into::into));
        CmdSpec::from_argv(&self.kubectl, full)
    }

    /// kubectl invocation without a namespace argument.
    pub fn kubectl<I, S>(&self, args: I) -> CmdSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CmdSpec::from_argv(&self.kubectl, args)
    }
}

/// Vault endpoint and token. Resolved only for commands that talk to Vault;
/// absence of either triggers a prompt, never a silent default.
#[derive(Clone)]
pub struct VaultEnv {
    pub addr: String,
    pub token: String,
}

impl VaultEnv {
    pub fn resolve(lookup: EnvLookup, prompt: Prompt) -> Result<Self> {
        Ok(VaultEnv {
            addr: resolve_addr(lookup, prompt)?,
            token: require(lookup, prompt, "VAULT_TOKEN", "Vault token")?,
        })
    }

    /// vault CLI invocation carrying the endpoint and token.
    pub fn vault<I, S>(&self, args: I) -> CmdSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CmdSpec::new("vault", args)
            .env("VAULT_ADDR", &self.addr)
            .env("VAULT_TOKEN", &self.token)
    }
}

/// Commands that only need the endpoint (helm install, manifest rendering).
pub fn resolve_addr(lookup: EnvLookup, prompt: Prompt) -> Result<String> {
    require(lookup, prompt, "VAULT_ADDR", "Vault address (e.g. http://vault.example.com:8200)")
}

fn require(lookup: EnvLookup, prompt: Prompt, key: &str, label: &str) -> Result<String> {
    if let Some(value) = lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        return Ok(value);
    }
    let value = prompt(label)?;
    if value.trim().is_empty() {
        return Err(anyhow!("{key} is required and was not provided"));
    }
    Ok(value.trim().to_string())
}

// Token is deliberately absent from Debug output.
impl std::fmt::Debug for VaultEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultEnv")
            .field("addr", &self.addr)
            .field("token", &"<redacted>")
            .finish()
    }
}
