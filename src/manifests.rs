//! Embedded Kubernetes manifest templates and placeholder rendering.
//!
//! Templates are compiled in so the binary works from any directory.
//! Placeholders use `{{KEY}}`; rendering fails on leftovers so a typo in a
//! template never reaches `kubectl apply`.

use anyhow::{anyhow, Result};

pub const NAMESPACE: &str = include_str!("../manifests/namespace.yaml");
pub const VAULT_CONNECTION: &str = include_str!("../manifests/vault-connection.yaml");
pub const VAULT_AUTH: &str = include_str!("../manifests/vault-auth.yaml");
pub const STATIC_SECRETS: &str = include_str!("../manifests/vault-static-secrets.yaml");
pub const DEPLOYMENT: &str = include_str!("../manifests/deployment.yaml");
pub const SERVICE: &str = include_str!("../manifests/service.yaml");
pub const INGRESS: &str = include_str!("../manifests/ingress.yaml");

/// Substitute `{{KEY}}` placeholders. Errors if a placeholder survives
/// rendering or a substitution key was never used.
pub fn render(template: &str, substitutions: &[(&str, &str)]) -> Result<String> {
    let mut rendered = template.to_string();
    for (key, value) in substitutions {
        let token = format!("{{{{{key}}}}}");
        if !rendered.contains(&token) {
            return Err(anyhow!("template has no placeholder {token}"));
        }
        rendered = rendered.replace(&token, value);
    }
    if let Some(start) = rendered.find("{{") {
        let tail: String = rendered[start..].chars().take(32).collect();
        return Err(anyhow!("unresolved placeholder near `{tail}`"));
    }
    Ok(rendered)
}
